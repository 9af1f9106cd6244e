/*
 *  scheduler.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Refresh scheduler - decides when and what to render, one render at a
 *  time
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

//! Refresh scheduler
//!
//! Two tasks share one single-flight lock:
//!
//! 1. the tick loop, which evaluates the active playlist once per tick and
//!    renders the next plugin instance when the current one has been shown
//!    for its interval
//! 2. the trigger worker, which drains manual requests (see `trigger`) and
//!    runs them through `manual_update`
//!
//! Whoever holds the lock owns the whole Deciding, Rendering, Dispatching
//! sequence. Manual requests wait for an in-flight render; nothing is ever
//! cancelled.

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::DeviceConfig;
use crate::display::{DisplayError, DisplayManager};
use crate::playlist::{PlaylistManager, PluginInstance, SharedPlaylists};
use crate::plugins::{PluginError, PluginRegistry};
use crate::trigger::{self, Trigger, TriggerHandle};

/// Consecutive failures from which each further failure logs as an error
const FAILURE_ESCALATION: u32 = 3;

pub const UPDATING_TEXT: &str = "Updating...";
const OVERLAY_POSITION: (&str, &str) = ("right", "bottom");

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Playlist {0} not found")]
    PlaylistNotFound(String),

    #[error("Plugin instance {plugin} not found in playlist {playlist}")]
    PluginNotFound { playlist: String, plugin: String },

    #[error("Plugin render failed: {0}")]
    Plugin(#[from] PluginError),

    #[error("Display failed: {0}")]
    Display(#[from] DisplayError),

    #[error("Render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Playlist state poisoned")]
    Poisoned,
}

/// One render request. Built, rendered, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshAction {
    pub playlist: String,
    pub plugin: String,
    pub force: bool,
    pub reason: String,
}

impl RefreshAction {
    pub fn new(playlist: &str, plugin: &str, force: bool, reason: &str) -> Self {
        Self {
            playlist: playlist.to_string(),
            plugin: plugin.to_string(),
            force,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Deciding,
    Rendering,
    Dispatching,
}

/// State guarded by the single-flight lock
#[derive(Debug, Default)]
struct Bookkeeping {
    consecutive_failures: u32,
    /// last failed automatic attempt per playlist, delays the retry
    failed_attempts: HashMap<String, Instant>,
}

struct Shared {
    config: Arc<DeviceConfig>,
    display: Arc<DisplayManager>,
    playlists: SharedPlaylists,
    plugins: Arc<PluginRegistry>,
    refresh_lock: AsyncMutex<Bookkeeping>,
    phase: watch::Sender<RefreshPhase>,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    ticker: JoinHandle<()>,
    worker: JoinHandle<()>,
}

pub struct RefreshScheduler {
    shared: Arc<Shared>,
    triggers: TriggerHandle,
    trigger_rx: Mutex<Option<mpsc::Receiver<Trigger>>>,
    running: Mutex<Option<Running>>,
}

fn lock_playlists(playlists: &SharedPlaylists) -> Result<MutexGuard<'_, PlaylistManager>, RefreshError> {
    playlists.lock().map_err(|_| RefreshError::Poisoned)
}

impl Shared {
    fn set_phase(&self, phase: RefreshPhase) {
        self.phase.send_replace(phase);
    }

    /// Work out the automatic action for this tick, if any
    fn due_action(&self, book: &Bookkeeping) -> Result<Option<RefreshAction>, RefreshError> {
        let pm = lock_playlists(&self.playlists)?;
        let Some(playlist) = pm.active_playlist() else {
            debug!("no active playlist, nothing due");
            return Ok(None);
        };
        if playlist.is_empty() {
            debug!("playlist {} is empty, nothing due", playlist.name);
            return Ok(None);
        }

        let failed_at = book.failed_attempts.get(&playlist.name).copied();
        // (instance whose interval gates the step, its last refresh)
        let (gate, shown_at) = match playlist.current_index() {
            None => (&playlist.plugins()[0], None),
            Some(idx) => match playlist.plugins().get(idx) {
                Some(current) => (current, current.last_refresh()),
                None => {
                    warn!(
                        "playlist {} cursor {} out of range ({} plugins), skipping tick",
                        playlist.name,
                        idx,
                        playlist.plugins().len()
                    );
                    return Ok(None);
                }
            },
        };

        if let Some(at) = shown_at.into_iter().chain(failed_at).max() {
            let elapsed = Instant::now().saturating_duration_since(at);
            if elapsed < gate.interval {
                debug!("{} waiting {}s of {}s", gate.name, elapsed.as_secs(), gate.interval.as_secs());
                return Ok(None);
            }
        }
        let Some(target) = playlist.successor_index() else {
            return Ok(None);
        };

        let plugin = &playlist.plugins()[target];
        Ok(Some(RefreshAction::new(&playlist.name, &plugin.name, false, "interval elapsed")))
    }

    fn instance_for(&self, action: &RefreshAction) -> Result<PluginInstance, RefreshError> {
        let pm = lock_playlists(&self.playlists)?;
        let playlist = pm
            .get_playlist(&action.playlist)
            .ok_or_else(|| RefreshError::PlaylistNotFound(action.playlist.clone()))?;
        playlist.plugin(&action.plugin).cloned().ok_or_else(|| RefreshError::PluginNotFound {
            playlist: action.playlist.clone(),
            plugin: action.plugin.clone(),
        })
    }

    /// Generate and dispatch. Caller holds the refresh lock.
    /// Returns the completion time.
    async fn render(&self, action: &RefreshAction) -> Result<Instant, RefreshError> {
        let instance = self.instance_for(action)?;
        let settings = self.plugins.render_settings_for(&instance);

        self.set_phase(RefreshPhase::Rendering);
        let plugins = Arc::clone(&self.plugins);
        let config = Arc::clone(&self.config);
        let image = tokio::task::spawn_blocking(move || plugins.generate(&instance, &config)).await??;

        self.set_phase(RefreshPhase::Dispatching);
        let display = Arc::clone(&self.display);
        tokio::task::spawn_blocking(move || display.display_image(&image, &settings)).await??;

        Ok(Instant::now())
    }

    /// Stamp the rendered instance and move the cursor onto it
    fn commit(&self, action: &RefreshAction, done: Instant) -> Result<(), RefreshError> {
        let mut pm = lock_playlists(&self.playlists)?;
        let Some(playlist) = pm.get_playlist_mut(&action.playlist) else {
            warn!("playlist {} vanished during render", action.playlist);
            return Ok(());
        };
        let Some(idx) = playlist.find(&action.plugin) else {
            warn!("{} removed from {} during render", action.plugin, action.playlist);
            return Ok(());
        };
        if let Some(instance) = playlist.plugin_mut(&action.plugin) {
            instance.stamp(done);
        }
        playlist.set_current_index(idx);
        Ok(())
    }

    async fn tick(&self) -> Result<Option<RefreshAction>, RefreshError> {
        let mut book = self.refresh_lock.lock().await;
        self.set_phase(RefreshPhase::Deciding);

        let action = match self.due_action(&book) {
            Ok(Some(action)) => action,
            other => {
                self.set_phase(RefreshPhase::Idle);
                return other;
            }
        };
        info!("Refreshing {} / {} ({})", action.playlist, action.plugin, action.reason);

        let outcome = match self.render(&action).await {
            Ok(done) => self.commit(&action, done),
            Err(e) => Err(e),
        };
        self.set_phase(RefreshPhase::Idle);

        match outcome {
            Ok(()) => {
                book.consecutive_failures = 0;
                book.failed_attempts.remove(&action.playlist);
                Ok(Some(action))
            }
            Err(e) => {
                book.consecutive_failures += 1;
                book.failed_attempts.insert(action.playlist.clone(), Instant::now());
                if book.consecutive_failures >= FAILURE_ESCALATION {
                    error!(
                        "Refresh of {} failed ({} in a row): {}",
                        action.plugin, book.consecutive_failures, e
                    );
                } else {
                    warn!("Refresh of {} failed: {}", action.plugin, e);
                }
                Err(e)
            }
        }
    }

    async fn manual_update(&self, action: RefreshAction) -> Result<(), RefreshError> {
        let _book = self.refresh_lock.lock().await;
        self.set_phase(RefreshPhase::Deciding);
        info!("Manual refresh of {} / {} ({})", action.playlist, action.plugin, action.reason);

        let outcome = match self.render(&action).await {
            Ok(done) => self.commit(&action, done),
            Err(e) => Err(e),
        };
        self.set_phase(RefreshPhase::Idle);

        if let Err(e) = &outcome {
            error!("Manual refresh of {} failed: {}", action.plugin, e);
        }
        outcome
    }

    /// Resolve a trigger against the active playlist
    fn action_for(&self, trigger: Trigger) -> Result<Option<RefreshAction>, RefreshError> {
        let mut pm = lock_playlists(&self.playlists)?;
        let Some(playlist) = pm.active_playlist_mut() else {
            warn!("{} ignored: no active playlist", trigger);
            return Ok(None);
        };
        let target = match trigger {
            Trigger::RefreshCurrent => playlist.current_plugin().or_else(|| playlist.plugins().first()),
            Trigger::NextPlugin => playlist.advance_cyclic(),
        };
        let Some(target) = target.map(|p| p.name.clone()) else {
            warn!("{} ignored: playlist {} is empty", trigger, playlist.name);
            return Ok(None);
        };
        Ok(Some(RefreshAction::new(&playlist.name, &target, true, &trigger.to_string())))
    }

    async fn handle_trigger(&self, trigger: Trigger) {
        let action = match self.action_for(trigger) {
            Ok(Some(action)) => action,
            Ok(None) => return,
            Err(e) => {
                error!("{} ignored: {}", trigger, e);
                return;
            }
        };

        let display = Arc::clone(&self.display);
        let overlay = tokio::task::spawn_blocking(move || display.display_overlay(UPDATING_TEXT, OVERLAY_POSITION));
        if let Err(e) = overlay.await {
            warn!("overlay task failed: {}", e);
        }

        // failures already logged by manual_update
        let _ = self.manual_update(action).await;
    }
}

async fn tick_loop(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    let period = shared.config.scheduler().tick();
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Refresh loop started, tick every {}s", period.as_secs());

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = interval.tick() => {
                // errors are logged inside tick
                let _ = shared.tick().await;
            }
        }
    }
    debug!("refresh loop exited");
}

async fn trigger_worker(shared: Arc<Shared>, mut rx: mpsc::Receiver<Trigger>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            next = rx.recv() => match next {
                Some(trigger) => shared.handle_trigger(trigger).await,
                None => break,
            },
        }
    }
    debug!("trigger worker exited");
}

impl RefreshScheduler {
    pub fn new(
        config: Arc<DeviceConfig>,
        display: Arc<DisplayManager>,
        playlists: SharedPlaylists,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        let (triggers, trigger_rx) = trigger::channel(config.scheduler().debounce());
        let (phase, _) = watch::channel(RefreshPhase::Idle);
        let shared = Shared {
            config,
            display,
            playlists,
            plugins,
            refresh_lock: AsyncMutex::new(Bookkeeping::default()),
            phase,
        };
        Self {
            shared: Arc::new(shared),
            triggers,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            running: Mutex::new(None),
        }
    }

    /// Spawn the tick loop and the trigger worker. Must be called from
    /// within a tokio runtime; a second call is ignored.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.is_some() {
            warn!("Scheduler already running");
            return;
        }
        let Some(rx) = self.trigger_rx.lock().unwrap_or_else(|p| p.into_inner()).take() else {
            warn!("Scheduler cannot be restarted after stop");
            return;
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let ticker = tokio::spawn(tick_loop(Arc::clone(&self.shared), stop_rx.clone()));
        let worker = tokio::spawn(trigger_worker(Arc::clone(&self.shared), rx, stop_rx));
        *running = Some(Running { stop_tx, ticker, worker });
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    /// Ask both tasks to finish and wait for them, at most the configured
    /// shutdown timeout. An in-flight render always runs to completion;
    /// returns false if the wait timed out.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(Running { stop_tx, ticker, worker }) = running else {
            return true;
        };
        info!("Stopping refresh scheduler");
        stop_tx.send_replace(true);

        let limit = self.shared.config.scheduler().shutdown_timeout();
        match time::timeout(limit, async {
            let _ = ticker.await;
            let _ = worker.await;
        })
        .await
        {
            Ok(()) => {
                info!("Refresh scheduler stopped");
                true
            }
            Err(_) => {
                warn!("Refresh scheduler still busy after {}s, leaving it", limit.as_secs());
                false
            }
        }
    }

    /// One evaluation of the scheduling rules: `Ok(None)` when nothing
    /// was due, the rendered action otherwise.
    pub async fn tick(&self) -> Result<Option<RefreshAction>, RefreshError> {
        self.shared.tick().await
    }

    /// Render `action` now, queued behind any render in flight
    pub async fn manual_update(&self, action: RefreshAction) -> Result<(), RefreshError> {
        self.shared.manual_update(action).await
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        self.triggers.clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RefreshPhase> {
        self.shared.phase.subscribe()
    }

    pub fn display(&self) -> &Arc<DisplayManager> {
        &self.shared.display
    }

    pub fn playlists(&self) -> &SharedPlaylists {
        &self.shared.playlists
    }

    #[cfg(test)]
    async fn consecutive_failures(&self) -> u32 {
        self.shared.refresh_lock.lock().await.consecutive_failures
    }
}
