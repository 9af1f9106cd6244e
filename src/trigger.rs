/*
 *  trigger.rs
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 *
 *  Manual refresh requests: debounce and a small bounded queue
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

use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;

/// Pending manual requests beyond this are dropped
pub const TRIGGER_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Re-render whatever is on screen (first plugin if nothing is)
    RefreshCurrent,
    /// Step the playlist and render the next plugin
    NextPlugin,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::RefreshCurrent => write!(f, "refresh current"),
            Trigger::NextPlugin => write!(f, "next plugin"),
        }
    }
}

/// Cloneable sender for manual triggers. Presses of the same kind inside
/// the debounce window are ignored, as are presses while the queue is full.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Trigger>,
    debounce: Duration,
    last_accepted: Arc<Mutex<HashMap<Trigger, Instant>>>,
}

/// Handle plus the receiving end the scheduler's worker drains
pub fn channel(debounce: Duration) -> (TriggerHandle, mpsc::Receiver<Trigger>) {
    let (tx, rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
    let handle = TriggerHandle { tx, debounce, last_accepted: Arc::new(Mutex::new(HashMap::new())) };
    (handle, rx)
}

impl TriggerHandle {
    /// Queue `trigger`; false when debounced, dropped or nobody listens
    pub fn request(&self, trigger: Trigger) -> bool {
        let now = Instant::now();
        let mut last = self.last_accepted.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(prev) = last.get(&trigger) {
            if now.duration_since(*prev) < self.debounce {
                debug!("{} debounced", trigger);
                return false;
            }
        }

        // only a queued press opens the debounce window
        match self.tx.try_send(trigger) {
            Ok(()) => {
                last.insert(trigger, now);
                debug!("{} queued", trigger);
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("{} dropped, {} requests already pending", trigger, TRIGGER_QUEUE_DEPTH);
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("{} dropped, scheduler not running", trigger);
                false
            }
        }
    }
}
