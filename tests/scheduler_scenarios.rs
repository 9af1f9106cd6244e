/*
 *  tests/scheduler_scenarios.rs
 *
 *  Refresh scheduling end to end against the mock panel
 *
 *  inkplay - playlist driven e-paper refresh
 *  (c) 2020-26 Stuart Hunter
 */

mod common;

use image::RgbImage;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant as StdInstant};
use tokio::sync::mpsc;
use tokio::time;

use inkplay::display::drivers::mock::MockDriver;
use inkplay::display::{DisplayCapabilities, DisplayDriver, DisplayError, ColorDepth, RenderSettings};
use inkplay::scheduler::{RefreshAction, RefreshPhase};

use common::{cursor, last_refresh, rig, rig_with, HEIGHT, WIDTH};

fn caps() -> DisplayCapabilities {
    DisplayCapabilities { width: WIDTH, height: HEIGHT, color_depth: ColorDepth::Rgb, refresh_ms: 0 }
}

/// Panel that holds every render until the test lets it finish
struct GateDriver {
    caps: DisplayCapabilities,
    gate: std_mpsc::Receiver<()>,
    started: mpsc::UnboundedSender<usize>,
    log: Arc<Mutex<Vec<(&'static str, StdInstant)>>>,
    renders: usize,
}

impl DisplayDriver for GateDriver {
    fn name(&self) -> &str {
        "gate"
    }

    fn capabilities(&self) -> &DisplayCapabilities {
        &self.caps
    }

    fn render(&mut self, _image: &RgbImage, _settings: &RenderSettings) -> Result<(), DisplayError> {
        self.renders += 1;
        self.log.lock().unwrap().push(("start", StdInstant::now()));
        let _ = self.started.send(self.renders);
        self.gate
            .recv()
            .map_err(|_| DisplayError::Driver("gate closed".into()))?;
        self.log.lock().unwrap().push(("end", StdInstant::now()));
        Ok(())
    }
}

/// Panel that counts overlapping renders
struct OverlapDriver {
    caps: DisplayCapabilities,
    probe: Arc<common::Probe>,
}

impl DisplayDriver for OverlapDriver {
    fn name(&self) -> &str {
        "overlap"
    }

    fn capabilities(&self) -> &DisplayCapabilities {
        &self.caps
    }

    fn render(&mut self, _image: &RgbImage, _settings: &RenderSettings) -> Result<(), DisplayError> {
        self.probe.enter();
        std::thread::sleep(Duration::from_millis(5));
        self.probe.leave();
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_sixty_one_ticks_advance_cursor_once() {
    let mock = MockDriver::in_memory(WIDTH, HEIGHT);
    let r = rig(&["one", "two", "three"], Duration::from_secs(60), Box::new(mock.clone()), Duration::ZERO);

    // first tick puts the first instance on screen
    r.scheduler.tick().await.unwrap();
    let start = cursor(&r.scheduler).unwrap();
    assert_eq!(start, 0);

    for _ in 0..61 {
        time::advance(Duration::from_secs(1)).await;
        r.scheduler.tick().await.unwrap();
    }

    assert_eq!(cursor(&r.scheduler), Some(start + 1));
    assert_eq!(mock.render_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn rotation_wraps_around_the_playlist() {
    let mock = MockDriver::in_memory(WIDTH, HEIGHT);
    let r = rig(&["one", "two", "three"], Duration::from_secs(10), Box::new(mock), Duration::ZERO);

    let mut seen = Vec::new();
    for _ in 0..5 {
        if let Some(action) = r.scheduler.tick().await.unwrap() {
            seen.push(action.plugin);
        }
        time::advance(Duration::from_secs(10)).await;
    }
    assert_eq!(seen, vec!["one", "two", "three", "one", "two"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_manual_update_waits_for_inflight_tick() {
    let (gate_tx, gate_rx) = std_mpsc::channel();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let driver = GateDriver { caps: caps(), gate: gate_rx, started: started_tx, log: Arc::clone(&log), renders: 0 };
    let r = rig(&["one", "two"], Duration::from_secs(60), Box::new(driver), Duration::ZERO);

    let auto = {
        let s = Arc::clone(&r.scheduler);
        tokio::spawn(async move { s.tick().await })
    };
    assert_eq!(started_rx.recv().await, Some(1));
    assert_eq!(*r.scheduler.subscribe_phase().borrow(), RefreshPhase::Dispatching);

    let manual = {
        let s = Arc::clone(&r.scheduler);
        tokio::spawn(async move { s.manual_update(RefreshAction::new("Default", "one", true, "button")).await })
    };

    // the manual render must not reach the panel while tick N holds the lock
    assert!(time::timeout(Duration::from_millis(200), started_rx.recv()).await.is_err());

    gate_tx.send(()).unwrap();
    assert_eq!(started_rx.recv().await, Some(2));
    gate_tx.send(()).unwrap();

    let action = auto.await.unwrap().unwrap().unwrap();
    assert_eq!(action.plugin, "one");
    manual.await.unwrap().unwrap();

    let log = log.lock().unwrap();
    let kinds: Vec<&str> = log.iter().map(|(k, _)| *k).collect();
    assert_eq!(kinds, vec!["start", "end", "start", "end"]);
    assert!(log[1].1 <= log[2].1);

    let stamp = last_refresh(&r.scheduler, "one").unwrap().into_std();
    assert!(stamp >= log[3].1, "timestamp predates the manual render");
    assert_eq!(cursor(&r.scheduler), Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_flight_under_concurrent_requests() {
    let panel = Arc::new(common::Probe::default());
    let driver = OverlapDriver { caps: caps(), probe: Arc::clone(&panel) };
    let r = rig(&["one", "two", "three"], Duration::from_millis(1), Box::new(driver), Duration::from_millis(5));

    let mut tasks = Vec::new();
    for i in 0..12 {
        let s = Arc::clone(&r.scheduler);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let _ = s.tick().await;
            } else {
                let name = ["one", "two", "three"][i % 3];
                let _ = s.manual_update(RefreshAction::new("Default", name, true, "test")).await;
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert_eq!(r.probe.max(), 1, "plugin generation overlapped");
    assert_eq!(panel.max(), 1, "driver saw overlapping renders");
    assert!(panel.calls() >= 6);
}

#[tokio::test(start_paused = true)]
async fn consecutive_manual_updates_each_render_and_stamp() {
    let mock = MockDriver::in_memory(WIDTH, HEIGHT);
    let r = rig(&["one", "two"], Duration::from_secs(60), Box::new(mock.clone()), Duration::ZERO);
    let action = RefreshAction::new("Default", "two", true, "button");

    r.scheduler.manual_update(action.clone()).await.unwrap();
    let first = last_refresh(&r.scheduler, "two").unwrap();

    time::advance(Duration::from_secs(3)).await;
    r.scheduler.manual_update(action).await.unwrap();
    let second = last_refresh(&r.scheduler, "two").unwrap();

    assert_eq!(mock.render_count(), 2);
    assert_eq!(r.probe.calls(), 2);
    assert!(second > first);
    assert_eq!(cursor(&r.scheduler), Some(1));
}

#[tokio::test]
async fn manual_trigger_runs_through_worker() {
    let mock = MockDriver::in_memory(WIDTH, HEIGHT);
    let r = rig(&["one", "two"], Duration::from_secs(3600), Box::new(mock.clone()), Duration::ZERO);
    r.scheduler.start();

    let handle = r.scheduler.trigger_handle();
    // let the immediate first tick land
    time::timeout(Duration::from_secs(5), async {
        while mock.render_count() < 1 {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(handle.request(inkplay::trigger::Trigger::NextPlugin));
    // overlay plus the render of "two"
    time::timeout(Duration::from_secs(5), async {
        while mock.render_count() < 3 {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(r.scheduler.stop().await);
    assert_eq!(cursor(&r.scheduler), Some(1));
    assert!(last_refresh(&r.scheduler, "two").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_inflight_render() {
    let (gate_tx, gate_rx) = std_mpsc::channel();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let driver = GateDriver { caps: caps(), gate: gate_rx, started: started_tx, log: Arc::clone(&log), renders: 0 };
    let r = rig(&["one", "two"], Duration::from_secs(60), Box::new(driver), Duration::ZERO);

    r.scheduler.start();
    assert_eq!(started_rx.recv().await, Some(1));

    let stopping = {
        let s = Arc::clone(&r.scheduler);
        tokio::spawn(async move { s.stop().await })
    };
    time::sleep(Duration::from_millis(200)).await;
    assert!(!stopping.is_finished(), "stop returned while the panel was busy");

    gate_tx.send(()).unwrap();
    assert!(stopping.await.unwrap());

    let kinds: Vec<&str> = log.lock().unwrap().iter().map(|(k, _)| *k).collect();
    assert_eq!(kinds, vec!["start", "end"]);
    assert_eq!(cursor(&r.scheduler), Some(0));
    assert!(last_refresh(&r.scheduler, "one").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_gives_up_after_shutdown_timeout() {
    let (gate_tx, gate_rx) = std_mpsc::channel();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let driver = GateDriver { caps: caps(), gate: gate_rx, started: started_tx, log: Arc::clone(&log), renders: 0 };
    let r = rig_with(
        |cfg| cfg.scheduler.shutdown_timeout_secs = 1,
        &["one"],
        Duration::from_secs(60),
        Box::new(driver),
        Duration::ZERO,
    );

    r.scheduler.start();
    assert_eq!(started_rx.recv().await, Some(1));

    let began = StdInstant::now();
    assert!(!r.scheduler.stop().await);
    assert!(began.elapsed() >= Duration::from_millis(900));
    assert!(!r.scheduler.is_running());

    // the abandoned render still runs to completion
    gate_tx.send(()).unwrap();
    time::timeout(Duration::from_secs(5), async {
        while log.lock().unwrap().len() < 2 {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(log.lock().unwrap()[1].0, "end");
}
