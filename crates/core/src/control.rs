//! The monitoring loop and the controller-facing session around it.
//!
//! One worker thread runs one `ControlLoop` per run. The controller talks to it
//! only through the atomic flags in `ControlState`; the worker talks back only
//! through the `Publisher`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::anyhow;

use crate::error::{ConfigError, RunError};
use crate::logger;
use crate::platform::{FrameSource, Injector};
use crate::publish::Publisher;
use crate::recognizer::Recognizer;
use crate::regions::{RegionRegistry, TIME};
use crate::settings::Settings;
use crate::sleep::sleep_jitter;
use crate::timer;
use crate::trigger::{Decision, TriggerConfig, TriggerScheduler};
use crate::types::{Frame, RunEvent, RunOutcome, RunReport, RunStats};

/// Flags shared by the controller and one run's worker. Last write wins.
#[derive(Debug, Default)]
pub struct ControlState {
    running: AtomicBool,
    paused: AtomicBool,
    stopping: AtomicBool,
}

impl ControlState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

/// The collaborators a run needs. Moved into the worker for the run and handed back on join.
pub struct Devices {
    pub screen: Box<dyn FrameSource>,
    pub input: Box<dyn Injector>,
    pub recognizer: Box<dyn Recognizer>,
}

pub struct ControlLoop {
    regions: Arc<RegionRegistry>,
    settings: Settings,
    control: Arc<ControlState>,
    events: Publisher,
}

enum Cycle {
    Idle,
    Done(RunOutcome),
}

impl ControlLoop {
    pub fn new(
        regions: Arc<RegionRegistry>,
        settings: Settings,
        control: Arc<ControlState>,
        events: Publisher,
    ) -> Self {
        Self { regions, settings, control, events }
    }

    /// Run until the countdown is acted on, a stop is requested, or a collaborator fails.
    pub fn run(&self, devices: &mut Devices) -> RunReport {
        let mut stats = RunStats::default();
        let mut scheduler = TriggerScheduler::new(TriggerConfig::from(&self.settings));

        self.control.set_running(true);
        scheduler.start();
        self.events.publish(RunEvent::Status("monitoring started".into()));

        let outcome = match self.monitor(devices, &mut scheduler, &mut stats) {
            Ok(outcome) => outcome,
            Err(e) => {
                scheduler.fail();
                RunOutcome::Errored(e)
            }
        };

        match &outcome {
            RunOutcome::Completed => self.events.publish(RunEvent::Completed),
            RunOutcome::Stopped => self.events.publish(RunEvent::Stopped),
            RunOutcome::Errored(e) => self.events.publish(RunEvent::Errored {
                kind: e.kind(),
                message: e.to_string(),
            }),
        }

        devices.screen.stop();
        self.control.set_running(false);
        logger::info_p(
            "loop",
            &format!(
                "run ended after {} cycle(s), {} frame(s), {} reading(s), {} click(s)",
                stats.cycles, stats.frames, stats.readings, stats.clicks
            ),
        );
        RunReport { outcome, stats }
    }

    fn monitor(
        &self,
        devices: &mut Devices,
        scheduler: &mut TriggerScheduler,
        stats: &mut RunStats,
    ) -> Result<RunOutcome, RunError> {
        let timing = &self.settings.timing;
        let mut was_paused = false;

        loop {
            if self.control.is_stopping() {
                scheduler.stop();
                return Ok(RunOutcome::Stopped);
            }

            if self.control.is_paused() {
                if !was_paused {
                    was_paused = true;
                    scheduler.pause();
                    self.events.publish(RunEvent::Paused);
                }
                thread::sleep(timing.pause_poll());
                continue;
            }
            if was_paused {
                was_paused = false;
                scheduler.resume();
                self.events.publish(RunEvent::Resumed);
            }

            stats.cycles += 1;
            if let Cycle::Done(outcome) = self.cycle(devices, scheduler, stats)? {
                return Ok(outcome);
            }
            sleep_jitter(timing.poll_ms, timing.poll_jitter);
        }
    }

    /// capture -> crop -> recognize -> parse -> decide -> (act)
    fn cycle(
        &self,
        devices: &mut Devices,
        scheduler: &mut TriggerScheduler,
        stats: &mut RunStats,
    ) -> Result<Cycle, RunError> {
        let Some(frame) = devices.screen.capture().map_err(RunError::capture)? else {
            return Ok(Cycle::Idle);
        };
        stats.frames += 1;
        if !frame.is_well_formed() {
            return Err(RunError::capture(anyhow!(
                "malformed frame: {} bytes for {}x{} at {} bytes per row",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.bytes_per_row
            )));
        }

        let roi = self.crop_time(&frame)?;
        drop(frame);

        #[cfg(feature = "debug-capture")]
        dump_roi(&roi);

        let Some(recognition) = devices.recognizer.recognize(&roi).map_err(RunError::recognition)?
        else {
            return Ok(Cycle::Idle);
        };
        stats.recognitions += 1;
        self.events.publish(RunEvent::Recognition {
            text: recognition.text.clone(),
            confidence: recognition.confidence,
        });

        if recognition.confidence < self.settings.recognizer.min_confidence {
            return Ok(Cycle::Idle);
        }
        let Some(reading) = timer::parse(&recognition.text) else {
            return Ok(Cycle::Idle);
        };
        stats.readings += 1;
        self.events.publish(RunEvent::Timer(reading));

        if scheduler.observe(reading) == Decision::Arm {
            self.events.publish(RunEvent::Armed);
            stats.clicks += scheduler.fire(&self.regions, devices.input.as_mut(), &self.events)?;
            return Ok(Cycle::Done(RunOutcome::Completed));
        }
        Ok(Cycle::Idle)
    }

    fn crop_time(&self, frame: &Frame) -> Result<Frame, RunError> {
        frame.crop(self.regions.time()).ok_or_else(|| {
            RunError::Config(ConfigError::OutsideFrame {
                name: TIME.to_string(),
                width: frame.width,
                height: frame.height,
            })
        })
    }
}

#[cfg(feature = "debug-capture")]
fn dump_roi(roi: &Frame) {
    let Some(img) = roi.to_rgb_image() else { return };
    if let Err(e) = img.save_with_format("logs/roi.png", image::ImageFormat::Png) {
        logger::warn_p("loop", &format!("failed to dump roi: {}", e));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct Worker {
    control: Arc<ControlState>,
    handle: JoinHandle<(Devices, RunReport)>,
}

/// Turn a worker's join result into its report. A worker that died outside
/// the loop's own panic guard takes the collaborators with it.
fn settle(joined: thread::Result<(Devices, RunReport)>) -> (Option<Devices>, RunReport) {
    match joined {
        Ok((devices, report)) => (Some(devices), report),
        Err(payload) => {
            let err = RunError::Panicked(format!("worker died: {}", panic_message(payload.as_ref())));
            logger::error_p("loop", &err.to_string());
            let report = RunReport { outcome: RunOutcome::Errored(err), stats: RunStats::default() };
            (None, report)
        }
    }
}

/// Controller handle: at most one worker at a time.
pub struct Session {
    regions: Arc<RegionRegistry>,
    settings: Settings,
    events: Publisher,
    devices: Option<Devices>,
    worker: Option<Worker>,
    /// Report of a finished run that `start` joined before `reap` saw it.
    unclaimed: Option<RunReport>,
}

impl Session {
    pub fn new(
        regions: RegionRegistry,
        settings: Settings,
        devices: Devices,
        events: mpsc::Sender<RunEvent>,
    ) -> Self {
        Self {
            regions: Arc::new(regions),
            settings,
            events: Publisher::new(events),
            devices: Some(devices),
            worker: None,
            unclaimed: None,
        }
    }

    /// Spawn the worker. A no-op while a run is active.
    ///
    /// A previous run that ended unreaped is joined here and its report
    /// kept for the next `reap`.
    pub fn start(&mut self) -> Result<(), RunError> {
        if let Some(worker) = self.worker.take() {
            if worker.control.is_running() && !worker.handle.is_finished() {
                logger::warn_p("loop", "already running");
                self.worker = Some(worker);
                return Ok(());
            }
            let report = self.join(worker);
            self.unclaimed = Some(report);
        }
        self.settings.validate()?;
        let Some(mut devices) = self.devices.take() else {
            return Err(RunError::Panicked(
                "collaborators were lost with a previous worker".into(),
            ));
        };

        let control = ControlState::new();
        let control_loop = ControlLoop::new(
            Arc::clone(&self.regions),
            self.settings.clone(),
            Arc::clone(&control),
            self.events.clone(),
        );
        let events = self.events.clone();
        let worker_control = Arc::clone(&control);
        control.set_running(true);

        let handle = thread::Builder::new()
            .name("lastsec-loop".into())
            .spawn(move || {
                let report = match panic::catch_unwind(AssertUnwindSafe(|| control_loop.run(&mut devices))) {
                    Ok(report) => report,
                    Err(payload) => {
                        let err = RunError::Panicked(panic_message(payload.as_ref()));
                        events.publish(RunEvent::Errored { kind: err.kind(), message: err.to_string() });
                        worker_control.set_running(false);
                        RunReport { outcome: RunOutcome::Errored(err), stats: RunStats::default() }
                    }
                };
                (devices, report)
            })
            .map_err(|e| RunError::Panicked(format!("cannot spawn worker: {}", e)))?;

        self.worker = Some(Worker { control, handle });
        Ok(())
    }

    pub fn pause(&self) {
        if let Some(w) = &self.worker {
            w.control.set_paused(true);
        }
    }

    pub fn resume(&self) {
        if let Some(w) = &self.worker {
            w.control.set_paused(false);
        }
    }

    pub fn toggle_pause(&self) {
        if let Some(w) = &self.worker {
            w.control.set_paused(!w.control.is_paused());
        }
    }

    pub fn is_paused(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| w.control.is_paused())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.control.is_running() && !w.handle.is_finished())
    }

    /// Request a stop and wait for the worker to exit.
    ///
    /// A run that has already armed finishes its clicks first.
    pub fn stop(&mut self) -> Option<RunReport> {
        let Some(worker) = self.worker.take() else {
            return self.unclaimed.take();
        };
        worker.control.request_stop();
        Some(self.join(worker))
    }

    /// Report of a run that ended on its own, once per run.
    pub fn reap(&mut self) -> Option<RunReport> {
        if let Some(report) = self.unclaimed.take() {
            return Some(report);
        }
        if !self.worker.as_ref()?.handle.is_finished() {
            return None;
        }
        let worker = self.worker.take()?;
        Some(self.join(worker))
    }

    fn join(&mut self, worker: Worker) -> RunReport {
        let (devices, report) = settle(worker.handle.join());
        if devices.is_some() {
            self.devices = devices;
        }
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::platform::stub::StubPlatform;
    use crate::platform::Platform;
    use crate::recognizer::{Scripted, ScriptedRecognizer, TimedRecognizer};
    use crate::settings::Timing;
    use crate::types::Point;
    use std::time::{Duration, Instant};

    const REGIONS: &str =
        r#"{"time": [10, 10, 60, 30], "buy": [100, 100, 120, 140], "verify": [200, 50, 260, 70]}"#;

    fn fast_settings() -> Settings {
        Settings {
            timing: Timing {
                dwell_ms: 20,
                click_gap_ms: 5,
                poll_ms: 1,
                pause_poll_ms: 10,
                poll_jitter: 0.0,
            },
            ..Settings::default()
        }
    }

    fn session_with(
        regions: &str,
        settings: Settings,
        platform: &StubPlatform,
        recognizer: impl Recognizer + 'static,
    ) -> (Session, mpsc::Receiver<RunEvent>) {
        let devices = Devices {
            screen: platform.open_screen(0).unwrap(),
            input: platform.input(0).unwrap(),
            recognizer: Box::new(recognizer),
        };
        let (tx, rx) = mpsc::channel();
        let regions = RegionRegistry::from_json(regions).unwrap();
        (Session::new(regions, settings, devices, tx), rx)
    }

    fn wait_report(session: &mut Session, timeout: Duration) -> RunReport {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(report) = session.reap() {
                return report;
            }
            assert!(Instant::now() < deadline, "run did not finish in {:?}", timeout);
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn wait_for(rx: &mpsc::Receiver<RunEvent>, pred: impl Fn(&RunEvent) -> bool) -> RunEvent {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                Ok(e) if pred(&e) => return e,
                Ok(_) => {}
                Err(e) => panic!("expected event not seen: {}", e),
            }
        }
    }

    #[test]
    fn test_completes_with_two_ordered_clicks() {
        let platform = StubPlatform::default();
        let (mut session, rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_texts(&["2分3秒", "2分2秒", "剩余 0 分 1 秒"]),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));

        assert!(report.outcome.is_completed());
        assert_eq!(report.stats.clicks, 2);
        assert_eq!(report.stats.readings, 3);
        assert_eq!(
            *platform.clicks().lock().unwrap(),
            vec![Point { x: 110, y: 120 }, Point { x: 230, y: 60 }]
        );

        let events: Vec<RunEvent> = rx.try_iter().collect();
        let completed = events.iter().filter(|e| **e == RunEvent::Completed).count();
        assert_eq!(completed, 1);
        let armed = events.iter().position(|e| *e == RunEvent::Armed).unwrap();
        let first_click = events
            .iter()
            .position(|e| matches!(e, RunEvent::Actuation { .. }))
            .unwrap();
        assert!(armed < first_click);
        assert_eq!(events.last(), Some(&RunEvent::Completed));
    }

    #[test]
    fn test_events_follow_cycle_order() {
        let platform = StubPlatform::default();
        let (mut session, rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_texts(&["noise", "0分1秒"]),
        );
        session.start().unwrap();
        wait_report(&mut session, Duration::from_secs(2));

        let kinds: Vec<&str> = rx
            .try_iter()
            .filter_map(|e| match e {
                RunEvent::Recognition { .. } => Some("recognition"),
                RunEvent::Timer(_) => Some("timer"),
                RunEvent::Armed => Some("armed"),
                RunEvent::Actuation { .. } => Some("click"),
                RunEvent::Completed => Some("completed"),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["recognition", "recognition", "timer", "armed", "click", "click", "completed"]
        );
    }

    #[test]
    fn test_no_targets_completes_without_clicks() {
        let platform = StubPlatform::default();
        let (mut session, _rx) = session_with(
            r#"{"time": [10, 10, 60, 30]}"#,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_texts(&["2分3秒", "2分2秒", "0分1秒"]),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));
        assert!(report.outcome.is_completed());
        assert_eq!(report.stats.clicks, 0);
        assert!(platform.clicks().lock().unwrap().is_empty());
    }

    #[test]
    fn test_absent_frames_and_text_are_skipped() {
        let platform = StubPlatform::default().with_gap_every(2);
        let (mut session, _rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_replies(vec![
                Scripted::Nothing,
                Scripted::text(""),
                Scripted::text("1分"),
                Scripted::text("0分1秒"),
            ]),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));
        assert!(report.outcome.is_completed());
        assert_eq!(report.stats.recognitions, 3);
        assert_eq!(report.stats.readings, 1);
        assert!(report.stats.cycles > report.stats.frames);
    }

    #[test]
    fn test_pause_halts_recognition_and_resume_restarts_it() {
        let platform = StubPlatform::default();
        let (mut session, rx) =
            session_with(REGIONS, fast_settings(), &platform, ScriptedRecognizer::countdown(600));
        session.start().unwrap();
        wait_for(&rx, |e| matches!(e, RunEvent::Recognition { .. }));

        session.pause();
        assert!(session.is_paused());
        wait_for(&rx, |e| *e == RunEvent::Paused);
        thread::sleep(Duration::from_millis(60));
        assert!(rx.try_iter().all(|e| !matches!(e, RunEvent::Recognition { .. })));

        session.resume();
        wait_for(&rx, |e| *e == RunEvent::Resumed);
        wait_for(&rx, |e| matches!(e, RunEvent::Recognition { .. }));

        let report = session.stop().unwrap();
        assert!(matches!(report.outcome, RunOutcome::Stopped));
    }

    #[test]
    fn test_stop_joins_promptly() {
        let platform = StubPlatform::default();
        let (mut session, rx) =
            session_with(REGIONS, fast_settings(), &platform, ScriptedRecognizer::countdown(600));
        session.start().unwrap();
        assert!(session.is_running());
        wait_for(&rx, |e| matches!(e, RunEvent::Timer(_)));

        let asked = Instant::now();
        let report = session.stop().unwrap();
        assert!(asked.elapsed() < Duration::from_millis(500));
        assert!(matches!(report.outcome, RunOutcome::Stopped));
        assert!(!session.is_running());
        assert!(platform.clicks().lock().unwrap().is_empty());
    }

    #[test]
    fn test_slow_recognizer_still_stops_within_a_cycle() {
        let platform = StubPlatform::default();
        let slow = ScriptedRecognizer::countdown(600).with_latency(Duration::from_millis(50));
        let (mut session, rx) = session_with(REGIONS, fast_settings(), &platform, slow);
        session.start().unwrap();
        wait_for(&rx, |e| matches!(e, RunEvent::Timer(_)));

        let asked = Instant::now();
        let report = session.stop().unwrap();
        // one recognition plus one poll
        assert!(asked.elapsed() < Duration::from_millis(500));
        assert!(matches!(report.outcome, RunOutcome::Stopped));
    }

    #[test]
    fn test_stalled_recognizer_cannot_block_stop() {
        let platform = StubPlatform::default();
        let stalled = ScriptedRecognizer::countdown(600).with_latency(Duration::from_secs(30));
        let mut settings = fast_settings();
        settings.recognizer.timeout_ms = 300;
        let timed = TimedRecognizer::new(stalled, settings.recognizer.timeout()).unwrap();
        let (mut session, _rx) = session_with(REGIONS, settings, &platform, timed);

        session.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        let asked = Instant::now();
        let report = session.stop().unwrap();
        assert!(asked.elapsed() < Duration::from_secs(2));
        match report.outcome {
            RunOutcome::Errored(e) => {
                assert_eq!(e.kind(), ErrorKind::Infrastructure);
                assert!(e.to_string().contains("did not answer"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(platform.clicks().lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_while_paused() {
        let platform = StubPlatform::default();
        let (mut session, rx) =
            session_with(REGIONS, fast_settings(), &platform, ScriptedRecognizer::countdown(600));
        session.start().unwrap();
        session.pause();
        wait_for(&rx, |e| *e == RunEvent::Paused);
        let report = session.stop().unwrap();
        assert!(matches!(report.outcome, RunOutcome::Stopped));
    }

    #[test]
    fn test_stop_after_arming_still_completes() {
        let platform = StubPlatform::default();
        let mut settings = fast_settings();
        settings.timing.dwell_ms = 150;
        let (mut session, rx) = session_with(
            REGIONS,
            settings,
            &platform,
            ScriptedRecognizer::with_texts(&["0分1秒"]),
        );
        session.start().unwrap();
        wait_for(&rx, |e| *e == RunEvent::Armed);

        let report = session.stop().unwrap();
        assert!(report.outcome.is_completed());
        assert_eq!(platform.clicks().lock().unwrap().len(), 2);
    }

    #[test]
    fn test_capture_failure_errors_without_clicks() {
        let platform = StubPlatform::default().failing_capture_at(3);
        let (mut session, rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_texts(&["0分5秒", "0分4秒", "0分1秒"]),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));

        match report.outcome {
            RunOutcome::Errored(e) => assert_eq!(e.kind(), ErrorKind::Infrastructure),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(platform.clicks().lock().unwrap().is_empty());
        let errored = rx.try_iter().find(|e| matches!(e, RunEvent::Errored { .. }));
        assert!(matches!(
            errored,
            Some(RunEvent::Errored { kind: ErrorKind::Infrastructure, ref message }) if message.contains("capture")
        ));
    }

    #[test]
    fn test_recognition_failure_errors_without_clicks() {
        let platform = StubPlatform::default();
        let (mut session, _rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_replies(vec![
                Scripted::text("0分2秒"),
                Scripted::Fail("engine gone".into()),
                Scripted::text("0分1秒"),
            ]),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));
        assert!(matches!(report.outcome, RunOutcome::Errored(RunError::Infrastructure { .. })));
        assert!(platform.clicks().lock().unwrap().is_empty());
    }

    #[test]
    fn test_click_failure_is_actuation_error() {
        let platform = StubPlatform::default().with_failing_clicks();
        let (mut session, _rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_texts(&["0分1秒"]),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));
        match report.outcome {
            RunOutcome::Errored(e) => assert_eq!(e.kind(), ErrorKind::Actuation),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_time_region_outside_frame_is_config_error() {
        let platform = StubPlatform::default();
        let (mut session, _rx) = session_with(
            r#"{"time": [1000, 1000, 1010, 1010]}"#,
            fast_settings(),
            &platform,
            ScriptedRecognizer::countdown(10),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));
        match report.outcome {
            RunOutcome::Errored(e) => assert_eq!(e.kind(), ErrorKind::Config),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frame_is_capture_error() {
        let platform = StubPlatform::default().with_truncated_frames();
        let (mut session, _rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::countdown(10),
        );
        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));
        match report.outcome {
            RunOutcome::Errored(e) => {
                assert_eq!(e.kind(), ErrorKind::Infrastructure);
                assert!(e.to_string().contains("malformed frame"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.stats.recognitions, 0);
    }

    #[test]
    fn test_low_confidence_is_published_but_not_parsed() {
        let platform = StubPlatform::default();
        let mut settings = fast_settings();
        settings.recognizer.min_confidence = 0.5;
        let (mut session, rx) = session_with(
            REGIONS,
            settings,
            &platform,
            ScriptedRecognizer::with_replies(vec![Scripted::Text("0分1秒".into(), 0.3)]),
        );
        session.start().unwrap();
        wait_for(&rx, |e| matches!(e, RunEvent::Recognition { .. }));
        thread::sleep(Duration::from_millis(30));
        let report = session.stop().unwrap();

        assert!(matches!(report.outcome, RunOutcome::Stopped));
        assert_eq!(report.stats.readings, 0);
        assert!(rx.try_iter().all(|e| !matches!(e, RunEvent::Timer(_))));
        assert!(platform.clicks().lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_settings_refuse_to_start() {
        let platform = StubPlatform::default();
        let mut settings = fast_settings();
        settings.timing.click_gap_ms = settings.timing.dwell_ms;
        let (mut session, _rx) =
            session_with(REGIONS, settings, &platform, ScriptedRecognizer::countdown(10));
        let err = session.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(!session.is_running());
    }

    #[test]
    fn test_session_can_run_again_after_completion() {
        let platform = StubPlatform::default();
        let (mut session, _rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_texts(&["0分1秒", "0分1秒"]),
        );
        session.start().unwrap();
        assert!(wait_report(&mut session, Duration::from_secs(2)).outcome.is_completed());
        session.start().unwrap();
        assert!(wait_report(&mut session, Duration::from_secs(2)).outcome.is_completed());
        assert_eq!(platform.clicks().lock().unwrap().len(), 4);
    }

    #[test]
    fn test_restart_keeps_unreaped_report() {
        let platform = StubPlatform::default();
        let (mut session, _rx) = session_with(
            REGIONS,
            fast_settings(),
            &platform,
            ScriptedRecognizer::with_replies(vec![Scripted::text("0分1秒")]),
        );
        session.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.is_running() {
            assert!(Instant::now() < deadline, "first run did not finish");
            thread::sleep(Duration::from_millis(2));
        }

        // no reap between the runs
        session.start().unwrap();
        let first = session.reap().unwrap();
        assert!(first.outcome.is_completed());
        assert_eq!(first.stats.clicks, 2);

        let second = session.stop().unwrap();
        assert!(matches!(second.outcome, RunOutcome::Stopped));
        assert!(session.reap().is_none());
    }

    #[test]
    fn test_dead_worker_settles_as_errored() {
        let payload: Box<dyn Any + Send> = Box::new("loop thread aborted");
        let (devices, report) = settle(Err(payload));
        assert!(devices.is_none());
        match report.outcome {
            RunOutcome::Errored(RunError::Panicked(msg)) => {
                assert!(msg.contains("loop thread aborted"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_worker_panic_surfaces_as_errored() {
        struct Exploding;
        impl Recognizer for Exploding {
            fn recognize(&mut self, _roi: &Frame) -> anyhow::Result<Option<crate::types::Recognition>> {
                panic!("model crashed");
            }
        }

        let platform = StubPlatform::default();
        let devices = Devices {
            screen: platform.open_screen(0).unwrap(),
            input: platform.input(0).unwrap(),
            recognizer: Box::new(Exploding),
        };
        let (tx, rx) = mpsc::channel();
        let regions = RegionRegistry::from_json(REGIONS).unwrap();
        let mut session = Session::new(regions, fast_settings(), devices, tx);

        session.start().unwrap();
        let report = wait_report(&mut session, Duration::from_secs(2));
        match report.outcome {
            RunOutcome::Errored(RunError::Panicked(msg)) => assert!(msg.contains("model crashed")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, RunEvent::Errored { kind: ErrorKind::Panicked, .. })));
        // collaborators survive the panic
        assert!(session.start().is_ok());
        session.stop();
    }
}
