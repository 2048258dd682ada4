use std::sync::mpsc;

use lastsec_core::control::Session;
use lastsec_core::logger;
use lastsec_core::types::{Recognition, RunEvent, RunOutcome, RunStats, TimerReading};

use crate::confirm::ConfirmDialog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Monitoring,
    Paused,
    Armed,
    Completed,
    Stopped,
    Error,
}

pub struct App {
    pub session: Session,
    pub event_rx: mpsc::Receiver<RunEvent>,
    pub run_state: RunState,
    pub status: String,
    pub timer: Option<TimerReading>,
    pub recognition: Option<Recognition>,
    pub total_clicks: u64,
    pub last_stats: Option<RunStats>,
    pub last_error: Option<String>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub confirm: Option<ConfirmDialog>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        session: Session,
        event_rx: mpsc::Receiver<RunEvent>,
        log_rx: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            session,
            event_rx,
            run_state: RunState::Idle,
            status: "ready".into(),
            timer: None,
            recognition: None,
            total_clicks: 0,
            last_stats: None,
            last_error: None,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            confirm: None,
            should_quit: false,
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
    }

    pub fn drain_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.apply(event);
        }
    }

    pub fn apply(&mut self, event: RunEvent) {
        match event {
            RunEvent::Status(s) => self.status = s,
            RunEvent::Recognition { text, confidence } => {
                self.recognition = Some(Recognition { text, confidence });
            }
            RunEvent::Timer(reading) => self.timer = Some(reading),
            RunEvent::Armed => self.run_state = RunState::Armed,
            RunEvent::Actuation { target, .. } => {
                self.total_clicks += 1;
                self.status = format!("clicked {}", target);
            }
            RunEvent::Paused => {
                self.run_state = RunState::Paused;
                self.status = "paused".into();
            }
            RunEvent::Resumed => {
                self.run_state = RunState::Monitoring;
                self.status = "monitoring".into();
            }
            RunEvent::Completed => {
                self.run_state = RunState::Completed;
                self.status = "task completed".into();
            }
            RunEvent::Stopped => {
                self.run_state = RunState::Stopped;
                self.status = "stopped".into();
            }
            RunEvent::Errored { message, .. } => {
                self.run_state = RunState::Error;
                self.status = message.clone();
                self.last_error = Some(message);
            }
        }
    }

    /// Collect the report of a run that ended on its own.
    pub fn reap(&mut self) {
        if let Some(report) = self.session.reap() {
            self.finish(report.stats, &report.outcome);
        }
    }

    fn finish(&mut self, stats: RunStats, outcome: &RunOutcome) {
        self.last_stats = Some(stats);
        if let RunOutcome::Errored(e) = outcome {
            self.last_error = Some(e.to_string());
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_running()
    }

    pub fn start(&mut self) {
        if self.is_active() {
            return;
        }
        // a run that ended since the last tick still reports before the next begins
        self.reap();
        match self.session.start() {
            Ok(()) => {
                self.run_state = RunState::Monitoring;
                self.status = "monitoring".into();
                self.timer = None;
                self.recognition = None;
                self.last_error = None;
            }
            Err(e) => {
                logger::error_p("loop", &format!("cannot start: {}", e));
                self.run_state = RunState::Error;
                self.status = e.to_string();
                self.last_error = Some(e.to_string());
            }
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.is_active() {
            self.session.toggle_pause();
        }
    }

    pub fn stop(&mut self) {
        if let Some(report) = self.session.stop() {
            self.drain_events();
            self.finish(report.stats, &report.outcome);
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Quit right away when idle, ask first while a run is active.
    pub fn request_quit(&mut self) {
        if self.is_active() {
            self.confirm = Some(ConfirmDialog::new("A run is active. Stop and quit?"));
        } else {
            self.quit();
        }
    }

    pub fn confirm_choice(&mut self, yes: bool) {
        self.confirm = None;
        if yes {
            self.quit();
        }
    }

    pub fn quit(&mut self) {
        self.stop();
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lastsec_core::control::Devices;
    use lastsec_core::error::ErrorKind;
    use lastsec_core::platform::stub::StubPlatform;
    use lastsec_core::platform::Platform;
    use lastsec_core::recognizer::ScriptedRecognizer;
    use lastsec_core::regions::RegionRegistry;
    use lastsec_core::settings::Settings;
    use lastsec_core::types::Point;
    use std::time::{Duration, Instant};

    fn app(recognizer: ScriptedRecognizer) -> App {
        let platform = StubPlatform::default();
        let devices = Devices {
            screen: platform.open_screen(0).unwrap(),
            input: platform.input(0).unwrap(),
            recognizer: Box::new(recognizer),
        };
        let mut settings = Settings::default();
        settings.timing.dwell_ms = 10;
        settings.timing.click_gap_ms = 1;
        settings.timing.poll_ms = 1;
        let regions =
            RegionRegistry::from_json(r#"{"time": [0, 0, 40, 20], "buy": [50, 50, 60, 60]}"#).unwrap();
        let (event_tx, event_rx) = mpsc::channel();
        let (_log_tx, log_rx) = mpsc::channel();
        App::new(Session::new(regions, settings, devices, event_tx), event_rx, log_rx)
    }

    #[test]
    fn test_events_drive_display_state() {
        let mut app = app(ScriptedRecognizer::with_texts(&[]));
        app.apply(RunEvent::Recognition { text: "0分3秒".into(), confidence: 0.8 });
        app.apply(RunEvent::Timer(TimerReading::new(0, 3)));
        assert_eq!(app.timer, Some(TimerReading::new(0, 3)));
        assert_eq!(app.recognition.as_ref().map(|r| r.text.as_str()), Some("0分3秒"));

        app.apply(RunEvent::Armed);
        assert_eq!(app.run_state, RunState::Armed);
        app.apply(RunEvent::Actuation { target: "buy".into(), at: Point { x: 1, y: 1 } });
        app.apply(RunEvent::Actuation { target: "verify".into(), at: Point { x: 2, y: 2 } });
        assert_eq!(app.total_clicks, 2);
        app.apply(RunEvent::Completed);
        assert_eq!(app.run_state, RunState::Completed);

        app.apply(RunEvent::Errored { kind: ErrorKind::Infrastructure, message: "boom".into() });
        assert_eq!(app.run_state, RunState::Error);
        assert_eq!(app.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_full_run_through_app() {
        let mut app = app(ScriptedRecognizer::with_texts(&["0分2秒", "0分1秒"]));
        app.start();
        assert_eq!(app.run_state, RunState::Monitoring);

        let deadline = Instant::now() + Duration::from_secs(2);
        while app.last_stats.is_none() {
            assert!(Instant::now() < deadline);
            app.drain_events();
            app.reap();
            std::thread::sleep(Duration::from_millis(2));
        }
        app.drain_events();
        assert_eq!(app.run_state, RunState::Completed);
        assert_eq!(app.total_clicks, 1);
        assert_eq!(app.timer, Some(TimerReading::new(0, 1)));
    }

    #[test]
    fn test_restart_records_previous_run() {
        let mut app = app(ScriptedRecognizer::with_texts(&["0分1秒"]));
        app.start();
        let deadline = Instant::now() + Duration::from_secs(2);
        while app.is_active() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(app.last_stats.is_none());

        app.start();
        assert_eq!(app.last_stats.map(|s| s.clicks), Some(1));
        assert_eq!(app.run_state, RunState::Monitoring);
        app.stop();
    }

    #[test]
    fn test_quit_asks_while_running() {
        let mut app = app(ScriptedRecognizer::countdown(600));
        app.start();
        app.request_quit();
        assert!(app.confirm.is_some());
        assert!(!app.should_quit);

        app.confirm_choice(false);
        assert!(app.confirm.is_none());
        assert!(app.is_active());

        app.request_quit();
        app.confirm_choice(true);
        assert!(app.should_quit);
        assert!(!app.is_active());
        assert_eq!(app.run_state, RunState::Stopped);
    }

    #[test]
    fn test_quit_when_idle_skips_dialog() {
        let mut app = app(ScriptedRecognizer::countdown(600));
        app.request_quit();
        assert!(app.confirm.is_none());
        assert!(app.should_quit);
    }
}
