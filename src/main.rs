use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use lastsec_core::control::{Devices, Session};
use lastsec_core::logger;
use lastsec_core::platform::{create_platform, hotkey};
use lastsec_core::recognizer::{self, Recognizer, ScriptedRecognizer, TimedRecognizer};
use lastsec_core::regions::RegionRegistry;
use lastsec_core::settings::Settings;
use lastsec_core::types::{RunEvent, RunOutcome};

// Fits the 320x180 stub screen.
const DEMO_REGIONS: &str =
    r#"{"time": [10, 10, 120, 40], "buy": [200, 120, 260, 150], "verify": [200, 60, 260, 90]}"#;

fn load_regions(path: &Path, force_stub: bool) -> Result<RegionRegistry> {
    if force_stub && !path.exists() {
        logger::warn(&format!("{} not found, using demo regions", path.display()));
        return Ok(RegionRegistry::from_json(DEMO_REGIONS)?);
    }
    let regions = RegionRegistry::load(path)
        .with_context(|| format!("cannot load regions from {}", path.display()))?;
    let mut names: Vec<&str> = regions.names().collect();
    names.sort_unstable();
    logger::info(&format!("loaded {} region(s): {}", regions.len(), names.join(", ")));
    Ok(regions)
}

fn main() -> Result<()> {
    let force_stub = std::env::args().any(|a| a == "--stub");
    let headless = std::env::args().any(|a| a == "--headless");

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let logs_dir = cwd.join("logs");

    logger::init(&logs_dir).context("cannot create log directory")?;
    logger::register_prefix("loop", logger::COLOR_BLUE);
    logger::register_prefix("trigger", logger::COLOR_MAGENTA);
    logger::register_prefix("ocr", logger::COLOR_GREEN);

    let settings_path = cwd.join("settings.json");
    if !settings_path.exists() {
        Settings::default().save(&settings_path);
    }
    let settings = Settings::load(&settings_path);
    settings.validate()?;

    let regions = load_regions(&cwd.join(&settings.regions_file), force_stub)?;

    let platform = create_platform(force_stub);
    logger::info(&format!("platform: {}", platform.name()));

    let recognizer: Box<dyn Recognizer> = if force_stub {
        let demo = ScriptedRecognizer::countdown(10);
        Box::new(TimedRecognizer::new(demo, settings.recognizer.timeout())?)
    } else {
        recognizer::open_engine(&settings.recognizer).context("cannot load the OCR engine")?
    };
    let devices = Devices {
        screen: platform.open_screen(settings.display)?,
        input: platform.input(settings.display)?,
        recognizer,
    };

    let (event_tx, event_rx) = mpsc::channel::<RunEvent>();
    let session = Session::new(regions, settings, devices, event_tx);

    let hotkey_flag = Arc::new(AtomicBool::new(false));
    hotkey::start_hotkey_listener(Arc::clone(&hotkey_flag));

    if headless {
        return run_headless(session, event_rx, hotkey_flag);
    }

    let (log_tx, log_rx) = mpsc::channel::<String>();
    logger::set_ui_sender(log_tx);
    logger::info("lastsec started");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = lastsec_tui::App::new(session, event_rx, log_rx);
    let result = lastsec_tui::event::run(&mut terminal, &mut app, hotkey_flag);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

fn run_headless(
    mut session: Session,
    event_rx: mpsc::Receiver<RunEvent>,
    hotkey_flag: Arc<AtomicBool>,
) -> Result<()> {
    logger::set_echo(true);
    logger::info(&format!("headless run, {} toggles pause", hotkey::HOTKEY_LABEL));
    session.start()?;

    let mut last_timer = None;
    loop {
        for event in event_rx.try_iter() {
            if let RunEvent::Timer(reading) = event {
                if last_timer != Some(reading) {
                    logger::info_p("loop", &format!("countdown {}", reading));
                    last_timer = Some(reading);
                }
            }
        }
        if hotkey::take(&hotkey_flag) {
            session.toggle_pause();
        }
        if let Some(report) = session.reap() {
            return match report.outcome {
                RunOutcome::Completed | RunOutcome::Stopped => Ok(()),
                RunOutcome::Errored(e) => Err(e.into()),
            };
        }
        thread::sleep(Duration::from_millis(50));
    }
}
