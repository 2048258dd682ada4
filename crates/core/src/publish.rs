use std::sync::mpsc;

use crate::logger;
use crate::types::RunEvent;

/// The loop's only way to talk to the presentation layer.
///
/// Events go out in the order they are produced; a disconnected receiver is ignored.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::Sender<RunEvent>,
}

impl Publisher {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        match &event {
            // high rate, shown in their own panels
            RunEvent::Recognition { .. } | RunEvent::Timer(_) => {}
            RunEvent::Status(s) => logger::info_p("loop", s),
            RunEvent::Armed => logger::warn_p("trigger", "deadline reached, armed"),
            RunEvent::Actuation { target, at } => {
                logger::info_p("trigger", &format!("clicked {} at ({}, {})", target, at.x, at.y))
            }
            RunEvent::Paused => logger::info_p("loop", "paused"),
            RunEvent::Resumed => logger::info_p("loop", "resumed"),
            RunEvent::Completed => logger::info_p("loop", "task completed"),
            RunEvent::Stopped => logger::info_p("loop", "stopped"),
            RunEvent::Errored { kind, message } => {
                logger::error_p("loop", &format!("{:?}: {}", kind, message))
            }
        }
        self.tx.send(event).ok();
    }
}
