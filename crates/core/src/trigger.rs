use std::thread;
use std::time::Duration;

use crate::error::RunError;
use crate::platform::Injector;
use crate::publish::Publisher;
use crate::regions::{RegionRegistry, BUY, VERIFY};
use crate::settings::Settings;
use crate::types::{RunEvent, TimerReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Monitoring,
    Paused,
    Arming,
    Triggering,
    Completed,
    Stopped,
    Errored,
}

impl SchedulerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SchedulerState::Completed | SchedulerState::Stopped | SchedulerState::Errored
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Arm,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub deadline: TimerReading,
    /// Consecutive deadline readings needed before arming.
    pub confirm_readings: u32,
    pub dwell: Duration,
    pub click_gap: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for TriggerConfig {
    fn from(s: &Settings) -> Self {
        Self {
            deadline: s.deadline,
            confirm_readings: s.confirm_readings.max(1),
            dwell: s.timing.dwell(),
            click_gap: s.timing.click_gap(),
        }
    }
}

/// Decides when the countdown hits the deadline and runs the one-shot click sequence.
pub struct TriggerScheduler {
    state: SchedulerState,
    config: TriggerConfig,
    streak: u32,
}

impl TriggerScheduler {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            state: SchedulerState::Idle,
            config,
            streak: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn start(&mut self) {
        if self.state == SchedulerState::Idle {
            self.state = SchedulerState::Monitoring;
        }
    }

    pub fn pause(&mut self) {
        if self.state == SchedulerState::Monitoring {
            self.state = SchedulerState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == SchedulerState::Paused {
            self.state = SchedulerState::Monitoring;
        }
    }

    /// Stop is honored only before arming.
    pub fn stop(&mut self) -> bool {
        match self.state {
            SchedulerState::Idle | SchedulerState::Monitoring | SchedulerState::Paused => {
                self.state = SchedulerState::Stopped;
                true
            }
            _ => false,
        }
    }

    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = SchedulerState::Errored;
        }
    }

    /// Feed one reading. Readings outside `Monitoring` are ignored.
    pub fn observe(&mut self, reading: TimerReading) -> Decision {
        if self.state != SchedulerState::Monitoring {
            return Decision::Continue;
        }
        if reading != self.config.deadline {
            self.streak = 0;
            return Decision::Continue;
        }

        self.streak += 1;
        if self.streak < self.config.confirm_readings {
            return Decision::Continue;
        }
        self.state = SchedulerState::Arming;
        Decision::Arm
    }

    /// Dwell, then click "buy" and "verify" (whichever exist) in order.
    /// Returns the number of clicks performed.
    pub fn fire(
        &mut self,
        regions: &RegionRegistry,
        input: &mut dyn Injector,
        events: &Publisher,
    ) -> Result<u64, RunError> {
        if self.state != SchedulerState::Arming {
            return Ok(0);
        }

        events.publish(RunEvent::Status("preparing to click...".into()));
        thread::sleep(self.config.dwell);
        self.state = SchedulerState::Triggering;

        let mut clicks = 0;
        for target in [BUY, VERIFY] {
            let Some(rect) = regions.get(target) else { continue };
            if clicks > 0 {
                thread::sleep(self.config.click_gap);
            }

            let at = rect.center();
            events.publish(RunEvent::Status(format!("clicking {}...", target)));
            if let Err(e) = input.click(at) {
                self.state = SchedulerState::Errored;
                return Err(RunError::Actuation {
                    target: target.to_string(),
                    detail: format!("{:#}", e),
                });
            }
            clicks += 1;
            events.publish(RunEvent::Actuation { target: target.to_string(), at });
        }

        self.state = SchedulerState::Completed;
        Ok(clicks)
    }
}
