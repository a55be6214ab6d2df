use crate::session::{clamp_count, clamp_pause, SessionConfig, Speed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Speed,
    Count,
    Pause,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Speed, Field::Count, Field::Pause];

    pub fn label(&self) -> &'static str {
        match self {
            Field::Speed => "Speed",
            Field::Count => "Number of Numbers",
            Field::Pause => "Pause Duration (seconds)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fine,
    Coarse,
}

/// Editable copy of the session settings shown on the setup screen
#[derive(Debug, Clone, PartialEq)]
pub struct SetupForm {
    pub focus: Field,
    pub speed: Speed,
    pub count: usize,
    pub pause_secs: f64,
}

impl SetupForm {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            focus: Field::Speed,
            speed: config.speed,
            count: config.count,
            pause_secs: config.pause_secs,
        }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::new(self.speed, self.count, self.pause_secs)
    }

    pub fn focus_next(&mut self) {
        self.focus = match self.focus {
            Field::Speed => Field::Count,
            Field::Count => Field::Pause,
            Field::Pause => Field::Speed,
        };
    }

    pub fn focus_prev(&mut self) {
        self.focus = match self.focus {
            Field::Speed => Field::Pause,
            Field::Count => Field::Speed,
            Field::Pause => Field::Count,
        };
    }

    pub fn increase(&mut self, step: Step) {
        self.adjust(1, step);
    }

    pub fn decrease(&mut self, step: Step) {
        self.adjust(-1, step);
    }

    fn adjust(&mut self, direction: i64, step: Step) {
        match self.focus {
            Field::Speed => {
                self.speed = if direction > 0 {
                    self.speed.next()
                } else {
                    self.speed.prev()
                };
            }
            Field::Count => {
                let delta = match step {
                    Step::Fine => 1,
                    Step::Coarse => 10,
                };
                let next = self.count as i64 + direction * delta;
                self.count = clamp_count(next.max(0) as usize);
            }
            Field::Pause => {
                let delta = match step {
                    Step::Fine => 0.1,
                    Step::Coarse => 1.0,
                };
                let next = self.pause_secs + direction as f64 * delta;
                // tenths only, so repeated steps don't drift
                self.pause_secs = clamp_pause((next * 10.0).round() / 10.0);
            }
        }
    }

    /// Current value of `field` as shown on screen
    pub fn value(&self, field: Field) -> String {
        match field {
            Field::Speed => self.speed.to_string(),
            Field::Count => self.count.to_string(),
            Field::Pause => format!("{:.1}", self.pause_secs),
        }
    }
}
