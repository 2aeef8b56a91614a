use crate::model::{RunConfig, RunState, RunSummary, UiEvent, ValidationError};

/// Oldest lines are dropped once the log grows past this.
pub const MAX_LOG_LINES: usize = 500;

const MAX_NUMBER_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Message,
    Count,
    Delay,
    AutoDelay,
    Prep,
}

impl Field {
    const ORDER: [Field; 5] = [
        Field::Message,
        Field::Count,
        Field::Delay,
        Field::AutoDelay,
        Field::Prep,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Field {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Field {
        Self::ORDER[(self.index() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Message => "Message",
            Field::Count => "Times to send",
            Field::Delay => "Delay (s)",
            Field::AutoDelay => "Auto delay",
            Field::Prep => "Preparation time (s)",
        }
    }
}

/// Raw text of the input form, as typed.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub message: String,
    pub count: String,
    pub delay: String,
    pub auto_delay: bool,
    pub prep: String,
    pub focus: Field,
}

impl FormState {
    pub fn from_config(cfg: &RunConfig) -> Self {
        Self {
            message: cfg.message.clone(),
            count: cfg.repeat_count.to_string(),
            delay: cfg.delay_seconds.to_string(),
            auto_delay: cfg.auto_delay,
            prep: cfg.prep_seconds.to_string(),
            focus: Field::Message,
        }
    }

    /// Parse the numeric fields. Range checks are left to `RunConfig::validate`.
    pub fn to_config(&self) -> Result<RunConfig, ValidationError> {
        Ok(RunConfig {
            message: self.message.clone(),
            repeat_count: parse_number(Field::Count, &self.count)?,
            delay_seconds: parse_number(Field::Delay, &self.delay)?,
            prep_seconds: parse_number(Field::Prep, &self.prep)?,
            auto_delay: self.auto_delay,
        })
    }

    fn buffer(&mut self) -> Option<&mut String> {
        match self.focus {
            Field::Message => Some(&mut self.message),
            Field::Count => Some(&mut self.count),
            Field::Delay => Some(&mut self.delay),
            Field::Prep => Some(&mut self.prep),
            Field::AutoDelay => None,
        }
    }

    /// Type a character into the focused field. Returns whether anything changed.
    pub fn input(&mut self, ch: char) -> bool {
        if self.focus == Field::AutoDelay {
            if ch == ' ' {
                self.auto_delay = !self.auto_delay;
                return true;
            }
            return false;
        }
        let allowed = match self.focus {
            Field::Message => !ch.is_control(),
            Field::Delay => ch.is_ascii_digit() || ch == '.' || ch == '-',
            _ => ch.is_ascii_digit(),
        };
        let numeric = self.focus != Field::Message;
        match self.buffer() {
            Some(buf) if allowed && !(numeric && buf.len() >= MAX_NUMBER_LEN) => {
                buf.push(ch);
                true
            }
            _ => false,
        }
    }

    pub fn backspace(&mut self) -> bool {
        self.buffer().and_then(|b| b.pop()).is_some()
    }
}

fn parse_number<T: std::str::FromStr>(field: Field, raw: &str) -> Result<T, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::NotANumber {
            field: field.label(),
            value: raw.to_string(),
        })
}

pub struct UiState {
    pub tab: usize,
    pub form: FormState,
    pub run_state: RunState,
    pub countdown_label: String,
    pub sent: u32,
    pub total: u32,
    pub log: Vec<String>,
    pub last_summary: Option<RunSummary>,
    pub info: String,
    pub dry_run: bool,
}

impl UiState {
    pub fn new(cfg: &RunConfig, dry_run: bool) -> Self {
        Self {
            tab: 0,
            form: FormState::from_config(cfg),
            run_state: RunState::Idle,
            countdown_label: "Ready.".into(),
            sent: 0,
            total: cfg.repeat_count,
            log: Vec::new(),
            last_summary: None,
            info: String::new(),
            dry_run,
        }
    }

    /// Inputs are editable only between runs.
    pub fn inputs_enabled(&self) -> bool {
        !self.run_state.is_active()
    }

    pub fn push_log(&mut self, line: &str) {
        self.log.push(crate::text_summary::timestamped(line));
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }

    pub fn apply_event(&mut self, ev: UiEvent) {
        match ev {
            UiEvent::State(s) => {
                self.run_state = s;
                if s == RunState::Idle {
                    self.countdown_label = "Ready.".into();
                }
            }
            UiEvent::Countdown(n) => {
                self.countdown_label = if n > 0 {
                    format!("Starting in {n} s… place your cursor in the target input.")
                } else {
                    "Starting now…".into()
                };
            }
            UiEvent::Progress { sent, total } => {
                self.sent = sent;
                self.total = total;
            }
            UiEvent::Log(line) => self.push_log(&line),
            UiEvent::RunEnded(summary) => {
                self.info = summary.detail.clone();
                self.last_summary = Some(*summary);
            }
        }
    }

    /// Fraction of the run completed, for the gauge.
    pub fn progress_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.sent as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }
}
