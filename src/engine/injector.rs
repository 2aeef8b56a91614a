//! Keyboard injection backends.
//!
//! The worker only sees the `Injector` trait. Injectors are built on the thread that uses
//! them because OS input handles are not guaranteed to be `Send`.

use enigo::{Direction, Enigo, Key, Keyboard, Mouse, Settings};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectError {
    /// The user triggered the failsafe (mouse parked in the top-left corner).
    #[error("safety interlock triggered (mouse moved to the top-left corner)")]
    SafetyInterlock,
    #[error("input injection unavailable: {0}")]
    Unavailable(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("{0}")]
    Failed(String),
}

pub trait Injector {
    fn type_text(&mut self, text: &str) -> Result<(), InjectError>;
    fn press_key(&mut self, key: &str) -> Result<(), InjectError>;
}

/// Builds an injector on the calling thread.
pub trait InjectorFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Injector>, InjectError>;
}

/// Pixels from the top-left corner that count as the failsafe position.
const FAILSAFE_MARGIN: i32 = 1;

pub struct EnigoInjector {
    enigo: Enigo,
    failsafe: bool,
}

impl EnigoInjector {
    pub fn new(failsafe: bool) -> Result<Self, InjectError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| InjectError::Unavailable(e.to_string()))?;
        Ok(Self { enigo, failsafe })
    }

    fn check_failsafe(&self) -> Result<(), InjectError> {
        if !self.failsafe {
            return Ok(());
        }
        let (x, y) = self
            .enigo
            .location()
            .map_err(|e| InjectError::Failed(format!("read mouse location: {e}")))?;
        if x <= FAILSAFE_MARGIN && y <= FAILSAFE_MARGIN {
            return Err(InjectError::SafetyInterlock);
        }
        Ok(())
    }
}

impl Injector for EnigoInjector {
    fn type_text(&mut self, text: &str) -> Result<(), InjectError> {
        // One character at a time so the failsafe can interrupt long messages.
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.check_failsafe()?;
            self.enigo
                .text(ch.encode_utf8(&mut buf))
                .map_err(|e| InjectError::Failed(e.to_string()))?;
        }
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<(), InjectError> {
        let key = parse_key(key)?;
        self.check_failsafe()?;
        self.enigo
            .key(key, Direction::Click)
            .map_err(|e| InjectError::Failed(e.to_string()))
    }
}

fn parse_key(name: &str) -> Result<Key, InjectError> {
    match name.to_ascii_lowercase().as_str() {
        "enter" | "return" => Ok(Key::Return),
        "tab" => Ok(Key::Tab),
        "escape" | "esc" => Ok(Key::Escape),
        "space" => Ok(Key::Space),
        "backspace" => Ok(Key::Backspace),
        _ => Err(InjectError::UnknownKey(name.to_string())),
    }
}

pub struct EnigoFactory {
    pub failsafe: bool,
}

impl InjectorFactory for EnigoFactory {
    fn connect(&self) -> Result<Box<dyn Injector>, InjectError> {
        Ok(Box::new(EnigoInjector::new(self.failsafe)?))
    }
}

/// Performs no input; every action is written to the diagnostic log instead.
pub struct DryRunInjector;

impl Injector for DryRunInjector {
    fn type_text(&mut self, text: &str) -> Result<(), InjectError> {
        tracing::info!(text, "dry-run: type text");
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<(), InjectError> {
        parse_key(key)?;
        tracing::info!(key, "dry-run: press key");
        Ok(())
    }
}

pub struct DryRunFactory;

impl InjectorFactory for DryRunFactory {
    fn connect(&self) -> Result<Box<dyn Injector>, InjectError> {
        Ok(Box::new(DryRunInjector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_are_case_insensitive() {
        assert_eq!(parse_key("Enter").unwrap(), Key::Return);
        assert_eq!(parse_key("RETURN").unwrap(), Key::Return);
        assert_eq!(parse_key("esc").unwrap(), Key::Escape);
    }

    #[test]
    fn unknown_keys_are_reported() {
        assert_eq!(
            parse_key("hyper"),
            Err(InjectError::UnknownKey("hyper".into()))
        );
    }

    #[test]
    fn dry_run_accepts_text_and_known_keys() {
        let mut inj = DryRunFactory.connect().unwrap();
        assert!(inj.type_text("hello").is_ok());
        assert!(inj.press_key("enter").is_ok());
        assert!(inj.press_key("nope").is_err());
    }
}
