//! # Controller Selection
//!
//! Parses the `--controllers` list.
//!
//! `*` enables every on-by-default controller, `foo` enables the controller
//! named `foo` and `-foo` disables it. The first entry naming a controller
//! wins; `*` only decides for controllers not named explicitly.

use crate::constants::PULLER_CONTROLLER;
use thiserror::Error;

/// Every controller this binary can run
pub const ALL_CONTROLLERS: &[&str] = &[PULLER_CONTROLLER];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerSelectionError {
    #[error("{0:?} is not a known controller (known controllers: {known})", known = ALL_CONTROLLERS.join(", "))]
    Unknown(String),
}

/// Validated `--controllers` selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledControllers {
    entries: Vec<String>,
}

impl Default for EnabledControllers {
    fn default() -> Self {
        Self {
            entries: vec!["*".to_string()],
        }
    }
}

impl EnabledControllers {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, ControllerSelectionError> {
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let name = entry.strip_prefix('-').unwrap_or(entry);
            if entry != "*" && !ALL_CONTROLLERS.contains(&name) {
                return Err(ControllerSelectionError::Unknown(entry.to_string()));
            }
            parsed.push(entry.to_string());
        }
        Ok(Self { entries: parsed })
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        let mut has_star = false;
        for entry in &self.entries {
            if entry == name {
                return true;
            }
            if entry.strip_prefix('-') == Some(name) {
                return false;
            }
            if entry == "*" {
                has_star = true;
            }
        }
        has_star
    }

    /// Names of the enabled controllers, in registration order
    pub fn enabled(&self) -> Vec<&'static str> {
        ALL_CONTROLLERS
            .iter()
            .copied()
            .filter(|name| self.is_enabled(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_enables_everything() {
        let selection = EnabledControllers::parse(&["*"]).unwrap();
        assert!(selection.is_enabled("puller"));
        assert_eq!(selection.enabled(), ["puller"]);
        assert_eq!(EnabledControllers::default(), selection);
    }

    #[test]
    fn test_explicit_disable_beats_star() {
        let selection = EnabledControllers::parse(&["-puller", "*"]).unwrap();
        assert!(!selection.is_enabled("puller"));
        assert!(selection.enabled().is_empty());
    }

    #[test]
    fn test_empty_list_enables_nothing() {
        let selection = EnabledControllers::parse::<&str>(&[]).unwrap();
        assert!(!selection.is_enabled("puller"));
    }

    #[test]
    fn test_named_controller_is_enabled() {
        let selection = EnabledControllers::parse(&["puller"]).unwrap();
        assert!(selection.is_enabled("puller"));
    }

    #[test]
    fn test_unknown_controller_is_rejected() {
        let err = EnabledControllers::parse(&["*", "-bogus"]).unwrap_err();
        assert_eq!(err, ControllerSelectionError::Unknown("-bogus".into()));
        assert!(err.to_string().contains("puller"));
    }
}
