//! Process-wide warning channel for schema and usage diagnostics.
//!
//! Warnings never fail an operation. They go to a pluggable handler, or to
//! `tracing::warn!` when none is installed, and each category can be
//! suppressed.

use once_cell::sync::Lazy;
use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, Mutex, PoisonError};

/// Warning category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WarningId(u32);

impl WarningId {
    /// Invalid or questionable configuration
    pub const CONFIG: Self = Self(4);
    /// `type_map()` scanned a lazily loaded schema
    pub const FULL_SCHEMA_SCAN: Self = Self(8);
    /// Deprecated configuration option
    pub const CONFIG_DEPRECATION: Self = Self(16);
    /// A loader returned something that is not a type
    pub const NOT_A_TYPE: Self = Self(32);
    /// A query requested a deprecated artifact
    pub const DEPRECATED_USAGE: Self = Self(64);
    /// Every category
    pub const ALL: Self = Self(4 | 8 | 16 | 32 | 64);

    /// Raw bits
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for WarningId {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for WarningId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::CONFIG => "config",
            Self::FULL_SCHEMA_SCAN => "full_schema_scan",
            Self::CONFIG_DEPRECATION => "config_deprecation",
            Self::NOT_A_TYPE => "not_a_type",
            Self::DEPRECATED_USAGE => "deprecated_usage",
            _ => return write!(f, "warning({})", self.0),
        };
        f.write_str(name)
    }
}

/// Custom warning sink
pub type WarningHandler = Arc<dyn Fn(&str, WarningId) + Send + Sync>;

struct WarningState {
    suppressed: u32,
    warned: u32,
    handler: Option<WarningHandler>,
}

static STATE: Lazy<Mutex<WarningState>> = Lazy::new(|| {
    Mutex::new(WarningState {
        suppressed: 0,
        warned: 0,
        handler: None,
    })
});

/// Entry point of the warning channel
pub struct Warning;

impl Warning {
    /// Install a handler, or restore the tracing sink with `None`
    pub fn set_warning_handler(handler: Option<WarningHandler>) {
        Self::state().handler = handler;
    }

    /// Suppress the given categories
    pub fn suppress(ids: WarningId) {
        Self::state().suppressed |= ids.0;
    }

    /// Re-enable the given categories
    pub fn enable(ids: WarningId) {
        Self::state().suppressed &= !ids.0;
    }

    /// Emit a warning
    pub fn warn(message: &str, id: WarningId) {
        let handler = {
            let mut state = Self::state();
            if id.intersects(WarningId(state.suppressed)) {
                return;
            }
            state.warned |= id.0;
            state.handler.clone()
        };
        Self::dispatch(handler, message, id);
    }

    /// Emit a warning only the first time its category fires
    pub fn warn_once(message: &str, id: WarningId) {
        let handler = {
            let mut state = Self::state();
            if id.intersects(WarningId(state.suppressed)) || id.intersects(WarningId(state.warned)) {
                return;
            }
            state.warned |= id.0;
            state.handler.clone()
        };
        Self::dispatch(handler, message, id);
    }

    fn dispatch(handler: Option<WarningHandler>, message: &str, id: WarningId) {
        match handler {
            Some(handler) => handler(message, id),
            None => tracing::warn!(category = %id, "{}", message),
        }
    }

    fn state() -> std::sync::MutexGuard<'static, WarningState> {
        STATE.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The channel is global; keep all assertions in one test.
    #[test]
    fn test_warning_channel() {
        let seen: Arc<Mutex<Vec<(String, WarningId)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        Warning::set_warning_handler(Some(Arc::new(move |msg: &str, id: WarningId| {
            sink.lock().unwrap().push((msg.to_string(), id));
        })));

        Warning::warn("first", WarningId::CONFIG);
        Warning::warn("second", WarningId::CONFIG);
        assert_eq!(seen.lock().unwrap().len(), 2);

        Warning::warn_once("once", WarningId::NOT_A_TYPE);
        Warning::warn_once("twice", WarningId::NOT_A_TYPE);
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(seen.lock().unwrap()[2].0, "once");

        Warning::suppress(WarningId::FULL_SCHEMA_SCAN);
        Warning::warn("scan", WarningId::FULL_SCHEMA_SCAN);
        assert_eq!(seen.lock().unwrap().len(), 3);

        Warning::enable(WarningId::FULL_SCHEMA_SCAN);
        Warning::warn("scan", WarningId::FULL_SCHEMA_SCAN);
        assert_eq!(seen.lock().unwrap().len(), 4);
        assert_eq!(seen.lock().unwrap()[3].1, WarningId::FULL_SCHEMA_SCAN);

        Warning::suppress(WarningId::ALL);
        Warning::warn("muted", WarningId::DEPRECATED_USAGE);
        assert_eq!(seen.lock().unwrap().len(), 4);

        Warning::enable(WarningId::ALL);
        Warning::set_warning_handler(None);
    }

    #[test]
    fn test_warning_id_display() {
        assert_eq!(WarningId::CONFIG.to_string(), "config");
        assert_eq!(WarningId::DEPRECATED_USAGE.to_string(), "deprecated_usage");
        assert!(WarningId::ALL.intersects(WarningId::NOT_A_TYPE));
    }
}
