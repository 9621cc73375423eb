//! Bus configuration.

use serde::{Deserialize, Serialize};

/// Configuration for an [`EventBus`](crate::EventBus).
///
/// Hosts embedding several buses typically deserialize one of these per bus
/// from their own configuration files.
///
/// ```
/// use postbox::BusConfig;
///
/// let config = BusConfig::new("game").with_trace_dispatch(true);
/// assert_eq!(config.name, "game");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BusConfig {
    /// Bus name, used in log output and lock errors.
    pub name: String,
    /// Emit a trace-level log line per handler invocation.
    ///
    /// Off by default; per-handler logging is noisy on hot event types.
    pub trace_dispatch: bool,
}

impl BusConfig {
    /// Configuration with the given bus name and defaults otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trace_dispatch: false,
        }
    }

    /// Set per-handler trace logging.
    pub fn with_trace_dispatch(mut self, trace_dispatch: bool) -> Self {
        self.trace_dispatch = trace_dispatch;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new("events")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.name, "events");
        assert!(!config.trace_dispatch);
    }

    #[test]
    fn test_config_builders() {
        let config = BusConfig::new("loader").with_trace_dispatch(true);
        assert_eq!(config.name, "loader");
        assert!(config.trace_dispatch);
    }
}
