use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;
use crate::ids::{ContactId, TransportId};
use crate::traits::{DuplexTransportConnection, SimplexTransportReader, SimplexTransportWriter};

/// Config key that opt-in carriers check before creating a plugin. Accepts
/// `true`, `1`, `yes` or `on` in any case; anything else leaves it disabled.
pub const CONFIG_ENABLED: &str = "enabled";

/// String-keyed carrier configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginConfig {
    values: HashMap<String, String>,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when the `enabled` key holds a true value.
    pub fn is_enabled(&self) -> bool {
        self.get(CONFIG_ENABLED).is_some_and(|v| {
            let v = v.trim();
            ["true", "1", "yes", "on"]
                .iter()
                .any(|yes| v.eq_ignore_ascii_case(yes))
        })
    }
}

/// Common surface of every transport plugin.
pub trait Plugin: Send + Sync {
    fn id(&self) -> &TransportId;

    /// Maximum latency of the carrier.
    fn max_latency(&self) -> Duration;

    /// Prepare the carrier for use.
    fn start(&self) -> Result<()>;

    /// Release any resources held since [`start`](Self::start).
    fn stop(&self) -> Result<()>;
}

/// A plugin for carriers that support continuous bidirectional streaming.
pub trait DuplexPlugin: Plugin {
    /// Attempt to connect to the given contact.
    ///
    /// `Ok(None)` means no attempt is possible right now (for example the
    /// contact has no known address); an `Err` means an attempt was made and
    /// failed.
    fn create_connection(
        &self,
        contact: ContactId,
    ) -> Result<Option<Box<dyn DuplexTransportConnection>>>;
}

/// A plugin for carriers that move data one way per physical event.
pub trait SimplexPlugin: Plugin {
    /// Attempt to create a reader for the given contact.
    ///
    /// Returns `Ok(None)` when nothing can be read at the moment.
    fn create_reader(&self, contact: ContactId) -> Result<Option<Box<dyn SimplexTransportReader>>>;

    /// Attempt to create a writer for the given contact.
    ///
    /// Returns `Ok(None)` when nothing can be written at the moment.
    fn create_writer(&self, contact: ContactId) -> Result<Option<Box<dyn SimplexTransportWriter>>>;
}

/// Creates duplex plugins from configuration.
pub trait DuplexPluginFactory {
    fn id(&self) -> &TransportId;

    /// Returns `None` if the carrier is disabled by `config`.
    fn create_plugin(&self, config: &PluginConfig) -> Result<Option<Box<dyn DuplexPlugin>>>;
}

/// Creates simplex plugins from configuration.
pub trait SimplexPluginFactory {
    fn id(&self) -> &TransportId;

    /// Returns `None` if the carrier is disabled by `config`.
    fn create_plugin(&self, config: &PluginConfig) -> Result<Option<Box<dyn SimplexPlugin>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_requires_a_true_value() {
        let mut config = PluginConfig::new();
        assert!(!config.is_enabled());
        for value in ["", "false", "0", "no", "off", "maybe"] {
            config.set(CONFIG_ENABLED, value);
            assert!(!config.is_enabled(), "{value:?} enabled the carrier");
        }
        for value in ["true", "TRUE", "1", "yes", " on "] {
            config.set(CONFIG_ENABLED, value);
            assert!(config.is_enabled(), "{value:?} left the carrier disabled");
        }
    }

    #[test]
    fn builder_style_values() {
        let config = PluginConfig::new().with("dir", "/tmp/x").with("capacity", "10");
        assert_eq!(config.get("dir"), Some("/tmp/x"));
        assert_eq!(config.get("capacity"), Some("10"));
        assert_eq!(config.get("missing"), None);
    }
}
