//! Configuration types for the bridge.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Bridge behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name used in log output.
    /// Default: "bridge"
    pub name: String,

    /// Record the accessing proxy as holder of object and array proxies
    /// read as properties, so that invoking them directly keeps the receiver.
    /// Default: true
    pub holder_binding: bool,

    /// Release handles immediately on disposal (taking an engine turn)
    /// instead of queueing them for the next turn.
    /// Default: false
    pub eager_release: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "bridge".to_string(),
            holder_binding: true,
            eager_release: false,
        }
    }
}

impl BridgeConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::Host(e.into()))
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable holder binding.
    pub fn holder_binding(mut self, enabled: bool) -> Self {
        self.holder_binding = enabled;
        self
    }

    /// Enable or disable eager handle release.
    pub fn eager_release(mut self, enabled: bool) -> Self {
        self.eager_release = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.name, "bridge");
        assert!(config.holder_binding);
        assert!(!config.eager_release);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = BridgeConfig::from_json(r#"{"eager_release": true}"#).unwrap();
        assert!(config.eager_release);
        assert!(config.holder_binding);

        assert!(BridgeConfig::from_json(r#"{"holder_binding": "yes"}"#).is_err());
        assert!(BridgeConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = BridgeConfig::new().name("nested").holder_binding(false);
        assert_eq!(config.name, "nested");
        assert!(!config.holder_binding);
    }
}
