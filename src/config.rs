//! Engine configuration.
//!
//! Capability flags are passed into [`crate::ChannelEngine`] at construction
//! rather than read from ambient global state, so tests can run multiple
//! engine configurations side by side.

use serde::Deserialize;
use std::path::Path;

/// Configuration for a [`crate::ChannelEngine`] instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Whether the permanent-delete path is reachable for remote privileged
    /// actors. Local actors may always use it.
    pub enable_permanent_delete: bool,

    /// Name of each team's default channel. Privacy conversion and archival
    /// are refused for it.
    pub default_channel_name: String,

    /// Upper bound on members in a group (multi-party) channel.
    pub group_channel_max_members: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_permanent_delete: false,
            default_channel_name: "town-square".to_string(),
            group_channel_max_members: 8,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}
