use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "MARKERS_";

/// Tunables for storage keys, formatting and polling cadence.
///
/// Intervals are stored in milliseconds so they can be overridden from TOML or
/// the environment (`MARKERS_HIGHLIGHT_POLL_MS=500`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Prefix of the per-video storage key.
    pub storage_prefix: String,
    /// Global key holding the preferred formatter name.
    pub formatter_preference_key: String,
    /// Formatter used when no preference is stored.
    pub default_formatter: String,
    /// Minimum number of DHMS components printed by the minimal formatter.
    pub minimal_min_places: usize,
    pub navigation_poll_ms: u64,
    pub highlight_poll_ms: u64,
    pub setup_poll_ms: u64,
    pub advertisement_backoff_ms: u64,
    /// How long a live delay measurement stays valid.
    pub delay_cache_ms: u64,
    pub diagnostics_attempts: u32,
    pub click_poll_ms: u64,
    pub click_attempts: u32,
    pub share_base_url: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            storage_prefix: String::from("r2_twitch_user_markers_"),
            formatter_preference_key: String::from("r2_twitch_user_markers_ui_formatter"),
            default_formatter: String::from("minimal"),
            minimal_min_places: 2,
            navigation_poll_ms: 1_000,
            highlight_poll_ms: 1_000,
            setup_poll_ms: 1_000,
            advertisement_backoff_ms: 5_000,
            delay_cache_ms: 60_000,
            diagnostics_attempts: 3,
            click_poll_ms: 100,
            click_attempts: 50,
            share_base_url: String::from("https://twitch.tv/videos/"),
        }
    }
}

impl OverlayConfig {
    /// Loads defaults, then `path` (when it exists), then `MARKERS_*` variables.
    ///
    /// # Example
    /// ```no_run
    /// use markers::OverlayConfig;
    ///
    /// let config = OverlayConfig::load(Some("markers.toml".as_ref())).expect("config");
    /// assert!(config.delay_cache().as_secs() > 0);
    /// ```
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX)).extract()
    }

    pub fn navigation_poll(&self) -> Duration {
        Duration::from_millis(self.navigation_poll_ms)
    }

    pub fn highlight_poll(&self) -> Duration {
        Duration::from_millis(self.highlight_poll_ms)
    }

    pub fn setup_poll(&self) -> Duration {
        Duration::from_millis(self.setup_poll_ms)
    }

    pub fn advertisement_backoff(&self) -> Duration {
        Duration::from_millis(self.advertisement_backoff_ms)
    }

    pub fn delay_cache(&self) -> Duration {
        Duration::from_millis(self.delay_cache_ms)
    }

    pub fn click_poll(&self) -> Duration {
        Duration::from_millis(self.click_poll_ms)
    }
}
