//! # cadence-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CadenceSettings::default()`]
//! 2. **User file**: `~/.cadence/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CADENCE_*` overrides (highest priority)
//!
//! ```no_run
//! let settings = cadence_settings::load_settings().unwrap_or_default();
//! println!("worker channel: {}", settings.channel.url);
//! ```

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path, validate,
};
pub use types::{ApiSettings, CadenceSettings, ChannelSettings, LoggingSettings, SessionSettings};
