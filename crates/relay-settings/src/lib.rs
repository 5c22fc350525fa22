//! # relay-settings
//!
//! Layered configuration for the relay service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`RelaySettings::default()`]
//! 2. **User file** — `~/.relay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `RELAY_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_with, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::{
    CompletionSettings, LoggingSettings, RelaySettings, ServerSettings, SessionSettings,
    TaskSettings,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_ends_with_relay_dir() {
        let path = settings_path();
        assert!(path.ends_with(".relay/settings.json"));
    }
}
