//! # banter-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BanterSettings::default()`]
//! 2. **User file**: `~/.banter/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `BANTER_*` overrides (highest priority)
//!
//! Per-owner overlay preferences fetched from the server are applied on top
//! at runtime by the overlay crate; they never touch this file.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = BanterSettings::default();
        let path = settings_path();
        assert!(path.ends_with(".banter/settings.json"));
    }
}
