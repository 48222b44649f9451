//! # rideline-settings
//!
//! Configuration management with layered sources for the rideline client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.rideline/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RIDELINE_*` overrides (highest priority)
//!
//! Library code takes a [`ClientSettings`] by value; only binaries should
//! reach for the [`get_settings`] singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<ClientSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.rideline/settings.json` with env
/// var overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static ClientSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ClientSettings) -> std::result::Result<(), ClientSettings> {
    SETTINGS.set(settings)
}
