//! # r2s-settings
//!
//! Configuration for the r2s service, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`R2sSettings::default()`]
//! 2. **Settings file**: `~/.r2s/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `R2S_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
