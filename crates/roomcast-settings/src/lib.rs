//! # roomcast-settings
//!
//! Configuration with layered sources for the roomcast server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RoomcastSettings::default()`]
//! 2. **Settings file**: `~/.roomcast/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `ROOMCAST_*` overrides (highest priority)
//!
//! Unlike a global singleton, the loaded value is handed to the server
//! explicitly so tests can run several differently configured servers.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, RoomcastSettings, ServerSettings};
