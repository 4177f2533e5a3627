//! TOML-based settings for the coaching server.
//!
//! Settings are loaded from `~/.repcoach/settings.toml` with environment variable
//! interpolation support. Secrets can also fall back to plain environment
//! variables through the `get_with_env_fallback` helper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use repcoach::settings::{SettingsManager, get_with_env_fallback};
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//!
//! let api_key = get_with_env_fallback(
//!     &settings.generation.openai.api_key,
//!     &["OPENAI_API_KEY"],
//!     None,
//! );
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, settings_path, SettingsManager};
pub use schema::{
    GenerationSettings, OpenAiSettings, RepcoachSettings, ServerSettings, SessionSettings,
};
