//! Environment-driven configuration for the garupa service.
//!
//! All knobs come from environment variables (a `.env` file is loaded by the
//! binary before this crate reads anything). The schema types carry the
//! defaults; [`GarupaConfig::from_env`] applies overrides on top of them.

mod env;
mod error;
pub mod schema;

pub use {
    error::{Error, Result},
    schema::{
        AgentConfig, CoalesceConfig, GarupaConfig, HandoffConfig, InstagramConfig, LeadConfig,
        OpenAiConfig, ServerConfig, StorageConfig, VoiceConfig,
    },
};
