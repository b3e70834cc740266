//! Shared types, config, and error definitions for the scalper bot.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    AlpacaConfig, BotConfig, ModelsConfig, PortfolioConfig, StrategyConfig, TimingConfig,
};
pub use error::Error;
pub use traits::{Broker, MetadataFeed, ModelStore};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
