//! Config-driven strategy selection
//!
//! The manager ties a [`RateLimiterConfig`] to the [`Factory`]: it picks the
//! configured strategy name, converts the matching typed sub-config into the
//! factory's map shape, and builds the engine.

use std::sync::Arc;

use crate::config::{RateLimiterConfig, StrategyConfig};
use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::limiter::RateLimiter;
use crate::metrics::Collector;
use crate::params::ConfigMap;
use crate::store::ScriptStore;
use crate::strategy;

/// Selects and builds the configured rate-limiting strategy.
pub struct StrategyManager {
    config: RateLimiterConfig,
    factory: Factory,
}

impl StrategyManager {
    pub fn new(config: RateLimiterConfig, store: Arc<dyn ScriptStore>) -> Self {
        Self {
            config,
            factory: Factory::new(store),
        }
    }

    /// As [`new`](StrategyManager::new), with a metrics collector installed
    /// on the factory.
    pub fn with_collector(
        config: RateLimiterConfig,
        store: Arc<dyn ScriptStore>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        Self {
            config,
            factory: Factory::new(store).with_collector(collector),
        }
    }

    /// Build the engine named by the configuration.
    pub fn current(&self) -> Result<Box<dyn RateLimiter>> {
        let name = self.config.strategy.as_str();
        let constructor = self
            .factory
            .constructor(name)
            .ok_or_else(|| Error::UnsupportedStrategy(name.to_string()))?;

        let strategies = &self.config.strategies;
        let typed = match name {
            strategy::TOKEN_BUCKET => {
                StrategyConfig::TokenBucket(strategies.token_bucket.clone())
            }
            strategy::SLIDING_WINDOW_LOG => {
                StrategyConfig::SlidingWindowLog(strategies.sliding_window_log.clone())
            }
            strategy::SLIDING_WINDOW_COUNTER => {
                StrategyConfig::SlidingWindowCounter(strategies.sliding_window_counter.clone())
            }
            _ => return Err(Error::UnsupportedStrategy(name.to_string())),
        };

        let map = constructor.convert_config(&typed)?;
        self.factory.create(name, &map)
    }

    /// Runtime strategy updates are a declared non-goal; reconfigure and
    /// restart instead.
    pub fn update(&self, _name: &str, _config: &ConfigMap) -> Result<()> {
        Err(Error::NotImplemented)
    }

    /// The strategy names the underlying factory can instantiate.
    pub fn available(&self) -> Vec<&'static str> {
        self.factory.available()
    }
}
