//! Strategy factory and registry
//!
//! The factory owns the name-keyed registry of strategy constructors plus
//! the shared store handle. Strategies register at construction time; the
//! registry must not be mutated once the factory is shared across tasks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::limiter::{RateLimiter, StrategyConstructor};
use crate::metrics::{Collector, MeteredLimiter};
use crate::params::ConfigMap;
use crate::store::ScriptStore;
use crate::strategy::sliding_window_counter::SlidingWindowCounterConstructor;
use crate::strategy::sliding_window_log::SlidingWindowLogConstructor;
use crate::strategy::token_bucket::TokenBucketConstructor;

/// Builds engines by strategy name.
pub struct Factory {
    store: Arc<dyn ScriptStore>,
    strategies: HashMap<&'static str, Box<dyn StrategyConstructor>>,
    collector: Option<Arc<dyn Collector>>,
}

impl Factory {
    /// Create a factory with the three built-in strategies registered and no
    /// metrics collector.
    pub fn new(store: Arc<dyn ScriptStore>) -> Self {
        let mut factory = Self {
            store,
            strategies: HashMap::new(),
            collector: None,
        };
        factory.register(Box::new(TokenBucketConstructor));
        factory.register(Box::new(SlidingWindowLogConstructor));
        factory.register(Box::new(SlidingWindowCounterConstructor));
        factory
    }

    /// Install a metrics collector. Engines created afterwards are wrapped
    /// in [`MeteredLimiter`].
    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Register an additional strategy constructor under its own name.
    pub fn register(&mut self, constructor: Box<dyn StrategyConstructor>) {
        self.strategies.insert(constructor.name(), constructor);
    }

    /// Instantiate the named strategy from a loosely-typed config map,
    /// wrapped with instrumentation when a collector is installed.
    pub fn create(&self, name: &str, config: &ConfigMap) -> Result<Box<dyn RateLimiter>> {
        let constructor = self
            .strategies
            .get(name)
            .ok_or_else(|| Error::UnsupportedStrategy(name.to_string()))?;

        let limiter = constructor.new_from_config(config, self.store.clone())?;
        tracing::debug!(strategy = name, "created rate limiter");

        match &self.collector {
            Some(collector) => Ok(Box::new(MeteredLimiter::new(
                limiter,
                collector.clone(),
                name,
            ))),
            None => Ok(limiter),
        }
    }

    /// Look up a registered constructor by name.
    pub fn constructor(&self, name: &str) -> Option<&dyn StrategyConstructor> {
        self.strategies.get(name).map(|c| c.as_ref())
    }

    /// The names this factory can instantiate.
    pub fn available(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
