//! Name → constructor table for delegate policies.
//!
//! Configuration selects a delegate by name (`[balancer] delegate = "..."`).
//! Policies are registered statically; there is no runtime loading.

use std::collections::BTreeMap;

use tracing::warn;

use shardgrid_core::BalancerConfig;

use crate::delegate::DelegatePolicy;
use crate::error::{BalancerError, BalancerResult};
use crate::policies::{CostBasedBalancer, SimpleBalancer, cost, simple};

/// Builds a fresh, uninitialized delegate from configuration.
pub type PolicyConstructor = fn(&BalancerConfig) -> Box<dyn DelegatePolicy>;

#[derive(Clone)]
pub struct PolicyRegistry {
    constructors: BTreeMap<String, PolicyConstructor>,
}

impl PolicyRegistry {
    /// A registry with no policies.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in policies.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(cost::NAME, |config| {
            Box::new(CostBasedBalancer::new(&config.cost))
        });
        registry.register(simple::NAME, |config| {
            Box::new(SimpleBalancer::new(&config.simple))
        });
        registry
    }

    /// Register `constructor` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, constructor: PolicyConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Registered policy names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct the policy named by `config.delegate`.
    pub fn create(&self, config: &BalancerConfig) -> BalancerResult<Box<dyn DelegatePolicy>> {
        let Some(constructor) = self.constructors.get(&config.delegate) else {
            warn!(
                requested = %config.delegate,
                known = ?self.names().collect::<Vec<_>>(),
                "unknown delegate policy"
            );
            return Err(BalancerError::UnknownPolicy(config.delegate.clone()));
        };
        Ok(constructor(config))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
