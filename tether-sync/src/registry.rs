//! Process-wide shared state, owned by the host and passed by reference.

use std::time::Duration;

use tether_core::Config;

use crate::lock::LockManager;
use crate::plan_store::PlanStore;

/// Plan storage plus execution locks. One per process; never global.
#[derive(Debug)]
pub struct Registry {
    plans: PlanStore,
    locks: LockManager,
    plan_ttl: Duration,
    lock_timeout: Duration,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        Self {
            plans: PlanStore::new(),
            locks: LockManager::new(config.lock_ttl()),
            plan_ttl: config.plan_ttl(),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn plans(&self) -> &PlanStore {
        &self.plans
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn plan_ttl(&self) -> Duration {
        self.plan_ttl
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
