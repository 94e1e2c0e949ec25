//! In-process plan storage with lazy expiry.
//!
//! Plans never outlive the process that computed them. Expired entries are
//! evicted when they are looked up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use tether_core::PlanId;

use crate::error::{ErrorCode, SyncError};
use crate::plan::SyncPlan;

/// Outcome of a plan lookup.
#[derive(Debug, Clone)]
pub enum PlanLookup {
    Valid(Arc<SyncPlan>),
    NotFound,
    Expired { expired_at: DateTime<Utc> },
}

impl PlanLookup {
    pub fn is_valid(&self) -> bool {
        matches!(self, PlanLookup::Valid(_))
    }

    /// Why the plan is unusable, if it is.
    pub fn reason(&self) -> Option<ErrorCode> {
        match self {
            PlanLookup::Valid(_) => None,
            PlanLookup::NotFound => Some(ErrorCode::PlanNotFound),
            PlanLookup::Expired { .. } => Some(ErrorCode::PlanExpired),
        }
    }

    pub fn into_result(self, plan_id: &PlanId) -> Result<Arc<SyncPlan>, SyncError> {
        match self {
            PlanLookup::Valid(plan) => Ok(plan),
            PlanLookup::NotFound => Err(SyncError::PlanNotFound {
                plan_id: plan_id.clone(),
            }),
            PlanLookup::Expired { expired_at } => Err(SyncError::PlanExpired {
                plan_id: plan_id.clone(),
                expired_at,
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct PlanStore {
    plans: Mutex<HashMap<PlanId, Arc<SyncPlan>>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plan: SyncPlan) -> Arc<SyncPlan> {
        let plan = Arc::new(plan);
        self.plans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(plan.plan_id.clone(), Arc::clone(&plan));
        plan
    }

    pub fn get(&self, plan_id: &PlanId) -> PlanLookup {
        self.get_at(plan_id, Utc::now())
    }

    /// Lookup as of `now`; an expired plan is evicted and reported once as
    /// expired, then as not found.
    pub fn get_at(&self, plan_id: &PlanId, now: DateTime<Utc>) -> PlanLookup {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        match plans.get(plan_id) {
            None => PlanLookup::NotFound,
            Some(plan) if plan.is_expired_at(now) => {
                let expired_at = plan.expires_at;
                plans.remove(plan_id);
                tracing::debug!(plan_id = %plan_id, "evicted expired plan");
                PlanLookup::Expired { expired_at }
            }
            Some(plan) => PlanLookup::Valid(Arc::clone(plan)),
        }
    }

    /// Remove a plan. Returns `false` if it was not present.
    pub fn delete(&self, plan_id: &PlanId) -> bool {
        self.plans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(plan_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.plans.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use tether_core::{RemoteId, SyncDirection};

    use super::*;
    use crate::differ::DiffResult;

    fn plan(ttl: Duration) -> SyncPlan {
        SyncPlan::new(
            RemoteId::from("r"),
            SyncDirection::Pull,
            PathBuf::from("/tmp/r"),
            DiffResult::default(),
            false,
            ttl,
        )
    }

    #[test]
    fn insert_then_get_is_valid() {
        let store = PlanStore::new();
        let id = store.insert(plan(Duration::from_secs(300))).plan_id.clone();
        assert!(store.get(&id).is_valid());
    }

    #[test]
    fn unknown_plan_is_not_found() {
        let store = PlanStore::new();
        let lookup = store.get(&PlanId::from("nope"));
        assert_eq!(lookup.reason(), Some(ErrorCode::PlanNotFound));
    }

    #[test]
    fn expired_plan_is_evicted_on_lookup() {
        let store = PlanStore::new();
        let stored = store.insert(plan(Duration::from_secs(300)));
        let later = stored.expires_at + chrono::Duration::seconds(1);

        let first = store.get_at(&stored.plan_id, later);
        assert_eq!(first.reason(), Some(ErrorCode::PlanExpired));
        assert!(store.is_empty());

        let second = store.get_at(&stored.plan_id, later);
        assert_eq!(second.reason(), Some(ErrorCode::PlanNotFound));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = PlanStore::new();
        let id = store.insert(plan(Duration::from_secs(300))).plan_id.clone();
        assert!(store.delete(&id));
        assert!(!store.delete(&id));
        let err = store.get(&id).into_result(&id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PlanNotFound);
    }
}
