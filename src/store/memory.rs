use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{Activation, ActivationStatus, NewActivation};

use super::{ActivationFilter, ActivationStore, StoreError};

/// In-memory store for single-instance deployments and tests.
///
/// State lives in a `DashMap` keyed by code: holding a map entry locks
/// that key's shard, which serializes create/redeem per code while calls
/// for different codes proceed in parallel. Each entry keeps the full
/// issuance history of its code, newest last, since redeemed and expired
/// records are retained for audit and codes may be re-issued.
///
/// Nothing here survives a restart; multi-instance deployments need the
/// Postgres store.
#[derive(Debug, Default)]
pub struct MemoryActivationStore {
    by_code: DashMap<String, Vec<Activation>>,
}

impl MemoryActivationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn expire_stale(records: &mut [Activation], now: DateTime<Utc>) {
    for a in records.iter_mut() {
        if a.status == ActivationStatus::Pending && a.is_past_deadline(now) {
            a.status = ActivationStatus::Expired;
        }
    }
}

fn matches(a: &Activation, filter: &ActivationFilter) -> bool {
    filter.status.map_or(true, |s| a.status == s)
        && filter.offer_id.map_or(true, |id| a.offer_id == id)
        && filter.user_id.map_or(true, |id| a.user_id == id)
}

#[async_trait]
impl ActivationStore for MemoryActivationStore {
    async fn create(&self, new: NewActivation) -> Result<Activation, StoreError> {
        // The entry guard is the per-code critical section.
        let mut records = self.by_code.entry(new.code.clone()).or_default();

        expire_stale(&mut records, new.activated_at);
        if records
            .iter()
            .any(|a| a.status == ActivationStatus::Pending)
        {
            return Err(StoreError::DuplicateCode);
        }

        let activation = Activation {
            id: Uuid::new_v4(),
            offer_id: new.offer_id,
            user_id: new.user_id,
            code: new.code.clone(),
            status: ActivationStatus::Pending,
            activated_at: new.activated_at,
            expires_at: new.expires_at,
            redeemed_at: None,
            redeemed_by: None,
        };
        records.push(activation.clone());

        Ok(activation)
    }

    async fn lookup(&self, code: &str, now: DateTime<Utc>) -> Result<Activation, StoreError> {
        let mut records = self.by_code.get_mut(code).ok_or(StoreError::NotFound)?;

        expire_stale(&mut records, now);
        records
            .iter()
            .max_by_key(|a| (a.status == ActivationStatus::Pending, a.activated_at))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn redeem(
        &self,
        code: &str,
        staff_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Activation, StoreError> {
        let mut records = self.by_code.get_mut(code).ok_or(StoreError::NotFound)?;

        // Compare-and-swap under the entry guard: whichever caller holds
        // the guard first observes the pending record and transitions it.
        if let Some(a) = records
            .iter_mut()
            .find(|a| a.status == ActivationStatus::Pending)
        {
            if a.is_past_deadline(now) {
                a.status = ActivationStatus::Expired;
                return Err(StoreError::Expired);
            }

            a.status = ActivationStatus::Redeemed;
            a.redeemed_at = Some(now);
            a.redeemed_by = Some(staff_id);
            return Ok(a.clone());
        }

        match records.iter().max_by_key(|a| a.activated_at) {
            None => Err(StoreError::NotFound),
            Some(a) if a.status == ActivationStatus::Redeemed => Err(StoreError::AlreadyRedeemed),
            Some(_) => Err(StoreError::Expired),
        }
    }

    async fn is_code_pending(&self, code: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let live = self.by_code.get(code).is_some_and(|records| {
            records
                .iter()
                .any(|a| a.status == ActivationStatus::Pending && !a.is_past_deadline(now))
        });

        Ok(live)
    }

    async fn count_redeemed(&self, offer_id: Uuid, user_id: Uuid) -> Result<i64, StoreError> {
        let count = self
            .by_code
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|a| {
                a.status == ActivationStatus::Redeemed
                    && a.offer_id == offer_id
                    && a.user_id == user_id
            })
            .count();

        Ok(count as i64)
    }

    async fn find_pending(
        &self,
        offer_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Activation>, StoreError> {
        for mut entry in self.by_code.iter_mut() {
            expire_stale(entry.value_mut(), now);
            if let Some(a) = entry.value().iter().find(|a| {
                a.status == ActivationStatus::Pending
                    && a.offer_id == offer_id
                    && a.user_id == user_id
            }) {
                return Ok(Some(a.clone()));
            }
        }

        Ok(None)
    }

    async fn list(
        &self,
        filter: ActivationFilter,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Activation>, StoreError> {
        let mut activations = Vec::new();
        for mut entry in self.by_code.iter_mut() {
            expire_stale(entry.value_mut(), now);
            activations.extend(entry.value().iter().filter(|a| matches(a, &filter)).cloned());
        }

        activations.sort_by(|a, b| b.activated_at.cmp(&a.activated_at));
        activations.truncate(limit as usize);

        Ok(activations)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
