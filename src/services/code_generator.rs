use chrono::{DateTime, Utc};
use rand::Rng;

use crate::store::{ActivationStore, StoreError};

pub const CODE_LENGTH: usize = 6;
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces activation codes.
///
/// Codes are bearer credentials shown to arbitrary restaurant staff, so
/// draws come from the thread-local CSPRNG rather than a seedable
/// generator. Uniqueness is only ever enforced against currently pending
/// activations; the 36^6 keyspace is generous but codes do legitimately
/// repeat over the lifetime of the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Draws a fresh 6-character code. Never fails.
    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// Draws until the store reports no live pending holder for the code.
    ///
    /// This is only a pre-check: the store's insert remains the
    /// authoritative uniqueness gate, and a race that slips past it
    /// surfaces as `DuplicateCode` from `create`, which the service
    /// retries with a bounded budget.
    pub async fn generate_unique(
        &self,
        store: &dyn ActivationStore,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        loop {
            let code = self.generate();
            if !store.is_code_pending(&code, now).await? {
                return Ok(code);
            }
            tracing::debug!("generated code collides with a pending activation, redrawing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activation, NewActivation};
    use crate::store::ActivationFilter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[test]
    fn codes_have_fixed_length_and_alphabet() {
        let generator = CodeGenerator::new();
        for _ in 0..200 {
            let code = generator.generate();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn consecutive_draws_differ() {
        let generator = CodeGenerator::new();
        let draws: std::collections::HashSet<_> =
            (0..50).map(|_| generator.generate()).collect();
        // 50 draws from a 2.1e9 keyspace colliding would point at a broken rng.
        assert_eq!(draws.len(), 50);
    }

    /// Store stub whose pending pre-check reports collisions for the
    /// first `collisions` calls.
    struct CollidingStore {
        collisions: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActivationStore for CollidingStore {
        async fn create(&self, _new: NewActivation) -> Result<Activation, StoreError> {
            unimplemented!()
        }

        async fn lookup(&self, _code: &str, _now: DateTime<Utc>) -> Result<Activation, StoreError> {
            unimplemented!()
        }

        async fn redeem(
            &self,
            _code: &str,
            _staff_id: Uuid,
            _now: DateTime<Utc>,
        ) -> Result<Activation, StoreError> {
            unimplemented!()
        }

        async fn is_code_pending(
            &self,
            _code: &str,
            _now: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) < self.collisions)
        }

        async fn count_redeemed(&self, _offer_id: Uuid, _user_id: Uuid) -> Result<i64, StoreError> {
            unimplemented!()
        }

        async fn find_pending(
            &self,
            _offer_id: Uuid,
            _user_id: Uuid,
            _now: DateTime<Utc>,
        ) -> Result<Option<Activation>, StoreError> {
            unimplemented!()
        }

        async fn list(
            &self,
            _filter: ActivationFilter,
            _limit: i64,
            _now: DateTime<Utc>,
        ) -> Result<Vec<Activation>, StoreError> {
            unimplemented!()
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn generate_unique_redraws_on_collision() {
        let store = CollidingStore {
            collisions: 3,
            calls: AtomicUsize::new(0),
        };
        let generator = CodeGenerator::new();

        let code = generator
            .generate_unique(&store, Utc::now())
            .await
            .unwrap();
        assert_eq!(code.len(), CODE_LENGTH);
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    }
}
