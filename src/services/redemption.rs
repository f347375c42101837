use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::models::offer::OfferDirectory;
use crate::models::{Activation, NewActivation};
use crate::services::code_generator::CodeGenerator;
use crate::store::{ActivationFilter, ActivationStore, StoreError};

/// Attempts at minting a free code before giving up. Exhausting this
/// budget is an operational signal of keyspace pressure, not an expected
/// outcome.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Listing limit for the staff audit view.
pub const STAFF_LIST_LIMIT: i64 = 50;

/// Listing limit for a user's own history.
pub const USER_LIST_LIMIT: i64 = 20;

#[derive(thiserror::Error, Debug)]
pub enum ActivateError {
    #[error("offer not found")]
    OfferNotFound,

    #[error("offer is not currently active")]
    OfferInactive,

    #[error("offer is outside its validity window")]
    OfferOutOfWindow,

    #[error("usage limit reached for this offer")]
    UsageLimitReached,

    #[error("could not mint a free activation code after repeated collisions")]
    CodeSpaceExhausted,

    #[error(transparent)]
    Store(StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum RedeemError {
    #[error("activation code not found")]
    CodeNotFound,

    #[error("activation code has already been redeemed")]
    AlreadyRedeemed,

    #[error("activation code has expired")]
    Expired,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RedeemError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => RedeemError::CodeNotFound,
            StoreError::AlreadyRedeemed => RedeemError::AlreadyRedeemed,
            StoreError::Expired => RedeemError::Expired,
            other => RedeemError::Store(other),
        }
    }
}

/// Result of an activation request. `reused` is set when the user already
/// held a live pending code for the offer and got that code back instead
/// of a second one.
#[derive(Debug, Clone)]
pub struct ActivationGrant {
    pub activation: Activation,
    pub reused: bool,
}

/// Orchestration façade over the generator and the store, and the only
/// component that reads offer data.
///
/// All redemption safety lives in the store's atomic conditional update;
/// this layer adds no locking of its own. Validation failures are client
/// errors surfaced immediately; only `DuplicateCode` contention is
/// retried, internally and with a bounded budget.
pub struct RedemptionService {
    offers: Arc<dyn OfferDirectory>,
    store: Arc<dyn ActivationStore>,
    generator: CodeGenerator,
    code_ttl: chrono::Duration,
}

impl RedemptionService {
    pub fn new(
        offers: Arc<dyn OfferDirectory>,
        store: Arc<dyn ActivationStore>,
        code_ttl: chrono::Duration,
    ) -> Self {
        Self {
            offers,
            store,
            generator: CodeGenerator::new(),
            code_ttl,
        }
    }

    /// Activates an offer for a customer and issues a single-use code.
    #[tracing::instrument(skip(self), fields(offer_id = %offer_id, user_id = %user_id))]
    pub async fn activate(
        &self,
        offer_id: Uuid,
        user_id: Uuid,
    ) -> Result<ActivationGrant, ActivateError> {
        let now = Utc::now();

        // 1. Load the offer from the collaborator's data
        let offer = self
            .offers
            .offer_by_id(offer_id)
            .await
            .map_err(|e| ActivateError::Store(StoreError::Database(e)))?
            .ok_or(ActivateError::OfferNotFound)?;

        // 2. Offer-level gates, read-only checks against external data
        if !offer.is_currently_active() {
            return Err(ActivateError::OfferInactive);
        }
        if !offer.is_within_window(now) {
            return Err(ActivateError::OfferOutOfWindow);
        }

        // 3. Advisory per-user cap. Read-then-decide: not linearizable
        // against concurrent activations by the same user, which is
        // acceptable for a business limit.
        let redeemed = self
            .store
            .count_redeemed(offer_id, user_id)
            .await
            .map_err(ActivateError::Store)?;
        if redeemed >= i64::from(offer.max_uses_per_user) {
            return Err(ActivateError::UsageLimitReached);
        }

        // 4. A live pending code for this offer is handed back as-is
        if let Some(existing) = self
            .store
            .find_pending(offer_id, user_id, now)
            .await
            .map_err(ActivateError::Store)?
        {
            tracing::debug!(activation_id = %existing.id, "returning existing pending activation");
            return Ok(ActivationGrant {
                activation: existing,
                reused: true,
            });
        }

        // 5. Mint a code. The store insert is the authoritative
        // uniqueness gate; collisions that slip past the pre-check are
        // retried here.
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = self
                .generator
                .generate_unique(self.store.as_ref(), now)
                .await
                .map_err(ActivateError::Store)?;

            match self
                .store
                .create(NewActivation {
                    offer_id,
                    user_id,
                    code,
                    activated_at: now,
                    expires_at: now + self.code_ttl,
                })
                .await
            {
                Ok(activation) => {
                    tracing::info!(
                        activation_id = %activation.id,
                        expires_at = %activation.expires_at,
                        "activation created"
                    );
                    return Ok(ActivationGrant {
                        activation,
                        reused: false,
                    });
                }
                Err(StoreError::DuplicateCode) => {
                    tracing::warn!(attempt, "activation code collided on insert, retrying");
                }
                Err(e) => return Err(ActivateError::Store(e)),
            }
        }

        tracing::error!("exhausted code generation attempts, keyspace under pressure");
        Err(ActivateError::CodeSpaceExhausted)
    }

    /// Redeems a code on behalf of a staff member, exactly once.
    #[tracing::instrument(skip(self, code), fields(staff_id = %staff_id))]
    pub async fn redeem(&self, code: &str, staff_id: Uuid) -> Result<Activation, RedeemError> {
        let code = normalize_code(code);
        let activation = self.store.redeem(&code, staff_id, Utc::now()).await?;

        tracing::info!(
            activation_id = %activation.id,
            offer_id = %activation.offer_id,
            user_id = %activation.user_id,
            "activation redeemed"
        );
        Ok(activation)
    }

    /// Snapshot of the activation behind a code, applying lazy expiry.
    pub async fn lookup(&self, code: &str) -> Result<Activation, RedeemError> {
        let code = normalize_code(code);
        Ok(self.store.lookup(&code, Utc::now()).await?)
    }

    /// Staff audit listing, newest first.
    pub async fn recent_activations(
        &self,
        filter: ActivationFilter,
    ) -> Result<Vec<Activation>, StoreError> {
        self.store.list(filter, STAFF_LIST_LIMIT, Utc::now()).await
    }

    /// A user's own activation history, newest first.
    pub async fn user_activations(&self, user_id: Uuid) -> Result<Vec<Activation>, StoreError> {
        let filter = ActivationFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.store.list(filter, USER_LIST_LIMIT, Utc::now()).await
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivationStatus, Offer};
    use crate::store::MemoryActivationStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use sqlx::types::Json;
    use std::collections::HashMap;

    struct StaticOfferDirectory {
        offers: HashMap<Uuid, Offer>,
    }

    #[async_trait]
    impl OfferDirectory for StaticOfferDirectory {
        async fn offer_by_id(&self, id: Uuid) -> Result<Option<Offer>, sqlx::Error> {
            Ok(self.offers.get(&id).cloned())
        }
    }

    fn offer(max_uses_per_user: i32) -> Offer {
        let now = Utc::now();
        Offer {
            id: Uuid::new_v4(),
            restaurant_id: Uuid::new_v4(),
            title: "Two for one pasta".to_string(),
            discount: serde_json::json!({"type": "bogo"}),
            minimum_order_cents: Some(2000),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            valid_days: Json(Vec::new()),
            max_uses: None,
            max_uses_per_user,
            current_uses: 0,
            is_active: true,
            created_at: now - Duration::days(1),
        }
    }

    fn service_with(
        offers: Vec<Offer>,
    ) -> (RedemptionService, Arc<MemoryActivationStore>) {
        let store = Arc::new(MemoryActivationStore::new());
        let directory = StaticOfferDirectory {
            offers: offers.into_iter().map(|o| (o.id, o)).collect(),
        };
        let service = RedemptionService::new(
            Arc::new(directory),
            store.clone(),
            Duration::minutes(30),
        );
        (service, store)
    }

    #[tokio::test]
    async fn activate_then_redeem_succeeds_once() {
        let offer = offer(1);
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);
        let user_id = Uuid::new_v4();
        let staff_id = Uuid::new_v4();

        let grant = service.activate(offer_id, user_id).await.unwrap();
        assert!(!grant.reused);
        assert_eq!(grant.activation.code.len(), 6);

        let redeemed = service.redeem(&grant.activation.code, staff_id).await.unwrap();
        assert_eq!(redeemed.status, ActivationStatus::Redeemed);
        assert_eq!(redeemed.redeemed_by, Some(staff_id));
        assert_eq!(redeemed.offer_id, offer_id);
        assert_eq!(redeemed.user_id, user_id);

        let again = service.redeem(&grant.activation.code, Uuid::new_v4()).await;
        assert!(matches!(again, Err(RedeemError::AlreadyRedeemed)));
    }

    #[tokio::test]
    async fn redeem_normalizes_caller_input() {
        let offer = offer(1);
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);

        let grant = service.activate(offer_id, Uuid::new_v4()).await.unwrap();
        let sloppy = format!("  {}  ", grant.activation.code.to_lowercase());

        let redeemed = service.redeem(&sloppy, Uuid::new_v4()).await.unwrap();
        assert_eq!(redeemed.id, grant.activation.id);
    }

    #[tokio::test]
    async fn redeem_after_deadline_reports_expired() {
        let offer = offer(1);
        let offer_id = offer.id;
        let (service, store) = service_with(vec![offer]);

        let grant = service.activate(offer_id, Uuid::new_v4()).await.unwrap();

        // Thirty-one minutes later the code is past its deadline.
        let late = Utc::now() + Duration::minutes(31);
        let result = store.redeem(&grant.activation.code, Uuid::new_v4(), late).await;
        assert!(matches!(result, Err(StoreError::Expired)));
    }

    #[tokio::test]
    async fn unknown_code_reports_not_found() {
        let (service, _store) = service_with(vec![offer(1)]);
        let result = service.redeem("000000", Uuid::new_v4()).await;
        assert!(matches!(result, Err(RedeemError::CodeNotFound)));
    }

    #[tokio::test]
    async fn activate_unknown_offer_reports_not_found() {
        let (service, _store) = service_with(vec![]);
        let result = service.activate(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(ActivateError::OfferNotFound)));
    }

    #[tokio::test]
    async fn inactive_offer_cannot_be_activated() {
        let mut offer = offer(1);
        offer.is_active = false;
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);

        let result = service.activate(offer_id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ActivateError::OfferInactive)));
    }

    #[tokio::test]
    async fn exhausted_global_cap_reads_as_inactive() {
        let mut offer = offer(1);
        offer.max_uses = Some(10);
        offer.current_uses = 10;
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);

        let result = service.activate(offer_id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ActivateError::OfferInactive)));
    }

    #[tokio::test]
    async fn offer_outside_window_cannot_be_activated() {
        let mut offer = offer(1);
        offer.valid_until = Utc::now() - Duration::hours(1);
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);

        let result = service.activate(offer_id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(ActivateError::OfferOutOfWindow)));
    }

    #[tokio::test]
    async fn usage_cap_counts_redeemed_activations() {
        let offer = offer(1);
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);
        let user_id = Uuid::new_v4();

        let grant = service.activate(offer_id, user_id).await.unwrap();
        service
            .redeem(&grant.activation.code, Uuid::new_v4())
            .await
            .unwrap();

        let second = service.activate(offer_id, user_id).await;
        assert!(matches!(second, Err(ActivateError::UsageLimitReached)));
    }

    #[tokio::test]
    async fn pending_activation_is_not_counted_against_cap() {
        let offer = offer(1);
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);
        let user_id = Uuid::new_v4();

        let first = service.activate(offer_id, user_id).await.unwrap();

        // Re-activating before redemption hands back the live code.
        let second = service.activate(offer_id, user_id).await.unwrap();
        assert!(second.reused);
        assert_eq!(second.activation.id, first.activation.id);
        assert_eq!(second.activation.code, first.activation.code);
    }

    #[tokio::test]
    async fn listings_cover_staff_and_user_views() {
        let offer = offer(2);
        let offer_id = offer.id;
        let (service, _store) = service_with(vec![offer]);
        let user_id = Uuid::new_v4();

        let grant = service.activate(offer_id, user_id).await.unwrap();
        service
            .redeem(&grant.activation.code, Uuid::new_v4())
            .await
            .unwrap();

        let staff_view = service
            .recent_activations(ActivationFilter {
                status: Some(ActivationStatus::Redeemed),
                offer_id: Some(offer_id),
                user_id: None,
            })
            .await
            .unwrap();
        assert_eq!(staff_view.len(), 1);

        let user_view = service.user_activations(user_id).await.unwrap();
        assert_eq!(user_view.len(), 1);
        assert_eq!(user_view[0].id, grant.activation.id);

        let stranger_view = service.user_activations(Uuid::new_v4()).await.unwrap();
        assert!(stranger_view.is_empty());
    }
}
