// Store module - authoritative record of activation lifecycle

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Activation, ActivationStatus, NewActivation};

pub use memory::MemoryActivationStore;
pub use postgres::PgActivationStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("another pending activation already holds this code")]
    DuplicateCode,

    #[error("no activation found for this code")]
    NotFound,

    #[error("activation has already been redeemed")]
    AlreadyRedeemed,

    #[error("activation has expired")]
    Expired,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Filter for audit listings. All fields are optional and combine with AND.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationFilter {
    pub status: Option<ActivationStatus>,
    pub offer_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Single source of truth for activation state.
///
/// Implementations must make `create` and `redeem` atomic per code: two
/// concurrent `redeem` calls for the same code are linearized so exactly
/// one succeeds, while calls for different codes proceed in parallel.
/// Expiry is evaluated lazily inside each operation; there is no sweep.
#[async_trait]
pub trait ActivationStore: Send + Sync {
    /// Inserts a new pending record. The insert itself is the uniqueness
    /// gate: if another pending activation holds the same code, the call
    /// fails with [`StoreError::DuplicateCode`] and the caller retries
    /// with a fresh code.
    async fn create(&self, new: NewActivation) -> Result<Activation, StoreError>;

    /// Reads the activation for a code. A pending record whose deadline
    /// has passed is flipped to expired as part of the read, so callers
    /// never observe a logically expired record still marked pending.
    /// When a code has been re-issued over time, resolves to the pending
    /// holder if one exists, otherwise the most recently activated record.
    async fn lookup(&self, code: &str, now: DateTime<Utc>) -> Result<Activation, StoreError>;

    /// Transitions the pending record for `code` to redeemed, setting
    /// `redeemed_at` and `redeemed_by`, only if `now <= expires_at`. This
    /// is one indivisible conditional update, never a read-then-write
    /// pair. A failed attempt against a past-deadline record marks it
    /// expired and reports [`StoreError::Expired`].
    async fn redeem(
        &self,
        code: &str,
        staff_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Activation, StoreError>;

    /// Collision pre-check for the code generator. A pending record whose
    /// deadline has passed does not count as a live holder.
    async fn is_code_pending(&self, code: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Number of redeemed activations for `(offer_id, user_id)`, the
    /// input to the advisory per-user usage cap.
    async fn count_redeemed(&self, offer_id: Uuid, user_id: Uuid) -> Result<i64, StoreError>;

    /// The user's live pending activation for an offer, if any, applying
    /// lazy expiry first.
    async fn find_pending(
        &self,
        offer_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Activation>, StoreError>;

    /// Audit listing, newest first, applying lazy expiry to the rows the
    /// filter touches.
    async fn list(
        &self,
        filter: ActivationFilter,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Activation>, StoreError>;

    /// Connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
