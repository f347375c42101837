use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of an activation. Transitions are forward-only: a record
/// leaves `Pending` at most once and never leaves `Redeemed` or `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    Pending,
    Redeemed,
    Expired,
}

/// A single issuance of a redeemable code, tied to one offer and one
/// customer. Records are kept after redemption or expiry for audit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activation {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub status: ActivationStatus,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<Uuid>,
}

impl Activation {
    /// True once the redemption deadline has passed, regardless of status.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewActivation {
    pub offer_id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
