// API module - HTTP endpoints

pub mod activations;
pub mod health;
pub mod middleware;
pub mod offers;
pub mod redemptions;

use std::sync::Arc;

use crate::services::redemption::RedemptionService;
use crate::store::ActivationStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RedemptionService>,
    pub store: Arc<dyn ActivationStore>,
}
