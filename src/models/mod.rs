// Models module - Database entity representations

pub mod activation;
pub mod offer;

pub use activation::{Activation, ActivationStatus, NewActivation};
pub use offer::Offer;
