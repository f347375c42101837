// Services module - Business logic

pub mod code_generator;
pub mod redemption;
