// src/domain/service/mod.rs
// Pure order-pipeline services: no I/O, no shared state

pub mod precision;
pub mod safety;
pub mod validator;

pub use precision::PrecisionFormatter;
pub use safety::SafetyGate;
pub use validator::OrderValidator;
