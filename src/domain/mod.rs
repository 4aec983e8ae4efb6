pub mod errors;
pub mod model;
pub mod repository;
pub mod service;

// Re-export common types for convenience
pub use errors::{
    AppError, AppResult, CancelError, ExchangeError, ExchangeResult, ExecutorError, PipelineError,
    PipelineResult, Stage,
};
pub use model::{
    AccountBalance, NormalizedOrder, OrderKind, OrderRecord, OrderRequest, OrderSide,
    OrderSnapshot, OrderStatus, SymbolRules,
};
