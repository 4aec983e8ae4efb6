pub mod order_pipeline;
pub mod order_tracker;

// Re-export public API
pub use order_pipeline::{OrderPipeline, PlaceOptions};
pub use order_tracker::OrderLifecycleTracker;
