pub mod alert_usecase;
pub mod dual_write_usecase;
pub mod enrichment_usecase;
pub mod trend_detection_usecase;

// Re-export public API
pub use alert_usecase::AlertDispatcher;
pub use dual_write_usecase::{DualSinkWriter, DualWriteOutcome, Sink, SinkFailure, WriteReport};
pub use enrichment_usecase::{EnrichedBatch, RecordEnricher, Rejection};
pub use trend_detection_usecase::{
    classify_crossover, TrendDetectionEngine, TrendDetectionUseCase, TrendOutcome, TrendSettings,
};
