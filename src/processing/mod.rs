// ============================================================================
// Processing Module
// ============================================================================
//
// Drains the inbox into committed order aggregates.
//
// ============================================================================

mod batch_processor;

pub use batch_processor::{BatchError, BatchProcessor, BatchReport, MessageDisposition, ProcessorConfig};
