// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Dead letter queue
// - Health monitoring
//
// ============================================================================

mod dlq;
mod health_monitor;

pub use dlq::{AddToDlq, DlqActor};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
