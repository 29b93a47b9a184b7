// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for asynchronous, concurrent operations.
//
// Structure:
// - core/           - Shared health types
// - infrastructure/ - Concrete infrastructure actors (DLQ, Health)
//
// Note: Order ingestion and queries are plain services and tokio tasks.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

mod core;
mod infrastructure;

pub use core::{ComponentHealth, HealthStatus};
pub use infrastructure::{AddToDlq, DlqActor, GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
