//! Backup rotation engine for virtualized guests.
//!
//! Decides which guests get a fresh clone, names each clone after its source
//! and creation minute, and retires clones once they pass their retention
//! window. The virtualization control plane is reached only through the
//! [`ProviderGateway`] trait.

pub mod error;
pub mod events;
pub mod inventory;
pub mod naming;
pub mod orchestrator;
pub mod planner;
pub mod provider;
pub mod retention;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use error::{ConfigError, OperationError, PlanError, RunError};
pub use events::{ChannelSink, EventSink, FanoutSink, RunEvent, RunPhase, TracingSink};
pub use inventory::{BackupTarget, Guest, GuestHandle, Inventory, TargetMap};
pub use naming::BackupLineage;
pub use orchestrator::{RunMode, RunOrchestrator, RunReport, RunSettings, RunSummary};
pub use planner::RunPlan;
pub use provider::{Placement, ProviderError, ProviderGateway, TaskHandle, TaskOutcome};
pub use retention::RetentionPolicy;
