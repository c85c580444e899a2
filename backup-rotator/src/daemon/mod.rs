//! Scheduled (cron) mode.

pub mod scheduler;
pub mod shutdown;

pub use scheduler::RotationScheduler;
pub use shutdown::ShutdownCoordinator;
