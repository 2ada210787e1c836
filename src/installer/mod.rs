pub mod executor;
pub mod manager;

pub use executor::{ExecutionOutcome, Executor, InstallationExecutor};
pub use manager::{EnableReport, InstallAttempt, SerenaManager, SerenaStatus};
