pub mod dca;
pub mod limit_order;
pub mod recurring_payment;
pub mod reporter;
pub mod router;
pub mod saga;
pub mod savings;
pub mod scheduler;
pub mod strategy;

pub use reporter::ResultReporter;
pub use router::AgentRouter;
pub use scheduler::{RunSummary, Scheduler, SchedulerState};
pub use strategy::{ExecutionContext, Strategy};
