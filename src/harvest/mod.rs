pub mod growth;
pub mod orchestrator;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod orchestrator_test;

pub use growth::{GrowthOutcome, GrowthSettings, ResultGrowthController, StopReason};
pub use orchestrator::{Collaborators, RunSummary, SearchOrchestrator, SessionReport};
pub use session::{SearchSession, SessionState};
