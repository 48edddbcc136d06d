//! Simulation harness
//!
//! Scripted scenarios that drive the cluster the way a diagnostic client
//! would and report what every node saw. Concurrency cases study isolation
//! levels and the lock manager; recovery cases cut nodes off, write, and
//! then resolve the resulting recovery log backlog.

mod concurrency;
mod recovery;
mod report;

pub use concurrency::{baseline, run_concurrency_case, LockPolicy, CONCURRENCY_KEY};
pub use recovery::{run_recovery_case, EVEN_KEY, ODD_KEY};
pub use report::{status_of, LogLine, NodeState, SimulationReport};
