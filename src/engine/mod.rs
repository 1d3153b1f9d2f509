//! Measurement engine
//!
//! Leaves first: the [`ConnectionPool`] moves bytes, the [`LatencyProber`]
//! samples round trips, the [`ThroughputBenchmarker`] turns pool samples into
//! Mbit/s, the [`ServerSelector`] ranks candidates, the [`ResultValidator`]
//! flags implausible results and the [`SessionOrchestrator`] sequences them.

pub mod benchmark;
pub mod pool;
pub mod prober;
pub mod selector;
pub mod session;
pub mod validator;

pub use benchmark::{steady_state_mbps, ThroughputBenchmarker, ThroughputMeasurement, WindowConfig};
pub use pool::{ConnectionPool, PoolConfig, ThroughputSample, TransferBudget};
pub use prober::{LatencyProber, LatencyReport};
pub use selector::{rank, SelectionConfig, ServerSelector};
pub use session::{
    aggregate, evaluate_exit_policy, SessionObserver, SessionOrchestrator, SessionState, SilentObserver,
};
pub use validator::ResultValidator;
