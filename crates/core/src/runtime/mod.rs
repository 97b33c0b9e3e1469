//! Process scoped machinery owned by the manager: the single-flight job
//! executor and the artifact lock table.

pub mod executor;
pub mod locks;

pub use executor::ConstrainedExecutor;
pub use locks::{ArtifactLock, LockTable};
