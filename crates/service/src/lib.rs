//! Service scaffolding shared by the long-running services, plus the two
//! services themselves.
//!
//! Both the nodelocker and the index resolver run as a pair of HTTP
//! listeners: the service listener carries the public surface, the operator
//! listener carries liveness, readiness, metrics and the operator JSON-RPC.

pub mod error;
pub mod index;
pub mod locker;
pub mod logging;
pub mod metrics;
pub mod readiness;
pub mod resolver;
pub mod rpc;
pub mod runner;

pub use error::{ServiceError, ServiceResult};
pub use index::IndexService;
pub use locker::LockerService;
pub use logging::{init_tracing, LogRegistry};
pub use readiness::ReadinessGate;
pub use resolver::{CachedResolver, Resolver, StoreResolver};
pub use runner::{run_dual_listener, DualListenerConfig};
