//! Page-operation execution core for the Keel embedded storage engine.
//!
//! A fixed pool of dedicated handler threads executes page-level mutation and
//! lookup operations against a shared tree-structured store, with load-aware
//! routing, cooperative retry on page contention, and both blocking and
//! callback-style completion. The store itself is an external collaborator:
//! this crate only sees opaque [`op::PageOperation`] units and reacts to the
//! status each one reports.

#![warn(missing_docs)]

pub mod completion;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod metrics;
pub mod op;
pub mod pool;
mod wake;

pub use completion::{AsyncHandler, AsyncResult, SettledFuture};
pub use config::{PoolOptions, RoutingPolicy};
pub use error::{KeelError, Result};
pub use handler::{PageOpWorker, PageOperationHandler};
pub use listener::{Completer, SyncListener};
pub use metrics::{CounterMetrics, NoopMetrics, SchedMetrics};
pub use op::{OpPriority, PageOpResult, PageOperation};
pub use pool::HandlerPool;
