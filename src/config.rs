//! Pool configuration surface.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{KeelError, Result};
use crate::metrics::SchedMetrics;

/// Routing policy used to pick a handler for each submitted operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum RoutingPolicy {
    /// Uniform random pick among handlers.
    Random,
    /// Strict rotation; even distribution by submission count, ignoring load.
    RoundRobin,
    /// Linear scan for the minimum load; ties keep the first minimum found.
    #[default]
    LoadBalance,
}

impl RoutingPolicy {
    /// Stable lowercase label for logs and configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            RoutingPolicy::Random => "random",
            RoutingPolicy::RoundRobin => "round_robin",
            RoutingPolicy::LoadBalance => "load_balance",
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoutingPolicy {
    type Err = KeelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(RoutingPolicy::Random),
            "roundrobin" | "round_robin" | "round-robin" => Ok(RoutingPolicy::RoundRobin),
            "loadbalance" | "load_balance" | "load-balance" => Ok(RoutingPolicy::LoadBalance),
            other => Err(KeelError::Config(format!("unknown routing policy: {other}"))),
        }
    }
}

/// Configuration options supplied when building a
/// [`crate::pool::HandlerPool`].
#[derive(Clone)]
pub struct PoolOptions {
    /// Number of handlers to build.
    pub handlers: usize,
    /// Routing policy for submissions from non-handler threads.
    pub policy: RoutingPolicy,
    /// Upper bound on a handler's sleep between wake checks.
    pub loop_interval: Duration,
    /// Whether worker threads are detached at shutdown instead of joined.
    pub daemon: bool,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn SchedMetrics>>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            handlers: 1,
            policy: RoutingPolicy::default(),
            loop_interval: Duration::from_millis(100),
            daemon: false,
            metrics: None,
        }
    }
}

impl PoolOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of handlers.
    pub fn handlers(mut self, count: usize) -> Self {
        self.handlers = count;
        self
    }

    /// Sets the routing policy.
    pub fn policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the idle-loop interval bounding each handler's sleep.
    pub fn loop_interval(mut self, interval: Duration) -> Self {
        self.loop_interval = interval;
        self
    }

    /// Detaches worker threads at shutdown instead of joining them.
    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Sets the metrics sink shared by every handler.
    pub fn metrics(mut self, metrics: Arc<dyn SchedMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.handlers == 0 {
            return Err(KeelError::Config("handler count must be at least 1".into()));
        }
        if self.loop_interval.is_zero() {
            return Err(KeelError::Config("loop interval must be non-zero".into()));
        }
        Ok(())
    }
}
