//! # Configuration
//!
//! Two small configuration surfaces, each with safe defaults and an
//! environment-variable override:
//!
//! | Struct              | Variable                      | Default                 |
//! |---------------------|-------------------------------|-------------------------|
//! | `GraphLimits`       | `REQUEST_GRAPH_MAX_NODES`     | 500                     |
//! | `GraphLimits`       | `REQUEST_GRAPH_MAX_PARALLEL`  | 16                      |
//! | `HttpBackendConfig` | `REQUEST_GRAPH_USER_AGENT`    | `request-graph/<ver>`   |
//!
//! `max_parallel` bounds backend calls in flight, not spawned branches: a
//! branch waiting on its successors never holds a slot.

use serde::{Deserialize, Serialize};

use crate::errors::GraphError;

// ============================================================================
// GRAPH LIMITS
// ============================================================================

pub const DEFAULT_MAX_NODES: usize = 500;

pub const DEFAULT_MAX_PARALLEL: usize = 16;

/// Size and concurrency bounds for a graph.
///
/// ```rust
/// use request_graph::config::GraphLimits;
///
/// let limits = GraphLimits {
///     max_parallel: 4,
///     ..Default::default()
/// };
/// assert!(limits.check(10).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLimits {
    /// Maximum number of nodes `add_node` accepts.
    pub max_nodes: usize,

    /// Maximum concurrent backend calls. `0` means unbounded.
    pub max_parallel: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

impl GraphLimits {
    /// Defaults overridden by `REQUEST_GRAPH_MAX_NODES` and
    /// `REQUEST_GRAPH_MAX_PARALLEL`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Some(n) = env_usize("REQUEST_GRAPH_MAX_NODES") {
            limits.max_nodes = n;
        }
        if let Some(n) = env_usize("REQUEST_GRAPH_MAX_PARALLEL") {
            limits.max_parallel = n;
        }

        limits
    }

    /// Tight limits for tests.
    pub fn strict() -> Self {
        Self {
            max_nodes: 20,
            max_parallel: 2,
        }
    }

    pub fn relaxed() -> Self {
        Self {
            max_nodes: 10_000,
            max_parallel: 0,
        }
    }

    /// Permits for the backend semaphore; `None` when unbounded.
    pub(crate) fn parallelism_bound(&self) -> Option<usize> {
        (self.max_parallel > 0).then_some(self.max_parallel)
    }

    pub fn check(&self, node_count: usize) -> Result<(), GraphError> {
        if node_count > self.max_nodes {
            return Err(GraphError::LimitExceeded {
                limit: "max_nodes",
                max: self.max_nodes,
                actual: node_count,
            });
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

/// Settings for [`crate::backend::http::HttpBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    pub user_agent: String,

    /// Headers added to every request unless the node sets the same name.
    #[serde(default)]
    pub default_headers: Vec<(String, String)>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("request-graph/", env!("CARGO_PKG_VERSION")).to_string(),
            default_headers: Vec::new(),
        }
    }
}

impl HttpBackendConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(agent) = std::env::var("REQUEST_GRAPH_USER_AGENT") {
            if !agent.trim().is_empty() {
                config.user_agent = agent;
            }
        }
        config
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = GraphLimits::default();
        assert_eq!(limits.max_nodes, DEFAULT_MAX_NODES);
        assert_eq!(limits.max_parallel, DEFAULT_MAX_PARALLEL);
    }

    #[test]
    fn test_check_rejects_oversized_graph() {
        let limits = GraphLimits::strict();
        assert!(limits.check(20).is_ok());
        assert!(matches!(
            limits.check(21),
            Err(GraphError::LimitExceeded { limit: "max_nodes", max: 20, actual: 21 })
        ));
    }

    #[test]
    fn test_zero_parallel_means_unbounded() {
        assert_eq!(GraphLimits::relaxed().parallelism_bound(), None);
        assert_eq!(GraphLimits::strict().parallelism_bound(), Some(2));
    }

    #[test]
    fn test_http_config_defaults() {
        let config = HttpBackendConfig::default().with_default_header("Accept", "application/json");
        assert!(config.user_agent.starts_with("request-graph/"));
        assert_eq!(config.default_headers.len(), 1);
    }
}
