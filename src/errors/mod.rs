//! # Structured Error Codes
//!
//! Every failure the graph engine can surface carries a stable code, so a test
//! harness or CI job can branch on the code instead of parsing messages.
//!
//! ## Categories
//!
//! | Range  | Category        | Meaning                                   |
//! |--------|-----------------|-------------------------------------------|
//! | E1xxx  | Graph           | Invalid graph construction or wiring      |
//! | E2xxx  | Transport       | The backend could not complete a request  |
//! | E3xxx  | Assertion       | A response check could not be evaluated   |
//! | E4xxx  | Configuration   | Formation input, limits, environment      |
//! | E5xxx  | Internal        | Bug in the engine itself                  |
//!
//! ## Example
//!
//! ```text
//! [E1002] self-loop on node 5f0c...: a node cannot be its own successor
//! ```

use std::fmt;

use thiserror::Error;

use crate::formation::FormationError;
use crate::protocol::NodeId;

// ============================================================================
// ERROR CODE
// ============================================================================

/// Structured error code: first digit is the category, the rest the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Graph construction
    // ========================================================================

    /// Node id does not belong to this graph.
    pub const UNKNOWN_NODE: Self = Self(1001);

    /// Edge from a node to itself.
    pub const INVALID_EDGE: Self = Self(1002);

    /// A cycle is reachable through successor edges.
    pub const CIRCULAR_DEPENDENCY: Self = Self(1003);

    /// Method name is not one of the supported HTTP methods.
    pub const INVALID_HTTP_METHOD: Self = Self(1004);

    // ========================================================================
    // E2xxx: Transport
    // ========================================================================

    /// Connection could not be established (DNS, refused, TLS).
    pub const TRANSPORT_CONNECTION: Self = Self(2001);

    /// Request could not be built (bad URL, bad header value).
    pub const TRANSPORT_INVALID_REQUEST: Self = Self(2002);

    /// Response body could not be read.
    pub const TRANSPORT_BODY: Self = Self(2003);

    /// Any other transport failure.
    pub const TRANSPORT_OTHER: Self = Self(2099);

    // ========================================================================
    // E3xxx: Assertions
    // ========================================================================

    /// Comparator applied to operands of incompatible types.
    pub const ASSERTION_TYPE_MISMATCH: Self = Self(3001);

    /// Comparator name not recognised.
    pub const ASSERTION_UNKNOWN_COMPARATOR: Self = Self(3002);

    /// Regex reference value does not compile.
    pub const ASSERTION_INVALID_PATTERN: Self = Self(3003);

    /// Assertion compared before being fully configured.
    pub const ASSERTION_NOT_CONFIGURED: Self = Self(3004);

    // ========================================================================
    // E4xxx: Configuration
    // ========================================================================

    /// Query string or header text could not be decoded.
    pub const FORMATION_INVALID: Self = Self(4001);

    /// Graph exceeds the configured limits.
    pub const LIMIT_EXCEEDED: Self = Self(4002);

    // ========================================================================
    // E5xxx: Internal
    // ========================================================================

    /// Unexpected engine state.
    pub const INTERNAL_ERROR: Self = Self(5001);

    /// A spawned branch task panicked or was aborted.
    pub const BRANCH_PANICKED: Self = Self(5002);

    // ========================================================================
    // METHODS
    // ========================================================================

    /// Numeric code, e.g. `1001`.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Code with the `E` prefix, e.g. `"E1001"`.
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Graph,
            2 => ErrorCategory::Transport,
            3 => ErrorCategory::Assertion,
            4 => ErrorCategory::Configuration,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Short human description of the code.
    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "Unknown node",
            1002 => "Invalid edge",
            1003 => "Circular dependency",
            1004 => "Invalid HTTP method",
            2001 => "Connection error",
            2002 => "Invalid request",
            2003 => "Unreadable response body",
            2099 => "Transport error",
            3001 => "Comparator type mismatch",
            3002 => "Unknown comparator",
            3003 => "Invalid regex pattern",
            3004 => "Assertion not configured",
            4001 => "Invalid formation",
            4002 => "Limit exceeded",
            5001 => "Internal error",
            5002 => "Branch task panicked",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// ERROR CATEGORY
// ============================================================================

/// Category derived from the first digit of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Graph,
    Transport,
    Assertion,
    Configuration,
    Internal,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph => write!(f, "Graph"),
            Self::Transport => write!(f, "Transport"),
            Self::Assertion => write!(f, "Assertion"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Internal => write!(f, "Internal"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

// ============================================================================
// GRAPH ERROR
// ============================================================================

/// Errors returned by graph construction and execution.
///
/// Assertion failures are never errors: they end up as `success = false` in the
/// node's report. Transport failures are also folded into the report.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    #[error("self-loop on node {0}: a node cannot be its own successor")]
    InvalidEdge(NodeId),

    #[error("circular dependency reachable from node {0}")]
    CircularDependency(NodeId),

    #[error("'{0}' is not a supported HTTP method")]
    InvalidMethod(String),

    #[error(transparent)]
    Formation(#[from] FormationError),

    #[error("graph limit '{limit}' exceeded: {actual} > {max}")]
    LimitExceeded {
        limit: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("branch spawned by node {node} panicked: {message}")]
    BranchPanicked { node: NodeId, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownNode(_) => ErrorCode::UNKNOWN_NODE,
            Self::InvalidEdge(_) => ErrorCode::INVALID_EDGE,
            Self::CircularDependency(_) => ErrorCode::CIRCULAR_DEPENDENCY,
            Self::InvalidMethod(_) => ErrorCode::INVALID_HTTP_METHOD,
            Self::Formation(_) => ErrorCode::FORMATION_INVALID,
            Self::LimitExceeded { .. } => ErrorCode::LIMIT_EXCEEDED,
            Self::BranchPanicked { .. } => ErrorCode::BRANCH_PANICKED,
            Self::Internal(_) => ErrorCode::INTERNAL_ERROR,
        }
    }

    /// Message prefixed with the structured code, for logs and harness output.
    pub fn user_message(&self) -> String {
        format!("[{}] {}", self.code(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_formatting() {
        assert_eq!(ErrorCode::UNKNOWN_NODE.formatted(), "E1001");
        assert_eq!(ErrorCode::TRANSPORT_CONNECTION.formatted(), "E2001");
        assert_eq!(ErrorCode::ASSERTION_TYPE_MISMATCH.to_string(), "E3001");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::INVALID_EDGE.category(), ErrorCategory::Graph);
        assert_eq!(ErrorCode::TRANSPORT_BODY.category(), ErrorCategory::Transport);
        assert_eq!(
            ErrorCode::ASSERTION_INVALID_PATTERN.category(),
            ErrorCategory::Assertion
        );
        assert_eq!(
            ErrorCode::LIMIT_EXCEEDED.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorCode::BRANCH_PANICKED.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_graph_error_user_message() {
        let id = NodeId::new();
        let err = GraphError::InvalidEdge(id);

        let msg = err.user_message();
        assert!(msg.starts_with("[E1002]"));
        assert!(msg.contains(&id.to_string()));
    }

    #[test]
    fn test_limit_error_message() {
        let err = GraphError::LimitExceeded {
            limit: "max_nodes",
            max: 2,
            actual: 3,
        };
        assert_eq!(err.code(), ErrorCode::LIMIT_EXCEEDED);
        assert!(err.to_string().contains("max_nodes"));
    }
}
