use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::assertion::AssertionReport;
use crate::errors::GraphError;
use crate::formation::{HeaderFormation, QueryString};

/// Opaque node identifier, a random UUID assigned when the node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// GET and HEAD requests never carry a body.
    pub fn allows_body(&self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl FromStr for Method {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(GraphError::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of the request a node sends.
///
/// `payload` is the node's own initial payload; it is always the first entry of
/// the node's pending payloads.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSpec {
    pub method: Method,
    pub host: String,
    pub path: String,
    pub payload: Value,
    pub query: QueryString,
    pub headers: HeaderFormation,
}

impl RequestSpec {
    pub fn new(method: Method, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            host: host.into(),
            path: path.into(),
            payload: Value::Null,
            query: QueryString::new(),
            headers: HeaderFormation::new(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_query(mut self, query: QueryString) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: HeaderFormation) -> Self {
        self.headers = headers;
        self
    }

    /// Concrete request with the aggregated payload in place of the initial one.
    pub fn to_request(&self, payload: Value) -> Request {
        Request {
            method: self.method,
            host: self.host.clone(),
            path: self.path.clone(),
            payload,
            query: self.query.clone(),
            headers: self.headers.clone(),
        }
    }
}

/// A request as handed to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub method: Method,
    pub host: String,
    pub path: String,
    pub payload: Value,
    pub query: QueryString,
    pub headers: HeaderFormation,
}

/// A backend response. `body` is JSON; non-JSON bodies arrive as a JSON string.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status_code: u16,
    pub body: Value,
    pub headers: HeaderFormation,
}

impl Response {
    pub fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            body,
            headers: HeaderFormation::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderFormation) -> Self {
        self.headers = headers;
        self
    }
}

/// Immutable outcome of one node's execution.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub node_id: NodeId,
    pub predecessor_ids: Vec<NodeId>,
    pub successor_ids: Vec<NodeId>,
    pub request: Request,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub assertion_reports: Vec<AssertionReport>,
}

/// A completed node's report plus the trees of its completed successors.
#[derive(Debug, Clone, Serialize)]
pub struct ReportTree {
    pub report: Report,
    pub children: Vec<ReportTree>,
}

impl ReportTree {
    /// Number of reports in the tree; a node reached through two paths counts twice.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(ReportTree::count).sum::<usize>()
    }

    /// True when every report in the tree succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.report.success && self.children.iter().all(ReportTree::all_succeeded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

/// Result of running every root of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reports: Vec<Report>,
    /// Nodes that never ran, because a predecessor failed or was unreachable.
    pub not_executed: Vec<NodeId>,
}

impl RunSummary {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
