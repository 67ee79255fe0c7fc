//! # request-graph
//!
//! Runs HTTP-style requests as a dependency graph. A node fires once every
//! predecessor has completed successfully, builds its payload from their
//! response bodies, checks its own response with assertions and passes the
//! body on to its successors.
//!
//! ```ignore
//! use std::sync::Arc;
//! use request_graph::{
//!     Assertion, Comparator, Finder, HttpBackend, Method, RequestGraph, RequestSpec, Severity,
//! };
//!
//! let mut graph = RequestGraph::new(Arc::new(HttpBackend::new()?));
//! let login = graph.add_node(RequestSpec::new(Method::Post, "https://api.test", "/login"))?;
//! let profile = graph.add_node(RequestSpec::new(Method::Get, "https://api.test", "/me"))?;
//! graph.connect_next(login, profile)?;
//! graph.add_assertion(
//!     login,
//!     Assertion::new(Severity::Error)
//!         .with_finder(Finder::status_code())
//!         .with_comparator(Comparator::Equal)
//!         .with_reference_value(200.into()),
//! )?;
//!
//! let summary = Arc::new(graph).run().await?;
//! println!("{}", summary.to_json_pretty()?);
//! ```

pub mod assertion;
pub mod backend;
pub mod checker;
pub mod config;
pub mod errors;
pub mod finder;
pub mod formation;
pub mod graph;
pub mod protocol;
pub mod telemetry;

pub use assertion::{Assertion, AssertionReport, Comparator, Severity};
pub use backend::http::HttpBackend;
pub use backend::{Backend, BackendError};
pub use checker::CircularChecker;
pub use config::{GraphLimits, HttpBackendConfig};
pub use errors::{ErrorCode, GraphError};
pub use finder::Finder;
pub use formation::{Formation, FormationError, HeaderFormation, QueryString};
pub use graph::{first_payload, Node, PayloadAggregator, RequestGraph};
pub use protocol::{
    Method, NodeId, Report, ReportTree, Request, RequestSpec, Response, RunStatus, RunSummary,
};
