//! Execution protocol.
//!
//! Per node, at most once:
//!
//! 1. aggregate the pending payloads
//! 2. send the request (bounded by `GraphLimits::max_parallel`)
//! 3. mark the node completed
//! 4. evaluate every assertion in order
//! 5. success = every assertion passed
//! 6. attach the report
//! 7. on success, feed each successor and spawn the ones that became ready
//!
//! Step 7 appends the body, records the delivery and claims the successor
//! while holding the successor's pending lock. Only successful predecessors
//! deliver, so a successor is claimed by the predecessor whose delivery
//! completes the set, and at that point every body is already in its pending
//! list.
//!
//! ```text
//! P1 done ──▶ lock N: push body, delivered = {P1}        (1 of 2, wait)
//! P2 done ──▶ lock N: push body, delivered = {P1, P2}    (2 of 2, claim)
//!                                  └──▶ spawn N, join
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{Node, RequestGraph};
use crate::checker::CircularChecker;
use crate::errors::GraphError;
use crate::protocol::{NodeId, Report, ReportTree, Response, RunStatus, RunSummary};

type BranchFuture = Pin<Box<dyn Future<Output = Result<(), GraphError>> + Send>>;

impl RequestGraph {
    /// Executes `id` and every branch it triggers, resolving when all of them
    /// have finished.
    ///
    /// Readiness is not required: the caller decides when a node runs. A node
    /// that has already started is not run again; the call waits for that
    /// earlier execution and its branches to settle instead.
    pub async fn execute(self: &Arc<Self>, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_or_err(id)?;

        {
            let mut pending = node.pending.lock().await;
            if pending.claimed {
                debug!(node_id = %id, "Node already started, waiting for it to settle");
                drop(pending);
                let mut settled = node.settled.subscribe();
                settled
                    .wait_for(|done| *done)
                    .await
                    .map_err(|e| GraphError::Internal(e.to_string()))?;
                return Ok(());
            }
            pending.claimed = true;
        }

        if !self.predecessors_succeeded(node) {
            warn!(node_id = %id, "Executing node before all predecessors succeeded");
        }

        Arc::clone(self).run_claimed(id).await
    }

    /// Executes every root concurrently after checking the graph for cycles.
    #[tracing::instrument(name = "graph_run", skip_all, fields(nodes = self.len()))]
    pub async fn run(self: &Arc<Self>) -> Result<RunSummary, GraphError> {
        if let Some(id) = CircularChecker::new(self).find_cycle() {
            return Err(GraphError::CircularDependency(id));
        }

        let start_time = Utc::now();
        let roots = self.roots();
        info!(nodes = self.len(), roots = roots.len(), "Starting graph run");

        let mut branches = JoinSet::new();
        for root in roots {
            let graph = Arc::clone(self);
            branches.spawn(async move { graph.execute(root).await }.in_current_span());
        }

        let mut first_error = None;
        while let Some(joined) = branches.join_next().await {
            let outcome = joined.map_err(|e| GraphError::Internal(e.to_string()));
            if let Err(e) = outcome.and_then(|r| r) {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let reports: Vec<Report> = self.reports().into_iter().cloned().collect();
        let not_executed: Vec<NodeId> = self
            .node_ids()
            .filter(|id| self.report(*id).is_none())
            .collect();

        let status = if not_executed.is_empty() && reports.iter().all(|r| r.success) {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };

        info!(
            status = ?status,
            executed = reports.len(),
            not_executed = not_executed.len(),
            "Graph run finished"
        );

        Ok(RunSummary {
            status,
            start_time,
            end_time: Utc::now(),
            reports,
            not_executed,
        })
    }

    /// Report of `root` and, recursively, of every completed successor.
    /// `None` when `root` has no report yet.
    pub fn report_tree(&self, root: NodeId) -> Option<ReportTree> {
        let mut path = Vec::new();
        self.build_tree(root, &mut path)
    }

    fn build_tree(&self, id: NodeId, path: &mut Vec<NodeId>) -> Option<ReportTree> {
        if path.contains(&id) {
            return None;
        }
        let node = self.nodes.get(&id)?;
        let report = node.report()?.clone();

        path.push(id);
        let children = node
            .successors
            .iter()
            .filter_map(|next| self.build_tree(*next, path))
            .collect();
        path.pop();

        Some(ReportTree { report, children })
    }

    // ------------------------------------------------------------------------
    // Protocol
    // ------------------------------------------------------------------------

    /// Runs a node that the caller has already claimed.
    fn run_claimed(self: Arc<Self>, id: NodeId) -> BranchFuture {
        let span = info_span!("graph_node", node_id = %id);
        Box::pin(
            async move {
                let node = self.node_or_err(id)?;
                let _settle = SettleOnDrop(&node.settled);

                let response = self.send_and_report(node).await?;
                if let Some(response) = response {
                    self.propagate(node, response.body).await?;
                }
                Ok(())
            }
            .instrument(span),
        )
    }

    /// Steps 1 to 6. Returns the response when the node succeeded.
    async fn send_and_report(&self, node: &Node) -> Result<Option<Response>, GraphError> {
        let payload = {
            let pending = node.pending.lock().await;
            (node.aggregator)(&pending.payloads)
        };
        let request = node.spec.to_request(payload);

        let timestamp = Utc::now();
        let started = Instant::now();
        info!(
            node_id = %node.id,
            method = %request.method,
            path = %request.path,
            "Executing node"
        );

        let outcome = {
            let _permit = match &self.permits {
                Some(semaphore) => Some(
                    semaphore
                        .acquire()
                        .await
                        .map_err(|e| GraphError::Internal(e.to_string()))?,
                ),
                None => None,
            };
            self.backend.send(&request).await
        };

        node.completed.store(true, Ordering::Release);
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut report = Report {
            success: false,
            timestamp,
            duration_ms,
            node_id: node.id,
            predecessor_ids: node.predecessors.clone(),
            successor_ids: node.successors.clone(),
            request,
            response: None,
            error: None,
            error_code: None,
            assertion_reports: Vec::new(),
        };

        let succeeded = match outcome {
            Ok(response) => {
                let mut assertions = node.assertions.lock().await;
                report.assertion_reports = assertions
                    .iter_mut()
                    .map(|a| a.compare_value_from_result(&response))
                    .collect();
                report.success = report.assertion_reports.iter().all(|r| r.success);
                report.response = Some(response.clone());
                report.success.then_some(response)
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, code = %e.code(), "Backend call failed");
                report.error = Some(e.to_string());
                report.error_code = Some(e.code().formatted());
                None
            }
        };

        info!(
            node_id = %node.id,
            success = report.success,
            duration_ms,
            assertions = report.assertion_reports.len(),
            "Node finished"
        );

        node.report
            .set(report)
            .map_err(|_| GraphError::Internal(format!("node {} reported twice", node.id)))?;

        Ok(succeeded)
    }

    /// Step 7: feed every successor, then run the ones this node made ready.
    async fn propagate(self: &Arc<Self>, node: &Node, body: Value) -> Result<(), GraphError> {
        let mut branches = JoinSet::new();

        for &next_id in &node.successors {
            let next = self.node_or_err(next_id)?;
            let mut pending = next.pending.lock().await;
            pending.payloads.push(body.clone());
            pending.delivered.insert(node.id);

            if !pending.claimed && pending.delivered.len() == next.predecessors.len() {
                pending.claimed = true;
                debug!(node_id = %node.id, successor = %next_id, "Triggering successor");
                branches.spawn(Arc::clone(self).run_claimed(next_id));
            }
        }

        let mut first_error = None;
        while let Some(joined) = branches.join_next().await {
            let outcome = joined.map_err(|e| GraphError::BranchPanicked {
                node: node.id,
                message: e.to_string(),
            });
            if let Err(e) = outcome.and_then(|r| r) {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Marks a node settled when its run ends, including by panic or error.
struct SettleOnDrop<'a>(&'a watch::Sender<bool>);

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}
