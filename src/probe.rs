use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, BackendError};

/// What the status indicator shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Pending,
    Connected,
    Unreachable,
}

impl ConnectivityState {
    pub fn is_settled(self) -> bool {
        self != ConnectivityState::Pending
    }
}

/// How a settled probe call maps onto [`ConnectivityState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// Any settlement, error or not, reads as connected. Matches the
    /// first scaffold page and can report a false positive.
    AlwaysConnected,
    /// Errors read as unreachable.
    #[default]
    Strict,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Reachable { rows: usize },
    Failed(BackendError),
}

impl ProbeOutcome {
    pub fn state_under(&self, policy: SettlementPolicy) -> ConnectivityState {
        match (self, policy) {
            (ProbeOutcome::Reachable { .. }, _) => ConnectivityState::Connected,
            (ProbeOutcome::Failed(_), SettlementPolicy::AlwaysConnected) => {
                ConnectivityState::Connected
            }
            (ProbeOutcome::Failed(_), SettlementPolicy::Strict) => ConnectivityState::Unreachable,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ProbeOutcome::Reachable { rows } => format!("reachable ({} rows)", rows),
            ProbeOutcome::Failed(e) => format!("failed: {}", e),
        }
    }
}

/// Single-writer state cell. Readers hold a [`watch::Receiver`].
///
/// `closed` is only touched while holding the channel's write lock, so a
/// `close` and a `settle` never interleave.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<ConnectivityState>>,
    closed: Arc<AtomicBool>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectivityState::Pending);
        StateCell {
            tx: Arc::new(tx),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    /// Refuse all later writes. Once this returns, no `settle` can land.
    pub fn close(&self) {
        self.tx.send_if_modified(|_| {
            self.closed.store(true, Ordering::SeqCst);
            false
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Move out of `Pending`. Returns false if the cell already settled or
    /// was closed.
    pub fn settle(&self, next: ConnectivityState) -> bool {
        if next == ConnectivityState::Pending {
            return false;
        }
        self.tx.send_if_modified(|current| {
            if current.is_settled() || self.closed.load(Ordering::SeqCst) {
                return false;
            }
            *current = next;
            true
        })
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one settled probe run.
#[derive(Debug)]
pub struct Settlement {
    pub outcome: ProbeOutcome,
    pub state: ConnectivityState,
    pub latency: Duration,
}

pub struct ReachabilityProbe {
    client: Arc<dyn BackendClient>,
    resource: String,
    columns: String,
    policy: SettlementPolicy,
}

impl ReachabilityProbe {
    pub fn new(
        client: Arc<dyn BackendClient>,
        resource: impl Into<String>,
        columns: impl Into<String>,
        policy: SettlementPolicy,
    ) -> Self {
        ReachabilityProbe {
            client,
            resource: resource.into(),
            columns: columns.into(),
            policy,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    /// Issue the query once and wait for it to settle.
    pub async fn run(&self) -> Settlement {
        let started = Instant::now();
        let outcome = match self.client.select(&self.resource, &self.columns).await {
            Ok(resp) => ProbeOutcome::Reachable {
                rows: resp.rows.len(),
            },
            Err(e) => ProbeOutcome::Failed(e),
        };
        let state = outcome.state_under(self.policy);
        Settlement {
            outcome,
            state,
            latency: started.elapsed(),
        }
    }

    /// Run in the background and write the result into `cell`, unless
    /// `liveness` is cancelled first.
    pub fn spawn(
        self,
        cell: StateCell,
        liveness: CancellationToken,
    ) -> JoinHandle<Option<Settlement>> {
        tokio::spawn(async move {
            let settlement = tokio::select! {
                _ = liveness.cancelled() => {
                    tracing::debug!("probe of {} abandoned: view torn down", self.resource);
                    return None;
                }
                s = self.run() => s,
            };

            // Teardown may race with settlement.
            if liveness.is_cancelled() {
                tracing::debug!(
                    "probe of {} settled after teardown, dropping result",
                    self.resource
                );
                return None;
            }

            if let ProbeOutcome::Failed(e) = &settlement.outcome {
                match self.policy {
                    SettlementPolicy::AlwaysConnected => tracing::warn!(
                        "probe of {} failed ({}) but policy reports connected",
                        self.resource,
                        e
                    ),
                    SettlementPolicy::Strict => {
                        tracing::warn!("probe of {} failed: {}", self.resource, e)
                    }
                }
            }

            // The cell may close between the check above and this write.
            if !cell.settle(settlement.state) {
                if cell.is_closed() {
                    tracing::debug!("probe of {} settled after teardown", self.resource);
                    return None;
                }
                return Some(settlement);
            }
            tracing::info!(
                "probe of {} settled as {:?} in {} ms",
                self.resource,
                settlement.state,
                settlement.latency.as_millis()
            );
            Some(settlement)
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::backend::{PostgrestError, QueryResponse};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    pub enum Behavior {
        Rows(usize),
        Reject,
        Never,
        /// Resolve with no rows once the notify fires.
        Gated(Arc<Notify>),
    }

    pub struct FakeClient {
        behavior: Behavior,
        pub calls: AtomicUsize,
    }

    impl FakeClient {
        pub fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(FakeClient {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn rejection() -> BackendError {
        BackendError::Rejected {
            status: StatusCode::NOT_FOUND,
            body: PostgrestError {
                code: Some("42P01".to_string()),
                message: Some("relation \"public._test\" does not exist".to_string()),
                ..Default::default()
            },
        }
    }

    #[async_trait]
    impl BackendClient for FakeClient {
        async fn select(
            &self,
            _table: &str,
            _columns: &str,
        ) -> Result<QueryResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Rows(n) => Ok(QueryResponse {
                    rows: vec![serde_json::json!({}); *n],
                }),
                Behavior::Reject => Err(rejection()),
                Behavior::Never => std::future::pending().await,
                Behavior::Gated(gate) => {
                    gate.notified().await;
                    Ok(QueryResponse::default())
                }
            }
        }
    }
}
