use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendClient;
use crate::config::{AppConfig, PageConfig};
use crate::probe::{
    ConnectivityState, ReachabilityProbe, Settlement, SettlementPolicy, StateCell,
};

pub const CONNECTING: &str = "⏳ Connecting...";
pub const CONNECTED: &str = "✅ Connected";
pub const UNREACHABLE: &str = "❌ Unreachable";

pub fn render_indicator(state: ConnectivityState) -> &'static str {
    match state {
        ConnectivityState::Pending => CONNECTING,
        ConnectivityState::Connected => CONNECTED,
        ConnectivityState::Unreachable => UNREACHABLE,
    }
}

pub fn status_line(label: &str, state: ConnectivityState) -> String {
    format!("{}: {}", label, render_indicator(state))
}

/// A mounted status page. Owns the connectivity cell and the probe's
/// liveness token; the probe cannot write once the view is torn down.
pub struct StatusView {
    page: PageConfig,
    resource: String,
    cell: StateCell,
    liveness: CancellationToken,
    probe_task: Option<JoinHandle<Option<Settlement>>>,
}

impl StatusView {
    /// Mount the view and start its probe. Must be called inside a tokio
    /// runtime.
    pub fn mount(client: Arc<dyn BackendClient>, cfg: &AppConfig) -> Self {
        Self::mount_with_policy(client, cfg, cfg.probe.policy)
    }

    pub fn mount_with_policy(
        client: Arc<dyn BackendClient>,
        cfg: &AppConfig,
        policy: SettlementPolicy,
    ) -> Self {
        let cell = StateCell::new();
        let liveness = CancellationToken::new();
        let probe = ReachabilityProbe::new(
            client,
            cfg.backend.probe_table.clone(),
            cfg.backend.probe_columns.clone(),
            policy,
        );
        tracing::info!(
            "mounting status view, probing {} with {:?} policy",
            probe.resource(),
            probe.policy()
        );
        let probe_task = probe.spawn(cell.clone(), liveness.child_token());

        StatusView {
            page: cfg.page.clone(),
            resource: cfg.backend.probe_table.clone(),
            cell,
            liveness,
            probe_task: Some(probe_task),
        }
    }

    pub fn page(&self) -> &PageConfig {
        &self.page
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn state(&self) -> ConnectivityState {
        self.cell.get()
    }

    pub fn status_line(&self) -> String {
        status_line(&self.page.service_label, self.state())
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.cell.subscribe()
    }

    /// Wait up to `window` for the probe to settle and return the state seen.
    pub async fn wait_settled(&self, window: Duration) -> ConnectivityState {
        let mut rx = self.subscribe();
        // Copy out of the watch guard before `rx` goes out of scope.
        let seen = tokio::time::timeout(window, rx.wait_for(|s| s.is_settled()))
            .await
            .ok()
            .and_then(|r| r.ok().map(|state| *state));
        seen.unwrap_or_else(|| self.state())
    }

    /// Take the probe task so the caller can collect its settlement.
    pub fn take_probe_task(&mut self) -> Option<JoinHandle<Option<Settlement>>> {
        self.probe_task.take()
    }

    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.liveness.is_cancelled() {
            tracing::debug!("tearing down status view");
            self.cell.close();
            self.liveness.cancel();
        }
        self.probe_task.take();
    }
}

impl Drop for StatusView {
    fn drop(&mut self) {
        self.release();
    }
}
