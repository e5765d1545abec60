use serde::{Deserialize, Serialize};

use crate::probe::{ConnectivityState, ProbeOutcome, Settlement, SettlementPolicy};
use crate::utils::unix_millis;

/// Summary of one probe run, printed by headless mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub service: String,
    pub resource: String,
    pub state: ConnectivityState,
    pub status_line: String,
    /// None while the probe has not settled.
    pub outcome: Option<String>,
    pub reachable: Option<bool>,
    pub latency_ms: Option<u128>,
    pub reported_at_unix_ms: u128,
}

impl ProbeReport {
    pub fn new(
        service: &str,
        resource: &str,
        state: ConnectivityState,
        settlement: Option<&Settlement>,
    ) -> Self {
        ProbeReport {
            service: service.to_string(),
            resource: resource.to_string(),
            state,
            status_line: crate::view::status_line(service, state),
            outcome: settlement.map(|s| s.outcome.describe()),
            reachable: settlement.map(|s| matches!(s.outcome, ProbeOutcome::Reachable { .. })),
            latency_ms: settlement.map(|s| s.latency.as_millis()),
            reported_at_unix_ms: unix_millis(),
        }
    }

    /// True when the displayed state disagrees with what the call returned.
    pub fn is_false_positive(&self) -> bool {
        self.state == ConnectivityState::Connected && self.reachable == Some(false)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Warn when errors are configured to render as connected.
pub fn warn_on_lenient_policy(policy: SettlementPolicy) {
    if policy == SettlementPolicy::AlwaysConnected {
        tracing::warn!(
            "settlement policy is always_connected: errors from the probe will still render as connected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::fakes::rejection;
    use std::time::Duration;

    #[test]
    fn test_report_for_pending_probe() -> anyhow::Result<()> {
        let report = ProbeReport::new("Supabase", "_test", ConnectivityState::Pending, None);
        assert_eq!(report.status_line, "Supabase: ⏳ Connecting...");
        assert!(report.outcome.is_none());
        assert!(report.latency_ms.is_none());
        assert!(!report.is_false_positive());

        let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
        assert_eq!(json["state"], "pending");
        assert_eq!(json["resource"], "_test");
        assert!(json["outcome"].is_null());
        Ok(())
    }

    #[test]
    fn test_report_flags_false_positive() {
        let settlement = Settlement {
            outcome: ProbeOutcome::Failed(rejection()),
            state: ConnectivityState::Connected,
            latency: Duration::from_millis(42),
        };
        let report = ProbeReport::new(
            "Supabase",
            "_test",
            settlement.state,
            Some(&settlement),
        );
        assert_eq!(report.latency_ms, Some(42));
        assert_eq!(report.reachable, Some(false));
        assert!(report.is_false_positive());
        assert!(report.outcome.as_deref().is_some_and(|o| o.contains("42P01")));
    }

    #[test]
    fn test_report_for_reachable_probe() {
        let settlement = Settlement {
            outcome: ProbeOutcome::Reachable { rows: 0 },
            state: ConnectivityState::Connected,
            latency: Duration::from_millis(5),
        };
        let report = ProbeReport::new("Supabase", "_test", settlement.state, Some(&settlement));
        assert_eq!(report.status_line, "Supabase: ✅ Connected");
        assert_eq!(report.reachable, Some(true));
        assert!(!report.is_false_positive());
    }
}
