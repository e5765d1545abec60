use std::io::Write;
use std::time::Duration;

use crate::diagnostics::ProbeReport;
use crate::view::StatusView;

#[cfg(feature = "ui")]
use crate::probe::ConnectivityState;
#[cfg(feature = "ui")]
use eframe::egui;

#[cfg(feature = "ui")]
pub struct DashboardApp {
    view: StatusView,
}

#[cfg(feature = "ui")]
pub fn run_dashboard(view: StatusView) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Handle::current();
    let title = view.page().title.clone();
    let options = eframe::NativeOptions::default();

    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            // Repaint as soon as the probe settles instead of polling.
            let ctx = cc.egui_ctx.clone();
            let mut rx = view.subscribe();
            runtime.spawn(async move {
                while rx.changed().await.is_ok() {
                    ctx.request_repaint();
                }
            });
            Box::new(DashboardApp::new(view))
        }),
    )
    .map_err(|e| anyhow::anyhow!("dashboard failed: {:?}", e))
}

#[cfg(feature = "ui")]
impl DashboardApp {
    fn new(view: StatusView) -> Self {
        Self { view }
    }

    fn indicator_color(state: ConnectivityState) -> egui::Color32 {
        match state {
            ConnectivityState::Pending => egui::Color32::YELLOW,
            ConnectivityState::Connected => egui::Color32::GREEN,
            ConnectivityState::Unreachable => egui::Color32::RED,
        }
    }
}

#[cfg(feature = "ui")]
impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let page = self.view.page().clone();
        let state = self.view.state();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.35);
                ui.label(egui::RichText::new(&page.title).size(32.0).strong());
                ui.add_space(16.0);
                ui.label(
                    egui::RichText::new(self.view.status_line())
                        .size(18.0)
                        .color(Self::indicator_color(state)),
                );
                ui.add_space(8.0);
                ui.label(
                    egui::RichText::new(&page.tagline)
                        .size(13.0)
                        .color(egui::Color32::GRAY),
                );
            });
        });
    }
}

#[cfg(not(feature = "ui"))]
pub fn run_dashboard(_view: StatusView) -> anyhow::Result<()> {
    tracing::info!("Dashboard requires 'ui' feature. Build with: cargo build --features ui, or pass --headless");
    Ok(())
}

/// Render the page as text once the probe settles or `window` elapses.
pub async fn run_headless(
    mut view: StatusView,
    window: Duration,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<ProbeReport> {
    let state = view.wait_settled(window).await;

    let settlement = match view.take_probe_task() {
        Some(task) if state.is_settled() => task.await?,
        _ => None,
    };

    let page = view.page().clone();
    let report = ProbeReport::new(
        &page.service_label,
        view.resource(),
        state,
        settlement.as_ref(),
    );
    view.teardown();

    if json {
        writeln!(out, "{}", report.to_json()?)?;
    } else {
        writeln!(out, "{}", page.title)?;
        writeln!(out, "{}", report.status_line)?;
        writeln!(out, "{}", page.tagline)?;
    }

    if report.is_false_positive() {
        tracing::warn!(
            "status shows connected but the probe failed: {}",
            report.outcome.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::probe::fakes::{Behavior, FakeClient};
    use crate::probe::{ConnectivityState, SettlementPolicy};

    async fn headless(
        behavior: Behavior,
        policy: SettlementPolicy,
        json: bool,
    ) -> anyhow::Result<(ProbeReport, String)> {
        let mut cfg = AppConfig::load_default()?;
        cfg.probe.policy = policy;
        let view = StatusView::mount(FakeClient::new(behavior), &cfg);

        let mut out = Vec::new();
        let report = run_headless(view, Duration::from_millis(200), json, &mut out).await?;
        Ok((report, String::from_utf8(out)?))
    }

    #[tokio::test]
    async fn test_headless_prints_page() -> anyhow::Result<()> {
        let (report, text) = headless(Behavior::Rows(0), SettlementPolicy::Strict, false).await?;
        assert_eq!(report.state, ConnectivityState::Connected);
        assert_eq!(
            text,
            "BORIS Killer - Setup Complete\nSupabase: ✅ Connected\nReady to build the future of construction management\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_headless_pending_after_window() -> anyhow::Result<()> {
        let (report, text) = headless(Behavior::Never, SettlementPolicy::Strict, false).await?;
        assert_eq!(report.state, ConnectivityState::Pending);
        assert!(report.latency_ms.is_none());
        assert!(text.contains("Supabase: ⏳ Connecting..."));
        Ok(())
    }

    #[tokio::test]
    async fn test_headless_json_reports_false_positive() -> anyhow::Result<()> {
        let (report, text) =
            headless(Behavior::Reject, SettlementPolicy::AlwaysConnected, true).await?;
        assert!(report.is_false_positive());

        let json: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(json["state"], "connected");
        assert_eq!(json["reachable"], false);
        assert_eq!(json["status_line"], "Supabase: ✅ Connected");
        Ok(())
    }

    #[tokio::test]
    async fn test_headless_strict_error_is_unreachable() -> anyhow::Result<()> {
        let (report, text) = headless(Behavior::Reject, SettlementPolicy::Strict, false).await?;
        assert_eq!(report.state, ConnectivityState::Unreachable);
        assert!(text.contains("Supabase: ❌ Unreachable"));
        Ok(())
    }
}
