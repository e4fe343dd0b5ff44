use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use tabled::Table;

use crate::{
    config::Settings,
    error, info,
    sync::{ProgressSink, SyncOutcome, pool},
    success,
    types::TenantResultRow,
    warning,
};

struct BarSink(ProgressBar);

impl ProgressSink for BarSink {
    fn report(&self, percent: u8) {
        self.0.set_position(u64::from(percent));
        if percent >= 100 {
            self.0.finish();
        }
    }
}

fn bar(multi: &MultiProgress, tenant_id: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{prefix:>12.blue} [{bar:30.cyan/blue}] {pos:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let pb = multi.add(ProgressBar::new(100));
    pb.set_style(style);
    pb.set_prefix(tenant_id.to_string());
    pb
}

/// Runs a pass for each tenant (or every tenant with `all`) and prints a
/// summary table, or the reports as JSON with `json`.
pub async fn sync(settings: &Settings, tenants: Vec<String>, all: bool, workers: Option<usize>, json: bool) {
    let orchestrator = match super::orchestrator(settings).await {
        Ok(o) => o,
        Err(e) => error!("Cannot connect to graph. Err: {}", e),
    };

    let tenants = if all {
        match orchestrator.list_tenants().await {
            Ok(t) => t,
            Err(e) => error!("Cannot list tenants. Err: {}", e),
        }
    } else {
        tenants
    };

    if tenants.is_empty() {
        warning!("No tenants to synchronize.");
        return;
    }

    let workers = workers.unwrap_or(settings.workers);
    if !json {
        info!("Synchronizing {} tenant(s) with {} worker(s)", tenants.len(), workers);
    }

    let multi = MultiProgress::new();
    let runs = pool::sync_tenants(&orchestrator, &tenants, workers, |tenant_id| {
        if json {
            None
        } else {
            Some(Arc::new(BarSink(bar(&multi, tenant_id))) as Arc<dyn ProgressSink>)
        }
    })
    .await;

    if json {
        let out: Vec<Value> = runs
            .iter()
            .map(|run| match &run.result {
                Ok(SyncOutcome::Done(report)) => {
                    json!({ "tenant_id": run.tenant_id, "outcome": "done", "report": report })
                }
                Ok(SyncOutcome::Expired) => json!({ "tenant_id": run.tenant_id, "outcome": "expired" }),
                Ok(SyncOutcome::FeedUnavailable(e)) => {
                    json!({ "tenant_id": run.tenant_id, "outcome": "feed_unavailable", "error": e.to_string() })
                }
                Err(e) => json!({ "tenant_id": run.tenant_id, "outcome": "failed", "error": e.to_string() }),
            })
            .collect();
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Cannot serialize reports. Err: {}", e),
        }
        return;
    }

    let rows: Vec<TenantResultRow> = runs
        .iter()
        .map(|run| {
            let (outcome, applied, skipped) = match &run.result {
                Ok(SyncOutcome::Done(r)) => ("done".to_string(), r.events_applied, r.skipped.len()),
                Ok(SyncOutcome::Expired) => ("expired, run auth".to_string(), 0, 0),
                Ok(SyncOutcome::FeedUnavailable(e)) => (format!("feed unavailable: {e}"), 0, 0),
                Err(e) => (format!("failed: {e}"), 0, 0),
            };
            TenantResultRow {
                tenant: run.tenant_id.clone(),
                outcome,
                applied,
                skipped,
            }
        })
        .collect();
    println!("{}", Table::new(rows));

    let skipped: Vec<_> = runs
        .iter()
        .filter_map(|run| run.result.as_ref().ok().and_then(SyncOutcome::report))
        .flat_map(|report| report.skipped.iter().cloned())
        .collect();
    if !skipped.is_empty() {
        warning!("{} entities were skipped and can be backfilled:", skipped.len());
        println!("{}", Table::new(skipped));
    }

    let done = runs
        .iter()
        .filter(|r| matches!(r.result, Ok(SyncOutcome::Done(_))))
        .count();
    success!("Synchronized {} of {} tenant(s)", done, runs.len());
}
