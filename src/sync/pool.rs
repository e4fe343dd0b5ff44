//! Bounded multi-tenant runner.
//!
//! Each tenant's pass runs in its own task; at most `workers` passes are in
//! flight at once. Tenants share nothing but the store's connection pool, so a
//! failing or panicking pass never affects its neighbours.

use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{error, info};

use crate::error::SyncError;

use super::{ProgressSink, SyncOrchestrator, SyncOutcome};

/// Outcome of one tenant's pass within a batch.
#[derive(Debug)]
pub struct TenantRun {
    pub tenant_id: String,
    pub result: Result<SyncOutcome, SyncError>,
}

/// Synchronizes every tenant in `tenants`, running at most `workers` passes
/// concurrently. Results come back in the input order.
///
/// `sink_for` is asked once per tenant for an optional progress sink.
pub async fn sync_tenants<F>(
    orchestrator: &SyncOrchestrator,
    tenants: &[String],
    workers: usize,
    sink_for: F,
) -> Vec<TenantRun>
where
    F: Fn(&str) -> Option<Arc<dyn ProgressSink>>,
{
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();

    for (index, tenant_id) in tenants.iter().enumerate() {
        let orchestrator = orchestrator.clone();
        let permits = Arc::clone(&permits);
        let tenant_id = tenant_id.clone();
        let sink = sink_for(&tenant_id);

        set.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let result = Err(SyncError::Worker {
                        tenant_id: tenant_id.clone(),
                        reason: e.to_string(),
                    });
                    return (index, TenantRun { tenant_id, result });
                }
            };

            // A nested task turns a panic into a JoinError for this tenant only.
            let pass = {
                let tenant_id = tenant_id.clone();
                tokio::spawn(async move {
                    orchestrator
                        .sync_tenant(&tenant_id, sink.as_deref())
                        .await
                })
            };

            let result = match pass.await {
                Ok(result) => result,
                Err(e) => {
                    error!(tenant_id, error = %e, "sync worker panicked");
                    Err(SyncError::Worker {
                        tenant_id: tenant_id.clone(),
                        reason: e.to_string(),
                    })
                }
            };
            (index, TenantRun { tenant_id, result })
        });
    }

    let mut runs: Vec<Option<TenantRun>> = tenants.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, run)) => runs[index] = Some(run),
            Err(e) => error!(error = %e, "sync worker aborted"),
        }
    }

    let runs: Vec<TenantRun> = runs
        .into_iter()
        .zip(tenants)
        .map(|(run, tenant_id)| {
            run.unwrap_or_else(|| TenantRun {
                tenant_id: tenant_id.clone(),
                result: Err(SyncError::Worker {
                    tenant_id: tenant_id.clone(),
                    reason: "worker aborted".to_string(),
                }),
            })
        })
        .collect();

    let failed = runs.iter().filter(|r| r.result.is_err()).count();
    info!(tenants = runs.len(), failed, workers, "multi-tenant sync finished");
    runs
}
