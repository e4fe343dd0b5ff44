use tabled::Table;

use crate::{config::Settings, error, success, types::NodeCountRow, warning};

pub async fn delete_tenant(settings: &Settings, tenant_id: &str) {
    let orchestrator = match super::orchestrator(settings).await {
        Ok(o) => o,
        Err(e) => error!("Cannot connect to graph. Err: {}", e),
    };

    match orchestrator.delete_tenant(tenant_id).await {
        Ok(deleted) => success!("Deleted {} node(s) of tenant {}", deleted, tenant_id),
        Err(e) => error!("Cannot delete tenant. Err: {}", e),
    }
}

pub async fn stats(settings: &Settings, tenant_id: &str) {
    let orchestrator = match super::orchestrator(settings).await {
        Ok(o) => o,
        Err(e) => error!("Cannot connect to graph. Err: {}", e),
    };

    let counts = match orchestrator.count_nodes(tenant_id).await {
        Ok(c) => c,
        Err(e) => error!("Cannot count nodes. Err: {}", e),
    };

    if counts.iter().all(|(_, total)| *total == 0) {
        warning!("Tenant {} has no nodes.", tenant_id);
        return;
    }

    let rows: Vec<NodeCountRow> = counts
        .into_iter()
        .map(|(label, total)| NodeCountRow {
            label: label.to_string(),
            total,
        })
        .collect();
    println!("{}", Table::new(rows));
}
