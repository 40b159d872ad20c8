mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use migrate_workflow::client::{
    HttpWorkflowService, InMemoryConfig, InMemoryWorkflowService, WorkflowClient, WorkflowService,
};
use migrate_workflow::decider::{AccountMigration, Step};
use migrate_workflow::worker::{Activity, PlaceholderActivity, WorkflowHost};
use migrate_workflow::workflow::{ActivityDescriptor, TaskList};
use migrate_workflow::EngineConfig;
use serde_json::json;

/// One placeholder activity per migration step
fn step_activities(config: &EngineConfig) -> Vec<Arc<dyn Activity>> {
    Step::ALL
        .iter()
        .map(|step| {
            let descriptor = ActivityDescriptor::new(
                step.name(),
                &config.activity_version,
                &config.activity_task_list,
            );
            let activity = match step {
                Step::AnalyzeResults => PlaceholderActivity::new(descriptor).with_result(Some(
                    json!({"status": 200, "data": {"successRate": 1.0}}),
                )),
                _ => PlaceholderActivity::new(descriptor),
            };
            Arc::new(activity) as Arc<dyn Activity>
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Configure via RUST_LOG or LOG_LEVEL (default: "migrate_workflow=info,migrate_worker=info")
    telemetry::init_tracing();

    tracing::info!("migrate-worker starting...");

    let config = EngineConfig::from_env();
    config.validate().context("Invalid configuration")?;

    let service: Arc<dyn WorkflowService> = match &config.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Using workflow service");
            Arc::new(
                HttpWorkflowService::new(endpoint)
                    .context("Failed to create workflow service client")?,
            )
        }
        None => {
            tracing::warn!("SWF_ENDPOINT not set, using in-memory workflow service");
            Arc::new(InMemoryWorkflowService::new(InMemoryConfig::default()))
        }
    };
    let client = WorkflowClient::new(service, config.client_config());

    tracing::info!(
        domain = %config.domain,
        workflow_type = %config.workflow_type(),
        decision_task_list = %config.decision_task_list,
        activity_task_list = %config.activity_task_list,
        pool_size = config.decider_pool_size,
        "Starting migration worker"
    );

    let host = WorkflowHost::new(client, config.workflow_type_options())
        .await
        .context("Failed to register workflow type")?
        .with_decision_defaults(config.decision_poller_config())
        .with_activity_defaults(config.activity_poller_config());

    let activity_version = config.activity_version.clone();
    let activity_task_list = config.activity_task_list.clone();
    host.register_decider(&TaskList::new(&config.decision_task_list), move || {
        Box::new(
            AccountMigration::new()
                .with_activity_version(activity_version.clone())
                .with_task_list(activity_task_list.clone()),
        )
    });
    host.register_activities(
        &TaskList::new(&config.activity_task_list),
        step_activities(&config),
    )
    .await
    .context("Failed to register activities")?;

    host.start().context("Failed to start pollers")?;

    if config.endpoint.is_none() {
        let execution = host
            .start_execution(None, Some(json!({"userId": "local-user"})))
            .await
            .context("Failed to start local execution")?;
        tracing::info!(workflow_id = %execution.workflow_id, "Started local migration");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    if let Err(e) = host.shutdown().await {
        tracing::error!(error = %e, "Worker shutdown incomplete");
        return Err(e.into());
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}
