//! Service construction from CLI configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use folio_queue::nats::NatsClient;
use folio_queue::queue::{JobQueue, JobQueueService};
use folio_queue::worker::{Processors, WorkerRegistry};
use folio_remote::{HttpCatalog, HttpStageProcessor, RemoteClient, RemoteConfig, WebhookNotifier};
use folio_server::ServiceState;
use folio_workflow::collaborator::{CheckpointRollback, Notifier, Repositories, TracingNotifier};
use folio_workflow::orchestrator::WorkflowOrchestrator;
use folio_workflow::relay::JobEventRelay;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Cli, StoreBackend};
use crate::{TRACING_TARGET_SERVER_SHUTDOWN, TRACING_TARGET_SERVER_STARTUP};

/// Running engine services and their background tasks.
pub struct Services {
    state: ServiceState,
    workers: Arc<WorkerRegistry>,
    relay_token: CancellationToken,
    relay: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Services {
    /// Returns the HTTP application state.
    pub fn state(&self) -> ServiceState {
        self.state.clone()
    }

    /// Stops the orchestrator, worker pools and event relay.
    ///
    /// Workers finish the jobs they hold; anything still running after
    /// `timeout` is aborted.
    pub async fn shutdown(self, timeout: Duration) {
        let Self {
            state,
            workers,
            relay_token,
            relay,
            sweeper,
        } = self;

        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            timeout_secs = timeout.as_secs(),
            "Stopping engine services"
        );

        let orchestrator = state.orchestrator().clone();
        orchestrator.shutdown();
        workers.shutdown();
        relay_token.cancel();

        let relay_abort = relay.abort_handle();
        let sweeper_abort = sweeper.abort_handle();
        let drain = async {
            orchestrator.wait().await;
            if let Err(err) = workers.wait_all().await {
                tracing::error!(
                    target: TRACING_TARGET_SERVER_SHUTDOWN,
                    error = %err,
                    "Worker pool stopped with error"
                );
            }
            let _ = relay.await;
            let _ = sweeper.await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                "Engine services did not stop in time, aborting"
            );
            workers.abort_all();
            relay_abort.abort();
            sweeper_abort.abort();
        } else {
            tracing::info!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                "Engine services stopped"
            );
        }
    }
}

/// Connects the job store, builds the collaborators and starts every
/// background task.
///
/// # Errors
///
/// Returns an error if the job store cannot be reached or a collaborator
/// cannot be created.
pub async fn create_services(cli: &Cli) -> anyhow::Result<Services> {
    let queue = create_queue(cli).await?;

    let client = create_remote_client(&cli.remote)?;
    let (repositories, processors) = create_collaborators(&cli.remote, client.as_ref())?;
    let notifier = create_notifier(&cli.remote, client.as_ref());

    let job_queue: Arc<dyn JobQueueService> = Arc::new(queue.clone());
    let mut orchestrator = WorkflowOrchestrator::new(
        job_queue,
        repositories,
        notifier.clone(),
        cli.workflow.clone(),
    )
    .with_clock(queue.clock());
    if let Some(checkpoints) = cli.engine.checkpoints() {
        let rollback = CheckpointRollback::new(checkpoints.iter().copied());
        orchestrator = orchestrator.with_rollback(Arc::new(rollback));
    }

    let workers = Arc::new(WorkerRegistry::spawn(&queue, &processors));
    let relay_token = CancellationToken::new();
    let relay = JobEventRelay::new(&queue, notifier, relay_token.clone()).spawn();
    let sweeper = orchestrator.spawn_sweeper();

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        store = ?cli.engine.store,
        processors = processors.len(),
        "Engine services started"
    );

    Ok(Services {
        state: ServiceState::new(orchestrator, queue, workers.clone()),
        workers,
        relay_token,
        relay,
        sweeper,
    })
}

async fn create_queue(cli: &Cli) -> anyhow::Result<JobQueue> {
    match cli.engine.store {
        StoreBackend::Memory => {
            tracing::warn!(
                target: TRACING_TARGET_SERVER_STARTUP,
                "Using the in-memory job store, jobs are lost on restart"
            );
            Ok(JobQueue::in_memory(cli.queue.clone()))
        }
        StoreBackend::Nats => {
            let client = NatsClient::connect(cli.nats.clone())
                .await
                .context("failed to connect to NATS")?;
            let store = client
                .queue_store()
                .await
                .context("failed to open the job store")?;
            let metadata = client
                .metadata_store(cli.queue.metadata_ttl())
                .await
                .context("failed to open the job metadata store")?;
            Ok(JobQueue::new(
                Arc::new(store),
                Arc::new(metadata),
                cli.queue.clone(),
            ))
        }
    }
}

fn create_remote_client(config: &RemoteConfig) -> anyhow::Result<Option<RemoteClient>> {
    let has_endpoint = config.processor_url.is_some()
        || config.records_url.is_some()
        || config.webhook_url.is_some();
    if !has_endpoint {
        return Ok(None);
    }

    let client = RemoteClient::new(config.clone()).context("failed to create HTTP client")?;
    Ok(Some(client))
}

/// Picks remote repositories and processors where configured, falling back
/// to the local catalog for the rest.
fn create_collaborators(
    config: &RemoteConfig,
    client: Option<&RemoteClient>,
) -> anyhow::Result<(Repositories, Processors)> {
    let remote_processors = config
        .processor_url
        .as_ref()
        .zip(client)
        .map(|(url, client)| HttpStageProcessor::new(client.clone(), url.clone()).into_processors());

    let (repositories, local_processors) = match config.records_url.as_ref().zip(client) {
        Some((url, client)) => {
            let catalog = HttpCatalog::new(client.clone(), url.clone());
            (Repositories::from_catalog(Arc::new(catalog)), None)
        }
        None => local_catalog()?,
    };

    let processors = remote_processors.or(local_processors).unwrap_or_else(|| {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_STARTUP,
            "No stage processors configured, submitted jobs will stay queued"
        );
        Processors::new()
    });

    Ok((repositories, processors))
}

#[cfg(feature = "mock")]
fn local_catalog() -> anyhow::Result<(Repositories, Option<Processors>)> {
    use folio_workflow::mock::{MemoryCatalog, catalog_processors};

    tracing::warn!(
        target: TRACING_TARGET_SERVER_STARTUP,
        "Using the in-memory catalog, projects must be seeded locally"
    );
    let catalog = Arc::new(MemoryCatalog::new());
    Ok((
        Repositories::from_catalog(catalog.clone()),
        Some(catalog_processors(catalog)),
    ))
}

#[cfg(not(feature = "mock"))]
fn local_catalog() -> anyhow::Result<(Repositories, Option<Processors>)> {
    anyhow::bail!("no records service configured: set --records-url or build with the `mock` feature")
}

fn create_notifier(config: &RemoteConfig, client: Option<&RemoteClient>) -> Arc<dyn Notifier> {
    match config.webhook_url.as_ref().zip(client) {
        Some((url, client)) => Arc::new(WebhookNotifier::new(
            client.clone(),
            url.clone(),
            config.webhook_secret.clone(),
        )),
        None => Arc::new(TracingNotifier),
    }
}
