//! Sample trial workload. Runs inside a launched experiment job, creates
//! the job's result and publishes a batch of made-up training metrics every
//! ten steps.

use std::time::Duration;

use ks_client::{report_steps, ClientConfig, KubeClient, ResourceClient};
use ks_types::JobEnvironment;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LAST_STEP: u32 = 200;
const STEP_INTERVAL: usize = 10;
const PAUSE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let env = JobEnvironment::from_env()?;
    let config = ClientConfig::from_env().with_namespace(env.namespace.clone());
    let client = KubeClient::connect(&config).await?;

    let experiment = client.current_experiment(&env).await?;
    info!(job = %env.job_name, experiment = experiment.name(), "starting job");

    let job = client.get_job(&env.job_name).await?;
    let result = client.ensure_result(&experiment, &job).await?.into_inner();

    let result = report_steps(&client, result, LAST_STEP, STEP_INTERVAL, PAUSE).await?;

    info!(result = result.name(), "job finished");
    Ok(())
}
