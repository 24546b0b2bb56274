//! Launches trial jobs for an experiment's parameter space.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use ks_client::{ClientConfig, ClusterSource, KubeClient, ResourceClient};
use ks_optimizer::{select_points, Launcher, StrategyKind};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Every point of the parameter grid.
    Grid,
    /// Uniformly sampled points.
    Random,
}

impl From<Strategy> for StrategyKind {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Grid => StrategyKind::Grid,
            Strategy::Random => StrategyKind::Random,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "ks-optimizer", version, about = "Launch experiment trial jobs")]
struct Args {
    /// Experiment namespace
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Experiment name
    #[arg(long)]
    experiment_name: String,

    /// How to pick parameter points
    #[arg(long, value_enum, default_value_t = Strategy::Grid)]
    strategy: Strategy,

    /// Number of jobs to launch. Required for random search; caps grid search.
    #[arg(long)]
    trials: Option<usize>,

    /// Kubeconfig context to use instead of the inferred one
    #[arg(long)]
    context: Option<String>,

    /// Print the materialized jobs as YAML without creating them
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose log output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    debug!(?args, "arguments");

    let mut config = ClientConfig::new(&args.namespace);
    if let Some(context) = &args.context {
        config = config.with_source(ClusterSource::Kubeconfig {
            context: Some(context.clone()),
        });
    }
    let client = KubeClient::connect(&config).await?;
    let experiment = client
        .get_experiment(&args.experiment_name)
        .await
        .with_context(|| format!("loading experiment {}", args.experiment_name))?;

    let points = select_points(experiment.parameters(), args.strategy.into(), args.trials)?;
    info!(
        experiment = experiment.name(),
        points = points.len(),
        "selected parameter points"
    );

    let launcher = Launcher::new(client);
    if args.dry_run {
        for point in &points {
            let job = launcher.materializer().materialize(&experiment, point)?;
            println!("---\n{}", serde_yaml::to_string(&job)?);
        }
        return Ok(());
    }

    let jobs = launcher.launch_all(&experiment, &points).await?;
    info!(experiment = experiment.name(), jobs = jobs.len(), "launched jobs");
    Ok(())
}
