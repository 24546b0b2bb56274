//! Prepares a cluster for experiments: creates the experiment namespace and
//! registers the experiment and result custom resource definitions.

use ks_client::{ClientConfig, KubeClient};
use ks_types::ENV_NAMESPACE;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_NAMESPACE: &str = "demo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let namespace = std::env::var(ENV_NAMESPACE)
        .ok()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    let config = ClientConfig::from_env().with_namespace(namespace);

    let client = KubeClient::connect(&config).await?;
    client.ensure_namespace().await?;
    client.register_crds().await?;
    Ok(())
}
