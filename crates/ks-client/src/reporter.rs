//! Periodic metric reporting for a running trial.

use std::time::Duration;

use ks_types::{ExpResult, TrialResult};
use rand::Rng;
use serde_json::json;
use tracing::info;

use crate::client::ResourceClient;

/// Record a `step-<i>` batch of `loss`/`accuracy` for every `interval`
/// steps from 0 through `last_step`, persisting each batch after `pause`.
/// Returns the result as stored after the final update.
pub async fn report_steps<C>(
    client: &C,
    mut result: TrialResult,
    last_step: u32,
    interval: usize,
    pause: Duration,
) -> ExpResult<TrialResult>
where
    C: ResourceClient + ?Sized,
{
    for step in (0..=last_step).step_by(interval.max(1)) {
        let metrics = {
            let mut rng = rand::rng();
            json!({
                "loss": rng.random::<f64>(),
                "accuracy": rng.random::<f64>(),
            })
        };
        let key = format!("step-{step}");
        info!(%key, %metrics, "publishing results");

        result.record_values([(key, metrics)]);
        tokio::time::sleep(pause).await;
        result = client.update_result(&result).await?;
    }
    Ok(result)
}
