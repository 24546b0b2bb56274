//! Cluster bootstrap: the experiment namespace and the custom resource
//! definitions the platform needs.

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use ks_types::{config_error, ExpResult};
use tracing::info;

use crate::client::{CreateOutcome, ResourceClient};
use crate::kube_client::{store_error, KubeClient};

const EXPERIMENT_CRD: &str = include_str!("../resources/crds/experiments.yaml");
const RESULT_CRD: &str = include_str!("../resources/crds/results.yaml");

/// The embedded experiment and result CRD manifests.
pub fn crd_manifests() -> ExpResult<Vec<CustomResourceDefinition>> {
    [EXPERIMENT_CRD, RESULT_CRD]
        .into_iter()
        .map(|text| {
            serde_yaml::from_str(text).map_err(|e| config_error!("invalid CRD manifest: {e}"))
        })
        .collect()
}

impl KubeClient {
    /// Create this client's namespace unless it already exists.
    pub async fn ensure_namespace(&self) -> ExpResult<CreateOutcome<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = self.namespace().to_string();
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };

        match api.create(&PostParams::default(), &namespace).await {
            Ok(created) => {
                info!(namespace = %name, "created namespace");
                Ok(CreateOutcome::Created(created))
            }
            Err(e) => {
                let err = store_error(e, "Namespace", Some(&name));
                if !err.is_already_exists() {
                    return Err(err);
                }
                info!(namespace = %name, "namespace already exists");
                let existing = api
                    .get(&name)
                    .await
                    .map_err(|e| store_error(e, "Namespace", Some(&name)))?;
                Ok(CreateOutcome::AlreadyExisted(existing))
            }
        }
    }

    /// Register the experiment and result CRDs, leaving existing ones alone.
    pub async fn register_crds(&self) -> ExpResult<Vec<CreateOutcome<String>>> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let mut outcomes = Vec::new();

        for crd in crd_manifests()? {
            let name = crd.metadata.name.clone().unwrap_or_default();
            match api.create(&PostParams::default(), &crd).await {
                Ok(_) => {
                    info!(crd = %name, "registered custom resource definition");
                    outcomes.push(CreateOutcome::Created(name));
                }
                Err(e) => {
                    let err = store_error(e, "CustomResourceDefinition", Some(&name));
                    if !err.is_already_exists() {
                        return Err(err);
                    }
                    info!(crd = %name, "custom resource definition already registered");
                    outcomes.push(CreateOutcome::AlreadyExisted(name));
                }
            }
        }
        Ok(outcomes)
    }
}
