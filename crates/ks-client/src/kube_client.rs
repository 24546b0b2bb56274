//! [`ResourceClient`] backed by the Kubernetes API server.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams,
};
use kube::config::KubeConfigOptions;
use kube::error::ErrorResponse;
use ks_types::{
    config_error, internal_error, ExpError, ExpResult, Experiment, StoreError, TrialResult,
    API_GROUP, API_VERSION, EXPERIMENT_KIND, EXPERIMENT_PLURAL, LABEL_EXPERIMENT_UID,
    RESULT_KIND, RESULT_PLURAL,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::client::ResourceClient;
use crate::config::{ClientConfig, ClusterSource};

pub(crate) const JOB_KIND: &str = "Job";

/// Client for experiments, results and jobs in one namespace of a cluster.
#[derive(Clone)]
pub struct KubeClient {
    pub(crate) client: kube::Client,
    namespace: String,
    experiments: ApiResource,
    results: ApiResource,
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeClient {
    /// Connect using the credentials `config` points at.
    pub async fn connect(config: &ClientConfig) -> ExpResult<Self> {
        let kube_config = match &config.source {
            ClusterSource::Infer => kube::Config::infer()
                .await
                .map_err(|e| config_error!("failed to infer cluster config: {e}"))?,
            ClusterSource::InCluster => kube::Config::incluster()
                .map_err(|e| config_error!("failed to load in-cluster config: {e}"))?,
            ClusterSource::Kubeconfig { context } => {
                let options = KubeConfigOptions {
                    context: context.clone(),
                    ..KubeConfigOptions::default()
                };
                kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| config_error!("failed to load kubeconfig: {e}"))?
            }
        };
        let client = kube::Client::try_from(kube_config)
            .map_err(|e| config_error!("failed to build cluster client: {e}"))?;

        info!(namespace = %config.namespace, "connected to cluster");
        Ok(Self::from_client(client, config.namespace.clone()))
    }

    pub fn from_client(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            experiments: custom_resource(EXPERIMENT_KIND, EXPERIMENT_PLURAL),
            results: custom_resource(RESULT_KIND, RESULT_PLURAL),
        }
    }

    fn custom(&self, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, resource)
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn list_custom<T: DeserializeOwned>(&self, resource: &ApiResource) -> ExpResult<Vec<T>> {
        let list = self
            .custom(resource)
            .list(&ListParams::default())
            .await
            .map_err(|e| store_error(e, &resource.kind, None))?;
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn get_custom<T: DeserializeOwned>(
        &self,
        resource: &ApiResource,
        name: &str,
    ) -> ExpResult<T> {
        let object = self
            .custom(resource)
            .get(name)
            .await
            .map_err(|e| store_error(e, &resource.kind, Some(name)))?;
        from_dynamic(object)
    }

    async fn create_custom<T: Serialize + DeserializeOwned>(
        &self,
        resource: &ApiResource,
        name: &str,
        value: &T,
    ) -> ExpResult<T> {
        let object = self
            .custom(resource)
            .create(&PostParams::default(), &to_dynamic(value, resource)?)
            .await
            .map_err(|e| store_error(e, &resource.kind, Some(name)))?;
        debug!(kind = %resource.kind, name, "created custom resource");
        from_dynamic(object)
    }

    async fn replace_custom<T: Serialize + DeserializeOwned>(
        &self,
        resource: &ApiResource,
        name: &str,
        value: &T,
    ) -> ExpResult<T> {
        let object = self
            .custom(resource)
            .replace(name, &PostParams::default(), &to_dynamic(value, resource)?)
            .await
            .map_err(|e| store_error(e, &resource.kind, Some(name)))?;
        from_dynamic(object)
    }

    async fn delete_custom(&self, resource: &ApiResource, name: &str) -> ExpResult<()> {
        self.custom(resource)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| store_error(e, &resource.kind, Some(name)))
    }
}

#[async_trait]
impl ResourceClient for KubeClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_experiments(&self) -> ExpResult<Vec<Experiment>> {
        self.list_custom(&self.experiments).await
    }

    async fn get_experiment(&self, name: &str) -> ExpResult<Experiment> {
        self.get_custom(&self.experiments, name).await
    }

    async fn create_experiment(&self, experiment: &Experiment) -> ExpResult<Experiment> {
        self.create_custom(&self.experiments, experiment.name(), experiment)
            .await
    }

    async fn update_experiment(&self, experiment: &Experiment) -> ExpResult<Experiment> {
        self.replace_custom(&self.experiments, experiment.name(), experiment)
            .await
    }

    async fn delete_experiment(&self, name: &str) -> ExpResult<()> {
        self.delete_custom(&self.experiments, name).await
    }

    async fn list_results(&self) -> ExpResult<Vec<TrialResult>> {
        self.list_custom(&self.results).await
    }

    async fn get_result(&self, name: &str) -> ExpResult<TrialResult> {
        self.get_custom(&self.results, name).await
    }

    async fn create_result(&self, result: &TrialResult) -> ExpResult<TrialResult> {
        self.create_custom(&self.results, result.name(), result).await
    }

    async fn update_result(&self, result: &TrialResult) -> ExpResult<TrialResult> {
        self.replace_custom(&self.results, result.name(), result).await
    }

    async fn delete_result(&self, name: &str) -> ExpResult<()> {
        self.delete_custom(&self.results, name).await
    }

    async fn list_jobs(&self, experiment: &Experiment) -> ExpResult<Vec<Job>> {
        let Some(uid) = experiment.uid() else {
            return Ok(Vec::new());
        };
        let params = ListParams::default().labels(&format!("{LABEL_EXPERIMENT_UID}={uid}"));
        let list = self
            .jobs()
            .list(&params)
            .await
            .map_err(|e| store_error(e, JOB_KIND, None))?;
        Ok(list.items)
    }

    async fn get_job(&self, name: &str) -> ExpResult<Job> {
        self.jobs()
            .get(name)
            .await
            .map_err(|e| store_error(e, JOB_KIND, Some(name)))
    }

    async fn create_job(&self, job: &Job) -> ExpResult<Job> {
        let name = job.metadata.name.clone().unwrap_or_default();
        self.jobs()
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| store_error(e, JOB_KIND, Some(&name)))
    }
}

fn custom_resource(kind: &str, plural: &str) -> ApiResource {
    let gvk = GroupVersionKind::gvk(API_GROUP, API_VERSION, kind);
    ApiResource::from_gvk_with_plural(&gvk, plural)
}

/// Serialize a typed resource into the dynamic form the API expects,
/// stamping `apiVersion` and `kind`.
fn to_dynamic<T: Serialize>(value: &T, resource: &ApiResource) -> ExpResult<DynamicObject> {
    let mut body = serde_json::to_value(value)?;
    let map = body
        .as_object_mut()
        .ok_or_else(|| internal_error!("{} body is not an object", resource.kind))?;
    map.insert("apiVersion".to_string(), resource.api_version.clone().into());
    map.insert("kind".to_string(), resource.kind.clone().into());
    Ok(serde_json::from_value(body)?)
}

fn from_dynamic<T: DeserializeOwned>(object: DynamicObject) -> ExpResult<T> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Map a client error for `kind`/`name` onto the store error taxonomy.
pub(crate) fn store_error(err: kube::Error, kind: &str, name: Option<&str>) -> ExpError {
    match err {
        kube::Error::Api(response) => api_error(&response, kind, name),
        other => StoreError::UpstreamFailure {
            message: other.to_string(),
        }
        .into(),
    }
}

fn api_error(response: &ErrorResponse, kind: &str, name: Option<&str>) -> ExpError {
    let upstream = || StoreError::UpstreamFailure {
        message: format!(
            "{} ({}): {}",
            response.reason, response.code, response.message
        ),
    };
    let error = match (response.code, response.reason.as_str(), name) {
        (409, "AlreadyExists", Some(name)) => StoreError::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        (409, _, Some(name)) => StoreError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        (404, _, Some(name)) => {
            let name = name.to_string();
            match kind {
                EXPERIMENT_KIND => StoreError::ExperimentNotFound { name },
                RESULT_KIND => StoreError::ResultNotFound { name },
                _ => StoreError::JobNotFound { name },
            }
        }
        _ => upstream(),
    };
    error.into()
}
