//! Experiment custom resource model and ownership metadata.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::{Deserialize, Serialize};

use crate::errors::TemplateError;
use crate::parameters::ParameterSpace;

/// API group of the experiment custom resources.
pub const API_GROUP: &str = "ml.intel.com";
pub const API_VERSION: &str = "v1";
pub const EXPERIMENT_KIND: &str = "Experiment";
pub const EXPERIMENT_PLURAL: &str = "experiments";
pub const RESULT_KIND: &str = "Result";
pub const RESULT_PLURAL: &str = "results";

/// Job label carrying the owning experiment's uid.
pub const LABEL_EXPERIMENT_UID: &str = "experiment_uid";
/// Job label carrying the owning experiment's name.
pub const LABEL_EXPERIMENT_NAME: &str = "experiment_name";
/// Result label carrying the owning experiment's name.
pub const LABEL_EXPERIMENT: &str = "experiment";
/// Job annotation holding the serialized parameter point.
pub const ANNOTATION_JOB_PARAMETERS: &str = "job_parameters";

pub fn api_version() -> String {
    format!("{API_GROUP}/{API_VERSION}")
}

/// Desired state of an experiment: the trial job template and the space to
/// explore.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExperimentSpec {
    /// Kubernetes `JobSpec` document shared by every trial.
    #[serde(rename = "jobSpec", default, skip_serializing_if = "Option::is_none")]
    pub job_template: Option<serde_json::Value>,

    #[serde(default)]
    pub parameters: ParameterSpace,
}

/// An experiment as stored in the cluster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Experiment {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ExperimentSpec,

    #[serde(default)]
    pub status: serde_json::Map<String, serde_json::Value>,
}

impl Experiment {
    pub fn new(name: impl Into<String>, job_template: serde_json::Value) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..ObjectMeta::default()
            },
            spec: ExperimentSpec {
                job_template: Some(job_template),
                parameters: ParameterSpace::new(),
            },
            status: serde_json::Map::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterSpace) -> Self {
        self.spec.parameters = parameters;
        self
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Platform-assigned uid, present once persisted.
    pub fn uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    pub fn parameters(&self) -> &ParameterSpace {
        &self.spec.parameters
    }

    pub fn job_template(&self) -> Option<&serde_json::Value> {
        self.spec.job_template.as_ref()
    }

    /// The persisted identity of this experiment.
    pub fn identity(&self) -> Result<ExperimentRef, TemplateError> {
        match self.uid() {
            Some(uid) if !self.name().is_empty() => Ok(ExperimentRef {
                name: self.name().to_string(),
                uid: uid.to_string(),
            }),
            _ => Err(TemplateError::MissingIdentity {
                experiment: self.name().to_string(),
            }),
        }
    }
}

/// Name and uid of a persisted experiment, enough to own other resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentRef {
    pub name: String,
    pub uid: String,
}

impl ExperimentRef {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
        }
    }

    /// Controlling owner reference that blocks deletion of the experiment
    /// until the owned resource is gone.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: api_version(),
            kind: EXPERIMENT_KIND.to_string(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Recover the experiment an object belongs to from its owner references.
    pub fn from_owner_references(references: &[OwnerReference]) -> Option<Self> {
        references
            .iter()
            .find(|r| r.kind == EXPERIMENT_KIND && r.api_version == api_version())
            .map(|r| Self::new(r.name.clone(), r.uid.clone()))
    }
}
