//! Environment surface of a launched experiment job.

use crate::errors::{ExpError, ExpResult, ParameterError};
use crate::parameters::{ParameterValue, ValueKind};

pub const ENV_JOB_NAME: &str = "JOB_NAME";
pub const ENV_NAMESPACE: &str = "EXPERIMENT_NAMESPACE";
pub const ENV_EXPERIMENT_NAME: &str = "EXPERIMENT_NAME";
pub const ENV_EXPERIMENT_UID: &str = "EXPERIMENT_UID";
pub const PARAMETER_PREFIX: &str = "PARAMETER_";

/// What a job process learns about itself from its environment.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEnvironment {
    pub namespace: String,
    pub job_name: String,
    pub experiment_name: String,
    pub experiment_uid: Option<String>,
    /// Parameters keyed by their upper-cased name, in variable order.
    pub parameters: Vec<(String, ParameterValue)>,
}

impl JobEnvironment {
    pub fn from_env() -> ExpResult<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> ExpResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut namespace = None;
        let mut job_name = None;
        let mut experiment_name = None;
        let mut experiment_uid = None;
        let mut parameters = Vec::new();

        for (key, value) in vars {
            let key: String = key.into();
            let value: String = value.into();
            match key.as_str() {
                ENV_NAMESPACE => namespace = non_empty(value),
                ENV_JOB_NAME => job_name = non_empty(value),
                ENV_EXPERIMENT_NAME => experiment_name = non_empty(value),
                ENV_EXPERIMENT_UID => experiment_uid = non_empty(value),
                _ => {
                    if let Some(parameter) = parse_parameter_var(&key, &value)? {
                        parameters.push(parameter);
                    }
                }
            }
        }

        Ok(Self {
            namespace: require(namespace, ENV_NAMESPACE)?,
            job_name: require(job_name, ENV_JOB_NAME)?,
            experiment_name: require(experiment_name, ENV_EXPERIMENT_NAME)?,
            experiment_uid,
            parameters,
        })
    }

    /// Look up a parameter by name, case-insensitively.
    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        let wanted = name.to_uppercase();
        self.parameters
            .iter()
            .find(|(n, _)| *n == wanted)
            .map(|(_, v)| v)
    }
}

/// Parse `PARAMETER_<NAME>_<KIND>=<text>`. Returns `Ok(None)` for variables
/// that are not parameter variables.
pub fn parse_parameter_var(key: &str, value: &str) -> ExpResult<Option<(String, ParameterValue)>> {
    let Some(rest) = key.strip_prefix(PARAMETER_PREFIX) else {
        return Ok(None);
    };
    let Some((name, kind)) = rest.rsplit_once('_') else {
        return Ok(None);
    };
    let Some(kind) = ValueKind::parse(kind) else {
        return Ok(None);
    };
    if name.is_empty() {
        return Ok(None);
    }

    let parsed = ParameterValue::parse_env_value(kind, value).ok_or_else(|| {
        ExpError::from(ParameterError::MalformedPoint {
            message: format!("{key}={value} is not a valid {kind} value"),
        })
    })?;
    Ok(Some((name.to_string(), parsed)))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn require(value: Option<String>, var: &str) -> ExpResult<String> {
    value.ok_or_else(|| ExpError::MissingEnvironment {
        var: var.to_string(),
    })
}
