//! Explicit cluster connection configuration.

use serde::{Deserialize, Serialize};

use ks_types::ENV_NAMESPACE;

/// Environment variable selecting a kubeconfig context.
pub const ENV_KUBE_CONTEXT: &str = "KUBE_CONTEXT";

/// Where cluster credentials come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterSource {
    /// Kubeconfig if one is present, otherwise the in-cluster service account.
    Infer,
    /// The pod's service account only.
    InCluster,
    /// A kubeconfig file, optionally pinned to one context.
    Kubeconfig { context: Option<String> },
}

/// Configuration for connecting to the experiment platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Namespace holding experiments, results and jobs.
    pub namespace: String,

    /// How to reach the cluster.
    pub source: ClusterSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            source: ClusterSource::Infer,
        }
    }
}

impl ClientConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `EXPERIMENT_NAMESPACE` and `KUBE_CONTEXT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(namespace) = lookup(ENV_NAMESPACE).filter(|v| !v.is_empty()) {
            config.namespace = namespace;
        }
        if let Some(context) = lookup(ENV_KUBE_CONTEXT).filter(|v| !v.is_empty()) {
            config.source = ClusterSource::Kubeconfig {
                context: Some(context),
            };
        }
        config
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_source(mut self, source: ClusterSource) -> Self {
        self.source = source;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.source, ClusterSource::Infer);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> =
            [("EXPERIMENT_NAMESPACE", "demo"), ("KUBE_CONTEXT", "kind-dev")]
                .into_iter()
                .collect();
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.namespace, "demo");
        assert_eq!(
            config.source,
            ClusterSource::Kubeconfig {
                context: Some("kind-dev".to_string())
            }
        );
    }

    #[test]
    fn empty_values_are_ignored() {
        let config = ClientConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn builder_chain() {
        let config = ClientConfig::new("ns")
            .with_source(ClusterSource::InCluster)
            .with_namespace("other");
        assert_eq!(config.namespace, "other");
        assert_eq!(config.source, ClusterSource::InCluster);
    }

    #[test]
    fn config_round_trip() {
        let config = ClientConfig::new("demo").with_source(ClusterSource::Kubeconfig {
            context: None,
        });
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""type":"kubeconfig""#));
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
