use anyhow::{Context, Result};
use kube::config::Kubeconfig;
use std::collections::HashMap;

/// Cluster targets known from the local kubeconfig.
#[derive(Debug, Clone, Default)]
pub struct ClusterCatalog {
    targets: Vec<KubeTarget>,
    current_context: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KubeTarget {
    pub context: String,
    pub cluster_name: String,
    pub cluster_server: Option<String>,
}

impl ClusterCatalog {
    pub fn load() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().context("failed to read kubeconfig")?;
        Ok(Self::from_kubeconfig(&kubeconfig))
    }

    pub fn from_kubeconfig(kubeconfig: &Kubeconfig) -> Self {
        Self {
            targets: build_kube_targets(kubeconfig),
            current_context: kubeconfig.current_context.clone(),
        }
    }

    pub fn targets(&self) -> &[KubeTarget] {
        &self.targets
    }

    /// Distinct cluster names, sorted.
    pub fn clusters(&self) -> Vec<String> {
        let mut clusters = self
            .targets
            .iter()
            .map(|target| target.cluster_name.clone())
            .collect::<Vec<_>>();
        clusters.sort();
        clusters.dedup();
        clusters
    }

    /// Cluster of the current context, falling back to the first known one.
    pub fn default_cluster(&self) -> Option<&str> {
        self.current_context
            .as_deref()
            .and_then(|current| self.targets.iter().find(|target| target.context == current))
            .or_else(|| self.targets.first())
            .map(|target| target.cluster_name.as_str())
    }

    pub fn server_for(&self, cluster: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|target| target.cluster_name == cluster)
            .and_then(|target| target.cluster_server.as_deref())
    }

    /// Picks the clusters to offer and the one to start with.
    pub fn resolve(&self, requested: Option<&str>) -> Result<(Vec<String>, String)> {
        let clusters = self.clusters();
        let initial = match requested.map(str::trim).filter(|value| !value.is_empty()) {
            Some(cluster) => cluster.to_string(),
            None => self
                .default_cluster()
                .map(str::to_string)
                .context("no clusters found in kubeconfig; pass --cluster")?,
        };
        Ok((clusters, initial))
    }
}

fn build_kube_targets(kubeconfig: &Kubeconfig) -> Vec<KubeTarget> {
    let mut cluster_servers = HashMap::new();
    for cluster in &kubeconfig.clusters {
        let server = cluster
            .cluster
            .as_ref()
            .and_then(|entry| entry.server.clone());
        cluster_servers.insert(cluster.name.clone(), server);
    }

    let mut targets = kubeconfig
        .contexts
        .iter()
        .filter_map(|named| {
            let context = named.context.as_ref()?;
            Some(KubeTarget {
                context: named.name.clone(),
                cluster_name: context.cluster.clone(),
                cluster_server: cluster_servers
                    .get(&context.cluster)
                    .cloned()
                    .unwrap_or(None),
            })
        })
        .filter(|target| !target.cluster_name.is_empty())
        .collect::<Vec<_>>();

    targets.sort_by(|left, right| {
        left.context
            .cmp(&right.context)
            .then_with(|| left.cluster_name.cmp(&right.cluster_name))
    });
    targets
}
