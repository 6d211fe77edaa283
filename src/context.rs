use crate::{Error, KubeStore, Result, RetryConfig, Settings, resources::bucket::Bucket};
use kube::{
    Client as KubeClient, Config as KubeConfig,
    config::{KubeConfigOptions, Kubeconfig},
};
use tracing::*;

// Context for the lifecycle operations
#[derive(Clone)]
pub struct Context<S> {
    /// Store the resources live in
    pub store: S,
    /// Backoff while waiting for the controller
    pub retry: RetryConfig,
}

impl Context<KubeStore<Bucket>> {
    /// Build a Kubernetes client from the kubeconfig and bind it to the provider namespace.
    pub async fn configure(settings: &Settings) -> Result<Self> {
        let kubeconfig = match &settings.kubeconfig {
            Some(path) => Kubeconfig::read_from(path)?,
            None => Kubeconfig::read()?,
        };
        let config =
            KubeConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        info!(
            cluster_url = %config.cluster_url,
            namespace = %settings.namespace,
            "Configured Kubernetes client"
        );
        let kube_client = KubeClient::try_from(config).map_err(Error::KubeError)?;

        Ok(Context {
            store: KubeStore::namespaced(kube_client, &settings.namespace, &settings.field_manager),
            retry: settings.poll.retry_config(),
        })
    }
}
