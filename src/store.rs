use async_trait::async_trait;
use kube::{
    Resource,
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    client::Client,
    core::NamespaceResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use thiserror::Error;

/// Field manager used for server-side apply
pub static FIELD_MANAGER: &str = "terraform-provider-crd";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("resource {0} not found")]
    NotFound(String),

    #[error("Kube Error: {0}")]
    Api(#[source] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    fn from_kube(name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(name.to_string()),
            err => StoreError::Api(err),
        }
    }
}

/// Namespaced object store keyed by name.
///
/// The waiters only rely on `get` telling found, not-found and other errors apart.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    type Object: Send + Sync;

    async fn get(&self, name: &str) -> Result<Self::Object, StoreError>;

    /// Server-side apply of the full desired object
    async fn apply(&self, name: &str, obj: &Self::Object) -> Result<Self::Object, StoreError>;

    /// Replace the object, guarded by the resourceVersion it carries
    async fn replace(&self, name: &str, obj: &Self::Object) -> Result<Self::Object, StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// [`ResourceStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore<K> {
    api: Api<K>,
    field_manager: String,
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    pub fn namespaced(client: Client, namespace: &str, field_manager: &str) -> Self {
        KubeStore {
            api: Api::namespaced(client, namespace),
            field_manager: field_manager.to_string(),
        }
    }
}

#[async_trait]
impl<K> ResourceStore for KubeStore<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Object = K;

    async fn get(&self, name: &str) -> Result<K, StoreError> {
        self.api
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(name, e))
    }

    async fn apply(&self, name: &str, obj: &K) -> Result<K, StoreError> {
        let ps = PatchParams::apply(&self.field_manager)
            .force()
            .validation_strict();
        self.api
            .patch(name, &ps, &Patch::Apply(obj))
            .await
            .map_err(|e| StoreError::from_kube(name, e))
    }

    async fn replace(&self, name: &str, obj: &K) -> Result<K, StoreError> {
        self.api
            .replace(name, &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(name, e))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.api
            .delete(name, &DeleteParams::foreground())
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(name, e))
    }
}
