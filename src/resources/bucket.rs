use crate::{
    BucketConfig, BucketState, Context, Error, Result,
    conditions::{Condition, HasConditions},
    store::ResourceStore,
    telemetry,
    wait::{wait_deleted, wait_ready},
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::*;

/// Resource type name suffix, appended to the provider type name
pub static TYPE_SUFFIX: &str = "_bucket";

/// Represents a bucket in cloud.acme.local.
///
/// The bucket controller publishes the ARN and a `Ready` condition in the status.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "Bucket",
    group = "cloud.acme.local",
    version = "v1",
    namespaced,
    shortname = "buc",
    status = "BucketStatus"
)]
pub struct BucketSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
pub struct BucketStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
}

impl HasConditions for Bucket {
    fn conditions(&self) -> Option<&[Condition]> {
        self.status.as_ref()?.conditions.as_deref()
    }
}

impl Bucket {
    fn desired(config: &BucketConfig) -> Bucket {
        Bucket::new(&config.name, config.spec.clone())
    }
}

fn record_trace_id() {
    let trace_id = telemetry::get_trace_id();
    if trace_id != opentelemetry::trace::TraceId::INVALID {
        Span::current().record("trace_id", field::display(&trace_id));
    }
}

/// Create, read, update and delete `acme_bucket` resources.
pub struct BucketResource<S> {
    pub(crate) ctx: Arc<Context<S>>,
}

impl<S> BucketResource<S>
where
    S: ResourceStore<Object = Bucket>,
{
    pub fn new(ctx: Arc<Context<S>>) -> Self {
        BucketResource { ctx }
    }

    /// Apply the bucket and wait until the controller reports it ready.
    ///
    /// State is built from the last fetched object, not the apply response,
    /// so it carries the controller's finalizers and status.
    #[instrument(skip(self, config), fields(name = %config.name, trace_id))]
    pub async fn create(&self, config: &BucketConfig) -> Result<BucketState> {
        record_trace_id();
        let timeout = config.timeouts.create()?;
        let name = config.name.as_str();

        info!("Creating Bucket \"{name}\"");
        let applied = self.ctx.store.apply(name, &Bucket::desired(config)).await?;

        debug!(
            resource_version = applied.metadata.resource_version.as_deref(),
            "Waiting for Bucket to become READY"
        );
        let bucket = wait_ready(
            &self.ctx.store,
            name,
            applied.metadata.resource_version.as_deref(),
            timeout,
            &self.ctx.retry,
        )
        .await
        .map_err(|source| Error::NotReady {
            name: name.to_string(),
            source,
        })?;

        info!("Created Bucket \"{name}\"");
        Ok(BucketState::observed(&bucket, config.timeouts.clone()))
    }

    /// Refresh state from the cluster. `None` when the bucket no longer exists.
    #[instrument(skip(self, state), fields(name = %state.name, trace_id))]
    pub async fn read(&self, state: &BucketState) -> Result<Option<BucketState>> {
        record_trace_id();
        let timeout = state.timeouts.read()?;

        match tokio::time::timeout(timeout, self.ctx.store.get(&state.name)).await {
            Err(_) => Err(Error::ReadTimeout {
                name: state.name.clone(),
                timeout,
            }),
            Ok(Err(e)) if e.is_not_found() => {
                warn!("Bucket \"{}\" was removed outside of the provider", state.name);
                Ok(None)
            }
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(bucket)) => Ok(Some(BucketState::observed(&bucket, state.timeouts.clone()))),
        }
    }

    /// Replace the bucket spec and wait until the controller reports it ready.
    ///
    /// The stored resourceVersion guards against concurrent writers; the
    /// stored finalizers are sent back so the replace does not drop them.
    #[instrument(skip(self, state, config), fields(name = %state.name, trace_id))]
    pub async fn update(&self, state: &BucketState, config: &BucketConfig) -> Result<BucketState> {
        record_trace_id();
        if state.name != config.name {
            return Err(Error::RequiresReplace {
                from: state.name.clone(),
                to: config.name.clone(),
            });
        }
        let timeout = config.timeouts.update()?;
        let name = config.name.as_str();

        let mut desired = Bucket::desired(config);
        desired.metadata.resource_version = state.resource_version.clone();
        if !state.finalizers.is_empty() {
            desired.metadata.finalizers = Some(state.finalizers.clone());
        }

        info!("Updating Bucket \"{name}\"");
        let replaced = self.ctx.store.replace(name, &desired).await?;

        let bucket = wait_ready(
            &self.ctx.store,
            name,
            replaced.metadata.resource_version.as_deref(),
            timeout,
            &self.ctx.retry,
        )
        .await
        .map_err(|source| Error::NotReady {
            name: name.to_string(),
            source,
        })?;

        info!("Updated Bucket \"{name}\"");
        Ok(BucketState::observed(&bucket, config.timeouts.clone()))
    }

    /// Delete the bucket and wait until the cluster no longer returns it.
    #[instrument(skip(self, state), fields(name = %state.name, trace_id))]
    pub async fn delete(&self, state: &BucketState) -> Result<()> {
        record_trace_id();
        let timeout = state.timeouts.delete()?;
        let name = state.name.as_str();

        info!("Deleting Bucket \"{name}\"");
        match self.ctx.store.delete(name).await {
            Err(e) if e.is_not_found() => {
                info!("Bucket \"{name}\" is already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
            Ok(()) => {}
        }

        wait_deleted(&self.ctx.store, name, timeout, &self.ctx.retry)
            .await
            .map_err(|source| Error::NotDeleted {
                name: name.to_string(),
                source,
            })?;

        info!("Deleted Bucket \"{name}\"");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{RetryConfig, WaitError};
    use crate::state::Timeouts;
    use crate::store::StoreError;
    use crate::wait::WaitCause;
    use crate::wait::tests::{FakeStore, Fetch, bucket, ready};
    use assert_json_diff::assert_json_include;
    use kube::CustomResourceExt;
    use serde_json::json;

    fn resource(store: FakeStore) -> BucketResource<FakeStore> {
        BucketResource::new(Arc::new(Context {
            store,
            retry: RetryConfig::default(),
        }))
    }

    fn config() -> BucketConfig {
        BucketConfig {
            name: "logs".into(),
            spec: BucketSpec {
                tags: Some(BTreeMap::from([("team".to_string(), "storage".to_string())])),
            },
            timeouts: Timeouts {
                create: Some("1m".into()),
                update: Some("1m".into()),
                delete: Some("1m".into()),
                read: Some("10s".into()),
            },
        }
    }

    fn applied_state() -> BucketState {
        let mut state = BucketState::observed(&ready("5"), config().timeouts);
        state.finalizers = vec!["first".into(), "second".into()];
        state
    }

    #[tokio::test(start_paused = true)]
    async fn create_populates_state_from_final_fetch() {
        let store = FakeStore::scripted(vec![
            Fetch::Found(bucket("1", None)),
            Fetch::Found(bucket("2", None)),
            Fetch::Found(ready("3")),
        ]);
        let mut apply_response = bucket("1", None);
        apply_response.metadata.finalizers = None;
        *store.mutation_response.lock().unwrap() = Some(apply_response);
        let buckets = resource(store);

        let state = buckets.create(&config()).await.unwrap();

        assert_eq!(state.resource_version.as_deref(), Some("3"));
        assert_eq!(state.finalizer(), Some("buckets.cloud.acme.local/finalizer"));
        assert_eq!(
            state.status.and_then(|s| s.arn).as_deref(),
            Some("arn:aws:s3:::logs")
        );
        assert_eq!(state.timeouts, config().timeouts);
        assert_eq!(buckets.ctx.store.gets(), 3);

        let applied = buckets.ctx.store.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_json_include!(
            actual: serde_json::to_value(&applied[0]).unwrap(),
            expected: json!({
                "apiVersion": "cloud.acme.local/v1",
                "kind": "Bucket",
                "metadata": { "name": "logs" },
                "spec": { "tags": { "team": "storage" } },
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn create_timeout_is_distinguishable() {
        let not_ready = bucket("2", Some(vec![Condition::new("Ready", "False")]));
        let store = FakeStore::scripted(vec![Fetch::Found(not_ready)]);
        let err = resource(store).create(&config()).await.unwrap_err();

        assert!(err.is_timeout());
        match err {
            Error::NotReady {
                source: WaitError::Timeout { last, .. },
                ..
            } => assert!(matches!(last, Some(WaitCause::NotReady))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejects_invalid_timeout_before_applying() {
        let mut config = config();
        config.timeouts.create = Some("soon".into());
        let buckets = resource(FakeStore::default());

        let err = buckets.create(&config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDuration(_)));
        assert!(buckets.ctx.store.applied.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn read_refreshes_state() {
        let store = FakeStore::scripted(vec![Fetch::Found(ready("9"))]);
        let state = resource(store).read(&applied_state()).await.unwrap().unwrap();

        assert_eq!(state.resource_version.as_deref(), Some("9"));
        assert_eq!(state.timeouts, config().timeouts);
    }

    #[tokio::test(start_paused = true)]
    async fn read_drops_state_when_gone() {
        let store = FakeStore::scripted(vec![Fetch::NotFound]);
        assert_eq!(resource(store).read(&applied_state()).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn read_surfaces_store_errors() {
        let store = FakeStore::scripted(vec![Fetch::Failed]);
        let err = resource(store).read(&applied_state()).await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Api(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn update_sends_version_and_finalizers() {
        let store =
            FakeStore::scripted(vec![Fetch::Found(bucket("6", None)), Fetch::Found(ready("7"))]);
        *store.mutation_response.lock().unwrap() = Some(bucket("6", None));
        let buckets = resource(store);

        let state = buckets.update(&applied_state(), &config()).await.unwrap();

        assert_eq!(state.resource_version.as_deref(), Some("7"));
        let replaced = buckets.ctx.store.replaced.lock().unwrap();
        assert_eq!(replaced[0].metadata.resource_version.as_deref(), Some("5"));
        assert_eq!(
            replaced[0].metadata.finalizers,
            Some(vec!["first".to_string(), "second".to_string()])
        );
        assert_eq!(replaced[0].spec, config().spec);
    }

    #[tokio::test(start_paused = true)]
    async fn update_rejects_rename() {
        let mut config = config();
        config.name = "archive".into();
        let buckets = resource(FakeStore::default());

        let err = buckets.update(&applied_state(), &config).await.unwrap_err();
        assert!(matches!(err, Error::RequiresReplace { .. }));
        assert!(buckets.ctx.store.replaced.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_gone() {
        let store = FakeStore::scripted(vec![
            Fetch::Found(ready("5")),
            Fetch::Found(ready("5")),
            Fetch::NotFound,
        ]);
        let buckets = resource(store);

        buckets.delete(&applied_state()).await.unwrap();
        assert_eq!(buckets.ctx.store.deleted.lock().unwrap().as_slice(), ["logs"]);
        assert_eq!(buckets.ctx.store.gets(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_of_missing_bucket_skips_waiting() {
        let store = FakeStore {
            delete_not_found: true,
            ..Default::default()
        };
        let buckets = resource(store);

        buckets.delete(&applied_state()).await.unwrap();
        assert_eq!(buckets.ctx.store.gets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_aborts_on_fetch_error() {
        let store = FakeStore::scripted(vec![Fetch::Failed]);
        let buckets = resource(store);

        let err = buckets.delete(&applied_state()).await.unwrap_err();
        assert!(!err.is_timeout());
        assert!(matches!(
            err,
            Error::NotDeleted {
                source: WaitError::Fatal(_),
                ..
            }
        ));
        assert_eq!(buckets.ctx.store.gets(), 1);
    }

    #[test]
    fn crd_coordinates() {
        let crd = Bucket::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("buckets.cloud.acme.local"));
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1");
    }
}
