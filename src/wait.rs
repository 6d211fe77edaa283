//! Block until the store reflects a mutation.
//!
//! [`wait_ready`] and [`wait_deleted`] share [`retry_until`] but classify
//! failed fetches differently: while waiting for readiness any fetch error is
//! assumed to be propagation delay, while waiting for deletion only not-found
//! ends the wait and any other fetch error aborts it.

use crate::{
    conditions::{HasConditions, is_ready},
    retry::{RetryConfig, RetryError, WaitError, retry_until},
    store::{ResourceStore, StoreError},
};
use kube::Resource;
use std::time::Duration;
use thiserror::Error;

/// Why a single poll did not finish the wait.
#[derive(Error, Debug)]
pub enum WaitCause {
    #[error("getting resource: {0}")]
    Store(#[source] StoreError),

    #[error("resource is not updated")]
    ResourceNotUpdated,

    #[error("resource doesn't have 'status.conditions' field")]
    MissingConditions,

    #[error("resource is not READY")]
    NotReady,

    #[error("resource still exists")]
    StillExists,
}

/// Poll `name` until it carries a new resourceVersion and a `Ready=True` condition.
///
/// `previous_resource_version` is the version returned by the mutation; a read
/// returning it again has not observed the mutation yet. Every failed poll is
/// retryable, so the only error is [`WaitError::Timeout`].
pub async fn wait_ready<S>(
    store: &S,
    name: &str,
    previous_resource_version: Option<&str>,
    timeout: Duration,
    config: &RetryConfig,
) -> Result<S::Object, WaitError<WaitCause>>
where
    S: ResourceStore + ?Sized,
    S::Object: Resource + HasConditions,
{
    retry_until(config, timeout, || async move {
        let obj = store
            .get(name)
            .await
            .map_err(|e| RetryError::Retryable(WaitCause::Store(e)))?;
        check_ready(obj, previous_resource_version)
    })
    .await
}

fn check_ready<K>(
    obj: K,
    previous_resource_version: Option<&str>,
) -> Result<K, RetryError<WaitCause>>
where
    K: Resource + HasConditions,
{
    if obj.meta().resource_version.as_deref() == previous_resource_version {
        return Err(RetryError::Retryable(WaitCause::ResourceNotUpdated));
    }
    if obj.conditions().is_none() {
        return Err(RetryError::Retryable(WaitCause::MissingConditions));
    }
    if !is_ready(&obj) {
        return Err(RetryError::Retryable(WaitCause::NotReady));
    }
    Ok(obj)
}

/// Poll `name` until the store reports it not found.
///
/// Any other fetch error is fatal: the delete was already accepted, so a
/// failing read is a real problem rather than propagation delay.
pub async fn wait_deleted<S>(
    store: &S,
    name: &str,
    timeout: Duration,
    config: &RetryConfig,
) -> Result<(), WaitError<WaitCause>>
where
    S: ResourceStore + ?Sized,
{
    retry_until(config, timeout, || async move {
        match store.get(name).await {
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(RetryError::Fatal(WaitCause::Store(e))),
            Ok(_) => Err(RetryError::Retryable(WaitCause::StillExists)),
        }
    })
    .await
}
