use crate::{
    Error, Result,
    resources::bucket::{Bucket, BucketResource, BucketSpec},
    store::ResourceStore,
};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::*;

/// Applied when an operation has no timeout configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Per-operation timeout overrides, e.g. `create = "10m"`
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

impl Timeouts {
    pub fn create(&self) -> Result<Duration> {
        resolve(self.create.as_deref())
    }

    pub fn read(&self) -> Result<Duration> {
        resolve(self.read.as_deref())
    }

    pub fn update(&self) -> Result<Duration> {
        resolve(self.update.as_deref())
    }

    pub fn delete(&self) -> Result<Duration> {
        resolve(self.delete.as_deref())
    }
}

fn resolve(value: Option<&str>) -> Result<Duration> {
    value.map(parse_duration).unwrap_or(Ok(DEFAULT_TIMEOUT))
}

/// Parse a Go style duration such as `"300ms"`, `"10m"` or `"1h30m"`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A leading `+` is
/// accepted, negative durations are not, and the total must fit in `u64`
/// nanoseconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || Error::InvalidDuration(s.to_string());
    let trimmed = s.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned == "0" {
        return Ok(Duration::ZERO);
    }
    if unsigned.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = unsigned;
    while !rest.is_empty() {
        let value_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let unit_len = rest[value_len..]
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len() - value_len);
        let value: f64 = rest[..value_len].parse().map_err(|_| invalid())?;
        let unit_nanos = match &rest[value_len..value_len + unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        let nanos = (value * unit_nanos).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(invalid());
        }
        total = total
            .checked_add(Duration::from_nanos(nanos as u64))
            .filter(|total| total.as_nanos() < u128::from(u64::MAX))
            .ok_or_else(invalid)?;
        rest = &rest[value_len + unit_len..];
    }
    Ok(total)
}

/// Desired state of an `acme_bucket` resource block.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BucketConfig {
    /// Immutable, changing it replaces the bucket
    pub name: String,
    pub spec: BucketSpec,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl BucketConfig {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<BucketConfig> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::Io {
                path: path.display().to_string(),
                source,
            })?;
        serde_yaml::from_str(&raw).map_err(Error::ResourceFile)
    }
}

/// Status fields surfaced to the user
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedStatus {
    pub arn: Option<String>,
}

/// What the provider remembers about an applied bucket.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BucketState {
    pub name: String,
    pub spec: BucketSpec,
    pub status: Option<ObservedStatus>,
    pub resource_version: Option<String>,
    /// Every finalizer on the object, in order
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Applied but never became ready, replaced on the next apply
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tainted: bool,
}

impl BucketState {
    /// Build state from the object last fetched from the cluster.
    pub fn observed(bucket: &Bucket, timeouts: Timeouts) -> BucketState {
        BucketState {
            name: bucket.name_any(),
            spec: bucket.spec.clone(),
            status: bucket.status.as_ref().map(|s| ObservedStatus {
                arn: s.arn.clone(),
            }),
            resource_version: bucket.resource_version(),
            finalizers: bucket.finalizers().to_vec(),
            timeouts,
            tainted: false,
        }
    }

    /// State for a bucket the cluster accepted but the controller never readied.
    pub fn tainted(config: &BucketConfig) -> BucketState {
        BucketState {
            name: config.name.clone(),
            spec: config.spec.clone(),
            status: None,
            resource_version: None,
            finalizers: Vec::new(),
            timeouts: config.timeouts.clone(),
            tainted: true,
        }
    }

    /// First finalizer, the one the bucket controller registers
    pub fn finalizer(&self) -> Option<&str> {
        self.finalizers.first().map(String::as_str)
    }
}

/// Change needed to move from the recorded state to the configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Plan {
    Create,
    Update,
    /// Name changed or the last apply never became ready: delete, then create
    Replace,
    NoOp,
}

pub fn plan(config: &BucketConfig, state: Option<&BucketState>) -> Plan {
    match state {
        None => Plan::Create,
        Some(state) if state.tainted || state.name != config.name => Plan::Replace,
        Some(state) if state.spec != config.spec => Plan::Update,
        Some(_) => Plan::NoOp,
    }
}

/// Converge the bucket on `config` and record the result in `state_file`.
///
/// A create that was accepted but never became ready is recorded as tainted,
/// so the next apply replaces it. Any other failure leaves the state file as
/// it was.
pub async fn apply<S>(
    buckets: &BucketResource<S>,
    state_file: &StateFile,
    state: Option<BucketState>,
    config: &BucketConfig,
) -> Result<BucketState>
where
    S: ResourceStore<Object = Bucket>,
{
    let (creating, result) = match (plan(config, state.as_ref()), state) {
        (Plan::NoOp, Some(state)) => match buckets.read(&state).await? {
            Some(mut refreshed) if refreshed.spec == config.spec => {
                refreshed.timeouts = config.timeouts.clone();
                (false, Ok(refreshed))
            }
            Some(refreshed) => {
                info!("Bucket \"{}\" drifted, updating", refreshed.name);
                (false, buckets.update(&refreshed, config).await)
            }
            None => (true, buckets.create(config).await),
        },
        (Plan::Update, Some(state)) => (false, buckets.update(&state, config).await),
        (Plan::Replace, Some(state)) => {
            buckets.delete(&state).await?;
            state_file.remove().await?;
            (true, buckets.create(config).await)
        }
        _ => (true, buckets.create(config).await),
    };

    match result {
        Ok(state) => {
            state_file.save(&state).await?;
            Ok(state)
        }
        Err(e @ Error::NotReady { .. }) if creating && e.is_timeout() => {
            warn!("Bucket \"{}\" never became READY, marking it tainted", config.name);
            state_file.save(&BucketState::tainted(config)).await?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// JSON state file, one bucket per file.
#[derive(Clone, Debug)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> StateFile {
        StateFile { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        Error::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// `None` when nothing has been applied yet
    pub async fn load(&self) -> Result<Option<BucketState>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(Error::SerializationError),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    pub async fn save(&self, state: &BucketState) -> Result<()> {
        let raw = serde_json::to_vec_pretty(state).map_err(Error::SerializationError)?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| self.io_error(e))
    }

    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(self.io_error(e)),
            _ => Ok(()),
        }
    }
}
