use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub static READY: &str = "Ready";
pub static TRUE: &str = "True";

/// A `{type, status}` predicate published by the controller reconciling an object.
///
/// Missing fields deserialize to empty strings, so a half-written status never
/// fails a fetch.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Condition {
            type_: type_.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    fn is_ready(&self) -> bool {
        self.type_ == READY && self.status == TRUE
    }
}

/// Objects whose status may carry a condition list.
pub trait HasConditions {
    /// `None` when the object has no status, or a status without conditions.
    fn conditions(&self) -> Option<&[Condition]>;
}

/// True iff some condition is `Ready=True`. Absent status or conditions is "not ready".
pub fn is_ready<K: HasConditions + ?Sized>(obj: &K) -> bool {
    obj.conditions()
        .map(|conditions| conditions.iter().any(Condition::is_ready))
        .unwrap_or(false)
}
