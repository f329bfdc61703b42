//! Alertmanager webhook payload.
//!
//! Decoding is best effort: every field is optional and `null` collections
//! decode to empty ones. Maps are `BTreeMap`s so that anything iterating over
//! labels or annotations sees them sorted by key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub type LabelSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertPayload {
    pub receiver: String,
    pub status: String,
    #[serde(rename = "externalURL")]
    pub external_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub common_labels: LabelSet,
    #[serde(deserialize_with = "null_as_default")]
    pub group_labels: LabelSet,
    #[serde(deserialize_with = "null_as_default")]
    pub common_annotations: LabelSet,
    #[serde(deserialize_with = "null_as_default")]
    pub alerts: Vec<AlertEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertEntry {
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: LabelSet,
    #[serde(deserialize_with = "null_as_default")]
    pub annotations: LabelSet,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
