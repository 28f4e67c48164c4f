//! Frigate integration wire shapes
//!
//! Only the fields the card reads are modelled. Timestamps arrive as float
//! seconds since the epoch.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub fn timestamp_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    let millis = (seconds * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis).single()
}

pub fn datetime_to_timestamp(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

/// Some Frigate commands return their payload as a JSON-encoded string.
pub fn decode_json_payload(value: Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(encoded) => serde_json::from_str(&encoded),
        other => Ok(other),
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrigateEvent {
    pub id: String,
    pub camera: String,
    pub label: String,
    #[serde(default)]
    pub sub_label: Option<String>,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub has_clip: bool,
    #[serde(default)]
    pub has_snapshot: bool,
    #[serde(default)]
    pub top_score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub zones: Vec<String>,
    #[serde(default)]
    pub retain_indefinitely: bool,
    #[serde(default)]
    pub false_positive: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrigateRecordingHour {
    pub hour: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrigateRecordingDay {
    pub day: String,
    #[serde(default)]
    pub events: u64,
    #[serde(default)]
    pub hours: Vec<FrigateRecordingHour>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrigateRecordingSegment {
    pub id: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrigateReviewData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub objects: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sub_labels: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub zones: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub detections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrigateReview {
    pub id: String,
    pub camera: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    pub severity: String,
    #[serde(default)]
    pub has_been_reviewed: bool,
    #[serde(default)]
    pub thumb_path: Option<String>,
    #[serde(default)]
    pub data: FrigateReviewData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrigateEventSummary {
    pub camera: String,
    pub day: String,
    pub label: String,
    #[serde(default)]
    pub sub_label: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub zones: Vec<String>,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrigatePtzInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub presets: Vec<String>,
}

/// Object snapshot inside an event change notification
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrigateEventChangeBody {
    pub camera: String,
    pub label: String,
    #[serde(default)]
    pub has_clip: bool,
    #[serde(default)]
    pub has_snapshot: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub current_zones: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrigateEventChangeType {
    New,
    Update,
    End,
}

/// Payload of `frigate/events/subscribe`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrigateEventChange {
    #[serde(rename = "type")]
    pub change_type: FrigateEventChangeType,
    pub after: FrigateEventChangeBody,
}
