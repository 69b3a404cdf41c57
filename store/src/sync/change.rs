//! Change records exchanged with a remote peer.
//!
//! ```json
//! {"entity": "workout_metric", "operation": "upsert",
//!  "payload": {"id": "…", "workout_id": "…", "metric_name": "distance",
//!              "value": 5.2, "unit": "km", "created_at": "2024-06-01T18:45:00Z"}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SyncError;
use crate::model::{normalize_notes, Metric, Workout, WorkoutMetric};
use crate::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upsert,
    Delete,
    /// Any other tag, e.g. from a newer peer. Applied as a no-op.
    #[serde(other)]
    Unknown,
}

/// Entity tags understood by the applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEntity {
    Metric,
    Workout,
    WorkoutMetric,
}

impl SyncEntity {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncEntity::Metric => "metric",
            SyncEntity::Workout => "workout",
            SyncEntity::WorkoutMetric => "workout_metric",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "metric" => Some(SyncEntity::Metric),
            "workout" => Some(SyncEntity::Workout),
            "workout_metric" => Some(SyncEntity::WorkoutMetric),
            _ => None,
        }
    }
}

impl fmt::Display for SyncEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Kept as free text so that unknown tags from newer peers decode.
    pub entity: String,
    pub operation: Operation,
    pub payload: Value,
}

impl Change {
    pub fn upsert_metric(metric: &Metric) -> Result<Self, SyncError> {
        Self::build(SyncEntity::Metric, Operation::Upsert, &MetricPayload::from(metric))
    }

    pub fn upsert_workout(workout: &Workout) -> Result<Self, SyncError> {
        Self::build(SyncEntity::Workout, Operation::Upsert, &WorkoutPayload::from(workout))
    }

    pub fn upsert_workout_metric(metric: &WorkoutMetric) -> Result<Self, SyncError> {
        Self::build(
            SyncEntity::WorkoutMetric,
            Operation::Upsert,
            &WorkoutMetricPayload::from(metric),
        )
    }

    pub fn delete(entity: SyncEntity, id: impl Into<String>) -> Result<Self, SyncError> {
        Self::build(entity, Operation::Delete, &DeletePayload { id: id.into() })
    }

    fn build<T: Serialize>(
        entity: SyncEntity,
        operation: Operation,
        payload: &T,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            entity: entity.as_str().to_string(),
            operation,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload as `T`, reporting failures as malformed.
    pub(crate) fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, SyncError> {
        T::deserialize(&self.payload).map_err(|e| SyncError::malformed(&self.entity, e))
    }
}

// ── Payloads ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    pub metric_type: String,
    pub value: f64,
    pub unit: String,
    pub recorded_at: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPayload {
    pub id: String,
    pub workout_type: String,
    pub started_at: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutMetricPayload {
    pub id: String,
    pub workout_id: String,
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePayload {
    pub id: String,
}

impl From<&Metric> for MetricPayload {
    fn from(m: &Metric) -> Self {
        Self {
            id: m.id.clone(),
            metric_type: m.metric_type.as_str().to_string(),
            value: m.value,
            unit: m.unit.clone(),
            recorded_at: timestamp::format(&m.recorded_at),
            notes: m.notes.clone(),
            created_at: timestamp::format(&m.created_at),
        }
    }
}

impl From<&Workout> for WorkoutPayload {
    fn from(w: &Workout) -> Self {
        Self {
            id: w.id.clone(),
            workout_type: w.workout_type.clone(),
            started_at: timestamp::format(&w.started_at),
            duration_minutes: w.duration_minutes,
            notes: w.notes.clone(),
            created_at: timestamp::format(&w.created_at),
        }
    }
}

impl From<&WorkoutMetric> for WorkoutMetricPayload {
    fn from(m: &WorkoutMetric) -> Self {
        Self {
            id: m.id.clone(),
            workout_id: m.workout_id.clone(),
            metric_name: m.metric_name.clone(),
            value: m.value,
            unit: m.unit.clone(),
            created_at: timestamp::format(&m.created_at),
        }
    }
}

fn require_id(entity: SyncEntity, id: &str) -> Result<(), SyncError> {
    if id.trim().is_empty() {
        return Err(SyncError::malformed(entity.as_str(), "empty id"));
    }
    Ok(())
}

fn parse_time(entity: SyncEntity, raw: &str) -> Result<chrono::DateTime<chrono::Utc>, SyncError> {
    timestamp::parse(raw).map_err(|e| SyncError::malformed(entity.as_str(), e))
}

impl TryFrom<MetricPayload> for Metric {
    type Error = SyncError;

    fn try_from(p: MetricPayload) -> Result<Self, Self::Error> {
        let entity = SyncEntity::Metric;
        require_id(entity, &p.id)?;
        Ok(Metric {
            metric_type: p
                .metric_type
                .parse()
                .map_err(|e| SyncError::malformed(entity.as_str(), e))?,
            recorded_at: parse_time(entity, &p.recorded_at)?,
            created_at: parse_time(entity, &p.created_at)?,
            id: p.id,
            value: p.value,
            unit: p.unit,
            notes: normalize_notes(p.notes),
        })
    }
}

impl TryFrom<WorkoutPayload> for Workout {
    type Error = SyncError;

    fn try_from(p: WorkoutPayload) -> Result<Self, Self::Error> {
        let entity = SyncEntity::Workout;
        require_id(entity, &p.id)?;
        Ok(Workout {
            started_at: parse_time(entity, &p.started_at)?,
            created_at: parse_time(entity, &p.created_at)?,
            id: p.id,
            workout_type: p.workout_type,
            duration_minutes: p.duration_minutes,
            notes: normalize_notes(p.notes),
            metrics: Vec::new(),
        })
    }
}

impl TryFrom<WorkoutMetricPayload> for WorkoutMetric {
    type Error = SyncError;

    fn try_from(p: WorkoutMetricPayload) -> Result<Self, Self::Error> {
        let entity = SyncEntity::WorkoutMetric;
        require_id(entity, &p.id)?;
        require_id(entity, &p.workout_id)?;
        Ok(WorkoutMetric {
            created_at: parse_time(entity, &p.created_at)?,
            id: p.id,
            workout_id: p.workout_id,
            metric_name: p.metric_name,
            value: p.value,
            unit: p.unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricType;
    use serde_json::json;

    #[test]
    fn change_wire_format() {
        let raw = json!({
            "entity": "metric",
            "operation": "delete",
            "payload": {"id": "0a1b2c3d-0000-4000-8000-000000000001"}
        });
        let change: Change = serde_json::from_value(raw).unwrap();
        assert_eq!(change.operation, Operation::Delete);
        assert_eq!(SyncEntity::from_tag(&change.entity), Some(SyncEntity::Metric));

        let payload: DeletePayload = change.decode().unwrap();
        assert_eq!(payload.id, "0a1b2c3d-0000-4000-8000-000000000001");
    }

    #[test]
    fn unknown_tags_still_decode() {
        let change: Change = serde_json::from_str(
            r#"{"entity":"sleep_stage","operation":"upsert","payload":{}}"#,
        )
        .unwrap();
        assert_eq!(SyncEntity::from_tag(&change.entity), None);

        let change: Change = serde_json::from_str(
            r#"{"entity":"metric","operation":"patch","payload":{}}"#,
        )
        .unwrap();
        assert_eq!(change.operation, Operation::Unknown);
    }

    #[test]
    fn outbound_metric_converts_back() {
        let metric = Metric::new(MetricType::Weight, 82.5, None, Some("fasted".into()));
        let change = Change::upsert_metric(&metric).unwrap();
        assert_eq!(change.entity, "metric");
        assert_eq!(change.payload["metric_type"], "weight");

        let payload: MetricPayload = change.decode().unwrap();
        assert_eq!(Metric::try_from(payload).unwrap(), metric);
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let payload = WorkoutPayload {
            id: "ffee0011-0000-4000-8000-000000000003".into(),
            workout_type: "run".into(),
            started_at: "yesterday".into(),
            duration_minutes: None,
            notes: None,
            created_at: "2024-06-01T00:00:00Z".into(),
        };
        let err = Workout::try_from(payload).unwrap_err();
        assert!(matches!(err, SyncError::MalformedPayload { ref entity, .. } if entity == "workout"));
    }

    #[test]
    fn missing_field_is_malformed() {
        let change = Change {
            entity: "workout_metric".into(),
            operation: Operation::Upsert,
            payload: json!({"id": "x", "value": 1.0}),
        };
        assert!(matches!(
            change.decode::<WorkoutMetricPayload>(),
            Err(SyncError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn unknown_metric_type_is_malformed() {
        let mut payload = MetricPayload::from(&Metric::new(MetricType::Steps, 1.0, None, None));
        payload.metric_type = "mana".into();
        assert!(Metric::try_from(payload).is_err());
    }
}
