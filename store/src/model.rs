//! Entity model: health metrics, workouts and workout sub-metrics.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::PersistenceError;
use crate::timestamp;

/// Category of a health [`Metric`]. Each category has a fixed display unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum MetricType {
    Weight,
    BodyFat,
    Bmi,
    Waist,
    BpSystolic,
    BpDiastolic,
    HeartRate,
    RestingHeartRate,
    Hrv,
    SleepDuration,
    SleepQuality,
    WaterIntake,
    BloodGlucose,
    OxygenSaturation,
    BodyTemperature,
    Vo2Max,
    RespiratoryRate,
    Mood,
    Energy,
    Stress,
    Steps,
}

impl MetricType {
    pub const ALL: [MetricType; 21] = [
        MetricType::Weight,
        MetricType::BodyFat,
        MetricType::Bmi,
        MetricType::Waist,
        MetricType::BpSystolic,
        MetricType::BpDiastolic,
        MetricType::HeartRate,
        MetricType::RestingHeartRate,
        MetricType::Hrv,
        MetricType::SleepDuration,
        MetricType::SleepQuality,
        MetricType::WaterIntake,
        MetricType::BloodGlucose,
        MetricType::OxygenSaturation,
        MetricType::BodyTemperature,
        MetricType::Vo2Max,
        MetricType::RespiratoryRate,
        MetricType::Mood,
        MetricType::Energy,
        MetricType::Stress,
        MetricType::Steps,
    ];

    /// Stable identifier used in storage, file names and sync payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Weight => "weight",
            MetricType::BodyFat => "body_fat",
            MetricType::Bmi => "bmi",
            MetricType::Waist => "waist",
            MetricType::BpSystolic => "bp_systolic",
            MetricType::BpDiastolic => "bp_diastolic",
            MetricType::HeartRate => "heart_rate",
            MetricType::RestingHeartRate => "resting_heart_rate",
            MetricType::Hrv => "hrv",
            MetricType::SleepDuration => "sleep_duration",
            MetricType::SleepQuality => "sleep_quality",
            MetricType::WaterIntake => "water_intake",
            MetricType::BloodGlucose => "blood_glucose",
            MetricType::OxygenSaturation => "oxygen_saturation",
            MetricType::BodyTemperature => "body_temperature",
            MetricType::Vo2Max => "vo2_max",
            MetricType::RespiratoryRate => "respiratory_rate",
            MetricType::Mood => "mood",
            MetricType::Energy => "energy",
            MetricType::Stress => "stress",
            MetricType::Steps => "steps",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            MetricType::Weight => "kg",
            MetricType::BodyFat | MetricType::OxygenSaturation => "%",
            MetricType::Bmi => "kg/m²",
            MetricType::Waist => "cm",
            MetricType::BpSystolic | MetricType::BpDiastolic => "mmHg",
            MetricType::HeartRate | MetricType::RestingHeartRate => "bpm",
            MetricType::Hrv => "ms",
            MetricType::SleepDuration => "hours",
            MetricType::SleepQuality | MetricType::Mood | MetricType::Energy | MetricType::Stress => {
                "score"
            }
            MetricType::WaterIntake => "ml",
            MetricType::BloodGlucose => "mg/dL",
            MetricType::BodyTemperature => "°C",
            MetricType::Vo2Max => "ml/kg/min",
            MetricType::RespiratoryRate => "breaths/min",
            MetricType::Steps => "steps",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PersistenceError::Validation(format!("unknown metric type: {s:?}")))
    }
}

impl From<MetricType> for &'static str {
    fn from(t: MetricType) -> Self {
        t.as_str()
    }
}

impl TryFrom<String> for MetricType {
    type Error = PersistenceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A single health measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: f64,
    /// Captured from the type at creation and never recomputed.
    pub unit: String,
    #[serde(with = "timestamp")]
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Metric {
    /// Build a new metric with a fresh id. `recorded_at` defaults to now.
    pub fn new(
        metric_type: MetricType,
        value: f64,
        recorded_at: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            metric_type,
            value,
            unit: metric_type.unit().to_string(),
            recorded_at: recorded_at.unwrap_or(now),
            notes: normalize_notes(notes),
            created_at: now,
        }
    }
}

/// An exercise session. `metrics` is only populated by reads that load them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: String,
    #[serde(rename = "type")]
    pub workout_type: String,
    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Vec<WorkoutMetric>,
}

impl Workout {
    pub fn new(
        workout_type: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
        duration_minutes: Option<i64>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            workout_type: workout_type.into(),
            started_at: started_at.unwrap_or(now),
            duration_minutes,
            notes: normalize_notes(notes),
            created_at: now,
            metrics: Vec::new(),
        }
    }

    /// Copy of this workout without its loaded metrics.
    pub fn without_metrics(&self) -> Self {
        Self {
            metrics: Vec::new(),
            ..self.clone()
        }
    }
}

/// A named measurement inside a workout, e.g. `distance = 5.2 km`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutMetric {
    pub id: String,
    pub workout_id: String,
    pub metric_name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl WorkoutMetric {
    pub fn new(
        workout_id: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
        unit: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            workout_id: workout_id.into(),
            metric_name: metric_name.into(),
            value,
            unit: unit.filter(|u| !u.is_empty()),
            created_at: Utc::now(),
        }
    }
}

/// Generate a new entity id (UUID v4, 36 characters).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// Blank notes collapse to `None` so both backends agree on "no notes".
pub(crate) fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.filter(|n| !n.trim().is_empty())
}

/// Borrowed [`normalize_notes`], applied wherever an entity is written.
pub(crate) fn stored_notes(notes: Option<&str>) -> Option<&str> {
    notes.filter(|n| !n.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_type_names_are_unique_and_parse_back() {
        let names: HashSet<&str> = MetricType::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(names.len(), 21);
        for t in MetricType::ALL {
            assert_eq!(t.as_str().parse::<MetricType>().unwrap(), t);
            assert!(!t.unit().is_empty());
        }
    }

    #[test]
    fn unknown_metric_type_is_validation_error() {
        let err = "cholesterol".parse::<MetricType>().unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));
    }

    #[test]
    fn metric_unit_derives_from_type() {
        let m = Metric::new(MetricType::Weight, 82.5, None, None);
        assert_eq!(m.unit, "kg");
        assert_eq!(m.id.len(), 36);
        assert_eq!(m.recorded_at, m.created_at);
    }

    #[test]
    fn blank_notes_become_none() {
        let m = Metric::new(MetricType::Mood, 7.0, None, Some("   ".to_string()));
        assert_eq!(m.notes, None);
        let w = Workout::new("run", None, Some(30), Some("felt good".to_string()));
        assert_eq!(w.notes.as_deref(), Some("felt good"));
    }

    #[test]
    fn metric_serializes_type_as_string() {
        let m = Metric::new(MetricType::BpSystolic, 120.0, None, None);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["type"], "bp_systolic");
        assert!(json.get("notes").is_none());
        let back: Metric = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn without_metrics_clears_only_metrics() {
        let mut w = Workout::new("swim", None, None, None);
        w.metrics
            .push(WorkoutMetric::new(&w.id, "laps", 40.0, None));
        let bare = w.without_metrics();
        assert!(bare.metrics.is_empty());
        assert_eq!(bare.id, w.id);
    }
}
