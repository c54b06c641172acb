//! Persisted shape of a comparison, as consumed by export writers.

use crate::report::describe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wlandiff_common::{
    ChangeStatus, ComparisonResult, FieldChange, Position, Summary, WlanDiffError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonArtifact {
    pub project_a_name: String,
    pub project_b_name: String,
    pub comparison_timestamp: DateTime<Utc>,
    pub summary: Summary,
    pub changes: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub status: ChangeStatus,
    pub name: String,
    /// Old name, present only when it differs from `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    pub floor: String,
    pub distance_moved: Option<f64>,
    pub old_coords: Option<[f64; 2]>,
    pub new_coords: Option<[f64; 2]>,
    pub details: String,
    pub field_changes: Vec<FieldChange>,
}

fn coords(position: &Position) -> [f64; 2] {
    [position.x, position.y]
}

impl From<&ComparisonResult> for ComparisonArtifact {
    fn from(result: &ComparisonResult) -> Self {
        let changes = result
            .changes
            .iter()
            .map(|record| {
                let name = record.name().to_string();
                let old_name = record
                    .old
                    .as_ref()
                    .map(|e| e.name.clone())
                    .filter(|old| *old != name);

                ChangeRecord {
                    status: record.status,
                    name,
                    old_name,
                    floor: record.floor.clone(),
                    distance_moved: record.distance_moved,
                    old_coords: record.old.as_ref().map(|e| coords(&e.position)),
                    new_coords: record.new.as_ref().map(|e| coords(&e.position)),
                    details: describe(record),
                    field_changes: record.field_changes.clone(),
                }
            })
            .collect();

        Self {
            project_a_name: result.metadata.project_a_name.clone(),
            project_b_name: result.metadata.project_b_name.clone(),
            comparison_timestamp: result.metadata.timestamp,
            summary: result.summary.clone(),
            changes,
        }
    }
}

impl ComparisonArtifact {
    /// Only records whose status is not `unchanged`
    pub fn changes_only(mut self) -> Self {
        self.changes.retain(|c| c.status != ChangeStatus::Unchanged);
        self
    }

    pub fn to_json(&self) -> Result<String, WlanDiffError> {
        serde_json::to_string_pretty(self).map_err(|e| WlanDiffError::Serialization(e.to_string()))
    }

    pub fn from_json(data: &str) -> Result<Self, WlanDiffError> {
        serde_json::from_str(data).map_err(|e| WlanDiffError::Serialization(e.to_string()))
    }
}
