use std::collections::HashMap;
use tracing::debug;
use wlandiff_common::{
    ChangeStatus, ComparisonMetadata, ComparisonResult, MatchResult, Position, Summary,
};

/// Assembles classified records into an ordered `ComparisonResult`
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    floors: Vec<String>,
    records: Vec<MatchResult>,
    old_skipped: usize,
    new_skipped: usize,
}

impl ReportBuilder {
    /// `floors` fixes the report order; floors seen only in records are appended
    pub fn new(floors: Vec<String>) -> Self {
        Self {
            floors,
            ..Self::default()
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = MatchResult>) {
        self.records.extend(records);
    }

    pub fn skipped(&mut self, old_skipped: usize, new_skipped: usize) {
        self.old_skipped += old_skipped;
        self.new_skipped += new_skipped;
    }

    pub fn build(self, metadata: ComparisonMetadata) -> ComparisonResult {
        let mut floors = self.floors;
        for record in &self.records {
            if !floors.contains(&record.floor) {
                floors.push(record.floor.clone());
            }
        }

        let floor_rank: HashMap<&str, usize> = floors
            .iter()
            .enumerate()
            .map(|(rank, name)| (name.as_str(), rank))
            .collect();

        let mut keyed: Vec<((usize, u8, usize, usize), MatchResult)> = self
            .records
            .into_iter()
            .map(|record| {
                let rank = floor_rank.get(record.floor.as_str()).copied().unwrap_or(usize::MAX);
                (sort_key(rank, &record), record)
            })
            .collect();
        // Explicit total order; nothing depends on map iteration
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut summary = Summary {
            old_skipped: self.old_skipped,
            new_skipped: self.new_skipped,
            ..Summary::default()
        };
        let changes: Vec<MatchResult> = keyed
            .into_iter()
            .map(|(_, record)| {
                summary.record(&record);
                record
            })
            .collect();

        debug!(
            "Built report: {} records over {} floors, {} changed",
            changes.len(),
            floors.len(),
            summary.changed()
        );

        ComparisonResult {
            metadata,
            summary,
            floors,
            changes,
        }
    }
}

/// Floor rank, then old index; additions follow by new index
fn sort_key(floor_rank: usize, record: &MatchResult) -> (usize, u8, usize, usize) {
    match (&record.old, &record.new) {
        (Some(old), new) => (floor_rank, 0, old.index, new.as_ref().map_or(0, |n| n.index)),
        (None, Some(new)) => (floor_rank, 1, new.index, 0),
        (None, None) => (floor_rank, 2, 0, 0),
    }
}

/// Human-readable detail line for one record
pub fn describe(record: &MatchResult) -> String {
    let changes = record
        .field_changes
        .iter()
        .map(|c| format!("{}: {} → {}", c.field, c.old, c.new))
        .collect::<Vec<_>>()
        .join("; ");

    let old_pos = record.old.as_ref().map(|e| e.position);
    let new_pos = record.new.as_ref().map(|e| e.position);

    match record.status {
        ChangeStatus::Moved => {
            let mut line = match (record.distance_moved, old_pos, new_pos) {
                (Some(d), Some(from), Some(to)) => format!(
                    "Moved {}: {} → {}",
                    format_distance(d),
                    format_coords(&from),
                    format_coords(&to)
                ),
                _ => "Moved".to_string(),
            };
            if !changes.is_empty() {
                line.push_str("; ");
                line.push_str(&changes);
            }
            line
        }
        ChangeStatus::Modified => changes,
        ChangeStatus::Renamed => {
            let old_name = record.old.as_ref().map_or("", |e| e.name.as_str());
            let new_name = record.new.as_ref().map_or("", |e| e.name.as_str());
            let mut line = format!("Renamed: {} → {}", old_name, new_name);
            if !changes.is_empty() {
                line.push_str("; ");
                line.push_str(&changes);
            }
            line
        }
        ChangeStatus::Added => new_pos
            .map(|p| format!("Added at {}", format_coords(&p)))
            .unwrap_or_else(|| "Added".to_string()),
        ChangeStatus::Removed => old_pos
            .map(|p| format!("Removed from {}", format_coords(&p)))
            .unwrap_or_else(|| "Removed".to_string()),
        ChangeStatus::Unchanged => String::new(),
    }
}

/// Meters to one decimal with a trailing "m"
pub fn format_distance(meters: f64) -> String {
    format!("{:.1}m", meters)
}

pub fn format_coords(position: &Position) -> String {
    format!("({:.1},{:.1})", position.x, position.y)
}
