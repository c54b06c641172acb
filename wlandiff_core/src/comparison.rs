use crate::classifier::ChangeClassifier;
use crate::distance::DistanceCalculator;
use crate::matcher::{FloorEntity, Matcher};
use crate::report::ReportBuilder;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use wlandiff_common::{
    CompareConfig, ComparisonMetadata, ComparisonResult, Floor, MatchResult, MatchStrategy,
    ProjectVersion, WlanDiffError,
};

/// Comparison engine for two snapshots of a wireless design.
///
/// Holds only its configuration, so one engine can serve concurrent
/// comparisons from several threads.
#[derive(Debug, Clone, Default)]
pub struct ComparisonEngine {
    config: CompareConfig,
}

impl ComparisonEngine {
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Compare `old` against `new` and produce the ordered change report
    pub fn compare(
        &self,
        old: &ProjectVersion,
        new: &ProjectVersion,
        metadata: ComparisonMetadata,
    ) -> Result<ComparisonResult, WlanDiffError> {
        self.compare_with_cancel(old, new, metadata, None)
    }

    /// Like [`compare`](Self::compare), checking `cancel` before each floor.
    /// A cancelled run returns `Cancelled` and no partial report.
    pub fn compare_with_cancel(
        &self,
        old: &ProjectVersion,
        new: &ProjectVersion,
        metadata: ComparisonMetadata,
        cancel: Option<&AtomicBool>,
    ) -> Result<ComparisonResult, WlanDiffError> {
        self.config.validate()?;
        validate_snapshot("old", old)?;
        validate_snapshot("new", new)?;

        info!(
            "Comparing '{}' ({} entities) with '{}' ({} entities) using {} matching",
            old.name,
            old.equipment.len(),
            new.name,
            new.equipment.len(),
            self.config.match_strategy
        );

        let floors = merged_floors(old, new);
        let (old_by_floor, old_skipped) = partition_by_floor("old", old);
        let (new_by_floor, new_skipped) = partition_by_floor("new", new);

        let matcher = Matcher::new(self.config.match_strategy);
        let classifier = ChangeClassifier::new(self.config.field_epsilon);

        let mut builder = ReportBuilder::new(floors.iter().map(|f| f.name.clone()).collect());
        builder.skipped(old_skipped, new_skipped);

        for floor in &floors {
            if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                info!("Comparison cancelled before floor '{}'", floor.name);
                return Err(WlanDiffError::Cancelled);
            }

            let old_entities = old_by_floor.get(floor.name.as_str()).map_or(&[][..], Vec::as_slice);
            let new_entities = new_by_floor.get(floor.name.as_str()).map_or(&[][..], Vec::as_slice);

            builder.extend(self.compare_floor(
                floor,
                old_entities,
                new_entities,
                &matcher,
                &classifier,
            ));
        }

        let result = builder.build(metadata);
        info!(
            "Comparison complete: {} records, {} changed",
            result.changes.len(),
            result.summary.changed()
        );
        Ok(result)
    }

    fn compare_floor(
        &self,
        floor: &Floor,
        old: &[FloorEntity<'_>],
        new: &[FloorEntity<'_>],
        matcher: &Matcher,
        classifier: &ChangeClassifier,
    ) -> Vec<MatchResult> {
        let calculator = DistanceCalculator::new(floor.meters_per_unit, self.config.move_threshold_m);
        let identity_radius = calculator.meters_to_units(self.config.identity_radius());

        if !calculator.is_calibrated() && !old.is_empty() && !new.is_empty() {
            if matcher.strategy() == MatchStrategy::Name {
                warn!(
                    "Floor '{}': missing or zero calibration, distances unavailable",
                    floor.name
                );
            } else {
                warn!(
                    "Floor '{}': missing or zero calibration, distances unavailable and coordinate matching skipped",
                    floor.name
                );
            }
        }

        let matched = matcher.match_floor(&floor.name, old, new, identity_radius);

        let mut records = Vec::with_capacity(
            matched.pairs.len() + matched.unmatched_old.len() + matched.unmatched_new.len(),
        );
        for pair in &matched.pairs {
            let displacement = calculator.measure(&pair.old.position, &pair.new.position);
            records.push(classifier.classify(&floor.name, pair, &displacement));
        }
        records.extend(matched.unmatched_old.iter().map(|e| classifier.removed(&floor.name, e)));
        records.extend(matched.unmatched_new.iter().map(|e| classifier.added(&floor.name, e)));

        debug!("Floor '{}': {} records", floor.name, records.len());
        records
    }
}

/// Floors of both snapshots in report order: old order, then floors new in `new`.
///
/// Shared floors take calibration, plan image and image scale from `new`,
/// falling back to `old` for whatever `new` lacks.
pub fn merged_floors(old: &ProjectVersion, new: &ProjectVersion) -> Vec<Floor> {
    let mut floors: Vec<Floor> = old
        .floors
        .iter()
        .map(|old_floor| match new.floor(&old_floor.name) {
            Some(new_floor) => Floor {
                name: old_floor.name.clone(),
                meters_per_unit: new_floor.calibration().or(old_floor.calibration()),
                plan_image: new_floor.plan_image.clone().or_else(|| old_floor.plan_image.clone()),
                image_scale: new_floor.image_scale.or(old_floor.image_scale),
            },
            None => old_floor.clone(),
        })
        .collect();

    for new_floor in &new.floors {
        if old.floor(&new_floor.name).is_none() {
            floors.push(new_floor.clone());
        }
    }

    floors
}

fn validate_snapshot(label: &str, version: &ProjectVersion) -> Result<(), WlanDiffError> {
    let snapshot = format!("{} ('{}')", label, version.name);

    if version.floors.is_empty() {
        return Err(WlanDiffError::invalid_snapshot(snapshot, "project has no floors"));
    }

    let mut seen = HashSet::new();
    for floor in &version.floors {
        if !seen.insert(floor.name.as_str()) {
            return Err(WlanDiffError::invalid_snapshot(
                snapshot,
                format!("duplicate floor name '{}'", floor.name),
            ));
        }
    }

    Ok(())
}

/// Admit well-formed entities, grouped by floor in snapshot order.
/// Returns the groups and the number of skipped entities.
fn partition_by_floor<'a>(
    label: &str,
    version: &'a ProjectVersion,
) -> (HashMap<&'a str, Vec<FloorEntity<'a>>>, usize) {
    let mut by_floor: HashMap<&'a str, Vec<FloorEntity<'a>>> = HashMap::new();
    let mut skipped = 0;

    for (index, entity) in version.equipment.iter().enumerate() {
        let Some(floor) = entity.floor.as_deref() else {
            warn!(
                "Skipping {} entity '{}' (index {}): no floor reference",
                label, entity.name, index
            );
            skipped += 1;
            continue;
        };

        if version.floor(floor).is_none() {
            warn!(
                "Skipping {} entity '{}' (index {}): unknown floor '{}'",
                label, entity.name, index, floor
            );
            skipped += 1;
            continue;
        }

        let Some(position) = entity.position.filter(|p| p.is_finite()) else {
            warn!(
                "Skipping {} entity '{}' (index {}): missing or invalid position",
                label, entity.name, index
            );
            skipped += 1;
            continue;
        };

        by_floor.entry(floor).or_default().push(FloorEntity {
            index,
            position,
            entity,
        });
    }

    (by_floor, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wlandiff_common::{ChangeStatus, EquipmentSnapshot, Position};

    fn metadata() -> ComparisonMetadata {
        ComparisonMetadata::new("a", "b", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn version(name: &str, floors: &[(&str, Option<f64>)], equipment: Vec<EquipmentSnapshot>) -> ProjectVersion {
        ProjectVersion {
            name: name.into(),
            floors: floors.iter().map(|(n, mpu)| Floor::new(*n, *mpu)).collect(),
            equipment,
        }
    }

    #[test]
    fn test_comparison_basic() {
        let old = version(
            "v1",
            &[("L1", Some(0.05))],
            vec![EquipmentSnapshot::new("AP-1", "L1", Position::new(10.0, 10.0))],
        );
        let new = version(
            "v2",
            &[("L1", Some(0.05))],
            vec![EquipmentSnapshot::new("AP-2", "L1", Position::new(500.0, 500.0))],
        );

        let result = ComparisonEngine::default().compare(&old, &new, metadata()).unwrap();

        assert_eq!(result.changes.len(), 2);
        assert_eq!(result.changes[0].status, ChangeStatus::Removed);
        assert_eq!(result.changes[1].status, ChangeStatus::Added);
    }

    #[test]
    fn test_entities_never_cross_floors() {
        let old = version(
            "v1",
            &[("L1", Some(0.05)), ("L2", Some(0.05))],
            vec![EquipmentSnapshot::new("AP-1", "L1", Position::new(10.0, 10.0))],
        );
        let new = version(
            "v2",
            &[("L1", Some(0.05)), ("L2", Some(0.05))],
            vec![EquipmentSnapshot::new("AP-1", "L2", Position::new(10.0, 10.0))],
        );

        let result = ComparisonEngine::default().compare(&old, &new, metadata()).unwrap();

        let statuses: Vec<(&str, ChangeStatus)> = result
            .changes
            .iter()
            .map(|r| (r.floor.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![("L1", ChangeStatus::Removed), ("L2", ChangeStatus::Added)]
        );
    }

    #[test]
    fn test_malformed_entities_skipped() {
        let mut no_position = EquipmentSnapshot::new("AP-X", "L1", Position::new(0.0, 0.0));
        no_position.position = None;
        let mut no_floor = EquipmentSnapshot::new("AP-Y", "L1", Position::new(0.0, 0.0));
        no_floor.floor = None;
        let unknown_floor = EquipmentSnapshot::new("AP-Z", "Basement", Position::new(0.0, 0.0));

        let old = version(
            "v1",
            &[("L1", Some(0.05))],
            vec![
                no_position,
                EquipmentSnapshot::new("AP-1", "L1", Position::new(10.0, 10.0)),
                no_floor,
            ],
        );
        let new = version(
            "v2",
            &[("L1", Some(0.05))],
            vec![
                unknown_floor,
                EquipmentSnapshot::new("AP-1", "L1", Position::new(10.0, 10.0)),
            ],
        );

        let result = ComparisonEngine::default().compare(&old, &new, metadata()).unwrap();

        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].status, ChangeStatus::Unchanged);
        assert_eq!(result.changes[0].old.as_ref().unwrap().index, 1);
        assert_eq!(result.changes[0].new.as_ref().unwrap().index, 1);
        assert_eq!(result.summary.old_skipped, 2);
        assert_eq!(result.summary.new_skipped, 1);
    }

    #[test]
    fn test_snapshot_without_floors_is_rejected() {
        let old = version("v1", &[("L1", Some(0.05))], vec![]);
        let new = version("v2", &[], vec![]);

        let err = ComparisonEngine::default().compare(&old, &new, metadata()).unwrap_err();
        match err {
            WlanDiffError::InvalidSnapshot { snapshot, reason } => {
                assert_eq!(snapshot, "new ('v2')");
                assert!(reason.contains("no floors"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_duplicate_floor_names_rejected() {
        let old = version("v1", &[("L1", Some(0.05)), ("L1", None)], vec![]);
        let new = version("v2", &[("L1", Some(0.05))], vec![]);

        assert!(matches!(
            ComparisonEngine::default().compare(&old, &new, metadata()),
            Err(WlanDiffError::InvalidSnapshot { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let old = version("v1", &[("L1", Some(0.05))], vec![]);
        let engine = ComparisonEngine::new(CompareConfig::default().with_move_threshold(f64::INFINITY));

        assert!(matches!(
            engine.compare(&old, &old, metadata()),
            Err(WlanDiffError::Config(_))
        ));
    }

    #[test]
    fn test_cancelled_comparison_returns_no_report() {
        let old = version(
            "v1",
            &[("L1", Some(0.05))],
            vec![EquipmentSnapshot::new("AP-1", "L1", Position::new(10.0, 10.0))],
        );
        let cancel = AtomicBool::new(true);

        let result = ComparisonEngine::default().compare_with_cancel(&old, &old, metadata(), Some(&cancel));
        assert!(matches!(result, Err(WlanDiffError::Cancelled)));
    }

    #[test]
    fn test_merged_floors() {
        let mut old = version("v1", &[("L1", Some(0.05)), ("L2", None)], vec![]);
        old.floors[0].plan_image = Some("old-l1.png".into());
        let mut new = version("v2", &[("L3", Some(0.1)), ("L1", Some(0.0)), ("L2", Some(0.02))], vec![]);
        new.floors[2].image_scale = Some(2.0);

        let floors = merged_floors(&old, &new);
        let names: Vec<&str> = floors.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["L1", "L2", "L3"]);

        assert_eq!(floors[0].meters_per_unit, Some(0.05));
        assert_eq!(floors[0].plan_image.as_deref(), Some(std::path::Path::new("old-l1.png")));
        assert_eq!(floors[1].meters_per_unit, Some(0.02));
        assert_eq!(floors[1].image_scale, Some(2.0));
        assert_eq!(floors[2].meters_per_unit, Some(0.1));
    }

    #[test]
    fn test_uncalibrated_floor_matches_by_name_only() {
        let old = version(
            "v1",
            &[("L1", None)],
            vec![
                EquipmentSnapshot::new("AP-1", "L1", Position::new(10.0, 10.0)),
                EquipmentSnapshot::new("AP-OLD", "L1", Position::new(50.0, 50.0)),
            ],
        );
        let new = version(
            "v2",
            &[("L1", None)],
            vec![
                EquipmentSnapshot::new("AP-1", "L1", Position::new(900.0, 10.0)),
                EquipmentSnapshot::new("AP-NEW", "L1", Position::new(50.0, 50.0)),
            ],
        );

        let result = ComparisonEngine::default().compare(&old, &new, metadata()).unwrap();
        let statuses: Vec<ChangeStatus> = result.changes.iter().map(|r| r.status).collect();

        assert_eq!(
            statuses,
            vec![ChangeStatus::Unchanged, ChangeStatus::Removed, ChangeStatus::Added]
        );
        assert_eq!(result.changes[0].distance_moved, None);
    }
}
