use crate::distance::Displacement;
use crate::matcher::{FloorEntity, MatchedPair};
use wlandiff_common::{
    Band, ChangeStatus, EntityRef, EquipmentSnapshot, FieldCategory, FieldChange, FieldValue,
    MatchMethod, MatchResult,
};

/// Diffs the tracked field schema of matched pairs and assigns a status
#[derive(Debug, Clone, Copy)]
pub struct ChangeClassifier {
    epsilon: f64,
}

impl Default for ChangeClassifier {
    fn default() -> Self {
        Self { epsilon: 0.01 }
    }
}

impl ChangeClassifier {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Classify a matched pair.
    ///
    /// Status order: renamed (coordinate match with differing names), moved,
    /// modified, unchanged. Field changes are kept whatever the status.
    pub fn classify(
        &self,
        floor: &str,
        pair: &MatchedPair<'_>,
        displacement: &Displacement,
    ) -> MatchResult {
        let field_changes = self.diff_fields(pair.old.entity, pair.new.entity);

        let status = if pair.method == MatchMethod::Coordinates && pair.old.name() != pair.new.name()
        {
            ChangeStatus::Renamed
        } else if displacement.exceeds_threshold {
            ChangeStatus::Moved
        } else if !field_changes.is_empty() {
            ChangeStatus::Modified
        } else {
            ChangeStatus::Unchanged
        };

        MatchResult {
            floor: floor.to_string(),
            old: Some(entity_ref(&pair.old)),
            new: Some(entity_ref(&pair.new)),
            status,
            matched_by: Some(pair.method),
            distance_moved: displacement.reported_meters(),
            field_changes,
        }
    }

    pub fn removed(&self, floor: &str, entity: &FloorEntity<'_>) -> MatchResult {
        MatchResult {
            floor: floor.to_string(),
            old: Some(entity_ref(entity)),
            new: None,
            status: ChangeStatus::Removed,
            matched_by: None,
            distance_moved: None,
            field_changes: Vec::new(),
        }
    }

    pub fn added(&self, floor: &str, entity: &FloorEntity<'_>) -> MatchResult {
        MatchResult {
            floor: floor.to_string(),
            old: None,
            new: Some(entity_ref(entity)),
            status: ChangeStatus::Added,
            matched_by: None,
            distance_moved: None,
            field_changes: Vec::new(),
        }
    }

    /// Every differing tracked field, in schema order: radio bands, placement, configuration
    pub fn diff_fields(&self, old: &EquipmentSnapshot, new: &EquipmentSnapshot) -> Vec<FieldChange> {
        let mut diff = FieldDiff {
            epsilon: self.epsilon,
            changes: Vec::new(),
        };

        for band in Band::ALL {
            let (old_radio, new_radio) = (old.radio(band), new.radio(band));
            if old_radio.is_none() && new_radio.is_none() {
                continue;
            }

            diff.integer(
                format!("{}_channel", band),
                FieldCategory::Radio,
                old_radio.and_then(|r| r.channel),
                new_radio.and_then(|r| r.channel),
            );
            diff.number(
                format!("{}_tx_power", band),
                FieldCategory::Radio,
                old_radio.and_then(|r| r.tx_power),
                new_radio.and_then(|r| r.tx_power),
            );
            diff.integer(
                format!("{}_channel_width", band),
                FieldCategory::Radio,
                old_radio.and_then(|r| r.channel_width),
                new_radio.and_then(|r| r.channel_width),
            );
            diff.text(
                format!("{}_antenna", band),
                FieldCategory::Radio,
                old_radio.and_then(|r| r.antenna.as_deref()),
                new_radio.and_then(|r| r.antenna.as_deref()),
            );
        }

        let (op, np) = (&old.placement, &new.placement);
        diff.number("mounting_height".into(), FieldCategory::Placement, op.mounting_height, np.mounting_height);
        diff.number("azimuth".into(), FieldCategory::Placement, op.azimuth, np.azimuth);
        diff.number("tilt".into(), FieldCategory::Placement, op.tilt, np.tilt);

        let (oc, nc) = (&old.config, &new.config);
        diff.text("vendor".into(), FieldCategory::Configuration, oc.vendor.as_deref(), nc.vendor.as_deref());
        diff.text("model".into(), FieldCategory::Configuration, oc.model.as_deref(), nc.model.as_deref());
        diff.text("color".into(), FieldCategory::Configuration, oc.color.as_deref(), nc.color.as_deref());
        if oc.tags != nc.tags {
            diff.push(
                "tags".into(),
                FieldCategory::Configuration,
                FieldValue::Tags(oc.tags.iter().cloned().collect()),
                FieldValue::Tags(nc.tags.iter().cloned().collect()),
            );
        }
        if oc.enabled != nc.enabled {
            diff.push(
                "enabled".into(),
                FieldCategory::Configuration,
                FieldValue::Flag(oc.enabled),
                FieldValue::Flag(nc.enabled),
            );
        }

        diff.changes
    }
}

fn entity_ref(entity: &FloorEntity<'_>) -> EntityRef {
    EntityRef {
        index: entity.index,
        name: entity.name().to_string(),
        position: entity.position,
    }
}

struct FieldDiff {
    epsilon: f64,
    changes: Vec<FieldChange>,
}

impl FieldDiff {
    fn push(&mut self, field: String, category: FieldCategory, old: FieldValue, new: FieldValue) {
        self.changes.push(FieldChange {
            field,
            category,
            old,
            new,
        });
    }

    fn number(&mut self, field: String, category: FieldCategory, old: Option<f64>, new: Option<f64>) {
        let differs = match (old, new) {
            (Some(a), Some(b)) => (a - b).abs() > self.epsilon,
            (None, None) => false,
            _ => true,
        };
        if differs {
            self.push(field, category, number_value(old), number_value(new));
        }
    }

    fn integer(&mut self, field: String, category: FieldCategory, old: Option<u32>, new: Option<u32>) {
        if old != new {
            self.push(field, category, integer_value(old), integer_value(new));
        }
    }

    fn text(&mut self, field: String, category: FieldCategory, old: Option<&str>, new: Option<&str>) {
        if old != new {
            self.push(field, category, text_value(old), text_value(new));
        }
    }
}

fn number_value(value: Option<f64>) -> FieldValue {
    value.map_or(FieldValue::Missing, FieldValue::Number)
}

fn integer_value(value: Option<u32>) -> FieldValue {
    value.map_or(FieldValue::Missing, |v| FieldValue::Integer(i64::from(v)))
}

fn text_value(value: Option<&str>) -> FieldValue {
    value.map_or(FieldValue::Missing, |v| FieldValue::Text(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceCalculator;
    use wlandiff_common::{Position, RadioSettings};

    fn ap(name: &str, x: f64, y: f64) -> EquipmentSnapshot {
        EquipmentSnapshot::new(name, "L1", Position::new(x, y))
    }

    fn radio_5ghz(tx_power: f64) -> RadioSettings {
        RadioSettings {
            channel: Some(36),
            tx_power: Some(tx_power),
            channel_width: Some(40),
            ..RadioSettings::new(Band::Ghz5)
        }
    }

    fn pair<'a>(
        old: &'a EquipmentSnapshot,
        new: &'a EquipmentSnapshot,
        method: MatchMethod,
    ) -> MatchedPair<'a> {
        MatchedPair {
            old: FloorEntity {
                index: 0,
                position: old.position.unwrap(),
                entity: old,
            },
            new: FloorEntity {
                index: 0,
                position: new.position.unwrap(),
                entity: new,
            },
            method,
        }
    }

    fn classify(old: &EquipmentSnapshot, new: &EquipmentSnapshot, method: MatchMethod) -> MatchResult {
        let calc = DistanceCalculator::new(Some(0.0215), 0.5);
        let p = pair(old, new, method);
        let displacement = calc.measure(&p.old.position, &p.new.position);
        ChangeClassifier::default().classify("L1", &p, &displacement)
    }

    #[test]
    fn test_unchanged() {
        let old = ap("AP-1", 10.0, 10.0);
        let result = classify(&old, &old.clone(), MatchMethod::Name);

        assert_eq!(result.status, ChangeStatus::Unchanged);
        assert!(result.field_changes.is_empty());
        assert_eq!(result.distance_moved, Some(0.0));
    }

    #[test]
    fn test_tx_power_change_is_modified() {
        let old = ap("AP-1", 10.0, 10.0).with_radio(radio_5ghz(5.0));
        let new = ap("AP-1", 10.5, 10.0).with_radio(radio_5ghz(8.0));

        let result = classify(&old, &new, MatchMethod::Name);

        assert_eq!(result.status, ChangeStatus::Modified);
        assert_eq!(
            result.field_changes,
            vec![FieldChange {
                field: "5GHz_tx_power".into(),
                category: FieldCategory::Radio,
                old: FieldValue::Number(5.0),
                new: FieldValue::Number(8.0),
            }]
        );
    }

    #[test]
    fn test_epsilon_suppresses_noise() {
        let old = ap("AP-1", 10.0, 10.0).with_radio(radio_5ghz(5.0));
        let new = ap("AP-1", 10.0, 10.0).with_radio(radio_5ghz(5.005));

        let result = classify(&old, &new, MatchMethod::Name);
        assert_eq!(result.status, ChangeStatus::Unchanged);
    }

    #[test]
    fn test_moved_keeps_field_changes() {
        let old = ap("AP-1", 685.6, 127.3).with_radio(radio_5ghz(5.0));
        let mut new = ap("AP-1", 833.8, 109.3).with_radio(radio_5ghz(8.0));
        new.placement.azimuth = Some(90.0);

        let result = classify(&old, &new, MatchMethod::Name);

        assert_eq!(result.status, ChangeStatus::Moved);
        assert_eq!(result.distance_moved, Some(3.21));
        let fields: Vec<&str> = result.field_changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["5GHz_tx_power", "azimuth"]);
    }

    #[test]
    fn test_coordinate_match_with_new_name_is_renamed() {
        let old = ap("AP-OLD", 10.0, 10.0);
        let new = ap("AP-NEW", 10.0, 10.0);

        let result = classify(&old, &new, MatchMethod::Coordinates);
        assert_eq!(result.status, ChangeStatus::Renamed);
        assert_eq!(result.name(), "AP-NEW");
    }

    #[test]
    fn test_coordinate_match_with_same_name_is_not_renamed() {
        let old = ap("AP-1", 10.0, 10.0);
        let new = ap("AP-1", 10.0, 10.0);

        let result = classify(&old, &new, MatchMethod::Coordinates);
        assert_eq!(result.status, ChangeStatus::Unchanged);
    }

    #[test]
    fn test_uncalibrated_move_falls_back_to_modified() {
        let old = ap("AP-1", 0.0, 0.0);
        let mut new = ap("AP-1", 5000.0, 0.0);
        new.config.vendor = Some("Aruba".into());

        let calc = DistanceCalculator::new(None, 0.5);
        let p = pair(&old, &new, MatchMethod::Name);
        let displacement = calc.measure(&p.old.position, &p.new.position);
        let result = ChangeClassifier::default().classify("L1", &p, &displacement);

        assert_eq!(result.status, ChangeStatus::Modified);
        assert_eq!(result.distance_moved, None);
    }

    #[test]
    fn test_configuration_and_radio_presence_fields() {
        let old = ap("AP-1", 0.0, 0.0);
        let mut new = ap("AP-1", 0.0, 0.0).with_radio(RadioSettings {
            channel: Some(6),
            ..RadioSettings::new(Band::Ghz2_4)
        });
        new.config.tags.insert("lobby".into());
        new.config.enabled = false;
        new.config.model = Some("AP-515".into());

        let changes = ChangeClassifier::default().diff_fields(&old, &new);
        let summary: Vec<(&str, &FieldValue, &FieldValue)> = changes
            .iter()
            .map(|c| (c.field.as_str(), &c.old, &c.new))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("2.4GHz_channel", &FieldValue::Missing, &FieldValue::Integer(6)),
                ("model", &FieldValue::Missing, &FieldValue::Text("AP-515".into())),
                ("tags", &FieldValue::Tags(vec![]), &FieldValue::Tags(vec!["lobby".into()])),
                ("enabled", &FieldValue::Flag(true), &FieldValue::Flag(false)),
            ]
        );
        assert_eq!(changes[0].category, FieldCategory::Radio);
        assert_eq!(changes[1].category, FieldCategory::Configuration);
    }

    #[test]
    fn test_unmatched_records() {
        let entity = ap("AP-999", 1.0, 2.0);
        let floor_entity = FloorEntity {
            index: 4,
            position: entity.position.unwrap(),
            entity: &entity,
        };
        let classifier = ChangeClassifier::default();

        let added = classifier.added("L1", &floor_entity);
        assert_eq!(added.status, ChangeStatus::Added);
        assert!(added.old.is_none());
        assert_eq!(added.new.as_ref().unwrap().index, 4);
        assert!(added.distance_moved.is_none());
        assert!(added.field_changes.is_empty());

        let removed = classifier.removed("L1", &floor_entity);
        assert_eq!(removed.status, ChangeStatus::Removed);
        assert!(removed.new.is_none());
    }
}
