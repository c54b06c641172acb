use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Location on a floor plan, in plan units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in plan units
    pub fn distance_to(&self, other: &Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Radio band a set of settings applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[serde(rename = "5GHz")]
    Ghz5,
    #[serde(rename = "6GHz")]
    Ghz6,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Ghz2_4, Band::Ghz5, Band::Ghz6];

    pub fn label(&self) -> &'static str {
        match self {
            Band::Ghz2_4 => "2.4GHz",
            Band::Ghz5 => "5GHz",
            Band::Ghz6 => "6GHz",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-band radio settings of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioSettings {
    pub band: Band,
    #[serde(default)]
    pub channel: Option<u32>,
    /// Transmit power in dBm
    #[serde(default)]
    pub tx_power: Option<f64>,
    /// Channel width in MHz
    #[serde(default)]
    pub channel_width: Option<u32>,
    #[serde(default)]
    pub antenna: Option<String>,
}

impl RadioSettings {
    pub fn new(band: Band) -> Self {
        Self {
            band,
            channel: None,
            tx_power: None,
            channel_width: None,
            antenna: None,
        }
    }
}

/// Physical mounting of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Mounting height in meters
    #[serde(default)]
    pub mounting_height: Option<f64>,
    /// Azimuth in degrees
    #[serde(default)]
    pub azimuth: Option<f64>,
    /// Tilt in degrees
    #[serde(default)]
    pub tilt: Option<f64>,
}

/// Vendor and bookkeeping attributes of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentConfig {
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for EquipmentConfig {
    fn default() -> Self {
        Self {
            vendor: None,
            model: None,
            color: None,
            tags: BTreeSet::new(),
            enabled: true,
        }
    }
}

/// One placed radio device within one project version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSnapshot {
    /// Display name, not guaranteed unique
    pub name: String,
    /// Floor the device sits on; `None` marks a malformed entity
    #[serde(default)]
    pub floor: Option<String>,
    /// Position in floor-plan units; `None` marks a malformed entity
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub radios: Vec<RadioSettings>,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub config: EquipmentConfig,
}

impl EquipmentSnapshot {
    pub fn new(name: impl Into<String>, floor: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            floor: Some(floor.into()),
            position: Some(position),
            radios: Vec::new(),
            placement: Placement::default(),
            config: EquipmentConfig::default(),
        }
    }

    pub fn with_radio(mut self, radio: RadioSettings) -> Self {
        self.radios.retain(|r| r.band != radio.band);
        self.radios.push(radio);
        self
    }

    pub fn radio(&self, band: Band) -> Option<&RadioSettings> {
        self.radios.iter().find(|r| r.band == band)
    }
}

/// A named floor plan with its calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    pub name: String,
    /// Real-world meters represented by one position unit
    #[serde(default)]
    pub meters_per_unit: Option<f64>,
    /// Plan image on disk, used only for rendering
    #[serde(default)]
    pub plan_image: Option<PathBuf>,
    /// Plan-image pixels per position unit; absent means 1:1
    #[serde(default)]
    pub image_scale: Option<f64>,
}

impl Floor {
    pub fn new(name: impl Into<String>, meters_per_unit: Option<f64>) -> Self {
        Self {
            name: name.into(),
            meters_per_unit,
            plan_image: None,
            image_scale: None,
        }
    }

    /// Calibration factor, if present and usable
    pub fn calibration(&self) -> Option<f64> {
        self.meters_per_unit.filter(|m| m.is_finite() && *m > 0.0)
    }
}

/// One loaded project snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVersion {
    pub name: String,
    #[serde(default)]
    pub floors: Vec<Floor>,
    #[serde(default)]
    pub equipment: Vec<EquipmentSnapshot>,
}

impl ProjectVersion {
    pub fn floor(&self, name: &str) -> Option<&Floor> {
        self.floors.iter().find(|f| f.name == name)
    }
}

/// How entities are correlated between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Exact name equality only
    Name,
    /// Spatial proximity only
    Coordinates,
    /// Names first, then proximity for the leftovers
    #[default]
    Combined,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Name => "name",
            MatchStrategy::Coordinates => "coordinates",
            MatchStrategy::Combined => "combined",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(MatchStrategy::Name),
            "coordinates" | "coords" => Ok(MatchStrategy::Coordinates),
            "combined" => Ok(MatchStrategy::Combined),
            other => Err(format!(
                "unknown match strategy '{}' (expected name, coordinates or combined)",
                other
            )),
        }
    }
}

/// Phase of the matcher that produced a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Name,
    Coordinates,
}

/// Final classification of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Present only in the new snapshot
    Added,
    /// Present only in the old snapshot
    Removed,
    /// Tracked fields differ
    Modified,
    /// Displacement exceeds the move threshold
    Moved,
    /// Correlated by location under a different name
    Renamed,
    Unchanged,
}

impl ChangeStatus {
    pub const ALL: [ChangeStatus; 6] = [
        ChangeStatus::Added,
        ChangeStatus::Removed,
        ChangeStatus::Modified,
        ChangeStatus::Moved,
        ChangeStatus::Renamed,
        ChangeStatus::Unchanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Removed => "removed",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Moved => "moved",
            ChangeStatus::Renamed => "renamed",
            ChangeStatus::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group a tracked field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldCategory {
    Radio,
    Placement,
    Configuration,
}

/// Value of a tracked field as it appears in a change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Field not set on this side
    Missing,
    Flag(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Tags(Vec<String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Missing => f.write_str("none"),
            FieldValue::Flag(value) => write!(f, "{}", value),
            FieldValue::Integer(value) => write!(f, "{}", value),
            // Debug keeps the fractional part of whole numbers ("5.0")
            FieldValue::Number(value) => write!(f, "{:?}", value),
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Tags(tags) => write!(f, "[{}]", tags.join(",")),
        }
    }
}

/// One differing tracked field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub category: FieldCategory,
    pub old: FieldValue,
    pub new: FieldValue,
}

/// Reference to an entity inside its own snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Index in the snapshot's equipment list
    pub index: usize,
    pub name: String,
    pub position: Position,
}

/// Relationship between an old entity and a new entity, or the absence of one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub floor: String,
    pub old: Option<EntityRef>,
    pub new: Option<EntityRef>,
    pub status: ChangeStatus,
    /// Matcher phase that correlated the pair; `None` for added/removed
    pub matched_by: Option<MatchMethod>,
    /// Real-world displacement in meters, when calibration allows it.
    ///
    /// Rounded to centimetres for display. The status compares the unrounded
    /// value against the threshold, so a `moved` record may report exactly the
    /// threshold (0.504 m against 0.5 m reads as 0.5).
    pub distance_moved: Option<f64>,
    pub field_changes: Vec<FieldChange>,
}

impl MatchResult {
    /// Name shown for the record: the new name when one exists
    pub fn name(&self) -> &str {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(|e| e.name.as_str())
            .unwrap_or_default()
    }

    pub fn is_change(&self) -> bool {
        self.status != ChangeStatus::Unchanged
    }
}

/// Aggregate counts over a comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Records carrying an old entity (matched + removed)
    pub old_total: usize,
    /// Records carrying a new entity (matched + added)
    pub new_total: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub moved: usize,
    pub renamed: usize,
    pub unchanged: usize,
    /// Malformed old entities left out of matching
    #[serde(default)]
    pub old_skipped: usize,
    /// Malformed new entities left out of matching
    #[serde(default)]
    pub new_skipped: usize,
}

impl Summary {
    pub fn record(&mut self, result: &MatchResult) {
        if result.old.is_some() {
            self.old_total += 1;
        }
        if result.new.is_some() {
            self.new_total += 1;
        }
        *self.count_mut(result.status) += 1;
    }

    pub fn count(&self, status: ChangeStatus) -> usize {
        match status {
            ChangeStatus::Added => self.added,
            ChangeStatus::Removed => self.removed,
            ChangeStatus::Modified => self.modified,
            ChangeStatus::Moved => self.moved,
            ChangeStatus::Renamed => self.renamed,
            ChangeStatus::Unchanged => self.unchanged,
        }
    }

    fn count_mut(&mut self, status: ChangeStatus) -> &mut usize {
        match status {
            ChangeStatus::Added => &mut self.added,
            ChangeStatus::Removed => &mut self.removed,
            ChangeStatus::Modified => &mut self.modified,
            ChangeStatus::Moved => &mut self.moved,
            ChangeStatus::Renamed => &mut self.renamed,
            ChangeStatus::Unchanged => &mut self.unchanged,
        }
    }

    /// Number of records whose status is not `unchanged`
    pub fn changed(&self) -> usize {
        self.added + self.removed + self.modified + self.moved + self.renamed
    }
}

/// Identifies the two snapshots of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetadata {
    pub project_a_name: String,
    pub project_b_name: String,
    pub timestamp: DateTime<Utc>,
}

impl ComparisonMetadata {
    pub fn new(
        project_a_name: impl Into<String>,
        project_b_name: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            project_a_name: project_a_name.into(),
            project_b_name: project_b_name.into(),
            timestamp,
        }
    }

    pub fn now(project_a_name: impl Into<String>, project_b_name: impl Into<String>) -> Self {
        Self::new(project_a_name, project_b_name, Utc::now())
    }
}

/// Reconciled change report between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub metadata: ComparisonMetadata,
    pub summary: Summary,
    /// Floor names in report order
    pub floors: Vec<String>,
    /// Records grouped by floor, then by originating index
    pub changes: Vec<MatchResult>,
}

impl ComparisonResult {
    pub fn records_for_floor<'a>(
        &'a self,
        floor: &'a str,
    ) -> impl Iterator<Item = &'a MatchResult> + 'a {
        self.changes.iter().filter(move |r| r.floor == floor)
    }
}

/// What to do with unchanged entities on a rendered plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnchangedPolicy {
    #[default]
    Hidden,
    Faint,
}

/// Parameters of one comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    #[serde(default)]
    pub match_strategy: MatchStrategy,

    /// Minimum real-world displacement, in meters, reported as a move
    #[serde(default = "default_move_threshold")]
    pub move_threshold_m: f64,

    /// "Same location" tolerance for coordinate matching, in meters.
    /// Falls back to the move threshold.
    #[serde(default)]
    pub identity_radius_m: Option<f64>,

    /// Tolerance below which numeric field differences are ignored
    #[serde(default = "default_field_epsilon")]
    pub field_epsilon: f64,
}

fn default_move_threshold() -> f64 {
    0.5
}

fn default_field_epsilon() -> f64 {
    0.01
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            match_strategy: MatchStrategy::default(),
            move_threshold_m: default_move_threshold(),
            identity_radius_m: None,
            field_epsilon: default_field_epsilon(),
        }
    }
}

impl CompareConfig {
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.match_strategy = strategy;
        self
    }

    pub fn with_move_threshold(mut self, meters: f64) -> Self {
        self.move_threshold_m = meters;
        self
    }

    pub fn with_identity_radius(mut self, meters: f64) -> Self {
        self.identity_radius_m = Some(meters);
        self
    }

    /// Effective identity radius in meters
    pub fn identity_radius(&self) -> f64 {
        self.identity_radius_m.unwrap_or(self.move_threshold_m)
    }

    pub fn validate(&self) -> crate::Result<()> {
        check_non_negative("move_threshold_m", self.move_threshold_m)?;
        check_non_negative("identity_radius_m", self.identity_radius())?;
        check_non_negative("field_epsilon", self.field_epsilon)?;
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> crate::Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(crate::WlanDiffError::Config(format!(
            "{} must be a finite, non-negative number (got {})",
            name, value
        )));
    }
    Ok(())
}

/// Layout options for visual diffs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub unchanged: UnchangedPolicy,

    /// Emit an image even when a floor has no changes
    #[serde(default)]
    pub emit_unchanged_floors: bool,

    /// Marker radius as a fraction of the plan image diagonal
    #[serde(default = "default_marker_radius_fraction")]
    pub marker_radius_fraction: f64,

    /// Lower bound for the marker radius, in pixels
    #[serde(default = "default_min_marker_radius")]
    pub min_marker_radius: f64,

    /// Draw entity names next to markers
    #[serde(default)]
    pub show_labels: bool,
}

fn default_marker_radius_fraction() -> f64 {
    0.008
}

fn default_min_marker_radius() -> f64 {
    4.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            unchanged: UnchangedPolicy::default(),
            emit_unchanged_floors: false,
            marker_radius_fraction: default_marker_radius_fraction(),
            min_marker_radius: default_min_marker_radius(),
            show_labels: false,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub compare: CompareConfig,

    #[serde(default)]
    pub render: RenderConfig,
}
