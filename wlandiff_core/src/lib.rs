pub mod artifact;
pub mod classifier;
pub mod comparison;
pub mod distance;
#[cfg(feature = "image-surface")]
pub mod image_surface;
pub mod matcher;
pub mod render;
pub mod report;

pub use artifact::{ChangeRecord, ComparisonArtifact};
pub use classifier::ChangeClassifier;
pub use comparison::{merged_floors, ComparisonEngine};
pub use distance::{Displacement, DistanceCalculator};
#[cfg(feature = "image-surface")]
pub use image_surface::{render_floor_plan, render_floors, ImageSurface, RenderedFloor};
pub use matcher::{FloorEntity, FloorMatch, MatchedPair, Matcher};
pub use render::{Color, DrawCommand, DrawingSurface, FloorDiff, Palette, Point, VisualDiffRenderer};
pub use report::{describe, ReportBuilder};
