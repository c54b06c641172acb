//! Visual diff layout for one floor.
//!
//! Layout (marker placement, size, colour, arrows) is computed here as a list
//! of [`DrawCommand`]s and replayed onto any [`DrawingSurface`]. The raster
//! backend lives in [`crate::image_surface`].

use tracing::{debug, warn};
use wlandiff_common::{
    ChangeStatus, ComparisonResult, Floor, MatchResult, Position, RenderConfig, UnchangedPolicy,
};

/// Point in plan-image pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance_to(&self, other: &Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Straight RGBA colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub const fn with_alpha(self, alpha: u8) -> Self {
        let [r, g, b, _] = self.0;
        Self([r, g, b, alpha])
    }
}

/// Minimal drawing capability the renderer needs
pub trait DrawingSurface {
    /// Width and height in pixels
    fn size(&self) -> (u32, u32);

    fn draw_circle(&mut self, center: Point, radius: f32, color: Color);

    /// Straight shaft from `from` to `to` with an arrowhead of length `head` at `to`
    fn draw_arrow(&mut self, from: Point, to: Point, width: f32, head: f32, color: Color);

    fn draw_label(&mut self, at: Point, text: &str, color: Color);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Circle {
        center: Point,
        radius: f32,
        color: Color,
    },
    Arrow {
        from: Point,
        to: Point,
        width: f32,
        head: f32,
        color: Color,
    },
    Label {
        at: Point,
        text: String,
        color: Color,
    },
}

impl DrawCommand {
    pub fn apply<S: DrawingSurface + ?Sized>(&self, surface: &mut S) {
        match self {
            DrawCommand::Circle {
                center,
                radius,
                color,
            } => surface.draw_circle(*center, *radius, *color),
            DrawCommand::Arrow {
                from,
                to,
                width,
                head,
                color,
            } => surface.draw_arrow(*from, *to, *width, *head, *color),
            DrawCommand::Label { at, text, color } => surface.draw_label(*at, text, *color),
        }
    }
}

/// Marker colours per status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub added: Color,
    pub removed: Color,
    pub modified: Color,
    pub renamed: Color,
    pub moved_from: Color,
    pub moved_to: Color,
    pub move_arrow: Color,
    pub unchanged: Color,
    pub label: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            added: Color::rgb(46, 160, 67),
            removed: Color::rgb(214, 39, 40),
            modified: Color::rgb(255, 140, 0),
            renamed: Color::rgb(148, 103, 189),
            moved_from: Color::rgb(127, 127, 127),
            moved_to: Color::rgb(31, 119, 180),
            move_arrow: Color::rgb(16, 56, 96),
            unchanged: Color::rgb(120, 120, 120).with_alpha(90),
            label: Color::rgb(20, 20, 20),
        }
    }
}

/// One floor's records paired with that floor's plan
#[derive(Debug, Clone)]
pub struct FloorDiff<'a> {
    pub floor: &'a Floor,
    pub records: Vec<&'a MatchResult>,
}

impl<'a> FloorDiff<'a> {
    pub fn from_result(result: &'a ComparisonResult, floor: &'a Floor) -> Self {
        Self {
            floor,
            records: result.records_for_floor(&floor.name).collect(),
        }
    }

    pub fn change_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_change()).count()
    }

    pub fn has_changes(&self) -> bool {
        self.records.iter().any(|r| r.is_change())
    }

    /// Plan-image pixels per position unit
    pub fn image_scale(&self) -> f32 {
        match self.floor.image_scale {
            None => 1.0,
            Some(scale) if scale.is_finite() && scale > 0.0 => scale as f32,
            Some(scale) => {
                warn!(
                    "Floor '{}': ignoring invalid image scale {}, drawing 1:1",
                    self.floor.name, scale
                );
                1.0
            }
        }
    }
}

/// Computes and draws the visual diff overlay of a floor
#[derive(Debug, Clone, Default)]
pub struct VisualDiffRenderer {
    config: RenderConfig,
    palette: Palette,
}

impl VisualDiffRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            palette: Palette::default(),
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Whether a floor yields an image at all
    pub fn should_render(&self, diff: &FloorDiff<'_>) -> bool {
        diff.has_changes() || self.config.emit_unchanged_floors
    }

    /// Marker radius proportional to the image diagonal
    pub fn marker_radius(&self, width: u32, height: u32) -> f32 {
        let diagonal = (width as f64).hypot(height as f64);
        (diagonal * self.config.marker_radius_fraction).max(self.config.min_marker_radius) as f32
    }

    /// Draw commands for `diff` on an image of `size`, or `None` when the floor is skipped
    pub fn layout(&self, diff: &FloorDiff<'_>, size: (u32, u32)) -> Option<Vec<DrawCommand>> {
        if !self.should_render(diff) {
            debug!("Floor '{}': no changes, skipping render", diff.floor.name);
            return None;
        }

        let radius = self.marker_radius(size.0, size.1);
        let scale = diff.image_scale();
        let to_pixels = |p: &Position| Point::new(p.x as f32 * scale, p.y as f32 * scale);

        let mut commands = Vec::new();

        // Faint markers go underneath everything else
        if self.config.unchanged == UnchangedPolicy::Faint {
            for record in diff.records.iter().filter(|r| !r.is_change()) {
                if let Some(entity) = &record.new {
                    commands.push(DrawCommand::Circle {
                        center: to_pixels(&entity.position),
                        radius: radius * 0.6,
                        color: self.palette.unchanged,
                    });
                }
            }
        }

        for record in diff.records.iter().filter(|r| r.is_change()) {
            let old = record.old.as_ref().map(|e| to_pixels(&e.position));
            let new = record.new.as_ref().map(|e| to_pixels(&e.position));

            let anchor = match (record.status, old, new) {
                (ChangeStatus::Moved, Some(from), Some(to)) => {
                    self.push_move(&mut commands, from, to, radius);
                    Some(to)
                }
                (status, _, _) => {
                    let center = if status == ChangeStatus::Removed { old } else { new.or(old) };
                    if let Some(center) = center {
                        commands.push(DrawCommand::Circle {
                            center,
                            radius,
                            color: self.status_color(status),
                        });
                    }
                    center
                }
            };

            if self.config.show_labels {
                if let Some(at) = anchor {
                    commands.push(DrawCommand::Label {
                        at: Point::new(at.x + radius + 2.0, at.y - radius),
                        text: record.name().to_string(),
                        color: self.palette.label,
                    });
                }
            }
        }

        debug!(
            "Floor '{}': {} draw commands, marker radius {:.1}px",
            diff.floor.name,
            commands.len(),
            radius
        );
        Some(commands)
    }

    /// Replay the layout onto `surface`; returns false when the floor is skipped
    pub fn render<S: DrawingSurface + ?Sized>(&self, diff: &FloorDiff<'_>, surface: &mut S) -> bool {
        match self.layout(diff, surface.size()) {
            Some(commands) => {
                for command in &commands {
                    command.apply(surface);
                }
                true
            }
            None => false,
        }
    }

    fn push_move(&self, commands: &mut Vec<DrawCommand>, from: Point, to: Point, radius: f32) {
        commands.push(DrawCommand::Circle {
            center: from,
            radius,
            color: self.palette.moved_from,
        });
        commands.push(DrawCommand::Circle {
            center: to,
            radius,
            color: self.palette.moved_to,
        });

        let length = from.distance_to(&to);
        let head = radius * 1.2;
        let width = (radius / 3.0).max(1.0);

        // Arrow between the circle edges when the gap leaves room for the head,
        // otherwise centre to centre on top of the overlapping markers
        let (start, end, head) = if length - radius * 2.0 > head {
            let (dx, dy) = ((to.x - from.x) / length, (to.y - from.y) / length);
            (
                Point::new(from.x + dx * radius, from.y + dy * radius),
                Point::new(to.x - dx * radius, to.y - dy * radius),
                head,
            )
        } else {
            (from, to, head.min(length))
        };

        commands.push(DrawCommand::Arrow {
            from: start,
            to: end,
            width,
            head,
            color: self.palette.move_arrow,
        });
    }

    fn status_color(&self, status: ChangeStatus) -> Color {
        match status {
            ChangeStatus::Added => self.palette.added,
            ChangeStatus::Removed => self.palette.removed,
            ChangeStatus::Modified => self.palette.modified,
            ChangeStatus::Renamed => self.palette.renamed,
            ChangeStatus::Moved => self.palette.moved_to,
            ChangeStatus::Unchanged => self.palette.unchanged,
        }
    }
}

/// Tip and the two barb ends of an arrowhead at `to`, pointing away from `from`
pub fn arrowhead(from: Point, to: Point, head: f32) -> [Point; 3] {
    let length = from.distance_to(&to);
    if length <= f32::EPSILON {
        return [to, to, to];
    }
    let (dx, dy) = ((to.x - from.x) / length, (to.y - from.y) / length);
    let back = Point::new(to.x - dx * head, to.y - dy * head);
    let half = head * 0.5;
    [
        to,
        Point::new(back.x - dy * half, back.y + dx * half),
        Point::new(back.x + dy * half, back.y - dx * half),
    ]
}
