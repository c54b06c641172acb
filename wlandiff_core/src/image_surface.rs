use crate::render::{arrowhead, Color, DrawingSurface, FloorDiff, Point, VisualDiffRenderer};
use image::{DynamicImage, Rgba, RgbaImage};
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};
use wlandiff_common::{ComparisonResult, Floor, WlanDiffError};

/// Raster drawing surface over an RGBA image
pub struct ImageSurface {
    image: RgbaImage,
}

impl ImageSurface {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::new(image.to_rgba8())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pixel range covering `[min, max]`, clipped to the image
    fn span(&self, min: f32, max: f32, limit: u32) -> Option<(u32, u32)> {
        if limit == 0 || max < 0.0 || min >= limit as f32 {
            return None;
        }
        let start = min.floor().max(0.0) as u32;
        let end = (max.ceil() as u32).min(limit - 1);
        Some((start, end))
    }

    fn fill_where(&mut self, min: Point, max: Point, color: Color, inside: impl Fn(Point) -> bool) {
        let (width, height) = self.image.dimensions();
        let (Some((x0, x1)), Some((y0, y1))) =
            (self.span(min.x, max.x, width), self.span(min.y, max.y, height))
        else {
            return;
        };

        for y in y0..=y1 {
            for x in x0..=x1 {
                // Sample at the pixel centre
                if inside(Point::new(x as f32 + 0.5, y as f32 + 0.5)) {
                    let pixel = self.image.get_pixel_mut(x, y);
                    *pixel = blend(*pixel, color);
                }
            }
        }
    }
}

impl DrawingSurface for ImageSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn draw_circle(&mut self, center: Point, radius: f32, color: Color) {
        let r2 = radius * radius;
        self.fill_where(
            Point::new(center.x - radius, center.y - radius),
            Point::new(center.x + radius, center.y + radius),
            color,
            |p| {
                let (dx, dy) = (p.x - center.x, p.y - center.y);
                dx * dx + dy * dy <= r2
            },
        );
    }

    fn draw_arrow(&mut self, from: Point, to: Point, width: f32, head: f32, color: Color) {
        let [tip, left, right] = arrowhead(from, to, head);
        // Shaft stops at the base of the head so the two never double-blend
        let base = Point::new((left.x + right.x) / 2.0, (left.y + right.y) / 2.0);
        let half = width / 2.0;

        self.fill_where(
            Point::new(from.x.min(base.x) - half, from.y.min(base.y) - half),
            Point::new(from.x.max(base.x) + half, from.y.max(base.y) + half),
            color,
            |p| segment_distance(p, from, base) <= half,
        );

        self.fill_where(
            Point::new(tip.x.min(left.x).min(right.x), tip.y.min(left.y).min(right.y)),
            Point::new(tip.x.max(left.x).max(right.x), tip.y.max(left.y).max(right.y)),
            color,
            |p| in_triangle(p, tip, left, right),
        );
    }

    fn draw_label(&mut self, _at: Point, text: &str, _color: Color) {
        // No font backend is bundled; labels are dropped on raster output
        debug!("Skipping label '{}' on raster surface", text);
    }
}

fn blend(dst: Rgba<u8>, color: Color) -> Rgba<u8> {
    let [r, g, b, a] = color.0;
    let alpha = a as f32 / 255.0;
    let mix = |src: u8, dst: u8| (src as f32 * alpha + dst as f32 * (1.0 - alpha)).round() as u8;
    Rgba([
        mix(r, dst[0]),
        mix(g, dst[1]),
        mix(b, dst[2]),
        dst[3].max(a),
    ])
}

fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let len2 = abx * abx + aby * aby;
    let t = if len2 <= f32::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + abx * t, a.y + aby * t);
    (p.x - cx).hypot(p.y - cy)
}

fn in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let edge = |u: Point, v: Point| (v.x - u.x) * (p.y - u.y) - (v.y - u.y) * (p.x - u.x);
    let (d1, d2, d3) = (edge(a, b), edge(b, c), edge(c, a));
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// A rendered visual diff for one floor
#[derive(Debug, Clone)]
pub struct RenderedFloor {
    pub floor: String,
    pub image: RgbaImage,
}

/// Render one floor onto its plan image.
///
/// `Ok(None)` when the floor is skipped or has no plan image on disk. A plan
/// file that exists but cannot be decoded is a `Render` error.
pub fn render_floor_plan(
    renderer: &VisualDiffRenderer,
    diff: &FloorDiff<'_>,
) -> Result<Option<RgbaImage>, WlanDiffError> {
    if !renderer.should_render(diff) {
        return Ok(None);
    }

    let Some(path) = diff.floor.plan_image.as_deref() else {
        warn!("Floor '{}': no plan image, visual diff omitted", diff.floor.name);
        return Ok(None);
    };
    if !path.is_file() {
        warn!(
            "Floor '{}': plan image {} not found, visual diff omitted",
            diff.floor.name,
            path.display()
        );
        return Ok(None);
    }

    let plan = load_plan(path)?;
    let mut surface = ImageSurface::from_dynamic(&plan);
    if !renderer.render(diff, &mut surface) {
        return Ok(None);
    }
    Ok(Some(surface.into_image()))
}

fn load_plan(path: &Path) -> Result<DynamicImage, WlanDiffError> {
    image::open(path)
        .map_err(|e| WlanDiffError::Render(format!("cannot load plan image {}: {}", path.display(), e)))
}

/// Render every floor of `result` on the rayon pool, in floor order.
///
/// Floors whose plan cannot be rendered are logged and left out; the data
/// report is never affected.
///
/// Run inside `ThreadPool::install` to keep rendering off a caller's own pool.
pub fn render_floors(
    renderer: &VisualDiffRenderer,
    result: &ComparisonResult,
    floors: &[Floor],
) -> Vec<RenderedFloor> {
    let rendered: Vec<RenderedFloor> = floors
        .par_iter()
        .filter_map(|floor| {
            let diff = FloorDiff::from_result(result, floor);
            match render_floor_plan(renderer, &diff) {
                Ok(Some(image)) => Some(RenderedFloor {
                    floor: floor.name.clone(),
                    image,
                }),
                Ok(None) => None,
                Err(e) => {
                    warn!("Floor '{}': render failed: {}", floor.name, e);
                    None
                }
            }
        })
        .collect();

    info!("Rendered {} of {} floors", rendered.len(), floors.len());
    rendered
}
