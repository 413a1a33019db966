//! Drawing targets for rendered frames.

use particles_bridge_common::SurfaceSize;

/// A 2D drawing target.
///
/// The interface mirrors the immediate-mode canvas the original renderer
/// draws to: stateful style setters followed by shape calls. Coordinates
/// are in pixels with the origin at the top-left corner.
pub trait DrawSurface {
    /// Clear the whole surface.
    fn clear(&mut self);

    /// Set the fill color for subsequent shapes. Colors are CSS-style
    /// strings (e.g. `"#E2F0FF"`); they are passed through verbatim.
    fn set_fill_color(&mut self, color: &str);

    /// Set the stroke color for subsequent lines.
    fn set_stroke_color(&mut self, color: &str);

    /// Set the stroke width for subsequent lines.
    fn set_line_width(&mut self, width: f64);

    /// Set the opacity applied to subsequent shapes, in `[0, 1]`.
    fn set_global_alpha(&mut self, alpha: f64);

    /// Fill a circle centered at `(x, y)`.
    fn fill_circle(&mut self, x: f64, y: f64, radius: f64);

    /// Stroke a line from `(x1, y1)` to `(x2, y2)`.
    fn stroke_line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64);

    /// The drawable area in pixels.
    fn size(&self) -> SurfaceSize;
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear,
    FillColor(String),
    StrokeColor(String),
    LineWidth(f64),
    GlobalAlpha(f64),
    Circle { x: f64, y: f64, radius: f64 },
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },
}

/// A surface that records every draw call instead of rasterizing.
///
/// Used by tests to assert on the exact draw sequence, and by headless
/// runs where the frames themselves are discarded.
#[derive(Debug)]
pub struct RecordingSurface {
    size: SurfaceSize,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            ops: Vec::new(),
        }
    }

    /// All draw calls recorded so far, in order.
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Drop all recorded draw calls.
    pub fn reset(&mut self) {
        self.ops.clear();
    }

    /// Number of circles drawn since the last reset.
    pub fn circle_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Circle { .. }))
            .count()
    }

    /// Number of lines drawn since the last reset.
    pub fn line_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Line { .. }))
            .count()
    }
}

impl DrawSurface for RecordingSurface {
    fn clear(&mut self) {
        self.ops.push(DrawOp::Clear);
    }

    fn set_fill_color(&mut self, color: &str) {
        self.ops.push(DrawOp::FillColor(color.to_string()));
    }

    fn set_stroke_color(&mut self, color: &str) {
        self.ops.push(DrawOp::StrokeColor(color.to_string()));
    }

    fn set_line_width(&mut self, width: f64) {
        self.ops.push(DrawOp::LineWidth(width));
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        self.ops.push(DrawOp::GlobalAlpha(alpha));
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64) {
        self.ops.push(DrawOp::Circle { x, y, radius });
    }

    fn stroke_line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.ops.push(DrawOp::Line { x1, y1, x2, y2 });
    }

    fn size(&self) -> SurfaceSize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_surface_preserves_order() {
        let mut surface = RecordingSurface::new(SurfaceSize::new(100, 200));

        surface.clear();
        surface.set_fill_color("#fff");
        surface.fill_circle(1.0, 2.0, 3.0);

        assert_eq!(
            surface.ops(),
            &[
                DrawOp::Clear,
                DrawOp::FillColor("#fff".to_string()),
                DrawOp::Circle {
                    x: 1.0,
                    y: 2.0,
                    radius: 3.0
                },
            ]
        );
        assert_eq!(surface.size(), SurfaceSize::new(100, 200));
    }

    #[test]
    fn test_counts_and_reset() {
        let mut surface = RecordingSurface::new(SurfaceSize::new(10, 10));
        surface.fill_circle(0.0, 0.0, 1.0);
        surface.fill_circle(5.0, 5.0, 1.0);
        surface.stroke_line(0.0, 0.0, 5.0, 5.0);

        assert_eq!(surface.circle_count(), 2);
        assert_eq!(surface.line_count(), 1);

        surface.reset();
        assert!(surface.ops().is_empty());
    }
}
