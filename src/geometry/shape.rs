//! Vehicle outlines
//!
//! Shapes are defined in the body frame (x along the heading) and drawn as
//! closed 2-row polylines at a sampled pose.

use std::f64::consts::PI;

use itertools::Itertools;
use nalgebra::DMatrix;

use crate::common::{PlanningError, PlanningResult, Pose2D};

/// Number of segments used to draw a circle
const CIRCLE_RESOLUTION: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle { radius: f64 },
    Square { side: f64 },
    /// `width` along the heading, `height` across it
    Rectangle { width: f64, height: f64 },
    Polygon { vertices: Vec<(f64, f64)> },
}

impl Shape {
    pub fn circle(radius: f64) -> Self {
        Shape::Circle { radius }
    }

    pub fn square(side: f64) -> Self {
        Shape::Square { side }
    }

    pub fn rectangle(width: f64, height: f64) -> Self {
        Shape::Rectangle { width, height }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Circle { .. } => "circle",
            Shape::Square { .. } => "square",
            Shape::Rectangle { .. } => "rectangle",
            Shape::Polygon { .. } => "polygon",
        }
    }

    /// Radius of the circumscribed circle
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle { radius } => *radius,
            Shape::Square { side } => side * 0.5 * 2f64.sqrt(),
            Shape::Rectangle { width, height } => 0.5 * width.hypot(*height),
            Shape::Polygon { vertices } => vertices
                .iter()
                .map(|(x, y)| x.hypot(*y))
                .fold(0.0, f64::max),
        }
    }

    /// Distance from the center along the heading where a hitch bar starts
    pub fn connector_offset(&self) -> PlanningResult<f64> {
        match self {
            Shape::Circle { .. } | Shape::Square { .. } => Ok(self.radius()),
            Shape::Rectangle { width, .. } => Ok(0.5 * width),
            other => Err(PlanningError::UnsupportedShape(format!(
                "no connector sizing rule for {}",
                other.kind()
            ))),
        }
    }

    /// Body-frame outline vertices, not closed
    fn body_vertices(&self) -> Vec<(f64, f64)> {
        let box_vertices = |w: f64, h: f64| {
            vec![
                (0.5 * w, 0.5 * h),
                (-0.5 * w, 0.5 * h),
                (-0.5 * w, -0.5 * h),
                (0.5 * w, -0.5 * h),
            ]
        };
        match self {
            Shape::Circle { radius } => (0..CIRCLE_RESOLUTION)
                .map(|i| {
                    let a = 2.0 * PI * i as f64 / CIRCLE_RESOLUTION as f64;
                    (radius * a.cos(), radius * a.sin())
                })
                .collect(),
            Shape::Square { side } => box_vertices(*side, *side),
            Shape::Rectangle { width, height } => box_vertices(*width, *height),
            Shape::Polygon { vertices } => vertices.clone(),
        }
    }

    /// Closed outline at `pose`, one column per point
    pub fn draw(&self, pose: &Pose2D) -> DMatrix<f64> {
        let (s, c) = pose.yaw.sin_cos();
        let vertices = self.body_vertices();
        let closed = vertices.iter().chain(vertices.first()).collect_vec();
        let mut outline = DMatrix::zeros(2, closed.len());
        for (k, (bx, by)) in closed.into_iter().enumerate() {
            outline[(0, k)] = pose.x + c * bx - s * by;
            outline[(1, k)] = pose.y + s * bx + c * by;
        }
        outline
    }
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Circle { radius: 0.2 }
    }
}

/// Straight segment between two points as a 2-row polyline
pub fn segment(from: (f64, f64), to: (f64, f64)) -> DMatrix<f64> {
    DMatrix::from_column_slice(2, 2, &[from.0, from.1, to.0, to.1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_outline_is_closed() {
        let rect = Shape::rectangle(2.0, 1.0);
        let outline = rect.draw(&Pose2D::new(1.0, 0.0, 0.0));
        assert_eq!(outline.nrows(), 2);
        assert_eq!(outline.ncols(), 5);
        assert_eq!(outline.column(0), outline.column(4));
        assert!((outline[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((outline[(1, 0)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_circle_outline_radius() {
        let circle = Shape::circle(0.3);
        let outline = circle.draw(&Pose2D::new(1.0, 2.0, 0.7));
        for k in 0..outline.ncols() {
            let r = (outline[(0, k)] - 1.0).hypot(outline[(1, k)] - 2.0);
            assert!((r - 0.3).abs() < 1e-12);
        }
    }

    #[test]
    fn test_connector_offsets() {
        assert_eq!(Shape::circle(0.2).connector_offset(), Ok(0.2));
        assert_eq!(Shape::rectangle(0.6, 0.2).connector_offset(), Ok(0.3));
        let polygon = Shape::Polygon { vertices: vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] };
        assert!(matches!(
            polygon.connector_offset(),
            Err(PlanningError::UnsupportedShape(_))
        ));
    }
}
