//! Plotting of vehicle chains and reconstructed signals with gnuplot

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use nalgebra::DMatrix;

use crate::common::{PlanningError, PlanningResult, Signals};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    // Semantic colors
    pub const BODY: &str = BLUE;
    pub const CONNECTOR: &str = BLACK;
    pub const TRAJECTORY: &str = RED;
    pub const TARGET: &str = GREEN;
    pub const SIGNAL: &str = ORANGE;
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    /// Legend entry, none when empty
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::new(colors::TRAJECTORY, "Trajectory")
    }
}

#[derive(Debug, Clone)]
struct Series {
    x: Vec<f64>,
    y: Vec<f64>,
    style: PathStyle,
    /// Drawn as points instead of a line
    markers: bool,
}

/// Collects series and renders them on a single set of axes
pub struct Visualizer {
    figure: Figure,
    series: Vec<Series>,
    title: String,
    x_label: String,
    y_label: String,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    /// Top view of the plane, equal axes
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            series: Vec::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            aspect_ratio: Some(1.0),
        }
    }

    /// Time plot of signal channels
    pub fn time_series(y_label: &str) -> Self {
        let mut vis = Self::new();
        vis.x_label = "t [s]".to_string();
        vis.y_label = y_label.to_string();
        vis.aspect_ratio = None;
        vis
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_y_label(&mut self, label: &str) -> &mut Self {
        self.y_label = label.to_string();
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn n_series(&self) -> usize {
        self.series.len()
    }

    pub fn plot_xy(&mut self, x: &[f64], y: &[f64], style: &PathStyle) -> &mut Self {
        self.series.push(Series {
            x: x.to_vec(),
            y: y.to_vec(),
            style: style.clone(),
            markers: false,
        });
        self
    }

    /// Plot a 2-row polyline, one column per point
    pub fn plot_polyline(&mut self, line: &DMatrix<f64>, style: &PathStyle) -> PlanningResult<&mut Self> {
        if line.nrows() != 2 {
            return Err(PlanningError::DimensionMismatch(format!(
                "polyline has {} rows, expected 2",
                line.nrows()
            )));
        }
        let x: Vec<f64> = line.row(0).iter().copied().collect();
        let y: Vec<f64> = line.row(1).iter().copied().collect();
        Ok(self.plot_xy(&x, &y, style))
    }

    /// Plot the output of a chain `draw`: two-point entries are hitch
    /// connectors, everything else is a body outline
    pub fn plot_chain(&mut self, lines: &[DMatrix<f64>]) -> PlanningResult<&mut Self> {
        let body = PathStyle::new(colors::BODY, "");
        let connector = PathStyle::new(colors::CONNECTOR, "").with_line_width(1.5);
        for line in lines {
            let style = if line.ncols() == 2 { &connector } else { &body };
            self.plot_polyline(line, style)?;
        }
        Ok(self)
    }

    /// Center path of every link, outermost first
    pub fn plot_trajectories(&mut self, signals: &Signals) -> &mut Self {
        let n_links = signals.pose.nrows() / 3;
        for i in 0..n_links {
            let x: Vec<f64> = signals.pose.row(3 * i).iter().copied().collect();
            let y: Vec<f64> = signals.pose.row(3 * i + 1).iter().copied().collect();
            let color = if i + 1 == n_links { colors::TRAJECTORY } else { colors::GRAY };
            let style = PathStyle::new(color, &format!("link {}", n_links - 1 - i)).with_line_width(1.0);
            self.plot_xy(&x, &y, &style);
        }
        self
    }

    /// Plot row `row` of a signal channel against time
    pub fn plot_channel(
        &mut self,
        time: &[f64],
        channel: &DMatrix<f64>,
        row: usize,
        style: &PathStyle,
    ) -> PlanningResult<&mut Self> {
        if row >= channel.nrows() || channel.ncols() != time.len() {
            return Err(PlanningError::DimensionMismatch(format!(
                "cannot plot row {} of a {}x{} channel over {} samples",
                row,
                channel.nrows(),
                channel.ncols(),
                time.len()
            )));
        }
        let y: Vec<f64> = channel.row(row).iter().copied().collect();
        Ok(self.plot_xy(time, &y, style))
    }

    /// Single marker, e.g. the terminal position of the base
    pub fn plot_target(&mut self, x: f64, y: f64) -> &mut Self {
        self.series.push(Series {
            x: vec![x],
            y: vec![y],
            style: PathStyle::new(colors::TARGET, "Target"),
            markers: true,
        });
        self
    }

    pub fn save_svg(&mut self, path: &str) -> PlanningResult<()> {
        self.render();
        self.figure
            .save_to_svg(path, 800, 600)
            .map_err(|e| PlanningError::VisualizationError(e.to_string()))
    }

    fn render(&mut self) {
        self.figure.clear_axes();
        let axes = self.figure.axes2d();
        for s in &self.series {
            if s.markers {
                axes.points(&s.x, &s.y, &[
                    Caption(&s.style.caption),
                    Color(&s.style.color),
                    PointSymbol('O'),
                    PointSize(1.5),
                ]);
            } else if s.style.caption.is_empty() {
                axes.lines(&s.x, &s.y, &[Color(&s.style.color), LineWidth(s.style.line_width)]);
            } else {
                axes.lines(&s.x, &s.y, &[
                    Caption(&s.style.caption),
                    Color(&s.style.color),
                    LineWidth(s.style.line_width),
                ]);
            }
        }

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}
