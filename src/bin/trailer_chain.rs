// Holonomic base pulling two trailers along a left turn.
//
// The base motion is prescribed, the trailer headings are integrated from the
// hitch kinematics, then everything is fitted with splines and rebuilt into
// signals the way a solved problem would be.
use articulated_planning::optimization::{Bindings, Problem};
use articulated_planning::spline::{linspace, BSplineBasis, Spline};
use articulated_planning::utils::{colors, PathStyle, Visualizer};
use articulated_planning::{build_chain, HolonomicOrient, TrailerConfig, VehicleNode};

use nalgebra::DVector;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HORIZON: f64 = 12.0;
const DT: f64 = 0.01;

/// Base velocity: straight, then a left turn at constant speed
fn base_input(t: f64) -> DVector<f64> {
    let speed = 0.3;
    let yaw_rate = if t < 4.0 { 0.0 } else { 0.15 };
    let yaw = 0.15 * (t - 4.0).max(0.0);
    DVector::from_vec(vec![speed * yaw.cos(), speed * yaw.sin(), yaw_rate])
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut leaf = HolonomicOrient::with_defaults();
    leaf.set_initial_conditions(&[0.0, 0.0, 0.0], None).unwrap();
    let chain = build_chain(
        Box::new(leaf),
        vec![
            (TrailerConfig::new(0.3, 0.4), 0.0),
            (TrailerConfig::new(0.3, 0.4), 0.0),
        ],
    )
    .unwrap();
    chain.init().unwrap();

    // straight chain behind the base
    let mut x: DVector<f64> = DVector::from_vec(vec![-1.4, 0.0, 0.0, -0.7, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let n_steps = (HORIZON / DT).round() as usize;
    let mut times = Vec::with_capacity(n_steps + 1);
    let mut samples = vec![Vec::with_capacity(n_steps + 1); chain.n_spl()];
    for step in 0..=n_steps {
        let t = step as f64 * DT;
        times.push(t);
        samples[0].push((x[2] / 2.0).tan());
        samples[1].push((x[5] / 2.0).tan());
        samples[2].push(x[6]);
        samples[3].push(x[7]);
        samples[4].push((x[8] / 2.0).tan());
        let dx = chain.ode(&x, &base_input(t)).unwrap();
        x += dx * DT;
    }

    let basis = BSplineBasis::uniform(chain.degree(), 60);
    let splines: Vec<Spline> = samples
        .iter()
        .map(|v| Spline::fit(basis.scaled(HORIZON), &times, v).unwrap())
        .collect();
    let signals = chain
        .splines2signals(&splines, &linspace(0.0, HORIZON, 241))
        .unwrap();

    // same coefficients on the normalised horizon against the chain constraints
    let mut problem = Problem::new(chain.n_spl());
    let vars = problem.spline_vars();
    chain.define_trajectory_constraints(&mut problem, &vars).unwrap();
    let normalised: Vec<Spline> = splines
        .iter()
        .map(|s| Spline::new(basis.clone(), s.coeffs().clone()).unwrap())
        .collect();
    let mut bindings = Bindings::default();
    bindings.symbols.insert("T".to_string(), HORIZON);
    let violation = problem
        .max_violation(&normalised, &bindings, &linspace(0.0, 1.0, 241))
        .unwrap();
    info!(violation, n_constraints = problem.constraints().len(), "fitted motion checked");

    std::fs::create_dir_all("./img").unwrap();
    let mut vis = Visualizer::new();
    vis.set_title("Trailer chain");
    vis.plot_trajectories(&signals);
    let last = signals.time.len() - 1;
    let base_row = signals.pose.nrows() - 3;
    vis.plot_target(signals.pose[(base_row, last)], signals.pose[(base_row + 1, last)]);
    for t in [0, 80, 160, -1] {
        vis.plot_chain(&chain.draw(&signals, t).unwrap()).unwrap();
    }
    vis.save_svg("./img/trailer_chain.svg").unwrap();

    let mut headings = Visualizer::time_series("heading [rad]");
    headings.set_title("Headings");
    for (row, (color, caption)) in [
        (colors::GRAY, "trailer 2"),
        (colors::ORANGE, "trailer 1"),
        (colors::RED, "base"),
    ]
    .into_iter()
    .enumerate()
    {
        headings
            .plot_channel(&signals.time, &signals.state, 3 * row + 2, &PathStyle::new(color, caption))
            .unwrap();
    }
    headings.save_svg("./img/trailer_chain_headings.svg").unwrap();
}
