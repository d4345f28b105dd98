mod config;
mod geometry;
mod post_processor;

use clap::Parser;
use log::{error, info};

use config::{JobConfig, MeshEngine};
use geofea::{
    mesher::{self, Triangulator},
    solver, AutoMesher, Constraints, GmshMesher, GridMesher, Result,
};

/// Plane linear elastic analysis on a polygon
#[derive(Parser, Debug)]
#[command(name = "geofea", version)]
struct Cli {
    /// Job file with material, mesh, load and support settings
    input: String,

    /// Polygon geometry, either .csv or .svg
    geometry: String,

    /// Output file for nodal displacements
    #[arg(long, default_value = "nodes.csv")]
    nodes_out: String,

    /// Output file for element strains
    #[arg(long, default_value = "elements.csv")]
    elements_out: String,

    /// Svg vertices closer than this to the previous vertex are dropped
    #[arg(long, default_value_t = 0.0)]
    min_spacing: f64,
}

fn run(cli: &Cli) -> Result<()> {
    let job: JobConfig = config::load_input_file(&cli.input)?;
    let region = geometry::load_region(&cli.geometry, cli.min_spacing)?;

    let triangulator: Box<dyn Triangulator> = match job.engine {
        MeshEngine::Auto => Box::new(AutoMesher::default()),
        MeshEngine::Gmsh => Box::new(GmshMesher::default()),
        MeshEngine::Grid => Box::new(GridMesher),
    };
    let mesh = mesher::run(triangulator.as_ref(), &region, &job.mesh)?;

    let constraints = if job.boundary_rules.is_empty() {
        Constraints::simple_support(&mesh)
    } else {
        Constraints::from_rules(&mesh, &job.boundary_rules)
    };

    let solution = solver::run(
        &mesh,
        &job.metadata,
        &job.loads,
        &job.load_mapping,
        &constraints,
    )?;

    let peak = solution
        .displacements
        .iter()
        .fold(0.0_f64, |acc, u| acc.max(u.abs()));
    info!("peak displacement component {peak:.6e}");

    post_processor::csv_output(&mesh, &solution, &cli.nodes_out, &cli.elements_out)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1);
    }
}
