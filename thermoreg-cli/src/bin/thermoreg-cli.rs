use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;

extern crate thermoreg_core;
use thermoreg_core::prelude::*;

/// Runs an activity schedule on a personalized body and prints the trace.
/// After running `cargo build --release`, run with
/// ```bash
/// ./target/release/thermoreg-cli --schedule-resource schedules/neutral_office.yaml --height 1.8 --weight 80
/// ```
/// Set `RUST_LOG=info` to follow activity boundaries.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(group(
    ArgGroup::new("schedule-source")
    .required(true)
    .args(&["schedule", "schedule-file", "schedule-resource"])
))]
struct ThermoregApi {
    /// Schedule as json string
    #[clap(long, value_parser)]
    schedule: Option<String>,
    #[clap(long, value_parser)]
    /// Path to schedule file (yaml or json)
    schedule_file: Option<String>,
    #[clap(long, value_parser)]
    /// Schedule bundled with the engine, e.g. `schedules/neutral_office.yaml`
    schedule_resource: Option<String>,
    #[clap(long, value_parser)]
    /// Path to mesh geometry file; the state is solved per face unless `--projected` is given
    geometry_file: Option<String>,
    #[clap(long, action)]
    /// Solve one element per segment, reporting on the mesh if one is given
    projected: bool,
    #[clap(long, value_parser)]
    /// Path to reference body file; defaults to the bundled standard body
    reference_file: Option<String>,
    #[clap(long, value_parser)]
    /// Path to anthropometrics file; individual flags below override it
    subject_file: Option<String>,
    #[clap(long, value_parser)]
    gender: Option<Gender>,
    #[clap(long, value_parser)]
    /// Height (m)
    height: Option<f64>,
    #[clap(long, value_parser)]
    /// Weight (kg)
    weight: Option<f64>,
    #[clap(long, value_parser)]
    /// Age (years)
    age: Option<f64>,
    #[clap(long, value_parser)]
    /// Path to simulation parameters file (sub-steps, budget, comfort and solver settings)
    params_file: Option<String>,
    #[clap(long, value_parser)]
    /// Trace rows per activity
    sub_steps: Option<usize>,
    #[clap(long, value_parser)]
    /// Wall-clock budget (s), checked between activities
    budget: Option<f64>,
    #[clap(long, value_parser)]
    /// How to return results: `summary` (csv, default), `json` or `yaml`
    res_fmt: Option<String>,
    #[clap(long, value_parser)]
    /// Write the full trace here instead of printing; format follows the extension (yaml or json)
    out_file: Option<String>,
}

fn run<G: GeometryIndexing>(
    indexing: G,
    bundle: ParameterBundle,
    schedule: ActivitySchedule,
    params: SimulationParams,
) -> anyhow::Result<SimulationTrace> {
    let model = ThermalModel::new(bundle, indexing, ModelParams::default())?;
    let mut sim = Simulator::new(model, schedule, params)?;
    sim.run_with_progress(|p| {
        log::debug!(
            "activity {}/{} sub-step {}: {:.0} %",
            p.activity + 1,
            p.n_activities,
            p.sub_step + 1,
            100.0 * p.fraction()
        )
    });
    Ok(sim.into_trace())
}

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let api = ThermoregApi::parse();

    let schedule = if let Some(json) = &api.schedule {
        ActivitySchedule::from_json(json)?
    } else if let Some(path) = &api.schedule_file {
        ActivitySchedule::from_file(path)?
    } else if let Some(resource) = &api.schedule_resource {
        ActivitySchedule::from_resource(resource)?
    } else {
        anyhow::bail!("no schedule given")
    };

    let reference = match &api.reference_file {
        Some(path) => ReferenceBody::from_file(path)?,
        None => ReferenceBody::standard()?,
    };
    let mut subject = match &api.subject_file {
        Some(path) => Anthropometrics::from_file(path)?,
        None => Anthropometrics::standard(),
    };
    if let Some(gender) = api.gender {
        subject.gender = gender;
    }
    if let Some(height) = api.height {
        subject.height = height;
    }
    if let Some(weight) = api.weight {
        subject.weight = weight;
    }
    if let Some(age) = api.age {
        subject.age = age;
    }
    let bundle = subject.personalize(&reference)?;

    let mut params = match &api.params_file {
        Some(path) => SimulationParams::from_file(path)?,
        None => SimulationParams::default(),
    };
    if let Some(sub_steps) = api.sub_steps {
        params.sub_steps = sub_steps;
    }
    if api.budget.is_some() {
        params.wall_clock_budget_seconds = api.budget;
    }
    params.validate()?;

    let geometry = api
        .geometry_file
        .as_ref()
        .map(MeshGeometry::from_file)
        .transpose()?;
    let trace = match (geometry, api.projected) {
        (Some(geometry), false) => run(MeshIndexing::new(geometry)?, bundle, schedule, params)?,
        (Some(geometry), true) => run(
            ProjectedIndexing::with_target(geometry)?,
            bundle,
            schedule,
            params,
        )?,
        (None, _) => run(ProjectedIndexing::new(), bundle, schedule, params)?,
    };

    if let Some(path) = &api.out_file {
        trace.to_file(path)?;
    } else {
        let res = match api.res_fmt.as_deref().unwrap_or("summary") {
            "summary" | "csv" => trace.summary_csv()?,
            "json" => trace.to_json()?,
            "yaml" => trace.to_yaml()?,
            other => anyhow::bail!("Invalid option `{}` for `--res-fmt`", other),
        };
        print!("{}", res);
    }

    anyhow::ensure!(
        trace.status.is_completed(),
        "run did not complete: {:?}",
        trace.status
    );
    Ok(())
}
