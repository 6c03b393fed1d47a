//! Activity sequencing: pushes each activity's conditions into a
//! [ThermalModel], integrates it in sub-steps and records one trace row per
//! sub-step.

pub mod batch;

use crate::activity::{Activity, ActivitySchedule};
use crate::comfort::{zhang::ZhangModel, ComfortParams, Sensation};
use crate::geometry::GeometryIndexing;
use crate::imports::*;
use crate::integrator::SolverParams;
use crate::segment::{CORE, SKIN};
use crate::thermal::ThermalModel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Settings of one run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
#[serde(default)]
pub struct SimulationParams {
    /// trace rows per activity
    pub sub_steps: usize,
    /// wall-clock limit checked before each activity \[s\]
    pub wall_clock_budget_seconds: Option<f64>,
    pub comfort: ComfortParams,
    pub solver: SolverParams,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            sub_steps: 10,
            wall_clock_budget_seconds: None,
            comfort: ComfortParams::default(),
            solver: SolverParams::default(),
        }
    }
}

impl SerdeAPI for SimulationParams {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate()
    }
}

impl SimulationParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.sub_steps > 0, config_err!("sub_steps must be at least 1"));
        if let Some(budget) = self.wall_clock_budget_seconds {
            ensure!(
                budget.is_finite() && budget > 0.0,
                config_err!("wall clock budget {budget} s must be positive")
            );
        }
        self.comfort.clone().init()?;
        self.solver.clone().init()
    }

    fn budget(&self) -> Option<Duration> {
        self.wall_clock_budget_seconds.map(Duration::from_secs_f64)
    }
}

/// Cooperative cancellation flag, checked between sub-steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Reported after every completed sub-step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub activity: usize,
    pub n_activities: usize,
    pub sub_step: usize,
    pub completed_sub_steps: usize,
    pub total_sub_steps: usize,
    /// simulated time \[s\]
    pub time: f64,
}

impl Progress {
    /// Completed share of the run in \[0, 1\]
    pub fn fraction(&self) -> f64 {
        self.completed_sub_steps as f64 / self.total_sub_steps.max(1) as f64
    }
}

/// How a run ended
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    Completed,
    /// an activity could not be applied or integrated; rows before it stand
    Failed {
        activity: usize,
        sub_step: usize,
        kind: String,
        message: String,
        /// last accepted solver state when integration failed
        last_state: Option<Vec<f64>>,
    },
    Cancelled {
        activity: usize,
        sub_step: usize,
    },
    BudgetExceeded {
        activity: usize,
    },
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn failed(err: &anyhow::Error, activity: usize, sub_step: usize) -> Self {
        let typed = err.chain().find_map(|e| e.downcast_ref::<ThermoError>());
        let last_state = match typed {
            Some(ThermoError::IntegrationFailure { last_state, .. }) => Some(last_state.to_vec()),
            _ => None,
        };
        Self::Failed {
            activity,
            sub_step,
            kind: typed.map_or("other", |e| e.kind()).to_string(),
            message: format!("{err:#}"),
            last_state,
        }
    }
}

/// One recorded sub-step. Element arrays are at output resolution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, HistoryVec)]
pub struct TraceState {
    /// \[s\]
    pub time: f64,
    pub activity: usize,
    pub pmv: f64,
    pub ppd: f64,
    pub sensation: Sensation,
    /// steady-state PMV; empty when its iteration did not converge
    pub fanger_pmv: Option<f64>,
    pub fanger_ppd: Option<f64>,
    /// \[°C\]
    pub mean_core_temperature: f64,
    /// \[°C\]
    pub mean_skin_temperature: f64,
    /// \[°C\]
    pub rectal_temperature: f64,
    pub mean_heat_transfer_coefficient: f64,
    pub mean_vapour_transfer_coefficient: f64,
    pub skin_temperature: Array1<f64>,
    pub core_temperature: Array1<f64>,
    pub wettedness: Array1<f64>,
    pub heat_transfer_coefficient: Array1<f64>,
    pub vapour_transfer_coefficient: Array1<f64>,
}

/// Element quantity selectable from a trace
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceQuantity {
    SkinTemperature,
    CoreTemperature,
    Wettedness,
    HeatTransferCoefficient,
    VapourTransferCoefficient,
}

/// Time-ordered record of one run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SimulationTrace {
    /// segment of every output element
    pub element_segment: Vec<Segment>,
    /// share of its segment's area of every output element
    pub element_area_fraction: Vec<f64>,
    pub history: TraceStateHistoryVec,
    pub status: RunStatus,
}

impl SerdeAPI for SimulationTrace {}

#[derive(Serialize)]
struct SummaryRow<'a> {
    time_s: f64,
    activity: usize,
    pmv: f64,
    ppd: f64,
    sensation: &'a Sensation,
    fanger_pmv: Option<f64>,
    fanger_ppd: Option<f64>,
    mean_skin_temperature: f64,
    mean_core_temperature: f64,
    rectal_temperature: f64,
    mean_heat_transfer_coefficient: f64,
    mean_vapour_transfer_coefficient: f64,
}

impl SimulationTrace {
    fn for_indexing<G: GeometryIndexing + ?Sized>(indexing: &G) -> Self {
        let n = indexing.n_output_elements();
        Self {
            element_segment: (0..n).map(|k| indexing.output_segment_of(k)).collect(),
            element_area_fraction: (0..n).map(|k| indexing.output_area_fraction_of(k)).collect(),
            history: TraceStateHistoryVec::new(),
            status: RunStatus::NotStarted,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// \[s\]
    pub fn time(&self) -> &[f64] {
        &self.history.time
    }

    /// The fixed segment label set trace series are keyed by
    pub fn segment_labels() -> Vec<String> {
        Segment::labels()
    }

    fn quantity(&self, quantity: TraceQuantity) -> &[Array1<f64>] {
        match quantity {
            TraceQuantity::SkinTemperature => &self.history.skin_temperature,
            TraceQuantity::CoreTemperature => &self.history.core_temperature,
            TraceQuantity::Wettedness => &self.history.wettedness,
            TraceQuantity::HeatTransferCoefficient => &self.history.heat_transfer_coefficient,
            TraceQuantity::VapourTransferCoefficient => &self.history.vapour_transfer_coefficient,
        }
    }

    /// Area-weighted segment mean of `quantity` for every row
    pub fn segment_series(&self, segment: Segment, quantity: TraceQuantity) -> Vec<f64> {
        let members: Vec<usize> = self
            .element_segment
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == segment)
            .map(|(k, _)| k)
            .collect();
        let total: f64 = members.iter().map(|&k| self.element_area_fraction[k]).sum();
        self.quantity(quantity)
            .iter()
            .map(|row| {
                members
                    .iter()
                    .map(|&k| row[k] * self.element_area_fraction[k])
                    .sum::<f64>()
                    / total
            })
            .collect()
    }

    /// Series of every element of `quantity`, one vector per element
    pub fn element_series(&self, element: usize, quantity: TraceQuantity) -> Vec<f64> {
        self.quantity(quantity).iter().map(|row| row[element]).collect()
    }

    /// Whole-body columns as CSV with a header row
    pub fn summary_csv(&self) -> anyhow::Result<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        let h = &self.history;
        for i in 0..self.len() {
            wtr.serialize(SummaryRow {
                time_s: h.time[i],
                activity: h.activity[i],
                pmv: h.pmv[i],
                ppd: h.ppd[i],
                sensation: &h.sensation[i],
                fanger_pmv: h.fanger_pmv[i],
                fanger_ppd: h.fanger_ppd[i],
                mean_skin_temperature: h.mean_skin_temperature[i],
                mean_core_temperature: h.mean_core_temperature[i],
                rectal_temperature: h.rectal_temperature[i],
                mean_heat_transfer_coefficient: h.mean_heat_transfer_coefficient[i],
                mean_vapour_transfer_coefficient: h.mean_vapour_transfer_coefficient[i],
            })?;
        }
        let bytes = wtr.into_inner().map_err(|e| anyhow!("{e}"))?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Runs an [ActivitySchedule] on one model and owns the resulting trace
#[derive(Debug, Clone)]
pub struct Simulator<G: GeometryIndexing> {
    pub model: ThermalModel<G>,
    pub schedule: ActivitySchedule,
    pub params: SimulationParams,
    pub zhang: ZhangModel,
    cancel: CancelToken,
    trace: SimulationTrace,
}

impl<G: GeometryIndexing> Simulator<G> {
    pub fn new(
        model: ThermalModel<G>,
        mut schedule: ActivitySchedule,
        params: SimulationParams,
    ) -> anyhow::Result<Self> {
        params.validate()?;
        schedule.validate()?;
        schedule.load_clothing()?;
        let trace = SimulationTrace::for_indexing(model.indexing());
        Ok(Self {
            model: model.with_solver(params.solver.clone()),
            schedule,
            params,
            zhang: ZhangModel::default(),
            cancel: CancelToken::new(),
            trace,
        })
    }

    /// Shares `token` with the caller so the run can be stopped from outside
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn trace(&self) -> &SimulationTrace {
        &self.trace
    }

    pub fn into_trace(self) -> SimulationTrace {
        self.trace
    }

    pub fn run(&mut self) -> &SimulationTrace {
        self.run_with_progress(|_| {})
    }

    /// Runs the whole schedule from the first activity. Failures, cancellation
    /// and an exhausted budget end the run and are recorded in the trace
    /// status; rows recorded until then are kept.
    pub fn run_with_progress<F: FnMut(&Progress)>(&mut self, mut progress: F) -> &SimulationTrace {
        self.trace = SimulationTrace::for_indexing(self.model.indexing());
        self.trace.status = self.execute(&mut progress);
        match &self.trace.status {
            RunStatus::Completed => log::info!("run completed with {} rows", self.trace.len()),
            status => log::warn!("run ended early: {status:?}"),
        }
        &self.trace
    }

    fn execute<F: FnMut(&Progress)>(&mut self, progress: &mut F) -> RunStatus {
        let start = Instant::now();
        let budget = self.params.budget();
        let sub_steps = self.params.sub_steps;
        let n_activities = self.schedule.len();
        let total_sub_steps = n_activities * sub_steps;
        let mut time = 0.0;

        for i in 0..n_activities {
            if let Some(budget) = budget {
                if start.elapsed() > budget {
                    return RunStatus::BudgetExceeded { activity: i };
                }
            }
            let activity = self.schedule.activities[i].clone();
            log::info!(
                "activity {i} {:?}: {} min at {} °C",
                activity.label,
                activity.duration_minutes,
                activity.ambient_temperature
            );
            if let Err(err) = self.apply_activity(i, &activity) {
                return RunStatus::failed(&err, i, 0);
            }
            let dt = activity.duration_seconds() / sub_steps as f64;
            for j in 0..sub_steps {
                if self.cancel.is_cancelled() {
                    return RunStatus::Cancelled {
                        activity: i,
                        sub_step: j,
                    };
                }
                if let Err(err) = self.model.solve(dt) {
                    return RunStatus::failed(&err, i, j);
                }
                match self.record(time + dt, i) {
                    Ok(row) => {
                        time = row.time;
                        self.trace.history.push(row);
                    }
                    Err(err) => return RunStatus::failed(&err, i, j),
                }
                progress(&Progress {
                    activity: i,
                    n_activities,
                    sub_step: j,
                    completed_sub_steps: i * sub_steps + j + 1,
                    total_sub_steps,
                    time,
                });
            }
        }
        RunStatus::Completed
    }

    /// Pushes the conditions of `activity` into the model
    fn apply_activity(&mut self, index: usize, activity: &Activity) -> anyhow::Result<()> {
        let model = &mut self.model;
        if index == 0 {
            model.reset();
        }
        model
            .set_clothing(&activity.clothing, activity.air_velocity)
            .with_context(|| format!("clothing of activity {index}"))?;
        if let Some(radiation) = &activity.radiation {
            model
                .set_radiation(radiation, &format!("radiation of activity {index}"))
                .with_context(|| format_dbg!(index))?;
        }
        model.set_ambient_temperature(activity.ambient_temperature)?;
        model.set_relative_humidity(activity.humidity_fraction())?;
        model.set_met(activity.met)?;
        model
            .boundary()
            .validate()
            .with_context(|| format!("boundary conditions of activity {index}"))
    }

    fn record(&self, time: f64, activity: usize) -> anyhow::Result<TraceState> {
        let model = &self.model;
        let comfort = &self.params.comfort;
        let index = self.zhang.evaluate(&model.zhang_inputs(), comfort)?;
        let mut fanger_inputs = model.fanger_inputs(comfort.clothing_insulation);
        fanger_inputs.work = comfort.external_work;
        let fanger = match fanger_inputs.evaluate() {
            Ok(fanger) => Some(fanger),
            Err(err) => {
                log::warn!("steady-state comfort skipped at t = {time} s: {err}");
                None
            }
        };
        let temperature = model.temperature();
        Ok(TraceState {
            time,
            activity,
            pmv: index.pmv,
            ppd: index.ppd,
            sensation: index.sensation,
            fanger_pmv: fanger.map(|f| f.pmv),
            fanger_ppd: fanger.map(|f| f.ppd),
            mean_core_temperature: model.mean_core_temperature(),
            mean_skin_temperature: model.mean_skin_temperature(),
            rectal_temperature: model.rectal_temperature(),
            mean_heat_transfer_coefficient: model.mean_heat_transfer_coefficient(),
            mean_vapour_transfer_coefficient: model.mean_vapour_transfer_coefficient(),
            skin_temperature: model.to_output(temperature.column(SKIN)),
            core_temperature: model.to_output(temperature.column(CORE)),
            wettedness: model.to_output(model.wettedness().view()),
            heat_transfer_coefficient: model.to_output(model.boundary().h_c.view()),
            vapour_transfer_coefficient: model.to_output(model.boundary().h_e.view()),
        })
    }
}

#[cfg(all(test, feature = "resources"))]
mod tests {
    use super::*;
    use crate::geometry::ProjectedIndexing;
    use crate::params::ModelParams;
    use crate::personalize::Anthropometrics;
    use crate::radiation::RadiationFlux;
    use crate::reference::ReferenceBody;

    fn simulator(activities: Vec<Activity>, sub_steps: usize) -> Simulator<ProjectedIndexing> {
        let bundle = Anthropometrics::standard()
            .personalize(&ReferenceBody::standard().unwrap())
            .unwrap();
        let model = ThermalModel::new(bundle, ProjectedIndexing::new(), ModelParams::default()).unwrap();
        Simulator::new(
            model,
            ActivitySchedule::new(activities),
            SimulationParams {
                sub_steps,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn short(minutes: f64) -> Activity {
        Activity {
            duration_minutes: minutes,
            ..Default::default()
        }
    }

    #[test]
    fn test_rows_per_sub_step_and_increasing_time() {
        let mut sim = simulator(vec![short(2.0), short(1.0)], 4);
        let mut calls = vec![];
        sim.run_with_progress(|p| calls.push(p.fraction()));
        let trace = sim.trace();
        assert_eq!(trace.status, RunStatus::Completed);
        assert_eq!(trace.len(), 8);
        assert!(trace.time().windows(2).all(|w| w[1] > w[0]));
        assert!((trace.time()[7] - 180.0).abs() < 1e-9);
        assert_eq!(calls.len(), 8);
        assert_eq!(calls[7], 1.0);
        assert_eq!(trace.history.activity[4], 1);
    }

    #[test]
    fn test_boundary_mismatch_halts_and_keeps_rows() {
        let mut bad = short(1.0);
        bad.radiation = Some(RadiationFlux::new(vec![50.0; 7]).unwrap());
        let mut sim = simulator(vec![short(1.0), bad, short(1.0)], 2);
        let trace = sim.run();
        assert_eq!(trace.len(), 2);
        match &trace.status {
            RunStatus::Failed { activity, kind, .. } => {
                assert_eq!(*activity, 1);
                assert_eq!(kind, "boundary_mismatch");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_rerun_starts_without_previous_radiation() {
        let mut hot = short(1.0);
        hot.radiation = Some(RadiationFlux::uniform(300.0).unwrap());
        let mut sim = simulator(vec![short(1.0), hot], 2);
        let first = sim.run().clone();
        assert!(first.status.is_completed());
        assert!(sim.model.boundary().radiant_flux.iter().all(|q| *q == 300.0));

        let second = sim.run().clone();
        assert_eq!(second.history, first.history);
        assert_eq!(second.status, first.status);
    }

    #[test]
    fn test_out_of_range_boundary_fails_before_solving() {
        let mut sim = simulator(vec![short(1.0), short(1.0)], 2);
        sim.schedule.activities[1].air_velocity = f64::NAN;
        let trace = sim.run();
        assert_eq!(trace.len(), 2);
        match &trace.status {
            RunStatus::Failed { activity, sub_step, kind, .. } => {
                assert_eq!((*activity, *sub_step), (1, 0));
                assert_eq!(kind, "configuration");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_cancellation_between_sub_steps() {
        let mut sim = simulator(vec![short(1.0)], 5);
        let token = sim.cancel_token();
        sim.run_with_progress(|p| {
            if p.sub_step == 1 {
                token.cancel()
            }
        });
        assert_eq!(sim.trace().len(), 2);
        assert_eq!(
            sim.trace().status,
            RunStatus::Cancelled {
                activity: 0,
                sub_step: 2
            }
        );
    }

    #[test]
    fn test_exhausted_budget_stops_before_next_activity() {
        let mut sim = simulator(vec![short(1.0), short(1.0)], 1);
        sim.params.wall_clock_budget_seconds = Some(1e-9);
        let trace = sim.run();
        // the first activity starts before any time has elapsed
        assert!(matches!(trace.status, RunStatus::BudgetExceeded { activity } if activity <= 1));
    }

    #[test]
    fn test_trace_series_and_csv() {
        let mut sim = simulator(vec![short(1.0)], 3);
        sim.run();
        let trace = sim.trace();
        let head = trace.segment_series(Segment::Head, TraceQuantity::SkinTemperature);
        assert_eq!(head.len(), 3);
        assert_eq!(head, trace.element_series(0, TraceQuantity::SkinTemperature));
        let csv = trace.summary_csv().unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("time_s,activity,pmv,ppd,sensation"));
        assert_eq!(lines.count(), 3);
        let restored = SimulationTrace::from_json(trace.to_json().unwrap()).unwrap();
        assert_eq!(&restored, trace);
    }
}
