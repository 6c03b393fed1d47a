//! Variable-step backward differentiation (orders 1 and 2) for stiff
//! systems whose Jacobian has the bordered block structure of
//! [linalg::BorderedBlockMatrix].

pub mod linalg;

use crate::imports::*;
use linalg::{BorderedBlockMatrix, BorderedLu};

/// Autonomous ODE system `dy/dt = f(y)` with time in seconds
pub trait OdeSystem {
    /// Length of the state vector
    fn dim(&self) -> usize;

    /// Evaluates `f(y)`
    fn derivative(&self, y: ArrayView1<f64>) -> Array1<f64>;

    /// Approximates the Jacobian of `f` at `y`, given `f0 = f(y)`
    fn jacobian(&self, y: ArrayView1<f64>, f0: ArrayView1<f64>) -> BorderedBlockMatrix;
}

/// Controls for [integrate]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
#[serde(default)]
pub struct SolverParams {
    pub rtol: f64,
    /// \[°C\]
    pub atol: f64,
    /// first trial step \[s\]
    pub initial_step: f64,
    /// step below which the solve is abandoned \[s\]
    pub min_step: f64,
    /// \[s\]
    pub max_step: f64,
    pub max_newton_iterations: usize,
    /// Newton convergence threshold in the weighted norm
    pub newton_tol: f64,
    /// accepted steps between Jacobian refreshes
    pub jacobian_refresh_steps: usize,
    /// cap on attempted steps per call to [integrate]
    pub max_steps: usize,
    /// when false, the whole duration is one interval; otherwise it is
    /// split into ceil(duration / 1 s) intervals
    pub unit_subdivision: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-5,
            initial_step: 1e-2,
            min_step: 1e-10,
            max_step: 1.0,
            max_newton_iterations: 6,
            newton_tol: 0.03,
            jacobian_refresh_steps: 20,
            max_steps: 1_000_000,
            unit_subdivision: true,
        }
    }
}

impl SerdeAPI for SolverParams {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.rtol > 0.0 && self.atol > 0.0,
            config_err!("solver tolerances must be positive")
        );
        ensure!(
            self.min_step > 0.0 && self.min_step <= self.initial_step && self.initial_step <= self.max_step,
            config_err!("solver steps must satisfy 0 < min_step <= initial_step <= max_step")
        );
        ensure!(
            self.max_newton_iterations > 0 && self.max_steps > 0,
            config_err!("solver iteration caps must be positive")
        );
        Ok(())
    }
}

/// Counters of one call to [integrate]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub newton_failures: usize,
    pub rhs_evaluations: usize,
    pub jacobian_evaluations: usize,
    /// last accepted step size, usable to warm-start the next call
    #[serde(skip)]
    pub last_step: Option<f64>,
}

/// Error constants of the predictor-corrector difference per order
const ERROR_CONSTANT: [f64; 2] = [0.5, 0.4];
const SAFETY: f64 = 0.9;

struct Bdf<'a, S: OdeSystem + ?Sized> {
    system: &'a S,
    params: &'a SolverParams,
    t: f64,
    y: Array1<f64>,
    f: Array1<f64>,
    /// previous accepted state and step, once one exists
    history: Option<(Array1<f64>, f64)>,
    order: usize,
    h: f64,
    jacobian: Option<BorderedBlockMatrix>,
    steps_since_jacobian: usize,
    factored: Option<(f64, BorderedLu)>,
    stats: SolverStats,
}

/// Outcome of one Newton solve
enum Newton {
    Converged(Array1<f64>),
    Failed,
}

impl<'a, S: OdeSystem + ?Sized> Bdf<'a, S> {
    fn new(system: &'a S, y0: Array1<f64>, h0: f64, params: &'a SolverParams) -> anyhow::Result<Self> {
        let mut solver = Self {
            system,
            params,
            t: 0.0,
            f: Array1::zeros(0),
            y: y0,
            history: None,
            order: 1,
            h: h0,
            jacobian: None,
            steps_since_jacobian: 0,
            factored: None,
            stats: SolverStats::default(),
        };
        let y0 = solver.y.clone();
        solver.f = solver.eval(y0.view())?;
        Ok(solver)
    }

    fn failure(&self, reason: String) -> anyhow::Error {
        ThermoError::IntegrationFailure {
            time: self.t,
            reason,
            last_state: self.y.clone(),
        }
        .into()
    }

    fn eval(&mut self, y: ArrayView1<f64>) -> anyhow::Result<Array1<f64>> {
        self.stats.rhs_evaluations += 1;
        let f = self.system.derivative(y);
        if !utils::all_finite(&f) {
            return Err(self.failure("non-finite derivative".into()));
        }
        Ok(f)
    }

    /// Weighted RMS norm relative to the current state
    fn norm(&self, v: ArrayView1<f64>) -> f64 {
        let p = self.params;
        let sum: f64 = Zip::from(&v)
            .and(&self.y)
            .fold(0.0, |acc, &vi, &yi| {
                let w = p.atol + p.rtol * yi.abs();
                acc + (vi / w).powi(2)
            });
        (sum / v.len().max(1) as f64).sqrt()
    }

    fn refresh_jacobian(&mut self) {
        self.stats.jacobian_evaluations += 1;
        self.jacobian = Some(self.system.jacobian(self.y.view(), self.f.view()));
        self.steps_since_jacobian = 0;
        self.factored = None;
    }

    /// Factors `I - gamma J`, reusing the last factorization when gamma moved
    /// less than 30 %
    fn factor(&mut self, gamma: f64) -> Option<&BorderedLu> {
        let stale = match &self.factored {
            Some((g, _)) => ((gamma - g) / g).abs() > 0.3,
            None => true,
        };
        if stale {
            let lu = self.jacobian.as_ref()?.iteration_matrix(gamma).factor()?;
            self.factored = Some((gamma, lu));
        }
        self.factored.as_ref().map(|(_, lu)| lu)
    }

    /// Solves `x - gamma f(x) = rhs_const` by modified Newton from `guess`
    fn newton(&mut self, guess: &Array1<f64>, rhs_const: &Array1<f64>, gamma: f64) -> anyhow::Result<Newton> {
        let mut x = guess.clone();
        let mut prev_norm = f64::INFINITY;
        for _ in 0..self.params.max_newton_iterations {
            let fx = self.eval(x.view())?;
            let mut residual = rhs_const - &x + &(gamma * &fx);
            let lu = match self.factor(gamma) {
                Some(lu) => lu,
                None => return Ok(Newton::Failed),
            };
            let slice = match residual.as_slice_mut() {
                Some(s) => s,
                None => bail!(format_dbg!("non-contiguous residual")),
            };
            lu.solve_in_place(slice);
            x += &residual;
            let norm = self.norm(residual.view());
            if !norm.is_finite() || norm > 2.0 * prev_norm {
                return Ok(Newton::Failed);
            }
            if norm <= self.params.newton_tol {
                return Ok(Newton::Converged(x));
            }
            prev_norm = norm;
        }
        Ok(Newton::Failed)
    }

    /// Advances to `t_end`
    fn advance_to(&mut self, t_end: f64) -> anyhow::Result<()> {
        let p = self.params;
        while t_end - self.t > 1e-12 * t_end.abs().max(1.0) {
            if self.stats.accepted_steps + self.stats.rejected_steps >= p.max_steps {
                return Err(self.failure(format!("exceeded {} steps", p.max_steps)));
            }
            if self.h < p.min_step {
                return Err(self.failure(format!("step size {:.3e} s below minimum", self.h)));
            }
            if self.jacobian.is_none() || self.steps_since_jacobian >= p.jacobian_refresh_steps {
                self.refresh_jacobian();
            }
            let h = self.h.min(t_end - self.t).min(p.max_step);
            // BDF2 needs a history step of comparable size
            let order = match &self.history {
                Some((_, h_prev)) if h / h_prev <= 5.0 => self.order,
                _ => 1,
            };

            let (predicted, rhs_const, gamma) = match (&self.history, order) {
                (Some((y_prev, h_prev)), 2) => {
                    let w = h / h_prev;
                    let a1 = (1.0 + w).powi(2) / (1.0 + 2.0 * w);
                    let a2 = -w * w / (1.0 + 2.0 * w);
                    let beta = (1.0 + w) / (1.0 + 2.0 * w);
                    let curvature = (y_prev - &self.y + &(*h_prev * &self.f)) / (h_prev * h_prev);
                    let predicted = &self.y + &(h * &self.f) + &(h * h * &curvature);
                    let rhs_const = a1 * &self.y + &(a2 * y_prev);
                    (predicted, rhs_const, beta * h)
                }
                _ => (&self.y + &(h * &self.f), self.y.clone(), h),
            };

            let x = match self.newton(&predicted, &rhs_const, gamma)? {
                Newton::Converged(x) => x,
                Newton::Failed => {
                    self.stats.newton_failures += 1;
                    if self.steps_since_jacobian > 0 {
                        // retry the same step with a fresh Jacobian
                        self.refresh_jacobian();
                    } else {
                        self.h = h * 0.25;
                        self.order = 1;
                        self.factored = None;
                        self.stats.rejected_steps += 1;
                    }
                    continue;
                }
            };

            let err = ERROR_CONSTANT[order - 1] * self.norm((&x - &predicted).view());
            let exponent = -1.0 / (order as f64 + 1.0);
            if err > 1.0 {
                self.stats.rejected_steps += 1;
                self.h = h * (SAFETY * err.powf(exponent)).clamp(0.1, 0.9);
                continue;
            }

            let fx = self.eval(x.view())?;
            let y_old = std::mem::replace(&mut self.y, x);
            self.history = Some((y_old, h));
            self.f = fx;
            self.t += h;
            self.stats.accepted_steps += 1;
            self.steps_since_jacobian += 1;
            self.stats.last_step = Some(h);

            let max_growth = if order == 2 { 2.0 } else { 5.0 };
            let factor = if err > 0.0 {
                (SAFETY * err.powf(exponent)).clamp(0.2, max_growth)
            } else {
                max_growth
            };
            // steps clipped to an interval end say little about the next one
            if (h - self.h).abs() <= f64::EPSILON * self.h.max(1.0) || factor < 1.0 {
                self.h = (h * factor).min(p.max_step);
            }
            self.order = 2;
        }
        Ok(())
    }
}

/// Integrates `system` from `y0` over `duration` seconds. Durations above
/// one second are split into `ceil(duration)` equal intervals that the
/// adaptive steps must land on.
pub fn integrate<S: OdeSystem + ?Sized>(
    system: &S,
    y0: Array1<f64>,
    duration: f64,
    initial_step: Option<f64>,
    params: &SolverParams,
) -> anyhow::Result<(Array1<f64>, SolverStats)> {
    ensure!(
        duration.is_finite() && duration >= 0.0,
        config_err!("integration duration {duration} must be finite and non-negative")
    );
    ensure!(
        y0.len() == system.dim(),
        config_err!("state of length {} for a system of dimension {}", y0.len(), system.dim())
    );
    if duration == 0.0 {
        return Ok((y0, SolverStats::default()));
    }
    let intervals = if params.unit_subdivision && duration > 1.0 {
        duration.ceil() as usize
    } else {
        1
    };
    let h0 = initial_step
        .unwrap_or(params.initial_step)
        .clamp(params.min_step, params.max_step)
        .min(duration);
    let mut bdf = Bdf::new(system, y0, h0, params)?;
    for k in 1..=intervals {
        bdf.advance_to(duration * k as f64 / intervals as f64)?;
    }
    if bdf.stats.rejected_steps > bdf.stats.accepted_steps {
        log::warn!(
            "{} of {} steps rejected over {duration} s",
            bdf.stats.rejected_steps,
            bdf.stats.accepted_steps + bdf.stats.rejected_steps
        );
    }
    log::debug!("{:?}", bdf.stats);
    Ok((bdf.y, bdf.stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use linalg::BorderedBlockMatrix;

    /// Four fast linear decays per block pulled toward a slow shared pool
    struct Relaxation {
        n: usize,
        rate: f64,
        coupling: f64,
    }

    impl OdeSystem for Relaxation {
        fn dim(&self) -> usize {
            4 * self.n + 1
        }

        fn derivative(&self, y: ArrayView1<f64>) -> Array1<f64> {
            let pool = y[4 * self.n];
            let mut f = Array1::zeros(self.dim());
            for k in 0..4 * self.n {
                f[k] = -self.rate * (y[k] - pool);
                f[4 * self.n] += self.coupling * (y[k] - pool);
            }
            f
        }

        fn jacobian(&self, _y: ArrayView1<f64>, _f0: ArrayView1<f64>) -> BorderedBlockMatrix {
            let mut j = BorderedBlockMatrix::zeros(self.n);
            for e in 0..self.n {
                for i in 0..4 {
                    j.blocks[e][i][i] = -self.rate;
                    j.column[e][i] = self.rate;
                    j.row[e][i] = self.coupling;
                }
            }
            j.corner = -self.coupling * 4.0 * self.n as f64;
            j
        }
    }

    #[test]
    fn test_stiff_decay_reaches_pool_value() {
        let system = Relaxation {
            n: 2,
            rate: 1e4,
            coupling: 0.01,
        };
        let mut y0 = Array1::from_elem(9, 1.0);
        y0[8] = 0.0;
        let (y, stats) = integrate(&system, y0, 5.0, None, &SolverParams::default()).unwrap();
        // conserved quantity: sum of fast states times 0.01 plus pool times rate
        let pool = y[8];
        assert!(y.iter().take(8).all(|v| (v - pool).abs() < 1e-4));
        let expected_pool = 0.01 * 8.0 / (1e4 + 0.01 * 8.0);
        assert!((pool - expected_pool).abs() < 1e-6);
        assert!(stats.accepted_steps > 0);
        // implicit steps are far larger than the explicit stability limit
        assert!(stats.accepted_steps < 5_000);
    }

    #[test]
    fn test_matches_exponential_solution() {
        let system = Relaxation {
            n: 1,
            rate: 0.5,
            coupling: 0.0,
        };
        let mut y0 = Array1::zeros(5);
        y0[0] = 1.0;
        let (y, _) = integrate(&system, y0, 2.0, None, &SolverParams::default()).unwrap();
        assert!((y[0] - (-1.0_f64).exp()).abs() < 1e-3);
        assert_eq!(y[4], 0.0);
    }

    #[test]
    fn test_zero_duration_is_identity() {
        let system = Relaxation {
            n: 1,
            rate: 1.0,
            coupling: 0.01,
        };
        let y0 = Array1::from_elem(5, 3.0);
        let (y, stats) = integrate(&system, y0.clone(), 0.0, None, &SolverParams::default()).unwrap();
        assert_eq!(y, y0);
        assert_eq!(stats.accepted_steps, 0);
    }

    struct Blowup;

    impl OdeSystem for Blowup {
        fn dim(&self) -> usize {
            5
        }

        fn derivative(&self, y: ArrayView1<f64>) -> Array1<f64> {
            y.mapv(|v| if v > 2.0 { f64::NAN } else { v })
        }

        fn jacobian(&self, _y: ArrayView1<f64>, _f0: ArrayView1<f64>) -> BorderedBlockMatrix {
            let mut j = BorderedBlockMatrix::zeros(1);
            for i in 0..4 {
                j.blocks[0][i][i] = 1.0;
            }
            j.corner = 1.0;
            j
        }
    }

    #[test]
    fn test_non_finite_derivative_is_integration_failure_with_state() {
        let y0 = Array1::from_elem(5, 1.0);
        let err = integrate(&Blowup, y0, 10.0, None, &SolverParams::default()).unwrap_err();
        match err.downcast_ref::<ThermoError>() {
            Some(ThermoError::IntegrationFailure { last_state, time, .. }) => {
                assert_eq!(last_state.len(), 5);
                assert!(last_state.iter().all(|v| v.is_finite() && *v <= 2.0));
                assert!(*time < 10.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
