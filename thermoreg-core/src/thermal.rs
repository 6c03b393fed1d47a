//! Thermal state model: four compartments per element plus a central blood
//! pool, driven by the thermoregulatory control laws.
//!
//! One implementation serves every element layout; the [GeometryIndexing]
//! strategy decides how many elements there are and which segment each one
//! belongs to. Extensive segment quantities are sliced onto elements by their
//! area fraction, so a mesh that splits segments uniformly reproduces the
//! 16-element temperatures.

use crate::air_properties::{saturated_vapor_pressure_kpa, vapor_pressure_kpa};
use crate::boundary::BoundaryConditions;
use crate::clothing::ClothingResistance;
use crate::comfort::{fanger::FangerInputs, zhang::ZhangInputs};
use crate::geometry::GeometryIndexing;
use crate::imports::*;
use crate::integrator::{self, linalg::BorderedBlockMatrix, OdeSystem, SolverParams, SolverStats};
use crate::params::*;
use crate::personalize::ParameterBundle;
use crate::radiation::RadiationFlux;
use crate::segment::{CORE, MUSCLE, SKIN};

const NC: usize = N_COMPARTMENTS;

/// Segment tables distributed onto solved elements
#[derive(Debug, Clone, PartialEq)]
struct ElementTables {
    segment: Vec<Segment>,
    fraction: Array1<f64>,
    /// \[m²\]
    area: Array1<f64>,
    heat_capacity: Array2<f64>,
    metabolic_rate: Array2<f64>,
    /// share of external work, applied through the element area
    work_distribution: Array1<f64>,
    basal_blood_flow: Array2<f64>,
    conductance: Array2<f64>,
    set_point: Array2<f64>,
    skin_receptor_weight: Array1<f64>,
    sweat_distribution: Array1<f64>,
    vasodilation_distribution: Array1<f64>,
    vasoconstriction_distribution: Array1<f64>,
    shivering_distribution: Array1<f64>,
    /// weight of each element in the head core reference signal
    head_weight: Array1<f64>,
    /// share of respiratory loss drawn from each element's core
    chest_weight: Array1<f64>,
}

impl ElementTables {
    fn slice<G: GeometryIndexing + ?Sized>(bundle: &ParameterBundle, indexing: &G) -> Self {
        let n = indexing.n_elements();
        let segment: Vec<Segment> = (0..n).map(|e| indexing.segment_of(e)).collect();
        let fraction: Array1<f64> = (0..n).map(|e| indexing.area_fraction_of(e)).collect();

        let extensive_table = |table: &Array2<f64>| {
            Array2::from_shape_fn((n, table.ncols()), |(e, j)| {
                table[[segment[e].index(), j]] * fraction[e]
            })
        };
        let intensive_table = |table: &Array2<f64>| {
            Array2::from_shape_fn((n, table.ncols()), |(e, j)| table[[segment[e].index(), j]])
        };
        let extensive = |column: &Array1<f64>| -> Array1<f64> {
            (0..n).map(|e| column[segment[e].index()] * fraction[e]).collect()
        };
        let intensive = |column: &Array1<f64>| -> Array1<f64> {
            (0..n).map(|e| column[segment[e].index()]).collect()
        };
        let only = |target: Segment| -> Array1<f64> {
            (0..n)
                .map(|e| if segment[e] == target { fraction[e] } else { 0.0 })
                .collect()
        };

        let area = extensive(&bundle.surface_area);
        let heat_capacity = extensive_table(&bundle.heat_capacity);
        let metabolic_rate = extensive_table(&bundle.metabolic_rate);
        let work_distribution = intensive(&bundle.work_distribution);
        let basal_blood_flow = extensive_table(&bundle.basal_blood_flow);
        let conductance = extensive_table(&bundle.conductance);
        let set_point = intensive_table(&bundle.set_point);
        let skin_receptor_weight = extensive(&bundle.skin_receptor_weight);
        let sweat_distribution = extensive(&bundle.sweat_distribution);
        let vasodilation_distribution = extensive(&bundle.vasodilation_distribution);
        let vasoconstriction_distribution = intensive(&bundle.vasoconstriction_distribution);
        let shivering_distribution = extensive(&bundle.shivering_distribution);
        let head_weight = only(Segment::Head);
        let chest_weight = only(Segment::Chest);

        Self {
            segment,
            fraction,
            area,
            heat_capacity,
            metabolic_rate,
            work_distribution,
            basal_blood_flow,
            conductance,
            set_point,
            skin_receptor_weight,
            sweat_distribution,
            vasodilation_distribution,
            vasoconstriction_distribution,
            shivering_distribution,
            head_weight,
            chest_weight,
        }
    }
}

/// Whole-body control signals of one evaluation
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, ApproxEq)]
pub struct ControlSignals {
    /// head core error \[°C\]
    pub head_core_error: f64,
    /// weighted warm skin error
    pub warm_skin: f64,
    /// weighted cold skin error
    pub cold_skin: f64,
    /// shivering heat before distribution \[W\]
    pub shivering: f64,
    pub vasodilation: f64,
    pub vasoconstriction: f64,
}

/// Every intermediate of one derivative evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct HeatBalance {
    /// n×4 \[°C/s\]
    pub derivative: Array2<f64>,
    /// \[°C/s\]
    pub blood_pool_derivative: f64,
    /// n×4 heat production \[W\]
    pub heat_production: Array2<f64>,
    /// n×4 blood flow \[L/h\]
    pub blood_flow: Array2<f64>,
    /// regulatory sweat \[W\]
    pub sweat: Array1<f64>,
    /// evaporative capacity \[W\]
    pub max_evaporation: Array1<f64>,
    /// actual evaporation \[W\]
    pub evaporation: Array1<f64>,
    /// dry heat loss \[W\]
    pub dry_heat_loss: Array1<f64>,
    /// total respiratory loss \[W\]
    pub respiration: f64,
    pub signals: ControlSignals,
}

impl HeatBalance {
    /// `0.06 + 0.94·Esw/Emax` with the ratio clamped to \[0, 1\]
    pub fn wettedness(&self) -> Array1<f64> {
        Zip::from(&self.sweat)
            .and(&self.max_evaporation)
            .map_collect(|&esw, &emax| {
                let emax = if emax == 0.0 { 1.0 } else { emax };
                0.06 + 0.94 * (esw / emax).clamp(0.0, 1.0)
            })
    }
}

/// Multi-element thermoregulation model over the indexing strategy `G`
#[derive(Debug, Clone)]
pub struct ThermalModel<G: GeometryIndexing> {
    indexing: G,
    params: ModelParams,
    solver: SolverParams,
    bundle: ParameterBundle,
    tables: ElementTables,
    boundary: BoundaryConditions,
    /// external work per element, muscle compartment \[W\]
    work: Array1<f64>,
    /// n×4 \[°C\]
    temperature: Array2<f64>,
    blood_pool_temperature: f64,
    wettedness: Array1<f64>,
    step_hint: Option<f64>,
    last_stats: SolverStats,
}

impl<G: GeometryIndexing> ThermalModel<G> {
    /// Distributes `bundle` onto the elements of `indexing`. A geometry that
    /// measures its own segment areas rescales the metabolic quantities first.
    pub fn new(bundle: ParameterBundle, indexing: G, params: ModelParams) -> anyhow::Result<Self> {
        bundle.check()?;
        let bundle = match indexing.segment_areas() {
            Some(areas) => bundle
                .scale_to_surface_area(areas.view(), params.metabolic_scaling_exponent)
                .with_context(|| format_dbg!())?,
            None => bundle,
        };
        let n = indexing.n_elements();
        ensure!(n > 0, config_err!("geometry has no elements"));
        for segment in Segment::ALL {
            ensure!(
                !indexing.elements_of(segment).is_empty(),
                config_err!("segment {segment} has no elements")
            );
        }
        let tables = ElementTables::slice(&bundle, &indexing);
        ensure!(
            tables.fraction.iter().all(|f| f.is_finite() && *f > 0.0),
            config_err!("element area fractions must be positive")
        );
        let mut model = Self {
            params,
            solver: SolverParams::default(),
            tables,
            boundary: BoundaryConditions::neutral(n),
            work: Array1::zeros(n),
            temperature: Array2::zeros((n, NC)),
            blood_pool_temperature: bundle.blood_pool.set_point,
            wettedness: Array1::from_elem(n, 0.06),
            step_hint: None,
            last_stats: SolverStats::default(),
            bundle,
            indexing,
        };
        model.initialize_from_set_points();
        model.update_work();
        Ok(model)
    }

    pub fn with_solver(mut self, solver: SolverParams) -> Self {
        self.solver = solver;
        self
    }

    pub fn indexing(&self) -> &G {
        &self.indexing
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn bundle(&self) -> &ParameterBundle {
        &self.bundle
    }

    pub fn boundary(&self) -> &BoundaryConditions {
        &self.boundary
    }

    pub fn n_elements(&self) -> usize {
        self.tables.segment.len()
    }

    /// Element areas \[m²\]
    pub fn element_area(&self) -> &Array1<f64> {
        &self.tables.area
    }

    /// Sets air velocity and the exchange coefficients served by `clothing`
    pub fn set_clothing<C: ClothingResistance + ?Sized>(
        &mut self,
        clothing: &C,
        air_velocity: f64,
    ) -> anyhow::Result<()> {
        ensure!(
            air_velocity.is_finite() && air_velocity >= 0.0,
            config_err!("air velocity {air_velocity} must be non-negative")
        );
        self.boundary.air_velocity = air_velocity;
        self.boundary
            .set_clothing(clothing, &self.indexing, &self.params);
        ensure!(
            self.boundary
                .h_c
                .iter()
                .chain(self.boundary.h_e.iter())
                .all(|h| h.is_finite() && *h > 0.0),
            config_err!("clothing model produced non-positive exchange coefficients")
        );
        Ok(())
    }

    /// Redistributes `flux` onto the elements; fails with
    /// [ThermoError::BoundaryMismatch] when its resolution does not fit
    pub fn set_radiation(&mut self, flux: &RadiationFlux, source_name: &str) -> anyhow::Result<()> {
        self.boundary.radiant_flux = flux.redistribute(&self.indexing, source_name)?;
        Ok(())
    }

    /// \[°C\]
    pub fn set_ambient_temperature(&mut self, ambient_temperature: f64) -> anyhow::Result<()> {
        ensure!(
            ambient_temperature.is_finite() && (-50.0..=100.0).contains(&ambient_temperature),
            config_err!("ambient temperature {ambient_temperature} °C out of range")
        );
        self.boundary.ambient_temperature = ambient_temperature;
        Ok(())
    }

    /// Relative humidity as a fraction
    pub fn set_relative_humidity(&mut self, relative_humidity: f64) -> anyhow::Result<()> {
        ensure!(
            (0.0..=1.0).contains(&relative_humidity),
            config_err!("relative humidity {relative_humidity} outside [0, 1]")
        );
        self.boundary.relative_humidity = relative_humidity;
        Ok(())
    }

    /// Metabolic rate \[met\]; external work follows from it
    pub fn set_met(&mut self, met: f64) -> anyhow::Result<()> {
        ensure!(
            met.is_finite() && met >= 0.0,
            config_err!("metabolic rate {met} must be non-negative")
        );
        self.boundary.met = met;
        self.update_work();
        Ok(())
    }

    /// External work above basal metabolism, floored at zero
    fn update_work(&mut self) {
        let excess = W_PER_M2_PER_MET * (self.boundary.met - self.bundle.basal_met);
        self.work = Zip::from(&self.tables.area)
            .and(&self.tables.work_distribution)
            .map_collect(|&area, &metf| (excess * area * metf).max(0.0));
    }

    /// External work per element \[W\]
    pub fn work(&self) -> &Array1<f64> {
        &self.work
    }

    /// Sets every compartment and the blood pool to its set point
    pub fn initialize_from_set_points(&mut self) {
        self.temperature.assign(&self.tables.set_point);
        self.blood_pool_temperature = self.bundle.blood_pool.set_point;
        self.step_hint = None;
    }

    /// Returns to the state of a fresh model: temperatures at set point, no
    /// radiant flux and basal wettedness. Exchange coefficients, ambient
    /// conditions and met are left for the next activity to set.
    pub fn reset(&mut self) {
        self.initialize_from_set_points();
        self.boundary.radiant_flux.fill(0.0);
        self.wettedness.fill(0.06);
        self.last_stats = SolverStats::default();
    }

    /// Flat state `[T_00, T_01, .., T_(n-1)3, T_cbp]`
    pub fn state(&self) -> Array1<f64> {
        let mut y = Array1::zeros(self.dim());
        y.slice_mut(s![..NC * self.n_elements()])
            .iter_mut()
            .zip(self.temperature.iter())
            .for_each(|(y, t)| *y = *t);
        y[NC * self.n_elements()] = self.blood_pool_temperature;
        y
    }

    pub fn set_state(&mut self, y: ArrayView1<f64>) -> anyhow::Result<()> {
        ensure!(
            y.len() == self.dim(),
            config_err!("state of length {} for {} elements", y.len(), self.n_elements())
        );
        ensure!(utils::all_finite(&y), config_err!("state contains non-finite values"));
        let n = self.n_elements();
        self.temperature
            .iter_mut()
            .zip(y.slice(s![..NC * n]).iter())
            .for_each(|(t, y)| *t = *y);
        self.blood_pool_temperature = y[NC * n];
        Ok(())
    }

    /// n×4 compartment temperatures \[°C\]
    pub fn temperature(&self) -> &Array2<f64> {
        &self.temperature
    }

    pub fn blood_pool_temperature(&self) -> f64 {
        self.blood_pool_temperature
    }

    /// Skin wettedness per element after the last solve
    pub fn wettedness(&self) -> &Array1<f64> {
        &self.wettedness
    }

    pub fn last_solver_stats(&self) -> &SolverStats {
        &self.last_stats
    }

    /// Mean radiant temperature per element \[°C\]
    pub fn radiant_temperature(&self) -> Array1<f64> {
        let ta = self.boundary.ambient_temperature;
        Zip::from(&self.boundary.radiant_flux)
            .and(&self.tables.area)
            .and(self.tables.heat_capacity.column(SKIN))
            .map_collect(|&flux, &area, &c_skin| ta + flux * area / J_PER_CAL / (c_skin * S_PER_H))
    }

    /// Operative temperature per element \[°C\]
    pub fn operative_temperature(&self) -> Array1<f64> {
        let hr = self.params.h_r;
        let ta = self.boundary.ambient_temperature;
        Zip::from(&self.radiant_temperature())
            .and(&self.boundary.h_c)
            .map_collect(|&tr, &hc| (hr * tr + hc * ta) / (hr + hc))
    }

    /// Evaluates the heat balance at the flat state `y`
    pub fn evaluate(&self, y: ArrayView1<f64>) -> HeatBalance {
        let n = self.n_elements();
        let tab = &self.tables;
        let ctl = &self.bundle.control;
        let bc = &self.boundary;
        let p = &self.params;
        let temp = |e: usize, k: usize| y[NC * e + k];
        let t_cbp = y[NC * n];

        let mut warm_skin = 0.0;
        let mut cold_skin = 0.0;
        let mut head_core_error = 0.0;
        for e in 0..n {
            let err_skin = temp(e, SKIN) - tab.set_point[[e, SKIN]];
            warm_skin += tab.skin_receptor_weight[e] * err_skin.max(0.0);
            cold_skin += tab.skin_receptor_weight[e] * (-err_skin).max(0.0);
            head_core_error += tab.head_weight[e] * (temp(e, CORE) - tab.set_point[[e, CORE]]);
        }
        let warm_head = head_core_error.max(0.0);
        let cold_head = (-head_core_error).max(0.0);
        let skin_error = warm_skin - cold_skin;
        let signals = ControlSignals {
            head_core_error,
            warm_skin,
            cold_skin,
            shivering: (-ctl.cch * head_core_error - ctl.sch * skin_error
                + ctl.pch * cold_head * cold_skin)
                .max(0.0),
            vasodilation: (ctl.cdl * head_core_error + ctl.sdl * skin_error
                + ctl.pdl * warm_head * warm_skin)
                .max(0.0),
            vasoconstriction: (-ctl.cst * head_core_error - ctl.sst * skin_error
                + ctl.pst * cold_head * cold_skin)
                .max(0.0),
        };
        let sweat_signal =
            ctl.csw * head_core_error + ctl.ssw * skin_error + ctl.psw * warm_head * warm_skin;

        let ta = bc.ambient_temperature;
        let pa = vapor_pressure_kpa(ta, bc.relative_humidity);
        let operative = self.operative_temperature();

        let mut heat_production = tab.metabolic_rate.clone();
        let mut blood_flow = tab.basal_blood_flow.clone();
        let mut sweat = Array1::zeros(n);
        let mut max_evaporation = Array1::zeros(n);
        let mut evaporation = Array1::zeros(n);
        let mut dry_heat_loss = Array1::zeros(n);
        for e in 0..n {
            let extra = self.work[e] + signals.shivering * tab.shivering_distribution[e];
            heat_production[[e, MUSCLE]] += extra;
            blood_flow[[e, MUSCLE]] += extra / BLOOD_FLOW_HEAT_EQUIVALENT;

            let t_skin = temp(e, SKIN);
            let km = 2f64.powf((t_skin - tab.set_point[[e, SKIN]]) / 10.0);
            blood_flow[[e, SKIN]] = km
                * (tab.basal_blood_flow[[e, SKIN]]
                    + tab.vasodilation_distribution[e] * signals.vasodilation)
                / (1.0 + tab.vasoconstriction_distribution[e] * signals.vasoconstriction);
            sweat[e] = (sweat_signal * tab.sweat_distribution[e] * km).max(0.0);

            dry_heat_loss[e] = (t_skin - operative[e]) * bc.h_c[e] * tab.area[e];
            max_evaporation[e] = (p.emax_factor * (saturated_vapor_pressure_kpa(t_skin) - pa)
                * tab.area[e]
                / bc.h_e[e])
                .max(0.0);
            evaporation[e] =
                sweat[e].min(p.esw_scale_factor * (max_evaporation[e] - sweat[e]) + sweat[e]);
        }
        let respiration =
            (0.0014 * (34.0 - ta) + 0.017 * (5.867 - pa)) * heat_production.sum();

        let mut derivative = Array2::zeros((n, NC));
        let mut pool = 0.0;
        let arc = p.alpha * p.rho_c;
        for e in 0..n {
            let bf: [f64; NC] =
                std::array::from_fn(|k| arc * blood_flow[[e, k]] * (temp(e, k) - t_cbp));
            let d: [f64; NC - 1] =
                std::array::from_fn(|k| tab.conductance[[e, k]] * (temp(e, k) - temp(e, k + 1)));
            let q = heat_production.row(e);
            let radiant = bc.radiant_flux[e] * tab.area[e];
            let balance = [
                q[0] - bf[0] - d[0] - respiration * tab.chest_weight[e],
                q[1] - bf[1] + d[0] - d[1],
                q[2] - bf[2] + d[1] - d[2],
                q[3] - bf[3] + d[2] - dry_heat_loss[e] - evaporation[e] + radiant,
            ];
            for k in 0..NC {
                derivative[[e, k]] = balance[k] / (tab.heat_capacity[[e, k]] * S_PER_H);
            }
            pool += bf.iter().sum::<f64>();
        }

        HeatBalance {
            derivative,
            blood_pool_derivative: pool / (self.bundle.blood_pool.heat_capacity * S_PER_H),
            heat_production,
            blood_flow,
            sweat,
            max_evaporation,
            evaporation,
            dry_heat_loss,
            respiration,
            signals,
        }
    }

    /// Heat balance at the current state
    pub fn heat_balance(&self) -> HeatBalance {
        self.evaluate(self.state().view())
    }

    /// Advances the state by `duration` seconds. On failure the state is left
    /// at its value before the call and the error carries the last accepted
    /// state of the solver.
    pub fn solve(&mut self, duration: f64) -> anyhow::Result<&SolverStats> {
        let (y, stats) =
            integrator::integrate(&*self, self.state(), duration, self.step_hint, &self.solver)?;
        if !utils::all_finite(&y) {
            bail!(ThermoError::IntegrationFailure {
                time: duration,
                reason: "non-finite state".into(),
                last_state: y,
            });
        }
        self.set_state(y.view())?;
        let balance = self.evaluate(y.view());
        self.wettedness = balance.wettedness();
        self.step_hint = stats.last_step.or(self.step_hint);
        self.last_stats = stats;
        Ok(&self.last_stats)
    }

    /// Area-weighted mean skin temperature \[°C\]
    pub fn mean_skin_temperature(&self) -> f64 {
        utils::weighted_mean(self.temperature.column(SKIN), self.tables.area.view())
    }

    /// Area-weighted mean core temperature \[°C\]
    pub fn mean_core_temperature(&self) -> f64 {
        utils::weighted_mean(self.temperature.column(CORE), self.tables.area.view())
    }

    /// Pelvis core temperature \[°C\]
    pub fn rectal_temperature(&self) -> f64 {
        self.segment_mean(self.temperature.column(CORE), Segment::Pelvis)
    }

    /// Mean convective coefficient over elements
    pub fn mean_heat_transfer_coefficient(&self) -> f64 {
        self.boundary.h_c.mean().unwrap_or_default()
    }

    /// Mean evaporative value over elements
    pub fn mean_vapour_transfer_coefficient(&self) -> f64 {
        self.boundary.h_e.mean().unwrap_or_default()
    }

    fn segment_mean(&self, values: ArrayView1<f64>, segment: Segment) -> f64 {
        let (sum, area) = self
            .indexing
            .elements_of(segment)
            .iter()
            .fold((0.0, 0.0), |(sum, area), &e| {
                (sum + values[e] * self.tables.area[e], area + self.tables.area[e])
            });
        if area > 0.0 {
            sum / area
        } else {
            0.0
        }
    }

    /// Area-weighted mean of an element quantity per segment
    pub fn segment_means(&self, values: ArrayView1<f64>) -> Array1<f64> {
        Segment::ALL
            .iter()
            .map(|&segment| self.segment_mean(values, segment))
            .collect()
    }

    /// Skin and core temperatures per segment with their rates of change
    pub fn zhang_inputs(&self) -> ZhangInputs {
        let balance = self.heat_balance();
        ZhangInputs {
            skin_temperature: self.segment_means(self.temperature.column(SKIN)),
            skin_rate: self.segment_means(balance.derivative.column(SKIN)),
            core_temperature: self.segment_means(self.temperature.column(CORE)),
            core_rate: self.segment_means(balance.derivative.column(CORE)),
            skin_set_point: self.segment_means(self.tables.set_point.column(SKIN)),
        }
    }

    /// Whole-body conditions for the steady-state comfort equation
    pub fn fanger_inputs(&self, clothing_insulation: f64) -> FangerInputs {
        let radiant = self.radiant_temperature();
        FangerInputs {
            ambient_temperature: self.boundary.ambient_temperature,
            mean_radiant_temperature: utils::weighted_mean(radiant.view(), self.tables.area.view()),
            air_velocity: self.boundary.air_velocity,
            relative_humidity: self.boundary.relative_humidity,
            met: self.boundary.met,
            work: 0.0,
            clothing_insulation,
        }
    }

    /// Maps a per-element quantity onto the reporting elements
    pub fn to_output(&self, values: ArrayView1<f64>) -> Array1<f64> {
        self.indexing.expand_segment_result_to_elements(values)
    }
}

impl<G: GeometryIndexing> OdeSystem for ThermalModel<G> {
    fn dim(&self) -> usize {
        NC * self.n_elements() + 1
    }

    fn derivative(&self, y: ArrayView1<f64>) -> Array1<f64> {
        let balance = self.evaluate(y);
        let n = self.n_elements();
        let mut f = Array1::zeros(NC * n + 1);
        f.slice_mut(s![..NC * n])
            .iter_mut()
            .zip(balance.derivative.iter())
            .for_each(|(f, d)| *f = *d);
        f[NC * n] = balance.blood_pool_derivative;
        f
    }

    /// Diagonal blocks by finite differences, perturbing one compartment of
    /// every element at once; blood pool border from the blood flows
    fn jacobian(&self, y: ArrayView1<f64>, f0: ArrayView1<f64>) -> BorderedBlockMatrix {
        let n = self.n_elements();
        let mut jac = BorderedBlockMatrix::zeros(n);
        for k in 0..NC {
            let mut yp = y.to_owned();
            let mut delta = vec![0.0; n];
            for e in 0..n {
                delta[e] = 1e-7 * y[NC * e + k].abs().max(1.0);
                yp[NC * e + k] += delta[e];
            }
            let fp = self.derivative(yp.view());
            for e in 0..n {
                for i in 0..NC {
                    jac.blocks[e][i][k] = (fp[NC * e + i] - f0[NC * e + i]) / delta[e];
                }
            }
        }
        let balance = self.evaluate(y);
        let arc = self.params.alpha * self.params.rho_c;
        let c_pool = self.bundle.blood_pool.heat_capacity * S_PER_H;
        let mut corner = 0.0;
        for e in 0..n {
            for k in 0..NC {
                let flow = arc * balance.blood_flow[[e, k]];
                jac.column[e][k] = flow / (self.tables.heat_capacity[[e, k]] * S_PER_H);
                jac.row[e][k] = flow / c_pool;
                corner -= flow / c_pool;
            }
        }
        jac.corner = corner;
        jac
    }
}
