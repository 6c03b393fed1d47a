use super::*;
use rayon::prelude::*;

/// Independent runs, e.g. one per subject, executed serially or on the rayon
/// thread pool. Runs never share state.
#[derive(Debug, Clone, Default)]
pub struct SimulationBatch<G: GeometryIndexing>(pub Vec<Simulator<G>>);

impl<G: GeometryIndexing + Send> SimulationBatch<G> {
    /// Calls `run` for each simulator in the batch. Every run is carried to
    /// its end; afterwards the first run that did not complete is reported.
    /// # Arguments:
    /// * parallelize: whether to parallelize `run` calls
    pub fn run(&mut self, parallelize: Option<bool>) -> anyhow::Result<()> {
        let parallelize = parallelize.unwrap_or(true);
        if parallelize {
            self.0.par_iter_mut().for_each(|sim| {
                sim.run();
            });
        } else {
            self.0.iter_mut().for_each(|sim| {
                sim.run();
            });
        }
        self.0.iter().enumerate().try_for_each(|(i, sim)| {
            let status = &sim.trace().status;
            if status.is_completed() {
                Ok(())
            } else {
                Err(anyhow!("{status:?}")).with_context(|| format!("simulation idx: {}", i))
            }
        })
    }

    pub fn statuses(&self) -> Vec<&RunStatus> {
        self.0.iter().map(|sim| &sim.trace().status).collect()
    }

    pub fn traces(&self) -> Vec<&SimulationTrace> {
        self.0.iter().map(|sim| sim.trace()).collect()
    }

    pub fn into_traces(self) -> Vec<SimulationTrace> {
        self.0.into_iter().map(Simulator::into_trace).collect()
    }

    pub fn push(&mut self, sim: Simulator<G>) {
        self.0.push(sim);
    }

    pub fn pop(&mut self) -> Option<Simulator<G>> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(all(test, feature = "resources"))]
mod tests {
    use super::*;
    use crate::geometry::ProjectedIndexing;
    use crate::params::ModelParams;
    use crate::personalize::Anthropometrics;
    use crate::reference::ReferenceBody;

    fn batch() -> SimulationBatch<ProjectedIndexing> {
        let reference = ReferenceBody::standard().unwrap();
        let subjects = [(1.72, 74.43), (1.60, 55.0), (1.90, 95.0)];
        let sims = subjects
            .iter()
            .map(|&(height, weight)| {
                let bundle = Anthropometrics {
                    height,
                    weight,
                    ..Anthropometrics::standard()
                }
                .personalize(&reference)
                .unwrap();
                let model =
                    ThermalModel::new(bundle, ProjectedIndexing::new(), ModelParams::default()).unwrap();
                let schedule = ActivitySchedule::new(vec![Activity {
                    duration_minutes: 5.0,
                    ambient_temperature: 24.0,
                    ..Default::default()
                }]);
                Simulator::new(
                    model,
                    schedule,
                    SimulationParams {
                        sub_steps: 2,
                        ..Default::default()
                    },
                )
                .unwrap()
            })
            .collect();
        SimulationBatch(sims)
    }

    #[test]
    fn test_parallel_matches_serial() {
        let mut serial = batch();
        let mut parallel = batch();
        serial.run(Some(false)).unwrap();
        parallel.run(Some(true)).unwrap();
        assert_eq!(serial.traces(), parallel.traces());
        assert!(serial.statuses().iter().all(|s| s.is_completed()));
        assert_eq!(parallel.len(), 3);
    }
}
