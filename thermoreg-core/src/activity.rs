//! Activities: the environmental and metabolic conditions held for a
//! duration, and ordered schedules of them.

use crate::clothing::ClothingModel;
use crate::imports::*;
use crate::radiation::RadiationFlux;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Activity {
    #[serde(default)]
    pub label: String,
    /// \[min\]
    pub duration_minutes: f64,
    /// \[%\]
    pub relative_humidity: f64,
    /// \[°C\]
    pub ambient_temperature: f64,
    /// \[m/s\]
    #[serde(default)]
    pub air_velocity: f64,
    /// \[met\]
    pub met: f64,
    #[serde(default)]
    pub clothing: ClothingModel,
    /// radiant flux; `None` keeps the flux of the previous activity
    #[serde(default)]
    pub radiation: Option<RadiationFlux>,
}

impl SerdeAPI for Activity {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate()
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self {
            label: String::new(),
            duration_minutes: 60.0,
            relative_humidity: 50.0,
            ambient_temperature: 24.0,
            air_velocity: 0.1,
            met: 1.0,
            clothing: ClothingModel::default(),
            radiation: None,
        }
    }
}

impl Activity {
    /// \[s\]
    pub fn duration_seconds(&self) -> f64 {
        self.duration_minutes * 60.0
    }

    /// Relative humidity as a fraction
    pub fn humidity_fraction(&self) -> f64 {
        self.relative_humidity / 100.0
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let name = &self.label;
        ensure!(
            self.duration_minutes.is_finite() && self.duration_minutes > 0.0,
            config_err!("activity {name:?}: duration must be positive")
        );
        ensure!(
            (0.0..=100.0).contains(&self.relative_humidity),
            config_err!(
                "activity {name:?}: relative humidity {}% outside [0, 100]",
                self.relative_humidity
            )
        );
        ensure!(
            self.ambient_temperature.is_finite()
                && (-50.0..=100.0).contains(&self.ambient_temperature),
            config_err!(
                "activity {name:?}: ambient temperature {} °C out of range",
                self.ambient_temperature
            )
        );
        ensure!(
            self.air_velocity.is_finite() && self.air_velocity >= 0.0,
            config_err!("activity {name:?}: air velocity must be non-negative")
        );
        ensure!(
            self.met.is_finite() && self.met >= 0.0,
            config_err!("activity {name:?}: metabolic rate must be non-negative")
        );
        self.clothing.validate()
    }
}

/// Activities run in order
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ActivitySchedule {
    #[serde(default)]
    pub name: String,
    pub activities: Vec<Activity>,
}

impl SerdeAPI for ActivitySchedule {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate()
    }
}

impl ActivitySchedule {
    pub fn new(activities: Vec<Activity>) -> Self {
        Self {
            name: String::new(),
            activities,
        }
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// \[min\]
    pub fn total_duration_minutes(&self) -> f64 {
        self.activities.iter().map(|a| a.duration_minutes).sum()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.activities.is_empty(),
            config_err!("schedule {:?} has no activities", self.name)
        );
        for (i, activity) in self.activities.iter().enumerate() {
            activity
                .validate()
                .with_context(|| format!("activity {i} of schedule {:?}", self.name))?;
        }
        Ok(())
    }

    /// Replaces clothing resource references with the loaded ensembles
    pub fn load_clothing(&mut self) -> anyhow::Result<()> {
        for activity in self.activities.iter_mut() {
            activity.clothing = activity.clothing.load()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_activity_uses_defaults() {
        let activity = Activity::from_yaml(
            "duration_minutes: 30\nrelative_humidity: 40\nambient_temperature: 21\nmet: 1.2\n",
        )
        .unwrap();
        assert_eq!(activity.clothing, ClothingModel::Nude);
        assert_eq!(activity.radiation, None);
        assert_eq!(activity.duration_seconds(), 1800.0);
        assert_eq!(activity.humidity_fraction(), 0.4);
    }

    #[test]
    fn test_invalid_activity_is_configuration_error() {
        let err = Activity::from_yaml(
            "duration_minutes: 0\nrelative_humidity: 40\nambient_temperature: 21\nmet: 1.0\n",
        )
        .unwrap_err();
        assert!(err
            .chain()
            .any(|e| matches!(e.downcast_ref::<ThermoError>(), Some(ThermoError::Configuration(_)))));
    }

    #[test]
    fn test_schedule_with_radiation_map() {
        let schedule = ActivitySchedule::from_yaml(
            r#"
name: two steps
activities:
  - { duration_minutes: 10, relative_humidity: 50, ambient_temperature: 24, met: 1.0 }
  - duration_minutes: 5
    relative_humidity: 30
    ambient_temperature: 30
    air_velocity: 0.5
    met: 2.0
    radiation: { Chest: 80.0, Arm: 40.0 }
"#,
        )
        .unwrap();
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.total_duration_minutes(), 15.0);
        let flux = schedule.activities[1].radiation.as_ref().unwrap();
        assert_eq!(flux.values()[Segment::Chest.index()], 80.0);
        assert!(ActivitySchedule::from_yaml("activities: []").is_err());
    }

    #[cfg(feature = "resources")]
    #[test]
    fn test_bundled_schedule_loads() {
        let mut schedule = ActivitySchedule::from_resource("schedules/neutral_office.yaml").unwrap();
        schedule.load_clothing().unwrap();
        assert!(!schedule.is_empty());
    }
}
