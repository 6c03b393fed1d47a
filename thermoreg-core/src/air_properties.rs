//! Water-vapour pressure correlations used at the skin/air interface.

/// Saturated vapour pressure \[kPa\] over water at `te_c` \[°C\] (Tetens form)
pub fn saturated_vapor_pressure_kpa(te_c: f64) -> f64 {
    0.61078 * (17.625 * te_c / (te_c + 237.3)).exp()
}

/// Partial vapour pressure \[kPa\] of air at `te_c` \[°C\] and relative
/// humidity `rh` given as a fraction
pub fn vapor_pressure_kpa(te_c: f64, rh: f64) -> f64 {
    rh * saturated_vapor_pressure_kpa(te_c)
}

/// Partial vapour pressure \[Pa\] in the form used by the steady-state comfort
/// equation; `rh` is a fraction
pub fn fanger_vapor_pressure_pa(te_c: f64, rh: f64) -> f64 {
    rh * 100.0 * 10.0 * (16.6536 - 4030.183 / (te_c + 235.0)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ApproxEq;

    #[test]
    fn test_saturation_pressure_at_reference_points() {
        assert!(saturated_vapor_pressure_kpa(0.0).approx_eq(&0.61078, 1e-9));
        assert!(saturated_vapor_pressure_kpa(25.0).approx_eq(&3.2766870465506286, 1e-9));
    }

    #[test]
    fn test_fanger_pressure_is_in_pascal() {
        // 50 % at 25 °C is roughly 1.58 kPa
        let pa = fanger_vapor_pressure_pa(25.0, 0.5);
        assert!(pa > 1500.0 && pa < 1650.0, "{pa}");
    }

    #[test]
    fn test_dry_air_has_no_vapour() {
        assert_eq!(vapor_pressure_kpa(30.0, 0.0), 0.0);
    }
}
