//! Module containing miscellaneous utility functions.

use crate::imports::*;

/// Round `x` to `decimals` places after the decimal point
pub fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}

/// Area-weighted mean of `values`
pub fn weighted_mean(values: ArrayView1<f64>, weights: ArrayView1<f64>) -> f64 {
    let total: f64 = weights.sum();
    if total == 0.0 {
        return 0.0;
    }
    values.dot(&weights) / total
}

/// Returns true if every value is finite
pub fn all_finite<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> bool {
    values.into_iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_two_decimals() {
        assert_eq!(round_to(1.86909, 2), 1.87);
        assert_eq!(round_to(74.434, 2), 74.43);
    }

    #[test]
    fn test_weighted_mean() {
        let v = array![30.0, 34.0];
        let w = array![1.0, 3.0];
        assert!(weighted_mean(v.view(), w.view()).approx_eq(&33.0, 1e-12));
        assert_eq!(weighted_mean(v.view(), array![0.0, 0.0].view()), 0.0);
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[1.0, 2.0]));
        assert!(!all_finite(&[1.0, f64::NAN]));
    }
}
