//! Closed-form least-squares slope, shared by the event-trend and
//! economic-trend features. A single-variable slope doesn't need a
//! design-matrix solver; the direct sum-of-products formula is exact and
//! avoids pulling in a linear algebra dependency for a one-line
//! computation.

/// Slope (per unit of x) of the least-squares fit of `y` against
/// `x = 0, 1, 2, ...`. `None` if fewer than 2 points or x has zero
/// variance (can't happen here since x is always 0..n-1 for n >= 2).
pub fn linear_trend_slope(y: &[f64]) -> Option<f64> {
    let n = y.len();
    if n < 2 {
        return None;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = y.iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, yi) in y.iter().enumerate() {
        let xi = i as f64;
        numerator += (xi - x_mean) * (yi - y_mean);
        denominator += (xi - x_mean).powi(2);
    }

    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_has_zero_slope() {
        assert_eq!(linear_trend_slope(&[5.0, 5.0, 5.0]), Some(0.0));
    }

    #[test]
    fn single_point_has_no_slope() {
        assert_eq!(linear_trend_slope(&[5.0]), None);
    }

    #[test]
    fn matches_a_sparse_weekly_burst() {
        let slope = linear_trend_slope(&[3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0]).unwrap();
        assert!((slope - 0.2143).abs() < 0.01, "got {slope}");
    }
}
