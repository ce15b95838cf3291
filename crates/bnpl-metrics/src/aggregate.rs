//! Small numeric helpers shared by the metric kinds

use bnpl_core::SilverRecord;

/// Ratio with the zero-denominator policy: `(0.0, true)` when there is no
/// denominator, otherwise `(num / den, false)`
pub fn ratio(numerator: f64, denominator: f64) -> (f64, bool) {
    if denominator == 0.0 {
        (0.0, true)
    } else {
        (numerator / denominator, false)
    }
}

/// Records ordered by a key field so float sums are reproducible
pub fn sorted_by<'a>(records: &'a [SilverRecord], key: &str) -> Vec<&'a SilverRecord> {
    let mut sorted: Vec<&SilverRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.get_str(key).cmp(&b.get_str(key)));
    sorted
}

/// Left-to-right sum of the last `n` points
pub fn sum_last(points: &[f64], n: usize) -> f64 {
    let start = points.len().saturating_sub(n);
    points[start..].iter().fold(0.0, |acc, p| acc + p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_zero_policy() {
        assert_eq!(ratio(3.0, 0.0), (0.0, true));
        assert_eq!(ratio(7.0, 10.0), (0.7, false));
    }

    #[test]
    fn test_sum_last() {
        let points = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sum_last(&points, 2), 7.0);
        assert_eq!(sum_last(&points, 10), 10.0);
        assert_eq!(sum_last(&[], 7), 0.0);
    }
}
