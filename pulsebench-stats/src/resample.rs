//! Resampling With Replacement

use rand::Rng;

/// Draw `samples.len()` values uniformly at random from `samples` with
/// replacement. Returns an empty vector for empty input.
pub fn resample<R: Rng>(samples: &[f64], rng: &mut R) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    (0..samples.len())
        .map(|_| samples[rng.gen_range(0..samples.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn test_resample_length() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let resampled = resample(&samples, &mut thread_rng());
        assert_eq!(resampled.len(), samples.len());
    }

    #[test]
    fn test_resample_values_from_input() {
        let samples = vec![10.0, 20.0, 30.0];
        let resampled = resample(&samples, &mut thread_rng());
        assert!(resampled.iter().all(|v| samples.contains(v)));
    }

    #[test]
    fn test_resample_empty() {
        let resampled = resample(&[], &mut thread_rng());
        assert!(resampled.is_empty());
    }

    #[test]
    fn test_resample_single_value() {
        let resampled = resample(&[7.0], &mut thread_rng());
        assert_eq!(resampled, vec![7.0]);
    }
}
