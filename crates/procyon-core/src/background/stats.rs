/// Sigma-clipped summary statistics of a pixel sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
}

/// Median of a sample; sorts a scratch copy.
pub fn median(values: &[f64]) -> f64 {
    debug_assert!(!values.is_empty());
    let mut scratch: Vec<f64> = values.to_vec();
    scratch.sort_by(|a, b| a.partial_cmp(b).expect("no NaN in sample"));
    let n = scratch.len();
    if n % 2 == 1 {
        scratch[n / 2]
    } else {
        0.5 * (scratch[n / 2 - 1] + scratch[n / 2])
    }
}

/// Iterative sigma-clipped mean/median/stddev.
///
/// Per iteration: compute the median and stddev of the surviving sample and
/// drop values beyond `sigma` standard deviations of the median. Stops when
/// an iteration rejects nothing, the spread collapses, or `max_iters` is
/// reached. Returns statistics of the surviving sample.
pub fn sigma_clipped_stats(values: &[f32], sigma: f64, max_iters: usize) -> ClippedStats {
    let mut sample: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    if sample.is_empty() {
        return ClippedStats {
            mean: 0.0,
            median: 0.0,
            stddev: 0.0,
        };
    }

    for _ in 0..max_iters {
        let center = median(&sample);
        let stddev = stddev_about_mean(&sample);
        if stddev < 1e-12 {
            break;
        }
        let lo = center - sigma * stddev;
        let hi = center + sigma * stddev;
        let before = sample.len();
        sample.retain(|&v| v >= lo && v <= hi);
        if sample.len() == before || sample.is_empty() {
            break;
        }
    }

    if sample.is_empty() {
        // Everything clipped away; fall back to the raw sample.
        sample = values.iter().map(|&v| v as f64).collect();
    }

    let mean = sample.iter().sum::<f64>() / sample.len() as f64;
    ClippedStats {
        mean,
        median: median(&sample),
        stddev: stddev_about_mean(&sample),
    }
}

fn stddev_about_mean(sample: &[f64]) -> f64 {
    let n = sample.len() as f64;
    let mean = sample.iter().sum::<f64>() / n;
    let var = sample.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipping_rejects_outliers() {
        // Flat sample with one hot pixel.
        let mut values = vec![10.0f32; 50];
        values.push(5000.0);
        let stats = sigma_clipped_stats(&values, 3.0, 10);
        assert!((stats.median - 10.0).abs() < 1e-9);
        assert!((stats.mean - 10.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_sample_statistics() {
        let values = vec![3.5f32; 16];
        let stats = sigma_clipped_stats(&values, 3.0, 10);
        assert_eq!(stats.mean, 3.5);
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[1.0, 3.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }
}
