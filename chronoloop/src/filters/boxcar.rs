use super::{Filter, SlidingWindow};

/// Moving average of the last `N` samples.
///
/// Keeps a running sum so each update costs the same regardless of the window
/// length. Until the window has filled up the average is over the samples
/// seen so far.
#[derive(Debug, Clone)]
pub struct BoxcarFilter<const N: usize> {
    window: SlidingWindow<i64, N>,
    sum: i128,
}

impl<const N: usize> Default for BoxcarFilter<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BoxcarFilter<N> {
    pub fn new() -> Self {
        Self {
            window: SlidingWindow::new(),
            sum: 0,
        }
    }

    /// Average only the last `len` samples, up to `N`
    pub fn set_window(&mut self, len: usize) {
        self.window.set_len(len);
        self.sum = 0;
    }
}

impl<const N: usize> Filter for BoxcarFilter<N> {
    fn reset(&mut self) {
        self.window.reset();
        self.sum = 0;
    }

    fn update(&mut self, sample: Option<i64>, _elapsed_usec: u32) -> Option<i64> {
        let sample = sample?;
        if let Some(evicted) = self.window.push(sample) {
            self.sum -= evicted as i128;
        }
        self.sum += sample as i128;

        // round half away from zero
        let count = self.window.len() as i128;
        let half = count / 2;
        let mean = if self.sum >= 0 {
            (self.sum + half) / count
        } else {
            (self.sum - half) / count
        };
        Some(mean as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_settles_after_full_window() {
        let mut filter = BoxcarFilter::<4>::new();
        for _ in 0..4 {
            assert_eq!(filter.update(Some(0), 1_000_000), Some(0));
        }

        let outputs: [Option<i64>; 5] =
            core::array::from_fn(|_| filter.update(Some(1000), 1_000_000));
        assert_eq!(
            outputs,
            [Some(250), Some(500), Some(750), Some(1000), Some(1000)]
        );
    }

    #[test]
    fn running_sum_matches_recompute() {
        let mut filter = BoxcarFilter::<7>::new();
        let mut history = [0i64; 64];
        let mut seed = 0x2545_f491_4f6c_dd1du64;

        for i in 0..history.len() {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let sample = (seed % 2_000_000_000) as i64 - 1_000_000_000;
            history[i] = sample;

            let window = &history[i.saturating_sub(6)..=i];
            let naive = window.iter().map(|&v| v as f64).sum::<f64>() / window.len() as f64;
            let output = filter.update(Some(sample), 1_000_000).unwrap();
            assert!((output as f64 - naive).abs() <= 0.5 + 1e-6, "{output} {naive}");
        }
    }

    #[test]
    fn discarded_samples_leave_state_alone() {
        let mut filter = BoxcarFilter::<2>::new();
        let _ = filter.update(Some(10), 1_000_000);
        assert_eq!(filter.update(None, 1_000_000), None);
        assert_eq!(filter.update(Some(20), 1_000_000), Some(15));
    }
}
