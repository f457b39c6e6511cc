use super::{Filter, SlidingWindow};

const NETWORK_3: [(usize, usize); 3] = [(0, 2), (0, 1), (1, 2)];
const NETWORK_5: [(usize, usize); 9] = [
    (0, 1),
    (3, 4),
    (2, 4),
    (2, 3),
    (0, 3),
    (0, 2),
    (1, 4),
    (1, 3),
    (1, 2),
];

fn sort_network(values: &mut [i64], network: &[(usize, usize)]) {
    for &(a, b) in network {
        if values[a] > values[b] {
            values.swap(a, b);
        }
    }
}

/// Median of the last `N` samples.
///
/// Until the window has filled up the median is taken over the samples seen
/// so far. An even window length averages the two middle samples.
#[derive(Debug, Clone)]
pub struct MedianFilter<const N: usize> {
    window: SlidingWindow<i64, N>,
}

impl<const N: usize> Default for MedianFilter<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MedianFilter<N> {
    pub fn new() -> Self {
        Self {
            window: SlidingWindow::new(),
        }
    }

    /// Use only the last `len` samples, up to `N`
    pub fn set_window(&mut self, len: usize) {
        self.window.set_len(len);
    }

    fn median(&self) -> Option<i64> {
        let mut scratch = [0i64; N];
        let values = self.window.copy_to(&mut scratch);

        match values.len() {
            0 => return None,
            3 => sort_network(values, &NETWORK_3),
            5 => sort_network(values, &NETWORK_5),
            _ => values.sort_unstable(),
        }

        let mid = values.len() / 2;
        if values.len() % 2 == 1 {
            Some(values[mid])
        } else {
            Some(((values[mid - 1] as i128 + values[mid] as i128) / 2) as i64)
        }
    }
}

impl<const N: usize> Filter for MedianFilter<N> {
    fn reset(&mut self) {
        self.window.reset();
    }

    fn update(&mut self, sample: Option<i64>, _elapsed_usec: u32) -> Option<i64> {
        let _ = self.window.push(sample?);
        self.median()
    }
}
