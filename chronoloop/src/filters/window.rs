/// Fixed-capacity ring buffer holding the most recent samples.
///
/// The window length can be shortened at runtime up to the capacity `N`.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T, const N: usize> {
    data: [T; N],
    next_idx: usize,
    fill: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> Default for SlidingWindow<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> SlidingWindow<T, N> {
    const NONEMPTY: () = assert!(N > 0, "window needs room for at least one sample");

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::NONEMPTY;
        Self {
            data: [T::default(); N],
            next_idx: 0,
            fill: 0,
            len: N,
        }
    }

    /// Change the window length, clamped to `1..=N`. Clears the contents.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.clamp(1, N);
        self.reset();
    }

    /// Configured window length
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.fill
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    pub fn is_full(&self) -> bool {
        self.fill == self.len
    }

    pub fn reset(&mut self) {
        self.next_idx = 0;
        self.fill = 0;
    }

    /// Store a sample, returning the one that fell out of a full window
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.is_full() {
            Some(self.data[self.next_idx])
        } else {
            self.fill += 1;
            None
        };
        self.data[self.next_idx] = value;
        self.next_idx = (self.next_idx + 1) % self.len;
        evicted
    }

    /// Copy the samples into `out`, oldest first, and return the filled part
    pub fn copy_to<'a>(&self, out: &'a mut [T; N]) -> &'a mut [T] {
        let start = (self.next_idx + self.len - self.fill) % self.len;
        for (i, slot) in out.iter_mut().take(self.fill).enumerate() {
            *slot = self.data[(start + i) % self.len];
        }
        &mut out[..self.fill]
    }

    /// The samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let start = (self.next_idx + self.len - self.fill) % self.len;
        (0..self.fill).map(move |i| self.data[(start + i) % self.len])
    }
}
