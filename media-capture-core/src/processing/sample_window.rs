/// Fixed-capacity window over the most recent audio samples.
///
/// Wrap in `Arc<parking_lot::Mutex<SampleWindow>>` for cross-thread
/// access. Overflow behavior: drops oldest samples.
#[derive(Debug)]
pub struct SampleWindow {
    buffer: Vec<f32>,
    write_index: usize,
    len: usize,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
            len: 0,
            capacity,
        }
    }

    /// Append samples, evicting the oldest once full.
    ///
    /// If `samples` is larger than capacity, only the last `capacity` samples are kept.
    pub fn push(&mut self, samples: &[f32]) {
        let samples = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
        self.len = (self.len + samples.len()).min(self.capacity);
    }

    /// Peak absolute magnitude over the window. Zero when empty.
    pub fn peak(&self) -> f32 {
        self.samples().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Samples in the window, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        let start = (self.write_index + self.capacity - self.len) % self.capacity;
        (0..self.len).map(move |i| self.buffer[(start + i) % self.capacity])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.write_index = 0;
        self.len = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
