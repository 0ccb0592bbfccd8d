//! Fixed-length moving statistics
//!
//! Keeps the last `K` scalar summaries (per-iteration reward mean, median
//! KL, ...) in a ring buffer. Pushing past capacity evicts the oldest entry;
//! storage never grows beyond `K`.

/// Ring buffer of the most recent `capacity` values
#[derive(Debug, Clone)]
pub struct MovingStat {
    values: Vec<f64>,
    capacity: usize,
    next: usize,
}

impl MovingStat {
    /// Create an empty queue holding at most `capacity` values
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "MovingStat capacity must be positive");
        Self { values: Vec::with_capacity(capacity), capacity, next: 0 }
    }

    /// Push a value, evicting the oldest when full
    pub fn push(&mut self, value: f64) {
        if self.values.len() < self.capacity {
            self.values.push(value);
        } else {
            self.values[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Mean of the stored values (0 when empty)
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation of the stored values (0 when empty)
    pub fn std(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.values.len() as f64;
        var.sqrt()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no values were pushed yet
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of stored values
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored values from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let split = if self.values.len() < self.capacity { 0 } else { self.next };
        self.values[split..].iter().chain(self.values[..split].iter()).copied()
    }
}
