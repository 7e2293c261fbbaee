//! Bounded error sampler.
//!
//! Keeps the first `capacity` errors of a window, each cut to
//! `max_length` characters. Later errors are dropped from the sample;
//! the accumulator still counts them.

use tally_core::truncate_chars;

#[derive(Debug, Clone)]
pub struct ErrorSampler {
    samples: Vec<String>,
    capacity: usize,
    max_length: usize,
}

impl ErrorSampler {
    pub fn new(capacity: usize, max_length: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.min(64)),
            capacity,
            max_length,
        }
    }

    /// Add an error message. Returns `false` if the sample was already full.
    pub fn add(&mut self, message: &str) -> bool {
        if self.samples.len() >= self.capacity {
            return false;
        }
        self.samples
            .push(truncate_chars(message, self.max_length).to_string());
        true
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Sampled messages in insertion order.
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }
}
