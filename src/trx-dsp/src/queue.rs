// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;

/// Counters describing the health of a [`Queue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub underflow: u32,
    pub overflow: u32,
    pub max_q: usize,
    pub stall: bool,
}

/// Fixed-capacity ring of 32-bit PCM samples.
///
/// One slot is kept free to tell full from empty. A write into a full queue
/// drops the oldest sample. A read from an empty queue returns `None` and
/// marks the queue stalled until the next write.
#[derive(Debug, Clone)]
pub struct Queue {
    data: Vec<i32>,
    head: usize,
    tail: usize,
    stall: bool,
    underflow: u32,
    overflow: u32,
    max_q: usize,
}

impl Queue {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1) + 1],
            head: 0,
            tail: 0,
            stall: false,
            underflow: 0,
            overflow: 0,
            max_q: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len() - 1
    }

    pub fn len(&self) -> usize {
        let slots = self.data.len();
        (self.head + slots - self.tail) % slots
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Drop every sample and clear the counters.
    pub fn empty(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.stall = false;
        self.underflow = 0;
        self.overflow = 0;
        self.max_q = 0;
    }

    /// Append a sample. Returns `false` when the oldest sample had to go.
    pub fn write(&mut self, sample: i32) -> bool {
        let slots = self.data.len();
        let next = (self.head + 1) % slots;
        let mut kept = true;
        if next == self.tail {
            self.tail = (self.tail + 1) % slots;
            self.overflow = self.overflow.wrapping_add(1);
            kept = false;
        }
        self.data[self.head] = sample;
        self.head = next;
        self.stall = false;
        self.max_q = self.max_q.max(self.len());
        kept
    }

    pub fn read(&mut self) -> Option<i32> {
        if self.is_empty() {
            self.underflow = self.underflow.wrapping_add(1);
            self.stall = true;
            return None;
        }
        let sample = self.data[self.tail];
        self.tail = (self.tail + 1) % self.data.len();
        Some(sample)
    }

    pub fn is_stalled(&self) -> bool {
        self.stall
    }

    pub fn underflow(&self) -> u32 {
        self.underflow
    }

    pub fn overflow(&self) -> u32 {
        self.overflow
    }

    /// Highest fill level seen since the last [`Queue::empty`].
    pub fn max_q(&self) -> usize {
        self.max_q
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len(),
            capacity: self.capacity(),
            underflow: self.underflow,
            overflow: self.overflow,
            max_q: self.max_q,
            stall: self.stall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = Queue::new(8);
        for v in 0..5 {
            assert!(q.write(v));
        }
        assert_eq!(q.len(), 5);
        for v in 0..5 {
            assert_eq!(q.read(), Some(v));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut q = Queue::new(16);
        let dropped = (0..20).filter(|v| !q.write(*v)).count();
        assert_eq!(dropped, 4);
        assert_eq!(q.overflow(), 4);
        assert_eq!(q.len(), 16);
        let drained: Vec<i32> = std::iter::from_fn(|| q.read()).collect();
        assert_eq!(drained, (4..20).collect::<Vec<_>>());
    }

    #[test]
    fn underflow_stalls_until_write() {
        let mut q = Queue::new(4);
        assert_eq!(q.read(), None);
        assert!(q.is_stalled());
        assert_eq!(q.underflow(), 1);
        q.write(7);
        assert!(!q.is_stalled());
        assert_eq!(q.read(), Some(7));
    }

    #[test]
    fn max_q_tracks_high_water_mark() {
        let mut q = Queue::new(10);
        for v in 0..6 {
            q.write(v);
        }
        for _ in 0..6 {
            q.read();
        }
        q.write(1);
        assert_eq!(q.max_q(), 6);
        q.empty();
        assert_eq!(q.stats(), QueueStats {
            len: 0,
            capacity: 10,
            ..QueueStats::default()
        });
    }

    #[test]
    fn wraps_many_times() {
        let mut q = Queue::new(3);
        for v in 0..1000 {
            q.write(v);
            assert_eq!(q.read(), Some(v));
        }
        assert_eq!(q.overflow(), 0);
        assert_eq!(q.underflow(), 0);
    }
}
