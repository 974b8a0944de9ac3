//! Fixed-length rolling window of per-cycle traffic samples.

use fleet_core::WINDOW_SIZE;

/// One cycle's observation for an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSlot {
    pub request_rate: u64,
    pub queue_depth: u64,
}

impl WindowSlot {
    pub fn new(request_rate: u64, queue_depth: u64) -> Self {
        Self {
            request_rate,
            queue_depth,
        }
    }
}

/// Totals over every slot of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSum {
    pub request_rate: u64,
    pub queue_depth: u64,
}

/// The last [`WINDOW_SIZE`] samples, oldest first.
///
/// Starts out full of zeros so a freshly registered application needs a
/// full window of real traffic before the averages reach its true level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricWindow {
    slots: [WindowSlot; WINDOW_SIZE],
}

impl Default for MetricWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricWindow {
    pub fn new() -> Self {
        Self {
            slots: [WindowSlot::default(); WINDOW_SIZE],
        }
    }

    /// Drop the oldest slot and append `sample` as the newest.
    pub fn advance(&mut self, sample: WindowSlot) {
        self.slots.rotate_left(1);
        self.slots[WINDOW_SIZE - 1] = sample;
    }

    pub fn sum(&self) -> WindowSum {
        self.slots.iter().fold(WindowSum::default(), |acc, slot| WindowSum {
            request_rate: acc.request_rate.saturating_add(slot.request_rate),
            queue_depth: acc.queue_depth.saturating_add(slot.queue_depth),
        })
    }

    /// Truncating per-slot average.
    pub fn average(&self) -> WindowSlot {
        let sum = self.sum();
        WindowSlot {
            request_rate: sum.request_rate / WINDOW_SIZE as u64,
            queue_depth: sum.queue_depth / WINDOW_SIZE as u64,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Most recent sample.
    pub fn newest(&self) -> WindowSlot {
        self.slots[WINDOW_SIZE - 1]
    }

    pub fn slots(&self) -> &[WindowSlot] {
        &self.slots
    }
}
