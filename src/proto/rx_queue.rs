//! Interrupt-to-task report hand-off.
//!
//! The USB receive interrupt pushes whole reports; the polling task pops
//! them. `heapless::spsc` keeps the head index private to the producer
//! and the tail index private to the consumer, so neither side takes a
//! lock and a full queue never corrupts the other side's view.

use heapless::spsc::{Consumer, Producer, Queue};
use log::warn;

use crate::config::MAX_PACKET_SIZE;

/// One queued inbound report.
pub type ReportBuf = heapless::Vec<u8, MAX_PACKET_SIZE>;

/// Backing storage for up to `N - 1` pending reports.
pub struct ReportQueue<const N: usize> {
    queue: Queue<ReportBuf, N>,
}

impl<const N: usize> ReportQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
        }
    }

    /// Split into the interrupt-side producer and task-side consumer.
    pub fn split(&mut self) -> (ReportProducer<'_, N>, ReportConsumer<'_, N>) {
        let (producer, consumer) = self.queue.split();
        (
            ReportProducer {
                inner: producer,
                dropped: 0,
            },
            ReportConsumer { inner: consumer },
        )
    }
}

impl<const N: usize> Default for ReportQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt-context half.
pub struct ReportProducer<'a, const N: usize> {
    inner: Producer<'a, ReportBuf, N>,
    dropped: u32,
}

impl<const N: usize> ReportProducer<'_, N> {
    /// Queue a copy of `report`. Returns `false` if it was dropped
    /// because the queue is full or the report is oversized.
    pub fn push(&mut self, report: &[u8]) -> bool {
        let Ok(buf) = ReportBuf::from_slice(report) else {
            self.dropped = self.dropped.wrapping_add(1);
            return false;
        };
        if self.inner.enqueue(buf).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            return false;
        }
        true
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

/// Task-context half.
pub struct ReportConsumer<'a, const N: usize> {
    inner: Consumer<'a, ReportBuf, N>,
}

impl<const N: usize> ReportConsumer<'_, N> {
    pub fn pop(&mut self) -> Option<ReportBuf> {
        self.inner.dequeue()
    }

    /// Hand up to `max` queued reports to `f`. Returns how many were taken.
    pub fn drain(&mut self, max: usize, mut f: impl FnMut(&[u8])) -> usize {
        let mut taken = 0;
        while taken < max {
            let Some(report) = self.inner.dequeue() else {
                break;
            };
            f(&report);
            taken += 1;
        }
        if taken == max && self.inner.ready() {
            warn!("link: {} reports left for the next pass", self.inner.len());
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.inner.ready()
    }
}
