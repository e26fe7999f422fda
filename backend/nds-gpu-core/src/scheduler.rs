//! Reference event scheduler for hosts driving the GPU
//!
//! Binary min-heap with one slot per [`EventChannel`]. Events that target the same cycle pop in
//! the order they were scheduled.

use crate::system::{EventChannel, GpuEvent};
use bincode::{Decode, Encode};
use std::array;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
enum Slot {
    Event(GpuEvent),
    Dummy,
}

impl Slot {
    fn as_bit(self) -> u32 {
        match self {
            Self::Event(event) => 1 << (event.channel() as u8),
            Self::Dummy => 1 << EventChannel::ALL.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
struct HeapEntry {
    slot: Slot,
    cycles: u64,
    sequence: u64,
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cycles.cmp(&other.cycles).then(self.sequence.cmp(&other.sequence))
    }
}

const HEAP_LEN: usize = EventChannel::ALL.len() + 1;

#[derive(Debug, Clone, Encode, Decode)]
pub struct Scheduler {
    heap: [HeapEntry; HEAP_LEN],
    len: usize,
    scheduled_bits: u32,
    next_sequence: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        // Initialize with a dummy event to avoid ever needing to check if the heap is empty
        Self {
            heap: array::from_fn(|_| HeapEntry {
                slot: Slot::Dummy,
                cycles: u64::MAX,
                sequence: u64::MAX,
            }),
            len: 1,
            scheduled_bits: Slot::Dummy.as_bit(),
            next_sequence: 0,
        }
    }

    /// Insert `event`, replacing any pending event in the same channel.
    pub fn insert_or_update(&mut self, event: GpuEvent, cycles: u64) {
        log::trace!("Inserting event {event:?} at cycles {cycles}");

        let slot = Slot::Event(event);
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.scheduled_bits & slot.as_bit() != 0 {
            for i in 0..self.len {
                let Slot::Event(existing) = self.heap[i].slot else { continue };
                if existing.channel() != event.channel() {
                    continue;
                }

                let old = self.heap[i];
                self.heap[i] = HeapEntry { slot, cycles, sequence };

                match self.heap[i].cmp(&old) {
                    Ordering::Less => self.heap_up(i),
                    Ordering::Greater => self.heap_down(i),
                    Ordering::Equal => {}
                }

                return;
            }
        }
        self.scheduled_bits |= slot.as_bit();

        self.heap[self.len] = HeapEntry { slot, cycles, sequence };
        self.len += 1;
        self.heap_up(self.len - 1);
    }

    pub fn remove(&mut self, channel: EventChannel) {
        log::trace!("Removing event channel {channel:?}");

        let bit = 1 << (channel as u8);
        if self.scheduled_bits & bit == 0 {
            return;
        }
        self.scheduled_bits &= !bit;

        for i in 0..self.len {
            let Slot::Event(event) = self.heap[i].slot else { continue };
            if event.channel() != channel {
                continue;
            }

            let old = self.heap[i];
            self.heap.swap(i, self.len - 1);
            self.len -= 1;

            if i < self.len {
                match self.heap[i].cmp(&old) {
                    Ordering::Less => self.heap_up(i),
                    Ordering::Greater => self.heap_down(i),
                    Ordering::Equal => {}
                }
            }

            return;
        }
    }

    #[must_use]
    pub fn is_scheduled(&self, channel: EventChannel) -> bool {
        self.scheduled_bits & (1 << (channel as u8)) != 0
    }

    #[must_use]
    pub fn next_event_cycles(&self) -> u64 {
        self.heap[0].cycles
    }

    #[must_use]
    pub fn is_event_ready(&self, cycles: u64) -> bool {
        self.heap[0].slot != Slot::Dummy && cycles >= self.heap[0].cycles
    }

    pub fn pop(&mut self, cycles: u64) -> Option<(GpuEvent, u64)> {
        if !self.is_event_ready(cycles) {
            return None;
        }

        let HeapEntry { slot, cycles, .. } = self.heap[0];
        let Slot::Event(event) = slot else { return None };

        self.heap.swap(0, self.len - 1);
        self.len -= 1;
        self.heap_down(0);
        self.scheduled_bits &= !slot.as_bit();

        log::trace!("Popped event {event:?} at cycles {cycles}");

        Some((event, cycles))
    }

    fn heap_up(&mut self, mut i: usize) {
        while i != 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent] <= self.heap[i] {
                return;
            }

            self.heap.swap(i, parent);
            i = parent;
        }
    }

    fn heap_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            if left >= self.len {
                return;
            }
            let right = left + 1;

            let smallest =
                if right < self.len && self.heap[right] < self.heap[left] { right } else { left };
            if self.heap[smallest] >= self.heap[i] {
                return;
            }

            self.heap.swap(i, smallest);
            i = smallest;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::LcdEvent;
    use test_log::test;

    #[test]
    fn pops_in_cycle_order() {
        let mut scheduler = Scheduler::new();
        scheduler.insert_or_update(GpuEvent::DisplayFifo(0), 200);
        scheduler.insert_or_update(GpuEvent::Lcd(LcdEvent::StartHBlank(0)), 100);

        assert_eq!(scheduler.pop(99), None);
        assert_eq!(scheduler.pop(150), Some((GpuEvent::Lcd(LcdEvent::StartHBlank(0)), 100)));
        assert_eq!(scheduler.pop(150), None);
        assert_eq!(scheduler.pop(200), Some((GpuEvent::DisplayFifo(0), 200)));
        assert_eq!(scheduler.pop(u64::MAX), None);
    }

    #[test]
    fn same_cycle_events_pop_in_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.insert_or_update(GpuEvent::DisplayFifo(8), 500);
        scheduler.insert_or_update(GpuEvent::Lcd(LcdEvent::StartScanline(3)), 500);

        assert_eq!(scheduler.pop(500), Some((GpuEvent::DisplayFifo(8), 500)));
        assert_eq!(scheduler.pop(500), Some((GpuEvent::Lcd(LcdEvent::StartScanline(3)), 500)));

        // Rescheduling moves the event behind anything already scheduled for that cycle
        scheduler.insert_or_update(GpuEvent::Lcd(LcdEvent::StartScanline(4)), 600);
        scheduler.insert_or_update(GpuEvent::DisplayFifo(16), 600);
        scheduler.insert_or_update(GpuEvent::Lcd(LcdEvent::StartHBlank(4)), 600);

        assert_eq!(scheduler.pop(600), Some((GpuEvent::DisplayFifo(16), 600)));
        assert_eq!(scheduler.pop(600), Some((GpuEvent::Lcd(LcdEvent::StartHBlank(4)), 600)));
    }

    #[test]
    fn insert_supersedes_pending_event_in_channel() {
        let mut scheduler = Scheduler::new();
        scheduler.insert_or_update(GpuEvent::Lcd(LcdEvent::StartHBlank(5)), 1000);
        scheduler.insert_or_update(GpuEvent::Lcd(LcdEvent::FinishFrame(263)), 400);

        assert!(scheduler.is_scheduled(EventChannel::Lcd));
        assert_eq!(scheduler.next_event_cycles(), 400);
        assert_eq!(scheduler.pop(1000), Some((GpuEvent::Lcd(LcdEvent::FinishFrame(263)), 400)));
        assert_eq!(scheduler.pop(1000), None);
        assert!(!scheduler.is_scheduled(EventChannel::Lcd));
    }

    #[test]
    fn remove_cancels_channel() {
        let mut scheduler = Scheduler::new();
        scheduler.insert_or_update(GpuEvent::DisplayFifo(0), 10);
        scheduler.insert_or_update(GpuEvent::Lcd(LcdEvent::StartScanline(1)), 20);

        scheduler.remove(EventChannel::DisplayFifo);
        scheduler.remove(EventChannel::DisplayFifo);

        assert!(!scheduler.is_scheduled(EventChannel::DisplayFifo));
        assert_eq!(scheduler.pop(100), Some((GpuEvent::Lcd(LcdEvent::StartScanline(1)), 20)));
        assert_eq!(scheduler.pop(100), None);
    }
}
