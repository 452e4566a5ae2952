//! Event definitions and the time-ordered event queue.
//!
//! Events are how components ask the kernel to call them back at a later
//! logical time (clock generators, timers, delayed completions). Everything
//! that happens within one instant is synchronous port traffic; events only
//! move time forward.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{ComponentId, SimTime};

/// A scheduled callback into a component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The simulation time at which this event fires
    pub time: SimTime,
    /// The component whose `on_event` receives it
    pub target: ComponentId,
    /// Component-defined discriminator
    pub tag: u64,
}

impl Event {
    /// Creates a new event.
    pub fn new(time: SimTime, target: ComponentId, tag: u64) -> Self {
        Self { time, target, tag }
    }
}

/// Time-ordered event queue.
///
/// Events are delivered in increasing time order; events sharing the same
/// time are delivered in the order they were pushed.
#[derive(Debug, Default)]
pub struct EventQueue {
    slots: BTreeMap<SimTime, VecDeque<Event>>,
    len: usize,
    peak_len: usize,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event.
    pub fn push(&mut self, event: Event) {
        self.slots.entry(event.time).or_default().push_back(event);
        self.len += 1;
        self.peak_len = self.peak_len.max(self.len);
    }

    /// Schedules several events, preserving their relative order.
    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.push(event);
        }
    }

    /// Returns the time of the earliest pending event.
    pub fn next_time(&self) -> Option<SimTime> {
        self.slots.keys().next().copied()
    }

    /// Removes and returns the earliest pending event.
    pub fn pop(&mut self) -> Option<Event> {
        let mut entry = self.slots.first_entry()?;
        let event = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if event.is_some() {
            self.len -= 1;
        }
        event
    }

    /// Drops every pending event.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.len = 0;
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no event is pending.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the largest number of simultaneously pending events seen.
    pub fn peak_len(&self) -> usize {
        self.peak_len
    }
}
