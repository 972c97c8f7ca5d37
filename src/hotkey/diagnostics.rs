use super::{HotkeyAction, HotkeyEvent, HotkeyPhase, InjectionOutcome};
use crate::motion::Mode;
use chrono::{DateTime, Local};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyRecord {
    pub at: DateTime<Local>,
    pub mode: Mode,
    pub button: u8,
    pub action: HotkeyAction,
    pub phase: HotkeyPhase,
    pub outcome: InjectionOutcome,
}

/// Most recent hotkey deliveries, oldest evicted first
#[derive(Debug, Clone)]
pub struct HotkeyDiagnostics {
    records: VecDeque<HotkeyRecord>,
    capacity: usize,
}

impl HotkeyDiagnostics {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, mode: Mode, event: &HotkeyEvent, outcome: InjectionOutcome) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(HotkeyRecord {
            at: Local::now(),
            mode,
            button: event.button,
            action: event.action.clone(),
            phase: event.phase,
            outcome,
        });
    }

    /// Shrinks or grows the ring, dropping the oldest records that no longer fit
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &HotkeyRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&HotkeyRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
