//! Reduces one tick's worth of motion datagrams
//!
//! Axes only matter at their latest value, but buttons are replayed sample by
//! sample so a press and release that both land inside one tick still produce
//! two edges.

use crate::device::sample::FilteredSample;
use crate::hotkey::{ButtonEdgeEvent, ButtonTransition};
use crate::transport::WireMessage;

#[derive(Debug, Clone, PartialEq)]
pub struct TickBatch {
    /// Newest motion message by arrival order
    pub latest: Option<WireMessage>,
    pub edges: Vec<ButtonEdgeEvent>,
    /// Button mask after the last sample; the baseline for the next tick
    pub committed_buttons: u32,
    /// Number of motion messages the latest axes stand in for
    pub steps: u32,
}

impl TickBatch {
    pub fn latest_sample(&self) -> Option<&FilteredSample> {
        self.latest.as_ref().map(|m| &m.sample)
    }
}

/// Edges between two masks, lowest button first
pub fn button_edges(previous: u32, current: u32, tick_sequence: u64) -> Vec<ButtonEdgeEvent> {
    let changed = previous ^ current;
    (0..u32::BITS as u8)
        .filter(|&bit| changed & (1 << bit) != 0)
        .map(|bit| ButtonEdgeEvent {
            button_index: bit,
            transition: if current & (1 << bit) != 0 {
                ButtonTransition::Pressed
            } else {
                ButtonTransition::Released
            },
            tick_sequence,
        })
        .collect()
}

/// Folds drained motion messages, in arrival order, into one batch
pub fn reduce(committed_buttons: u32, messages: &[WireMessage], tick_sequence: u64) -> TickBatch {
    let mut mask = committed_buttons;
    let mut edges = Vec::new();
    for message in messages {
        edges.extend(button_edges(mask, message.sample.buttons, tick_sequence));
        mask = message.sample.buttons;
    }

    TickBatch {
        latest: messages.last().copied(),
        edges,
        committed_buttons: mask,
        steps: messages.len() as u32,
    }
}
