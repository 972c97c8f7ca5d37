use super::{
    Activation, ButtonEdgeEvent, ButtonTransition, HotkeyBinding, HotkeyEvent, HotkeyPhase,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingState {
    Idle,
    Held,
}

#[derive(Debug, Clone)]
struct Slot {
    binding: HotkeyBinding,
    state: BindingState,
}

impl Slot {
    fn event(&self, phase: HotkeyPhase, tick_sequence: u64) -> HotkeyEvent {
        HotkeyEvent {
            button: self.binding.button,
            action: self.binding.action.clone(),
            phase,
            tick_sequence,
        }
    }
}

/// Per-binding `Idle`/`Held` machine driven by ordered button edges
///
/// Every `Assert` is matched by exactly one `Deassert`, whether the button is
/// released, pressed again after a missed release, or the bindings are
/// released wholesale on stop or mode change.
#[derive(Debug, Clone, Default)]
pub struct HotkeyDetector {
    slots: Vec<Slot>,
}

impl HotkeyDetector {
    pub fn new(bindings: Vec<HotkeyBinding>) -> Self {
        Self {
            slots: bindings
                .into_iter()
                .map(|binding| Slot {
                    binding,
                    state: BindingState::Idle,
                })
                .collect(),
        }
    }

    pub fn bindings(&self) -> impl Iterator<Item = &HotkeyBinding> {
        self.slots.iter().map(|slot| &slot.binding)
    }

    /// Buttons whose bindings are currently held
    pub fn held_buttons(&self) -> Vec<u8> {
        self.slots
            .iter()
            .filter(|slot| slot.state == BindingState::Held)
            .map(|slot| slot.binding.button)
            .collect()
    }

    pub fn on_edge(&mut self, edge: &ButtonEdgeEvent) -> Vec<HotkeyEvent> {
        let mut events = Vec::new();
        for slot in self
            .slots
            .iter_mut()
            .filter(|slot| slot.binding.bit() == edge.button_index)
        {
            let hold = slot.binding.activation == Activation::Hold;
            match (edge.transition, slot.state) {
                (ButtonTransition::Pressed, state) => {
                    if state == BindingState::Held && hold {
                        debug!(
                            "Button {} pressed while held, closing previous hold",
                            slot.binding.button
                        );
                        events.push(slot.event(HotkeyPhase::Deassert, edge.tick_sequence));
                    }
                    slot.state = BindingState::Held;
                    let phase = if hold {
                        HotkeyPhase::Assert
                    } else {
                        HotkeyPhase::Fire
                    };
                    events.push(slot.event(phase, edge.tick_sequence));
                }
                (ButtonTransition::Released, BindingState::Held) => {
                    slot.state = BindingState::Idle;
                    if hold {
                        events.push(slot.event(HotkeyPhase::Deassert, edge.tick_sequence));
                    }
                }
                (ButtonTransition::Released, BindingState::Idle) => {}
            }
        }
        events
    }

    pub fn on_edges(&mut self, edges: &[ButtonEdgeEvent]) -> Vec<HotkeyEvent> {
        edges.iter().flat_map(|edge| self.on_edge(edge)).collect()
    }

    /// Returns every held binding to idle, deasserting holds
    pub fn release_all(&mut self, tick_sequence: u64) -> Vec<HotkeyEvent> {
        let mut events = Vec::new();
        for slot in &mut self.slots {
            if slot.state == BindingState::Held {
                slot.state = BindingState::Idle;
                if slot.binding.activation == Activation::Hold {
                    events.push(slot.event(HotkeyPhase::Deassert, tick_sequence));
                }
            }
        }
        events
    }

    /// Swaps the binding set after releasing everything held under the old one
    pub fn set_bindings(
        &mut self,
        bindings: Vec<HotkeyBinding>,
        tick_sequence: u64,
    ) -> Vec<HotkeyEvent> {
        let released = self.release_all(tick_sequence);
        *self = Self::new(bindings);
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{HotkeyAction, KeyCombo};

    fn binding(button: u8, activation: Activation) -> HotkeyBinding {
        HotkeyBinding {
            button,
            action: HotkeyAction::Combo("ctrl+z".parse::<KeyCombo>().unwrap()),
            activation,
        }
    }

    fn edge(button_index: u8, transition: ButtonTransition) -> ButtonEdgeEvent {
        ButtonEdgeEvent {
            button_index,
            transition,
            tick_sequence: 7,
        }
    }

    fn phases(events: &[HotkeyEvent]) -> Vec<(u8, HotkeyPhase)> {
        events.iter().map(|e| (e.button, e.phase)).collect()
    }

    #[test]
    fn hold_asserts_and_deasserts_once() {
        let mut detector = HotkeyDetector::new(vec![binding(1, Activation::Hold)]);
        let events = detector.on_edges(&[
            edge(0, ButtonTransition::Pressed),
            edge(0, ButtonTransition::Released),
            edge(0, ButtonTransition::Released),
        ]);
        assert_eq!(
            phases(&events),
            vec![(1, HotkeyPhase::Assert), (1, HotkeyPhase::Deassert)]
        );
        assert_eq!(events[0].tick_sequence, 7);
    }

    #[test]
    fn one_shot_fires_on_press_only() {
        let mut detector = HotkeyDetector::new(vec![binding(3, Activation::OneShot)]);
        let events = detector.on_edges(&[
            edge(2, ButtonTransition::Pressed),
            edge(2, ButtonTransition::Released),
            edge(2, ButtonTransition::Pressed),
        ]);
        assert_eq!(
            phases(&events),
            vec![(3, HotkeyPhase::Fire), (3, HotkeyPhase::Fire)]
        );
    }

    #[test]
    fn unbound_buttons_are_ignored() {
        let mut detector = HotkeyDetector::new(vec![binding(1, Activation::Hold)]);
        assert!(detector.on_edge(&edge(4, ButtonTransition::Pressed)).is_empty());
    }

    #[test]
    fn repeated_press_closes_stale_hold() {
        let mut detector = HotkeyDetector::new(vec![binding(2, Activation::Hold)]);
        detector.on_edge(&edge(1, ButtonTransition::Pressed));
        let events = detector.on_edge(&edge(1, ButtonTransition::Pressed));
        assert_eq!(
            phases(&events),
            vec![(2, HotkeyPhase::Deassert), (2, HotkeyPhase::Assert)]
        );
    }

    #[test]
    fn release_all_and_rebind_deassert_held() {
        let mut detector = HotkeyDetector::new(vec![
            binding(1, Activation::Hold),
            binding(2, Activation::OneShot),
        ]);
        detector.on_edges(&[
            edge(0, ButtonTransition::Pressed),
            edge(1, ButtonTransition::Pressed),
        ]);
        assert_eq!(detector.held_buttons(), vec![1, 2]);

        let released = detector.set_bindings(vec![binding(5, Activation::Hold)], 9);
        assert_eq!(phases(&released), vec![(1, HotkeyPhase::Deassert)]);
        assert_eq!(released[0].tick_sequence, 9);
        assert!(detector.held_buttons().is_empty());
        assert!(detector.release_all(10).is_empty());
    }
}
