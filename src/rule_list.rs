//! Ordered rule list under a single mutex, with a deferred-free retirement
//! queue (spec.md §4.1).

use std::sync::{Mutex, MutexGuard};

use crate::event::Event;
use crate::rule::Rule;

/// A downstream MIDI-out connection the router can optionally fan events
/// out to (spec.md §4.3/§9: "defined but not invoked by the engine" in the
/// source — here an explicit, opt-in capability rather than a dead code
/// path).
pub trait MidiOutSink: Send {
    fn send(&mut self, event: &Event);
}

/// The output device referenced by `set_midi_device`: its channel capacity
/// (used to bound the channel affine transform, spec.md §4.2.d) and,
/// optionally, the live connection used for MIDI-out fan-out.
///
/// The source leaves the channel bound implicitly non-null at event-handling
/// time (it is a raw pointer dereferenced unconditionally). A router that
/// has not yet had [`crate::router::Router::set_midi_device`] called
/// defaults to an effectively unbounded channel space rather than panicking
/// or silently dropping every event, so a freshly-built router with only
/// default rules satisfies the unity-passthrough invariant (spec.md §8,
/// property 4) with no setup beyond `Router::new`.
pub struct MidiDevice {
    pub channels: u32,
    pub sink: Option<Box<dyn MidiOutSink>>,
}

impl MidiDevice {
    /// A device with the given channel capacity and no live MIDI-out
    /// connection (channel-bound checking only).
    pub fn with_channels(channels: u32) -> Self {
        Self { channels, sink: None }
    }
}

impl Default for MidiDevice {
    fn default() -> Self {
        Self {
            channels: u32::MAX,
            sink: None,
        }
    }
}

/// Rule list state protected by one mutex: the live rules (head-first, most
/// recently added first) and the retirement queue of waiting rules that
/// drained during the last event and are ready to be dropped outside the
/// lock.
pub(crate) struct RuleListInner {
    pub rules: Vec<Rule>,
    pub free_rules: Vec<Rule>,
    pub midi_device: MidiDevice,
}

pub(crate) struct RuleList {
    inner: Mutex<RuleListInner>,
}

impl RuleList {
    /// A router starts with a single default ("unity") rule, matching the
    /// source's `new_sbmidi_router` behaviour.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RuleListInner {
                rules: vec![Rule::new()],
                free_rules: Vec::new(),
                midi_device: MidiDevice::default(),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RuleListInner> {
        self.inner.lock().expect("rule list mutex poisoned")
    }

    /// Replace the rule list with a single default rule. Any rule with
    /// pending held state is marked `waiting` rather than dropped, and
    /// fully-drained rules are moved to the free-list to be dropped after
    /// this call returns (never while the lock is held).
    pub fn set_default_rules(&self) {
        let mut guard = self.lock();
        Self::retire_all(&mut guard);
        guard.rules.insert(0, Rule::new());
    }

    /// Remove all rules. A cleared router with no remaining waiting rules
    /// drops every voice event until a new rule is added.
    pub fn clear_rules(&self) {
        let mut guard = self.lock();
        Self::retire_all(&mut guard);
    }

    fn retire_all(guard: &mut RuleListInner) {
        let departing = std::mem::take(&mut guard.rules);
        for mut rule in departing {
            if rule.pending_events() == 0 {
                guard.free_rules.push(rule);
            } else {
                rule.mark_waiting();
                guard.rules.push(rule);
            }
        }
    }

    /// Prepend `rule`, taking ownership, and harvest whatever has
    /// accumulated on the free-list so the caller can drop it once the lock
    /// is released.
    pub fn add_rule(&self, rule: Rule) -> Vec<Rule> {
        let mut guard = self.lock();
        let harvested = std::mem::take(&mut guard.free_rules);
        guard.rules.insert(0, rule);
        harvested
    }

    /// Store the output device. A `None` device is a no-op, matching the
    /// source's "no-op on null" contract.
    pub fn set_midi_device(&self, device: Option<MidiDevice>) {
        if let Some(device) = device {
            self.lock().midi_device = device;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_router_starts_with_one_default_rule() {
        let list = RuleList::new();
        assert_eq!(list.lock().rules.len(), 1);
    }

    #[test]
    fn set_default_rules_drops_idle_rules_and_waits_pending_ones() {
        let list = RuleList::new();
        {
            let mut guard = list.lock();
            guard.rules[0].hold(60); // give the initial rule pending state
        }
        list.set_default_rules();
        let guard = list.lock();
        // New default rule prepended, old rule demoted to waiting and kept.
        assert_eq!(guard.rules.len(), 2);
        assert!(guard.rules[1].is_waiting());
        assert!(guard.free_rules.is_empty());
    }

    #[test]
    fn clear_rules_frees_idle_rules_immediately() {
        let list = RuleList::new();
        list.clear_rules();
        let guard = list.lock();
        assert!(guard.rules.is_empty());
        assert_eq!(guard.free_rules.len(), 1);
    }

    #[test]
    fn add_rule_harvests_free_list() {
        let list = RuleList::new();
        list.clear_rules();
        assert_eq!(list.lock().free_rules.len(), 1);
        let harvested = list.add_rule(Rule::new());
        assert_eq!(harvested.len(), 1);
        assert!(list.lock().free_rules.is_empty());
        assert_eq!(list.lock().rules.len(), 1);
    }
}
