//! The router engine: `handle_event` walks the rule list, applies matching
//! rules, produces output events, updates held state, and retires drained
//! waiting rules (spec.md §4.2).

use crate::event::{Event, EventType, SOSTENUTO_SWITCH, SUSTAIN_SWITCH};
use crate::rule::{CustomId as RuleCustomId, Rule};
use crate::rule_list::{MidiDevice, RuleList};
use crate::sinks::{CustomEventSink, CustomId, RoutedEventSink};

/// A concurrent, rule-driven MIDI event router.
///
/// `handle_event` may be called from a driver thread while `default_rules`,
/// `clear_rules` and `add_rule` are called from a separate control thread;
/// a single mutex (owned by the internal [`RuleList`]) serializes all of it.
/// Callback invocations on the sinks happen *while that mutex is held* —
/// see spec.md §5 for why this is a correctness requirement, not an
/// oversight.
pub struct Router<R, C>
where
    R: RoutedEventSink,
    C: CustomEventSink,
{
    rules: RuleList,
    routed_sink: R,
    custom_sink: C,
    /// Opt-in MIDI-out fan-out (spec.md §9): emission to the external
    /// device happens only when explicitly enabled, never silently.
    midi_out_fanout: bool,
}

impl<R, C> Router<R, C>
where
    R: RoutedEventSink,
    C: CustomEventSink,
{
    /// Create a new router with default ("unity") rules, passing all
    /// voice events through unmodified.
    pub fn new(routed_sink: R, custom_sink: C) -> Self {
        Self {
            rules: RuleList::new(),
            routed_sink,
            custom_sink,
            midi_out_fanout: false,
        }
    }

    /// Enable or disable fan-out of emitted events to the configured MIDI
    /// output device, if any (spec.md §9 — never on by default).
    pub fn set_midi_out_fanout(&mut self, enabled: bool) {
        self.midi_out_fanout = enabled;
    }

    /// Store the output device used for the channel-count bound (spec.md
    /// §4.2.d) and, if fan-out is enabled, for MIDI-out emission. Passing
    /// `None` is a no-op.
    pub fn set_midi_device(&self, device: Option<MidiDevice>) {
        self.rules.set_midi_device(device);
    }

    /// Replace the rule list with a single default rule (spec.md §4.1).
    pub fn default_rules(&self) {
        self.rules.set_default_rules();
    }

    /// Remove all rules (spec.md §4.1). Until a rule is added, a cleared
    /// router drops all voice events (though any still-`waiting` rules
    /// continue to see their own negative events).
    pub fn clear_rules(&self) {
        self.rules.clear_rules();
    }

    /// Add a rule, taking ownership. Prepended, so it is evaluated before
    /// all previously-added rules (spec.md §4.1).
    pub fn add_rule(&self, rule: Rule) {
        let freed = self.rules.add_rule(rule);
        drop(freed);
    }

    /// Route a single input event. Canonicalizes note-off to zero-velocity
    /// note-on, bypasses rule evaluation for non-voice events, and
    /// otherwise walks the rule list head-to-tail applying every match
    /// (spec.md §4.2). Always succeeds; per-rule drops are silent by design
    /// (spec.md §7).
    pub fn handle_event(&mut self, mut event: Event) {
        event.canonicalize();

        if !event.is_voice() {
            // Non-voice bypass: both sinks see the raw event, no rule
            // evaluation. Locking here still serializes against a
            // concurrent rule mutation, matching spec.md §4.2 step 2.
            let _guard = self.rules.lock();
            self.custom_sink.on_custom_event(&event, CustomId::Bypass);
            self.routed_sink.on_routed_event(&event);
            return;
        }

        let event_has_p2 = event.has_param2();
        let mut guard = self.rules.lock();
        let channel_cap = guard.midi_device.channels;

        let mut i = 0;
        while i < guard.rules.len() {
            let rule = &mut guard.rules[i];

            if let Some(rt) = rule.rule_type {
                if rt != event.event_type {
                    i += 1;
                    continue;
                }
            }

            if !rule.chan.matches(event.channel) {
                i += 1;
                continue;
            }
            if !rule.param1.matches(event.param1) {
                i += 1;
                continue;
            }
            if event_has_p2 && !rule.param2.matches(event.param2) {
                i += 1;
                continue;
            }

            if let RuleCustomId::Keyed(id) = rule.custom_id {
                self.custom_sink.on_custom_event(&event, CustomId::Keyed(id));
                i += 1;
                continue;
            }

            let chan = rule.chan.transform(event.channel);
            if chan < 0 || chan as u64 >= channel_cap as u64 {
                i += 1;
                continue;
            }
            let chan = chan as u32;

            let new_type = rule.new_type.unwrap_or(event.event_type);
            let new_type_has_p2 = new_type.has_param2();

            let (mut par1, mut par2) = transform_params(rule, &event, event_has_p2, new_type_has_p2);

            if !range_ok(new_type, par1) {
                i += 1;
                continue;
            }
            par1 = clamp_par1(new_type, par1);
            if new_type_has_p2 {
                par2 = par2.clamp(0, 127);
            }

            let transition = classify_transition(new_type, par1, par2);
            let mut retire_now = false;
            match transition {
                Transition::Positive => rule.hold(par1 as u32),
                Transition::Negative => {
                    if rule.release(par1 as u32) && rule.should_retire() {
                        retire_now = true;
                    }
                }
                Transition::None => {
                    if rule.is_waiting() {
                        // Inactive except for matching negative events.
                        i += 1;
                        continue;
                    }
                }
            }

            let new_event = Event {
                event_type: new_type,
                channel: chan,
                param1: par1 as u32,
                param2: if new_type_has_p2 { par2 as u32 } else { 0 },
                sysex: None,
            };

            self.routed_sink.on_routed_event(&new_event);
            if self.midi_out_fanout {
                if let Some(sink) = guard.midi_device.sink.as_mut() {
                    sink.send(&new_event);
                }
            }

            if retire_now {
                let retired = guard.rules.remove(i);
                guard.free_rules.push(retired);
                // Don't advance `i`: the next rule has shifted into this slot.
            } else {
                i += 1;
            }
        }
    }
}

enum Transition {
    Positive,
    Negative,
    None,
}

fn is_pedal(new_type: EventType, par1: i64) -> bool {
    new_type == EventType::ControlChange && (par1 == SUSTAIN_SWITCH as i64 || par1 == SOSTENUTO_SWITCH as i64)
}

fn classify_transition(new_type: EventType, par1: i64, par2: i64) -> Transition {
    if new_type == EventType::NoteOn {
        if par2 > 0 {
            return Transition::Positive;
        } else {
            return Transition::Negative;
        }
    }
    if is_pedal(new_type, par1) {
        if par2 >= 64 {
            return Transition::Positive;
        } else {
            return Transition::Negative;
        }
    }
    Transition::None
}

/// Parameter transform, covering the four input/output arity combinations
/// from spec.md §4.2.f. Returns `(par1, par2)`; `par2` is meaningless
/// unless the output type has one.
fn transform_params(rule: &Rule, event: &Event, event_has_p2: bool, new_type_has_p2: bool) -> (i64, i64) {
    match (event_has_p2, new_type_has_p2) {
        (true, true) => (rule.param1.transform(event.param1), rule.param2.transform(event.param2)),
        (true, false) => (rule.param2.transform(event.param2), 0),
        (false, false) => (rule.param1.transform(event.param1), 0),
        (false, true) => {
            // Open question codified from the source (spec.md §9): par1
            // takes the rule's configured param2.min literally, not
            // transformed. See DESIGN.md for the decision to preserve this.
            (rule.param2.min, rule.param1.transform(event.param1))
        }
    }
}

/// Drop-vs-clamp policy on `par1` after transform (spec.md §4.2.g).
fn range_ok(new_type: EventType, par1: i64) -> bool {
    match new_type {
        EventType::ControlChange | EventType::ProgramChange => (0..=127).contains(&par1),
        _ => true,
    }
}

fn clamp_par1(new_type: EventType, par1: i64) -> i64 {
    match new_type {
        EventType::PitchBend => par1.clamp(0, 16383),
        _ => par1.clamp(0, 127),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::RecordingSink;

    fn router() -> Router<RecordingSink, RecordingSink> {
        Router::new(RecordingSink::new(), RecordingSink::new())
    }

    #[test]
    fn s1_unity_passthrough() {
        let mut r = router();
        r.handle_event(Event::voice(EventType::NoteOn, 0, 60, 100));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::NoteOn, 0, 60, 100)]);
    }

    #[test]
    fn s2_channel_split() {
        let mut r = router();
        r.clear_rules();
        r.add_rule(Rule::new().set_chan(0, 0, 1.0, 5));

        r.handle_event(Event::voice(EventType::NoteOn, 0, 60, 100));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::NoteOn, 5, 60, 100)]);

        r.routed_sink.routed.clear();
        r.handle_event(Event::voice(EventType::NoteOn, 1, 60, 100));
        assert!(r.routed_sink.routed.is_empty());
    }

    #[test]
    fn s3_cc_to_pitch_bend_remap() {
        let mut r = router();
        r.clear_rules();
        r.add_rule(
            Rule::new()
                .set_type(EventType::ControlChange)
                .set_newtype(EventType::PitchBend)
                .set_param2(0, 999_999, 129.0, 0),
        );

        r.handle_event(Event::voice(EventType::ControlChange, 0, 7, 64));
        assert_eq!(r.routed_sink.routed, vec![Event::voice1(EventType::PitchBend, 0, 8256)]);
    }

    #[test]
    fn s4_note_off_symmetry_across_retire() {
        let mut r = router();
        r.clear_rules();
        r.add_rule(Rule::new().set_param1(0, 999_999, 1.0, 12));

        r.handle_event(Event::voice(EventType::NoteOn, 0, 60, 100));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::NoteOn, 0, 72, 100)]);

        r.default_rules();

        r.routed_sink.routed.clear();
        r.handle_event(Event::voice(EventType::NoteOn, 0, 60, 0));
        // The retired +12 rule still forwards this negative event, and the
        // still-live default rule also forwards it unmodified.
        assert!(r.routed_sink.routed.contains(&Event::voice(EventType::NoteOn, 0, 72, 0)));
        assert!(r.routed_sink.routed.contains(&Event::voice(EventType::NoteOn, 0, 60, 0)));

        // The +12 rule has drained and moved to the free-list.
        let freed = r.rules.add_rule(Rule::new());
        assert_eq!(freed.len(), 1);
    }

    #[test]
    fn s5_sustain_pedal_tracking() {
        let mut r = router();
        r.handle_event(Event::voice(EventType::ControlChange, 0, 0x40, 127));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::ControlChange, 0, 0x40, 127)]);

        r.clear_rules();

        r.routed_sink.routed.clear();
        r.handle_event(Event::voice(EventType::ControlChange, 0, 0x40, 0));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::ControlChange, 0, 0x40, 0)]);

        let freed = r.rules.add_rule(Rule::new());
        assert_eq!(freed.len(), 1);
    }

    #[test]
    fn s6_inversion_window() {
        let mut r = router();
        r.clear_rules();
        r.add_rule(Rule::new().set_chan(10, 5, 1.0, 0));

        r.handle_event(Event::voice(EventType::NoteOn, 6, 60, 100));
        assert!(r.routed_sink.routed.is_empty());

        r.handle_event(Event::voice(EventType::NoteOn, 5, 60, 100));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::NoteOn, 5, 60, 100)]);

        r.routed_sink.routed.clear();
        r.handle_event(Event::voice(EventType::NoteOn, 11, 60, 100));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::NoteOn, 11, 60, 100)]);
    }

    #[test]
    fn note_off_canonicalizes_identically_to_zero_velocity_note_on() {
        let mut a = router();
        let mut b = router();
        a.handle_event(Event::voice(EventType::NoteOff, 0, 60, 64));
        b.handle_event(Event::voice(EventType::NoteOn, 0, 60, 0));
        assert_eq!(a.routed_sink.routed, b.routed_sink.routed);
    }

    #[test]
    fn custom_rule_dispatches_unmodified_event_and_continues_matching() {
        let mut r = router();
        r.add_rule(Rule::new().set_custom(42));

        r.handle_event(Event::voice(EventType::NoteOn, 0, 60, 100));

        assert_eq!(r.custom_sink.custom, vec![(Event::voice(EventType::NoteOn, 0, 60, 100), CustomId::Keyed(42))]);
        // The default unity rule (added at construction) still fires.
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::NoteOn, 0, 60, 100)]);
    }

    #[test]
    fn non_voice_event_bypasses_rules_and_reaches_both_sinks() {
        let mut r = router();
        r.clear_rules(); // even with no rules, non-voice events still bypass
        let evt = Event::system(EventType::MidiStart);
        r.handle_event(evt.clone());
        assert_eq!(r.routed_sink.routed, vec![evt.clone()]);
        assert_eq!(r.custom_sink.custom, vec![(evt, CustomId::Bypass)]);
    }

    #[test]
    fn cc_param1_out_of_range_is_dropped_not_clamped() {
        let mut r = router();
        r.clear_rules();
        // Remap note-on's note number onto a CC controller number that will
        // overflow 127 after the affine transform.
        r.add_rule(
            Rule::new()
                .set_type(EventType::NoteOn)
                .set_newtype(EventType::ControlChange)
                .set_param1(0, 999_999, 2.0, 0),
        );
        r.handle_event(Event::voice(EventType::NoteOn, 0, 100, 100));
        assert!(r.routed_sink.routed.is_empty());
    }

    #[test]
    fn pitch_bend_clamps_instead_of_dropping() {
        let mut r = router();
        r.clear_rules();
        r.add_rule(
            Rule::new()
                .set_type(EventType::ControlChange)
                .set_newtype(EventType::PitchBend)
                .set_param2(0, 999_999, 1000.0, 0),
        );
        r.handle_event(Event::voice(EventType::ControlChange, 0, 7, 127));
        assert_eq!(r.routed_sink.routed, vec![Event::voice1(EventType::PitchBend, 0, 16383)]);
    }

    #[test]
    fn adding_a_rule_does_not_disturb_other_rules_held_state() {
        let mut r = router();
        r.clear_rules();
        r.add_rule(Rule::new()); // unity rule, tracks held notes

        r.handle_event(Event::voice(EventType::NoteOn, 0, 60, 100));
        assert_eq!(r.rules.lock().rules[0].pending_events(), 1);

        r.add_rule(Rule::new().set_chan(0, 0, 1.0, 1));
        assert_eq!(r.rules.lock().rules[1].pending_events(), 1);
    }

    #[test]
    fn missing_input_param2_seeds_output_par1_from_configured_param2_min() {
        // Codifies the open question from spec.md §9: when the input event
        // has no param2 and the output type wants one, par1 is the rule's
        // configured param2.min verbatim, not transformed and not zero.
        let mut r = router();
        r.clear_rules();
        r.add_rule(
            Rule::new()
                .set_type(EventType::ProgramChange)
                .set_newtype(EventType::NoteOn)
                .set_param2(60, 999_999, 1.0, 0),
        );
        r.handle_event(Event::voice1(EventType::ProgramChange, 0, 100));
        assert_eq!(r.routed_sink.routed, vec![Event::voice(EventType::NoteOn, 0, 60, 100)]);
    }

    #[test]
    fn channel_out_of_device_range_drops_the_rule_match() {
        let mut r = router();
        r.set_midi_device(Some(MidiDevice::with_channels(4)));
        r.clear_rules();
        r.add_rule(Rule::new().set_chan(0, 999_999, 1.0, 10));
        r.handle_event(Event::voice(EventType::NoteOn, 0, 60, 100));
        assert!(r.routed_sink.routed.is_empty());
    }
}
