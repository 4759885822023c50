//! Boundary adapters: the two downstream callback interfaces the router
//! invokes, and a closure-based adapter for embedding the router without
//! implementing a trait by hand.
//!
//! Grounded in the teacher's closure-based `midir::MidiInput::connect`
//! callback and in `multi_engine::MultiEngineSynth`'s per-instance event
//! fan-out: a trait object closed over state stands in for the source's
//! raw `void *` callback + context pointer pair (spec.md §9 REDESIGN FLAGS).

use crate::event::Event;

/// Whether a dispatch to [`CustomEventSink`] is a non-voice bypass event or
/// a matched custom rule, replacing the source's `custom_id == -1` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomId {
    /// Non-voice event bypassing rule evaluation entirely.
    Bypass,
    /// A custom rule matched; carries the rule's configured id.
    Keyed(u32),
}

/// Receives routed (possibly transformed) voice events, and unmodified
/// non-voice events. Analogous to the source's `fluid_handler`.
///
/// Invoked while the router's rules mutex is held (spec.md §5): a sink must
/// not block indefinitely and must not call back into the router.
pub trait RoutedEventSink: Send {
    fn on_routed_event(&mut self, event: &Event);
}

/// Receives events matched by custom rules (unmodified), plus non-voice
/// bypass events tagged [`CustomId::Bypass`]. Analogous to the source's
/// `custom_handler`. Must not mutate the event.
pub trait CustomEventSink: Send {
    fn on_custom_event(&mut self, event: &Event, custom_id: CustomId);
}

/// Adapts a plain closure to [`RoutedEventSink`].
pub struct CallbackSink<F: FnMut(&Event) + Send>(F);

impl<F: FnMut(&Event) + Send> CallbackSink<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F: FnMut(&Event) + Send> RoutedEventSink for CallbackSink<F> {
    fn on_routed_event(&mut self, event: &Event) {
        (self.0)(event)
    }
}

/// A [`RoutedEventSink`]/[`CustomEventSink`] that does nothing, useful for
/// routers that only care about one side of the dispatch.
#[derive(Default)]
pub struct NullSink;

impl RoutedEventSink for NullSink {
    fn on_routed_event(&mut self, _event: &Event) {}
}

impl CustomEventSink for NullSink {
    fn on_custom_event(&mut self, _event: &Event, _custom_id: CustomId) {}
}

/// Collects every event handed to it, for tests and for `CallbackSink`-free
/// assertions.
#[cfg(test)]
pub(crate) struct RecordingSink {
    pub routed: Vec<Event>,
    pub custom: Vec<(Event, CustomId)>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self {
            routed: Vec::new(),
            custom: Vec::new(),
        }
    }
}

#[cfg(test)]
impl RoutedEventSink for RecordingSink {
    fn on_routed_event(&mut self, event: &Event) {
        self.routed.push(event.clone());
    }
}

#[cfg(test)]
impl CustomEventSink for RecordingSink {
    fn on_custom_event(&mut self, event: &Event, custom_id: CustomId) {
        self.custom.push((event.clone(), custom_id));
    }
}
