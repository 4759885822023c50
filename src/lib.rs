//! A concurrent, rule-driven MIDI event router.
//!
//! Incoming MIDI voice and system events are matched against an ordered
//! list of rules; each matching rule produces zero or one transformed
//! event, dispatched to the appropriate downstream handler. The router
//! tracks per-rule held state (active notes, depressed sustain/sostenuto
//! pedals) so that rule deletion never leaves a hanging note or a stuck
//! pedal on a downstream device.
//!
//! See [`Router`] for the entry point.

pub mod config;
pub mod error;
pub mod event;
pub mod midi_io;
pub mod rule;
pub mod rule_list;
pub mod router;
pub mod sinks;

pub use event::{Event, EventType};
pub use router::Router;
pub use rule::Rule;
pub use rule_list::{MidiDevice, MidiOutSink};
pub use sinks::{CallbackSink, CustomEventSink, CustomId, NullSink, RoutedEventSink};
