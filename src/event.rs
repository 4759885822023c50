//! Normalized MIDI event value and arity classification.

use serde::{Deserialize, Serialize};

/// MIDI sustain controller number.
pub const SUSTAIN_SWITCH: u32 = 0x40;
/// MIDI sostenuto controller number.
pub const SOSTENUTO_SWITCH: u32 = 0x42;

/// Event type, kept numerically aligned with the MIDI status-byte upper
/// nibble so downstream consumers can pattern-match on raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NoteOff,
    NoteOn,
    KeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    Sysex,
    MidiStart,
    MidiContinue,
    MidiStop,
    MidiSync,
    MidiSystemReset,
}

impl EventType {
    /// The MIDI status-byte upper nibble / system-common tag for this type.
    pub fn status_code(self) -> u8 {
        match self {
            EventType::NoteOff => 0x80,
            EventType::NoteOn => 0x90,
            EventType::KeyPressure => 0xA0,
            EventType::ControlChange => 0xB0,
            EventType::ProgramChange => 0xC0,
            EventType::ChannelPressure => 0xD0,
            EventType::PitchBend => 0xE0,
            EventType::Sysex => 0xF0,
            EventType::MidiSync => 0xF8,
            EventType::MidiStart => 0xFA,
            EventType::MidiContinue => 0xFB,
            EventType::MidiStop => 0xFC,
            EventType::MidiSystemReset => 0xFF,
        }
    }

    /// Whether this event type carries a meaningful `param2`.
    ///
    /// Note events, key pressure and CC carry a second parameter; program
    /// change, pitch bend and channel pressure do not; everything else is
    /// non-voice and bypasses rule evaluation entirely (see [`Event::is_voice`]).
    pub fn has_param2(self) -> bool {
        matches!(
            self,
            EventType::NoteOn | EventType::NoteOff | EventType::KeyPressure | EventType::ControlChange
        )
    }

    /// Whether this type is a voice event that rule matching applies to.
    pub fn is_voice(self) -> bool {
        self.has_param2()
            || matches!(
                self,
                EventType::ProgramChange | EventType::PitchBend | EventType::ChannelPressure
            )
    }
}

/// A normalized MIDI event.
///
/// `channel` is unsigned and not bounded to 0..16: the input driver composes
/// it as `input_port_index * 16 + midi_channel`, so the channel space can
/// exceed a single MIDI cable's 16 channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub channel: u32,
    pub param1: u32,
    pub param2: u32,
    pub sysex: Option<Vec<u8>>,
}

impl Event {
    /// Construct a voice event with both parameters.
    pub fn voice(event_type: EventType, channel: u32, param1: u32, param2: u32) -> Self {
        Self {
            event_type,
            channel,
            param1,
            param2,
            sysex: None,
        }
    }

    /// Construct a voice event with only `param1` (program change, pitch bend,
    /// channel pressure). `param2` is set to zero and ignored by consumers
    /// that check [`EventType::has_param2`].
    pub fn voice1(event_type: EventType, channel: u32, param1: u32) -> Self {
        Self {
            event_type,
            channel,
            param1,
            param2: 0,
            sysex: None,
        }
    }

    /// Construct a non-voice system event (no channel/param semantics).
    pub fn system(event_type: EventType) -> Self {
        Self {
            event_type,
            channel: 0,
            param1: 0,
            param2: 0,
            sysex: None,
        }
    }

    /// Construct a sysex event carrying an owned payload.
    pub fn sysex(payload: Vec<u8>) -> Self {
        Self {
            event_type: EventType::Sysex,
            channel: 0,
            param1: payload.len() as u32,
            param2: 0,
            sysex: Some(payload),
        }
    }

    /// Whether this event type carries a meaningful `param2`.
    pub fn has_param2(&self) -> bool {
        self.event_type.has_param2()
    }

    /// Whether this event is a voice event subject to rule evaluation, as
    /// opposed to a system-common/real-time event that bypasses it.
    pub fn is_voice(&self) -> bool {
        self.event_type.is_voice()
    }

    /// Canonicalize a note-off into a zero-velocity note-on in place.
    ///
    /// Downstream consumers treat zero-velocity note-on as note-off; this
    /// collapses the two code paths the router has to evaluate rules
    /// against (spec step 1 of the handler, §4.2).
    pub fn canonicalize(&mut self) {
        if self.event_type == EventType::NoteOff {
            self.event_type = EventType::NoteOn;
            self.param2 = 0;
        }
    }
}
