//! Concrete boundary adapters: a real `midir`-backed input driver and
//! MIDI-out sender, playing the role spec.md §1 treats as an external
//! collaborator ("the ALSA-sequencer-specific I/O driver"). Grounded in the
//! teacher's `midi::handler::MidiHandler` and in
//! `original_source/patcher/src/sbmidi_alsa.c`'s `sbmidi_alsaseq_sendevent`.

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::error::{MidiDeviceError, MidirError};
use crate::event::{Event, EventType};
use crate::rule_list::MidiOutSink;

/// Decode a raw MIDI status+data byte sequence into a normalized [`Event`].
/// Returns `None` for fragments midir never delivers whole (running status
/// is already reassembled by midir before this function sees it) or for
/// event types this router has no use for (system-common tune request,
/// etc. beyond the set spec.md §6 names).
///
/// `port_index` implements the driver's channel-space extension described
/// in spec.md §3: `channel = port_index * 16 + midi_channel`.
pub fn decode_midi_bytes(port_index: u32, bytes: &[u8]) -> Option<Event> {
    let status = *bytes.first()?;

    if status >= 0xF8 {
        let event_type = match status {
            0xF8 => EventType::MidiSync,
            0xFA => EventType::MidiStart,
            0xFB => EventType::MidiContinue,
            0xFC => EventType::MidiStop,
            0xFF => EventType::MidiSystemReset,
            _ => return None,
        };
        return Some(Event::system(event_type));
    }

    if status == 0xF0 {
        return Some(Event::sysex(bytes.get(1..).unwrap_or_default().to_vec()));
    }

    let message_type = status & 0xF0;
    let midi_channel = (status & 0x0F) as u32;
    let channel = port_index * 16 + midi_channel;

    match message_type {
        0x80 => Some(Event::voice(EventType::NoteOff, channel, *bytes.get(1)? as u32, *bytes.get(2)? as u32)),
        0x90 => Some(Event::voice(EventType::NoteOn, channel, *bytes.get(1)? as u32, *bytes.get(2)? as u32)),
        0xA0 => Some(Event::voice(EventType::KeyPressure, channel, *bytes.get(1)? as u32, *bytes.get(2)? as u32)),
        0xB0 => Some(Event::voice(EventType::ControlChange, channel, *bytes.get(1)? as u32, *bytes.get(2)? as u32)),
        0xC0 => Some(Event::voice1(EventType::ProgramChange, channel, *bytes.get(1)? as u32)),
        0xD0 => Some(Event::voice1(EventType::ChannelPressure, channel, *bytes.get(1)? as u32)),
        0xE0 => {
            let lsb = *bytes.get(1)? as u32;
            let msb = *bytes.get(2)? as u32;
            Some(Event::voice1(EventType::PitchBend, channel, (msb << 7) | lsb))
        }
        _ => None,
    }
}

/// Encode a routed [`Event`] back into raw MIDI bytes for output. Returns
/// `None` for non-voice types this sender doesn't forward (matching
/// `sbmidi_alsaseq_sendevent`'s "silently refuses non-voice events").
pub fn encode_midi_bytes(event: &Event) -> Option<Vec<u8>> {
    let channel_nibble = (event.channel % 16) as u8;
    let status = event.event_type.status_code() | channel_nibble;
    match event.event_type {
        EventType::NoteOn | EventType::NoteOff | EventType::KeyPressure | EventType::ControlChange => {
            Some(vec![status, event.param1 as u8, event.param2 as u8])
        }
        EventType::ProgramChange | EventType::ChannelPressure => Some(vec![status, event.param1 as u8]),
        EventType::PitchBend => {
            let lsb = (event.param1 & 0x7F) as u8;
            let msb = ((event.param1 >> 7) & 0x7F) as u8;
            Some(vec![status, lsb, msb])
        }
        _ => None,
    }
}

/// Resolve a device index by exact numeric index or case-insensitive
/// substring match against a list of device names, grounded in the
/// teacher's `find_midi_device`/`find_audio_device`.
pub fn find_device(names: &[String], search: &str) -> Result<usize, MidiDeviceError> {
    if let Ok(index) = search.parse::<usize>() {
        return if index < names.len() {
            Ok(index)
        } else {
            Err(MidiDeviceError::IndexOutOfRange { index, max: names.len().saturating_sub(1) })
        };
    }

    let search_lower = search.to_lowercase();
    names
        .iter()
        .position(|n| n.to_lowercase().contains(&search_lower))
        .ok_or_else(|| MidiDeviceError::NotFound(search.to_string()))
}

/// Live connection to a MIDI input port. Decodes bytes on midir's own
/// callback thread and forwards normalized events through an unbounded
/// channel; the consumer end is expected to be drained by a loop polling
/// with a short timeout purely to check a quit flag (spec.md §5), not to
/// rate-limit ingestion.
pub struct MidiInputDriver {
    _connection: MidiInputConnection<()>,
}

impl MidiInputDriver {
    /// List available MIDI input device names.
    pub fn list_devices() -> Result<Vec<String>, MidiDeviceError> {
        let midi_in = MidiInput::new("midi-router-list").map_err(|e| MidirError::Init(e.to_string()))?;
        midi_in
            .ports()
            .iter()
            .map(|p| midi_in.port_name(p).map_err(|e| MidirError::PortInfo(e.to_string()).into()))
            .collect()
    }

    /// Connect to the input device at `device_index`, tagging every decoded
    /// event with `port_index` for the channel-space extension (spec.md
    /// §3). Decoded events are pushed to `event_tx` with `try_send`, never
    /// blocking the MIDI callback thread.
    pub fn connect(device_index: usize, port_index: u32, event_tx: Sender<Event>) -> Result<Self, MidiDeviceError> {
        let midi_in = MidiInput::new("midi-router-input").map_err(|e| MidirError::Init(e.to_string()))?;
        let ports = midi_in.ports();
        let port = ports.get(device_index).ok_or(MidiDeviceError::IndexOutOfRange {
            index: device_index,
            max: ports.len().saturating_sub(1),
        })?;

        let connection = midi_in
            .connect(
                port,
                "midi-router-input",
                move |_timestamp_us, bytes, _| {
                    if let Some(event) = decode_midi_bytes(port_index, bytes) {
                        let _ = event_tx.try_send(event);
                    }
                },
                (),
            )
            .map_err(|e| MidirError::Connect(e.to_string()))?;

        Ok(Self { _connection: connection })
    }
}

/// Live connection to a MIDI output port, used for the opt-in fan-out
/// described in spec.md §9 ("the helper that emits to external MIDI out is
/// defined but not invoked by the engine in the source").
pub struct MidiOutSender {
    connection: MidiOutputConnection,
}

impl MidiOutSender {
    pub fn list_devices() -> Result<Vec<String>, MidiDeviceError> {
        let midi_out = MidiOutput::new("midi-router-list").map_err(|e| MidirError::Init(e.to_string()))?;
        midi_out
            .ports()
            .iter()
            .map(|p| midi_out.port_name(p).map_err(|e| MidirError::PortInfo(e.to_string()).into()))
            .collect()
    }

    pub fn connect(device_index: usize) -> Result<Self, MidiDeviceError> {
        let midi_out = MidiOutput::new("midi-router-output").map_err(|e| MidirError::Init(e.to_string()))?;
        let ports = midi_out.ports();
        let port = ports.get(device_index).ok_or(MidiDeviceError::IndexOutOfRange {
            index: device_index,
            max: ports.len().saturating_sub(1),
        })?;

        let connection = midi_out
            .connect(port, "midi-router-output")
            .map_err(|e| MidirError::Connect(e.to_string()))?;

        Ok(Self { connection })
    }
}

impl MidiOutSink for MidiOutSender {
    fn send(&mut self, event: &Event) {
        if let Some(bytes) = encode_midi_bytes(event) {
            // Best-effort: a send error here means the downstream port has
            // gone away, which is not this sink's job to recover from.
            let _ = self.connection.send(&bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_note_on_and_extends_channel_by_port() {
        let evt = decode_midi_bytes(2, &[0x90, 60, 100]).unwrap();
        assert_eq!(evt, Event::voice(EventType::NoteOn, 32, 60, 100));
    }

    #[test]
    fn decodes_pitch_bend_as_14_bit_value() {
        let evt = decode_midi_bytes(0, &[0xE0, 0x00, 0x40]).unwrap();
        // msb=0x40 (64), lsb=0 -> 64*128 = 8192, pitch bend center.
        assert_eq!(evt, Event::voice1(EventType::PitchBend, 0, 8192));
    }

    #[test]
    fn decodes_system_realtime_with_no_channel() {
        let evt = decode_midi_bytes(0, &[0xFA]).unwrap();
        assert_eq!(evt, Event::system(EventType::MidiStart));
    }

    #[test]
    fn encode_roundtrips_note_on() {
        let evt = Event::voice(EventType::NoteOn, 3, 60, 100);
        assert_eq!(encode_midi_bytes(&evt), Some(vec![0x93, 60, 100]));
    }

    #[test]
    fn encode_roundtrips_pitch_bend() {
        let evt = Event::voice1(EventType::PitchBend, 0, 8192);
        assert_eq!(encode_midi_bytes(&evt), Some(vec![0xE0, 0x00, 0x40]));
    }

    #[test]
    fn encode_refuses_non_voice_events() {
        let evt = Event::system(EventType::MidiStart);
        assert_eq!(encode_midi_bytes(&evt), None);
    }

    #[test]
    fn find_device_by_index() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(find_device(&names, "1").unwrap(), 1);
    }

    #[test]
    fn find_device_by_name_substring_case_insensitive() {
        let names = vec!["USB Keyboard".to_string(), "Loopback".to_string()];
        assert_eq!(find_device(&names, "keyboard").unwrap(), 0);
    }

    #[test]
    fn find_device_reports_not_found() {
        let names = vec!["USB Keyboard".to_string()];
        assert!(matches!(find_device(&names, "nonexistent"), Err(MidiDeviceError::NotFound(_))));
    }
}
