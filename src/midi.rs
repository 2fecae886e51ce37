use std::fmt::{self, Display};

pub const NOTE_OFF_MSG: u8 = 0x80;
pub const NOTE_ON_MSG: u8 = 0x90;
pub const AFTERTOUCH_MSG: u8 = 0xA0;
pub const CONTROL_CHANGE_MSG: u8 = 0xB0;
pub const PROGRAM_CHANGE_MSG: u8 = 0xC0;
pub const CHANNEL_PRESSURE_MSG: u8 = 0xD0;
pub const PITCH_BEND_MSG: u8 = 0xE0;

/// A short MIDI message as it crosses from the audio thread to the worker.
///
/// Fixed size and `Copy`, so it can live in a ring-channel slot. Channels
/// are 1-based in the public API (1..=16) and 0-based in the status byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiMessage {
    data: [u8; 3],
    size: u8,
    /// Seconds, relative to whatever clock the producer uses.
    pub timestamp: f64,
}

impl Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_note_on() {
            write!(f, "NoteOn ch{} note {} vel {}", self.channel(), self.note_number(), self.velocity())
        } else if self.is_note_off() {
            write!(f, "NoteOff ch{} note {}", self.channel(), self.note_number())
        } else if self.is_controller() {
            write!(
                f,
                "CC ch{} #{} = {}",
                self.channel(),
                self.controller_number(),
                self.controller_value()
            )
        } else {
            write!(f, "MIDI {:02X?}", self.bytes())
        }
    }
}

impl MidiMessage {
    fn channel_nybble(channel: u8) -> u8 {
        channel.clamp(1, 16) - 1
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            data: [NOTE_ON_MSG | Self::channel_nybble(channel), note & 0x7F, velocity & 0x7F],
            size: 3,
            timestamp: 0.0,
        }
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            data: [NOTE_OFF_MSG | Self::channel_nybble(channel), note & 0x7F, velocity & 0x7F],
            size: 3,
            timestamp: 0.0,
        }
    }

    pub fn controller(channel: u8, control: u8, value: u8) -> Self {
        Self {
            data: [
                CONTROL_CHANGE_MSG | Self::channel_nybble(channel),
                control & 0x7F,
                value & 0x7F,
            ],
            size: 3,
            timestamp: 0.0,
        }
    }

    /// Builds a message from raw bytes. Only the first three bytes are kept;
    /// `None` for an empty slice or a missing status byte.
    pub fn from_bytes(bytes: &[u8], timestamp: f64) -> Option<Self> {
        let status = *bytes.first()?;
        if status & 0x80 == 0 {
            return None;
        }
        let size = bytes.len().min(3);
        let mut data = [0u8; 3];
        data[..size].copy_from_slice(&bytes[..size]);
        Some(Self {
            data,
            size: size as u8,
            timestamp,
        })
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.size as usize]
    }

    pub fn status(&self) -> u8 {
        self.data[0] & 0xF0
    }

    fn is_channel_message(&self) -> bool {
        (NOTE_OFF_MSG..0xF0).contains(&self.data[0])
    }

    /// Note-on with a non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        self.status() == NOTE_ON_MSG && self.size == 3 && self.data[2] > 0
    }

    /// Note-off, including note-on with velocity 0.
    pub fn is_note_off(&self) -> bool {
        self.size == 3
            && (self.status() == NOTE_OFF_MSG || (self.status() == NOTE_ON_MSG && self.data[2] == 0))
    }

    pub fn is_controller(&self) -> bool {
        self.status() == CONTROL_CHANGE_MSG && self.size == 3
    }

    /// 1-based channel, or 0 for system messages.
    pub fn channel(&self) -> u8 {
        if self.is_channel_message() {
            (self.data[0] & 0x0F) + 1
        } else {
            0
        }
    }

    pub fn note_number(&self) -> u8 {
        self.data[1]
    }

    pub fn velocity(&self) -> u8 {
        self.data[2]
    }

    pub fn velocity_as_float(&self) -> f32 {
        self.data[2] as f32 / 127.0
    }

    pub fn controller_number(&self) -> u8 {
        self.data[1]
    }

    pub fn controller_value(&self) -> u8 {
        self.data[2]
    }

    pub fn controller_value_as_float(&self) -> f32 {
        self.data[2] as f32 / 127.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_in_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<MidiMessage>(), 16);
    }

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        let msg = MidiMessage::note_on(1, 60, 0);
        assert!(!msg.is_note_on());
        assert!(msg.is_note_off());

        let msg = MidiMessage::note_on(10, 60, 100);
        assert!(msg.is_note_on());
        assert_eq!(msg.channel(), 10);
        assert_eq!(msg.bytes(), &[0x99, 60, 100]);
        assert!((msg.velocity_as_float() - 100.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn parses_raw_controller_bytes() {
        let msg = MidiMessage::from_bytes(&[0xB2, 7, 127], 1.5).unwrap();
        assert!(msg.is_controller());
        assert_eq!(msg.channel(), 3);
        assert_eq!(msg.controller_number(), 7);
        assert_eq!(msg.controller_value_as_float(), 1.0);
        assert_eq!(msg.timestamp, 1.5);
    }

    #[test]
    fn rejects_data_without_status() {
        assert!(MidiMessage::from_bytes(&[], 0.0).is_none());
        assert!(MidiMessage::from_bytes(&[0x40, 1], 0.0).is_none());

        let clock = MidiMessage::from_bytes(&[0xF8], 0.0).unwrap();
        assert_eq!(clock.channel(), 0);
        assert!(!clock.is_note_on() && !clock.is_note_off() && !clock.is_controller());
    }
}
