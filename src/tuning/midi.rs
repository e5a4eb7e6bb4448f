//! Minimal Standard MIDI File reader.
//!
//! Only what reference-pitch tuning needs: note-on/note-off spans in seconds,
//! honouring the tempo map.  Formats 0 and 1 with PPQ timing are supported;
//! SMPTE timing is rejected.

use std::path::Path;

use thiserror::Error;

const DEFAULT_TEMPO_US: u32 = 500_000;

// ---------------------------------------------------------------------------
// MidiError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a MIDI file (missing MThd header)")]
    NotMidi,

    #[error("unexpected end of MIDI data")]
    Truncated,

    #[error("unsupported MIDI file: {0}")]
    Unsupported(String),

    #[error("malformed MIDI data: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// NoteSpan
// ---------------------------------------------------------------------------

/// One sounding note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteSpan {
    /// MIDI key number (69 = A4).
    pub key: u8,
    pub start_secs: f32,
    pub end_secs: f32,
}

/// Frequency of MIDI `key` given the pitch of A4.
pub fn key_to_hz(key: u8, a4_hz: f32) -> f32 {
    a4_hz * 2f32.powf((key as f32 - 69.0) / 12.0)
}

// ---------------------------------------------------------------------------
// Byte reader
// ---------------------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn u8(&mut self) -> Result<u8, MidiError> {
        let b = *self.data.get(self.pos).ok_or(MidiError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn peek(&self) -> Result<u8, MidiError> {
        self.data.get(self.pos).copied().ok_or(MidiError::Truncated)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], MidiError> {
        let end = self.pos.checked_add(n).ok_or(MidiError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(MidiError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, MidiError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, MidiError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Variable-length quantity, at most four bytes.
    fn vlq(&mut self) -> Result<u32, MidiError> {
        let mut value = 0u32;
        for _ in 0..4 {
            let b = self.u8()?;
            value = (value << 7) | u32::from(b & 0x7f);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(MidiError::Malformed("variable-length quantity too long".into()))
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum EventKind {
    NoteOn { channel: u8, key: u8 },
    NoteOff { channel: u8, key: u8 },
    Tempo(u32),
}

#[derive(Debug, Clone, Copy)]
struct TimedEvent {
    tick: u64,
    kind: EventKind,
}

fn read_track(track: &[u8], events: &mut Vec<TimedEvent>) -> Result<(), MidiError> {
    let mut r = Reader::new(track);
    let mut tick = 0u64;
    let mut running_status: Option<u8> = None;

    while !r.is_empty() {
        tick += u64::from(r.vlq()?);

        let status = if r.peek()? & 0x80 != 0 {
            r.u8()?
        } else {
            running_status.ok_or_else(|| MidiError::Malformed("data byte without status".into()))?
        };

        match status {
            0xff => {
                let meta_type = r.u8()?;
                let len = r.vlq()? as usize;
                let payload = r.bytes(len)?;
                match meta_type {
                    0x2f => break,
                    0x51 if len == 3 => {
                        let tempo = u32::from_be_bytes([0, payload[0], payload[1], payload[2]]);
                        events.push(TimedEvent {
                            tick,
                            kind: EventKind::Tempo(tempo),
                        });
                    }
                    _ => {}
                }
            }
            0xf0 | 0xf7 => {
                let len = r.vlq()? as usize;
                r.bytes(len)?;
            }
            0x80..=0xef => {
                running_status = Some(status);
                let channel = status & 0x0f;
                match status & 0xf0 {
                    0x80 => {
                        let key = r.u8()?;
                        r.u8()?;
                        events.push(TimedEvent {
                            tick,
                            kind: EventKind::NoteOff { channel, key },
                        });
                    }
                    0x90 => {
                        let key = r.u8()?;
                        let velocity = r.u8()?;
                        let kind = if velocity == 0 {
                            EventKind::NoteOff { channel, key }
                        } else {
                            EventKind::NoteOn { channel, key }
                        };
                        events.push(TimedEvent { tick, kind });
                    }
                    0xc0 | 0xd0 => {
                        r.u8()?;
                    }
                    _ => {
                        r.bytes(2)?;
                    }
                }
            }
            other => {
                return Err(MidiError::Malformed(format!("unexpected status byte {other:#04x}")));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MidiFile
// ---------------------------------------------------------------------------

/// Notes of a MIDI file on an absolute time axis.
#[derive(Debug, Clone, Default)]
pub struct MidiFile {
    notes: Vec<NoteSpan>,
    length_secs: f32,
}

impl MidiFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MidiError> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Parse an in-memory Standard MIDI File.
    pub fn parse(data: &[u8]) -> Result<Self, MidiError> {
        let mut r = Reader::new(data);
        if r.bytes(4).map_err(|_| MidiError::NotMidi)? != b"MThd" {
            return Err(MidiError::NotMidi);
        }
        let header_len = r.u32()? as usize;
        if header_len < 6 {
            return Err(MidiError::Malformed("header chunk too short".into()));
        }
        let format = r.u16()?;
        let track_count = r.u16()?;
        let division = r.u16()?;
        r.bytes(header_len - 6)?;

        if format > 1 {
            return Err(MidiError::Unsupported(format!("format {format}")));
        }
        if division & 0x8000 != 0 {
            return Err(MidiError::Unsupported("SMPTE time division".into()));
        }
        if division == 0 {
            return Err(MidiError::Malformed("zero ticks per quarter note".into()));
        }

        let mut events = Vec::new();
        let mut tracks_read = 0;
        while tracks_read < track_count && !r.is_empty() {
            let id = r.bytes(4)?;
            let len = r.u32()? as usize;
            let body = r.bytes(len)?;
            if id == b"MTrk" {
                read_track(body, &mut events)?;
                tracks_read += 1;
            }
        }

        Ok(Self::from_events(events, division))
    }

    fn from_events(mut events: Vec<TimedEvent>, ticks_per_quarter: u16) -> Self {
        // Stable sort keeps per-track order for simultaneous events.
        events.sort_by_key(|e| e.tick);

        let mut tempo_us = DEFAULT_TEMPO_US;
        let mut last_tick = 0u64;
        let mut secs = 0.0f64;
        let mut open: Vec<(u8, u8, f32)> = Vec::new();
        let mut notes = Vec::new();

        for event in events {
            secs += (event.tick - last_tick) as f64 * f64::from(tempo_us)
                / (f64::from(ticks_per_quarter) * 1_000_000.0);
            last_tick = event.tick;
            let now = secs as f32;

            match event.kind {
                EventKind::Tempo(t) => tempo_us = t,
                EventKind::NoteOn { channel, key } => open.push((channel, key, now)),
                EventKind::NoteOff { channel, key } => {
                    if let Some(i) = open.iter().position(|&(c, k, _)| c == channel && k == key) {
                        let (_, _, start) = open.remove(i);
                        notes.push(NoteSpan {
                            key,
                            start_secs: start,
                            end_secs: now,
                        });
                    }
                }
            }
        }

        let length_secs = secs as f32;
        // Notes never switched off run to the end of the file.
        for (_, key, start) in open {
            notes.push(NoteSpan {
                key,
                start_secs: start,
                end_secs: length_secs,
            });
        }
        notes.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));

        Self { notes, length_secs }
    }

    pub fn notes(&self) -> &[NoteSpan] {
        &self.notes
    }

    pub fn length_secs(&self) -> f32 {
        self.length_secs
    }

    /// Keys sounding at `time_secs` (start inclusive, end exclusive).
    pub fn active_keys_at(&self, time_secs: f32) -> Vec<u8> {
        self.notes
            .iter()
            .filter(|n| n.start_secs <= time_secs && time_secs < n.end_secs)
            .map(|n| n.key)
            .collect()
    }

    /// Frequency of the highest key sounding at `time_secs`, if any.
    pub fn highest_pitch_at(&self, time_secs: f32, a4_hz: f32) -> Option<f32> {
        self.active_keys_at(time_secs)
            .into_iter()
            .max()
            .map(|key| key_to_hz(key, a4_hz))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
