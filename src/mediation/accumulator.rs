use std::cmp::Ordering;

use anyhow::{anyhow, bail};
use circular_buffer::CircularBuffer;

use super::{
    messages::{HexByte, Message, SYSEX_END, SYSEX_START},
    tables::{LengthRule, Tables},
};

/// Upper bound on a single in-progress message, SysEx included.
pub const MESSAGE_BUFFER_CAPACITY: usize = 512;

enum Framing {
    Pending,
    Complete,
    Invalid(String),
}

/// Reassembles complete messages from the chunks handed over by the MIDI
/// driver. Holds at most one message in progress; the buffer is empty again
/// after every completed message and after every framing error.
pub struct Accumulator {
    buffer: CircularBuffer<MESSAGE_BUFFER_CAPACITY, HexByte>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Accumulator {
            buffer: CircularBuffer::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends a chunk and returns the message it completes, if any.
    ///
    /// Overflow, an unknown length and a message running past its length are
    /// errors; each clears the buffer so the next status byte starts cleanly.
    pub fn accept(&mut self, chunk: &[u8], tables: &Tables) -> anyhow::Result<Option<Message>> {
        if chunk.is_empty() {
            return Ok(None);
        }

        for &byte in chunk {
            if self.buffer.is_full() {
                let dropped = self.buffer.len();
                self.buffer.clear();
                bail!(
                    "message buffer overflow after {} bytes; framing reset",
                    dropped
                );
            }
            self.buffer.push_back(HexByte(byte));
        }

        match self.framing(tables) {
            Framing::Pending => Ok(None),
            Framing::Complete => {
                let message = Message::new(self.buffer.iter().copied().collect());
                self.buffer.clear();
                Ok(Some(message))
            }
            Framing::Invalid(reason) => {
                self.buffer.clear();
                Err(anyhow!("{}; framing reset", reason))
            }
        }
    }

    fn framing(&self, tables: &Tables) -> Framing {
        let Some(&first) = self.buffer.front() else {
            return Framing::Pending;
        };

        if first == SYSEX_START {
            return match self.buffer.back() {
                Some(&last) if last == SYSEX_END => Framing::Complete,
                _ => Framing::Pending,
            };
        }

        let expected = match tables.length_rule(first) {
            None => {
                return Framing::Invalid(format!("no message length known for status {}", first))
            }
            Some(LengthRule::Fixed { length }) => *length,
            Some(LengthRule::BySubtype { subtype }) => {
                let Some(second) = self.buffer.get(1) else {
                    return Framing::Pending;
                };
                match subtype.get(second) {
                    Some(length) => *length,
                    None => {
                        return Framing::Invalid(format!(
                            "no message length known for status {} subtype {}",
                            first, second
                        ))
                    }
                }
            }
        };

        match self.buffer.len().cmp(&expected) {
            Ordering::Less => Framing::Pending,
            Ordering::Equal => Framing::Complete,
            Ordering::Greater => Framing::Invalid(format!(
                "message from status {} ran to {} bytes, expected {}",
                first,
                self.buffer.len(),
                expected
            )),
        }
    }
}
