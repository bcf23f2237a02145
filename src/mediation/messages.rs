use std::fmt;

use anyhow::anyhow;
use rosc::OscType;
use serde::{Deserialize, Serialize};

/// One delivery from the MIDI driver: 1-3 bytes (more for SysEx) and the
/// driver timestamp in microseconds.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub bytes: Vec<u8>,
    pub stamp: u64,
}

/// A single protocol byte. Displays (and parses) as the `0x..` token used for
/// the lookup table keys.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct HexByte(pub u8);

pub const SYSEX_START: HexByte = HexByte(0xf0);
pub const SYSEX_END: HexByte = HexByte(0xf7);

impl HexByte {
    /// First hex digit of the token, i.e. the status class.
    pub fn high_nibble(self) -> u8 {
        self.0 >> 4
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for HexByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

impl From<HexByte> for String {
    fn from(value: HexByte) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for HexByte {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        HexByte::try_from(value.as_str())
    }
}

impl TryFrom<&str> for HexByte {
    type Error = anyhow::Error;

    /// Accepts `"0xb0"`, `"0XB0"` or a bare `"b0"`.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 2 {
            return Err(anyhow!("'{}' is not a one-byte hex token", value));
        }
        u8::from_str_radix(digits, 16)
            .map(HexByte)
            .map_err(|e| anyhow!("'{}' is not a one-byte hex token: {}", value, e))
    }
}

/// A complete, reassembled protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message(Vec<HexByte>);

impl Message {
    pub fn new(tokens: Vec<HexByte>) -> Self {
        Message(tokens)
    }

    pub fn tokens(&self) -> &[HexByte] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<HexByte> {
        self.0.first().copied()
    }

    pub fn get(&self, index: usize) -> Option<HexByte> {
        self.0.get(index).copied()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().map(|b| b.value()).collect()
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Message(bytes.iter().copied().map(HexByte).collect())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self.0.iter().map(|b| b.to_string()).collect();
        write!(f, "[{}]", tokens.join(", "))
    }
}

/// The scalar carried by an outbound OSC message.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum EventValue {
    Text(String),
    Int(i32),
    Bool(bool),
    Nil,
}

impl EventValue {
    /// OSC arguments for this value; `Nil` sends an argument-less message.
    pub fn into_osc_args(self) -> Vec<OscType> {
        match self {
            EventValue::Text(s) => vec![OscType::String(s)],
            EventValue::Int(i) => vec![OscType::Int(i)],
            EventValue::Bool(b) => vec![OscType::Bool(b)],
            EventValue::Nil => Vec::new(),
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Text(s) => write!(f, "\"{}\"", s),
            EventValue::Int(i) => write!(f, "{}", i),
            EventValue::Bool(b) => write!(f, "{}", b),
            EventValue::Nil => write!(f, "nil"),
        }
    }
}

/// Normalised console events. The serialised `result_type` tag is the key
/// used to look up address templates.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "result_type", rename_all = "snake_case")]
pub enum SemanticEvent {
    ConsoleType {
        data: String,
    },
    #[serde(rename = "console_fwversion")]
    ConsoleFirmware {
        data: String,
    },
    ChannelName {
        channel: String,
        data: String,
    },
    ChannelFader {
        channel: String,
        data: i32,
    },
    ChannelPan {
        channel: String,
        mix: String,
        data: i32,
    },
    PaflSelect {
        channel: String,
        data: bool,
    },
    #[serde(rename = "ch_preamp_source")]
    PreampSource {
        channel: String,
        data: String,
    },
    #[serde(rename = "ch_usb_source")]
    UsbSource {
        channel: String,
        data: String,
    },
    Function {
        function: String,
    },
    MmcAction {
        action: String,
    },
}

impl SemanticEvent {
    pub fn result_type(&self) -> &'static str {
        match self {
            SemanticEvent::ConsoleType { .. } => "console_type",
            SemanticEvent::ConsoleFirmware { .. } => "console_fwversion",
            SemanticEvent::ChannelName { .. } => "channel_name",
            SemanticEvent::ChannelFader { .. } => "channel_fader",
            SemanticEvent::ChannelPan { .. } => "channel_pan",
            SemanticEvent::PaflSelect { .. } => "pafl_select",
            SemanticEvent::PreampSource { .. } => "ch_preamp_source",
            SemanticEvent::UsbSource { .. } => "ch_usb_source",
            SemanticEvent::Function { .. } => "function",
            SemanticEvent::MmcAction { .. } => "mmc_action",
        }
    }

    pub fn channel(&self) -> Option<&str> {
        match self {
            SemanticEvent::ChannelName { channel, .. }
            | SemanticEvent::ChannelFader { channel, .. }
            | SemanticEvent::ChannelPan { channel, .. }
            | SemanticEvent::PaflSelect { channel, .. }
            | SemanticEvent::PreampSource { channel, .. }
            | SemanticEvent::UsbSource { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Named field lookup for address placeholders.
    pub fn field(&self, name: &str) -> Option<&str> {
        match (name, self) {
            ("result_type", _) => Some(self.result_type()),
            ("channel", _) => self.channel(),
            ("mix", SemanticEvent::ChannelPan { mix, .. }) => Some(mix),
            ("function", SemanticEvent::Function { function }) => Some(function),
            ("action", SemanticEvent::MmcAction { action }) => Some(action),
            _ => None,
        }
    }

    pub fn value(&self) -> EventValue {
        match self {
            SemanticEvent::ConsoleType { data }
            | SemanticEvent::ConsoleFirmware { data }
            | SemanticEvent::ChannelName { data, .. }
            | SemanticEvent::PreampSource { data, .. }
            | SemanticEvent::UsbSource { data, .. } => EventValue::Text(data.clone()),
            SemanticEvent::ChannelFader { data, .. } | SemanticEvent::ChannelPan { data, .. } => {
                EventValue::Int(*data)
            }
            SemanticEvent::PaflSelect { data, .. } => EventValue::Bool(*data),
            SemanticEvent::Function { .. } | SemanticEvent::MmcAction { .. } => EventValue::Nil,
        }
    }
}
