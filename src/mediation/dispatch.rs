use log::{debug, error};
use midi_msg::{MidiMsg, ReceiverContext};

use super::{
    messages::{Message, SemanticEvent, SYSEX_START},
    nrpn, sysex,
    tables::Tables,
};

const CONTROL_CHANGE: u8 = 0xb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    SysEx,
    ControlChange,
    Other,
}

impl MessageClass {
    pub fn of(message: &Message) -> Self {
        match message.first() {
            Some(first) if first == SYSEX_START => MessageClass::SysEx,
            Some(first) if first.high_nibble() == CONTROL_CHANGE => MessageClass::ControlChange,
            _ => MessageClass::Other,
        }
    }
}

/// Routes a complete message to its decoder. Decode failures are logged and
/// produce no events.
pub fn dispatch(message: &Message, tables: &Tables) -> Vec<SemanticEvent> {
    let decoded = match MessageClass::of(message) {
        MessageClass::SysEx => sysex::decode(message, tables),
        MessageClass::ControlChange => nrpn::decode(message, tables),
        MessageClass::Other => {
            debug!("Ignoring message: {}", describe(message));
            return Vec::new();
        }
    };

    match decoded {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to decode {}: {:#}", message, e);
            Vec::new()
        }
    }
}

fn describe(message: &Message) -> String {
    let mut ctx = ReceiverContext::new();
    match MidiMsg::from_midi_with_context(&message.to_bytes(), &mut ctx) {
        Ok((msg, _len)) => format!("{:?}", msg),
        Err(_) => message.to_string(),
    }
}
