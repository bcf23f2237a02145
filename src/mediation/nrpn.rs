use anyhow::bail;
use log::debug;

use super::{
    messages::{HexByte, Message, SemanticEvent},
    tables::{Parameter, Tables, UNKNOWN},
};

// Reassembled NRPN layout:
// [Bn 63 CH] [Bn 62 ID] [Bn 06 VA] [Bn 26 VX]
const CHANNEL_INDEX: usize = 2;
const PARAMETER_INDEX: usize = 5;
const VALUE_INDEX: usize = 8;

/// Controller number opening an NRPN sequence (parameter MSB select).
const NRPN_SELECT: HexByte = HexByte(0x63);

/// Pan arrives as 0..=74 with the centre at 37.
pub const PAN_CENTRE: i32 = 37;

const PREAMP_SOURCES: [&str; 2] = ["local", "dsnake"];
const USB_SOURCES: [&str; 2] = ["preamp", "usb"];

fn source_name(names: &[&str; 2], value: u8) -> String {
    names
        .get(usize::from(value))
        .copied()
        .unwrap_or(UNKNOWN)
        .to_owned()
}

/// Decodes a reassembled NRPN sequence. Plain control changes (volume, pan,
/// sustain, all notes off) produce no events.
pub fn decode(message: &Message, tables: &Tables) -> anyhow::Result<Vec<SemanticEvent>> {
    if message.get(1) != Some(NRPN_SELECT) {
        debug!("Ignoring plain control change {}", message);
        return Ok(Vec::new());
    }

    let (Some(channel), Some(parameter), Some(value)) = (
        message.get(CHANNEL_INDEX),
        message.get(PARAMETER_INDEX),
        message.get(VALUE_INDEX),
    ) else {
        bail!("parameter message too short ({} bytes)", message.len());
    };

    let Some(kind) = tables.parameter(parameter) else {
        debug!("Unhandled parameter id {} in {}", parameter, message);
        return Ok(Vec::new());
    };

    let channel = tables.channel(channel);
    let raw = value.value();
    let event = match kind {
        Parameter::Fader => SemanticEvent::ChannelFader {
            channel,
            data: i32::from(raw),
        },
        Parameter::Pan { mix } => SemanticEvent::ChannelPan {
            channel,
            mix,
            data: i32::from(raw) - PAN_CENTRE,
        },
        Parameter::PaflSelect => SemanticEvent::PaflSelect {
            channel,
            data: raw != 0,
        },
        Parameter::PreampSource => SemanticEvent::PreampSource {
            channel,
            data: source_name(&PREAMP_SOURCES, raw),
        },
        Parameter::UsbSource => SemanticEvent::UsbSource {
            channel,
            data: source_name(&USB_SOURCES, raw),
        },
    };
    Ok(vec![event])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nrpn(channel: u8, parameter: u8, value: u8) -> Message {
        Message::from(
            &[
                0xb0, 0x63, channel, 0xb0, 0x62, parameter, 0xb0, 0x06, value, 0xb0, 0x26, 0x07,
            ][..],
        )
    }

    fn decode_one(message: &Message) -> SemanticEvent {
        let tables = Tables::builtin().unwrap();
        let mut events = decode(message, &tables).unwrap();
        assert_eq!(events.len(), 1);
        events.remove(0)
    }

    #[test]
    fn pan_is_recentred() {
        assert_eq!(
            decode_one(&nrpn(0x02, 0x16, 0x4b)),
            SemanticEvent::ChannelPan {
                channel: "3".into(),
                mix: "lr".into(),
                data: 38,
            }
        );
        match decode_one(&nrpn(0x02, 0x16, 0x00)) {
            SemanticEvent::ChannelPan { data, .. } => assert_eq!(data, -37),
            other => panic!("unexpected event {:?}", other),
        }
        match decode_one(&nrpn(0x02, 0x16, 0x25)) {
            SemanticEvent::ChannelPan { data, .. } => assert_eq!(data, 0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn fader_value_is_decoded() {
        assert_eq!(
            decode_one(&nrpn(0x00, 0x17, 0x62)),
            SemanticEvent::ChannelFader {
                channel: "1".into(),
                data: 0x62,
            }
        );
    }

    #[test]
    fn pafl_select_is_nonzero() {
        assert_eq!(
            decode_one(&nrpn(0x20, 0x51, 0x01)),
            SemanticEvent::PaflSelect {
                channel: "st1".into(),
                data: true,
            }
        );
        assert_eq!(
            decode_one(&nrpn(0x20, 0x51, 0x00)),
            SemanticEvent::PaflSelect {
                channel: "st1".into(),
                data: false,
            }
        );
    }

    #[test]
    fn sources_resolve_through_their_maps() {
        assert_eq!(
            decode_one(&nrpn(0x04, 0x57, 0x01)),
            SemanticEvent::PreampSource {
                channel: "5".into(),
                data: "dsnake".into(),
            }
        );
        assert_eq!(
            decode_one(&nrpn(0x04, 0x58, 0x00)),
            SemanticEvent::UsbSource {
                channel: "5".into(),
                data: "preamp".into(),
            }
        );
        assert_eq!(
            decode_one(&nrpn(0x04, 0x58, 0x09)),
            SemanticEvent::UsbSource {
                channel: "5".into(),
                data: "Unknown".into(),
            }
        );
    }

    #[test]
    fn unknown_channel_does_not_fail() {
        assert_eq!(
            decode_one(&nrpn(0x7e, 0x17, 0x10)),
            SemanticEvent::ChannelFader {
                channel: "Unknown".into(),
                data: 0x10,
            }
        );
    }

    #[test]
    fn unknown_parameter_yields_nothing() {
        let tables = Tables::builtin().unwrap();
        assert!(decode(&nrpn(0x00, 0x01, 0x10), &tables).unwrap().is_empty());
    }

    #[test]
    fn plain_control_change_yields_nothing() {
        let tables = Tables::builtin().unwrap();
        for controller in [0x07u8, 0x0a, 0x40, 0x7b] {
            let message = Message::from(&[0xb0u8, controller, 0x64][..]);
            assert!(decode(&message, &tables).unwrap().is_empty());
        }
    }

    #[test]
    fn truncated_nrpn_is_an_error() {
        let tables = Tables::builtin().unwrap();
        let message = Message::from(&[0xb0u8, 0x63, 0x00, 0xb0, 0x62, 0x17][..]);
        assert!(decode(&message, &tables).is_err());
    }
}
