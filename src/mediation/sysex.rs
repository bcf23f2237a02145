use anyhow::{anyhow, bail, Context};
use log::debug;

use super::{
    messages::{HexByte, Message, SemanticEvent, SYSEX_END},
    tables::Tables,
};

pub const END_OF_SYNC: &str = "end-of-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SysexAction {
    ChannelName,
    ConsoleInfo,
    MeterData,
    EndOfSync,
    Mmc,
}

impl SysexAction {
    fn from_byte(action: HexByte) -> Option<Self> {
        match action.value() {
            0x02 => Some(SysexAction::ChannelName),
            0x11 => Some(SysexAction::ConsoleInfo),
            0x13 => Some(SysexAction::MeterData),
            0x14 => Some(SysexAction::EndOfSync),
            0x7f => Some(SysexAction::Mmc),
            _ => None,
        }
    }
}

/// Splits a SysEx message into its action byte and payload, dropping the
/// console header (when the message carries it) and the end marker.
fn split(message: &Message, header: &[HexByte]) -> anyhow::Result<(HexByte, Vec<HexByte>)> {
    let tokens = message.tokens();
    if tokens.len() < 3 {
        bail!("SysEx message too short ({} bytes)", tokens.len());
    }

    let end = if tokens.last() == Some(&SYSEX_END) {
        tokens.len() - 1
    } else {
        tokens.len()
    };
    let start = if tokens.len() > header.len() && tokens.starts_with(header) {
        header.len()
    } else {
        1
    };

    let body = tokens.get(start..end).unwrap_or_default();
    let (action, payload) = body
        .split_first()
        .ok_or_else(|| anyhow!("SysEx message has no action byte"))?;
    if payload.is_empty() {
        bail!("SysEx action {} has an empty payload", action);
    }
    Ok((*action, payload.to_vec()))
}

pub fn decode(message: &Message, tables: &Tables) -> anyhow::Result<Vec<SemanticEvent>> {
    let (action, payload) = split(message, &tables.sysex_header)?;

    match SysexAction::from_byte(action) {
        Some(SysexAction::ChannelName) => channel_name(&payload, tables),
        Some(SysexAction::ConsoleInfo) => console_info(&payload, tables),
        Some(SysexAction::MeterData) => {
            debug!("Meter data ({} bytes) not forwarded", payload.len());
            Ok(Vec::new())
        }
        Some(SysexAction::EndOfSync) => Ok(vec![SemanticEvent::Function {
            function: END_OF_SYNC.to_owned(),
        }]),
        Some(SysexAction::Mmc) => mmc_action(&payload, tables),
        None => {
            debug!("Unhandled SysEx action {}", action);
            Ok(Vec::new())
        }
    }
}

fn console_info(payload: &[HexByte], tables: &Tables) -> anyhow::Result<Vec<SemanticEvent>> {
    let [box_id, major, minor] = payload else {
        bail!(
            "console information message is malformed: expected 3 bytes, got {}",
            payload.len()
        );
    };
    Ok(vec![
        SemanticEvent::ConsoleType {
            data: tables.console_type(*box_id),
        },
        SemanticEvent::ConsoleFirmware {
            data: format!("{}.{}", major.value(), minor.value()),
        },
    ])
}

fn channel_name(payload: &[HexByte], tables: &Tables) -> anyhow::Result<Vec<SemanticEvent>> {
    let (index, characters) = payload
        .split_first()
        .context("channel name message has no channel index")?;
    let bytes: Vec<u8> = characters.iter().map(|b| b.value()).collect();
    let name = String::from_utf8_lossy(&bytes)
        .trim_end_matches('\0')
        .to_owned();
    Ok(vec![SemanticEvent::ChannelName {
        channel: tables.channel(*index),
        data: name,
    }])
}

/// MMC payload: device id, sub-id (0x06 = command), command.
fn mmc_action(payload: &[HexByte], tables: &Tables) -> anyhow::Result<Vec<SemanticEvent>> {
    let command = payload
        .get(2)
        .ok_or_else(|| anyhow!("MMC message too short: {} payload bytes", payload.len()))?;
    Ok(vec![SemanticEvent::MmcAction {
        action: tables.mmc_command(*command),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Tables {
        Tables::builtin().unwrap()
    }

    fn with_header(tables: &Tables, body: &[u8]) -> Message {
        let mut bytes: Vec<u8> = tables.sysex_header.iter().map(|b| b.value()).collect();
        bytes.extend_from_slice(body);
        bytes.push(0xf7);
        Message::from(bytes.as_slice())
    }

    #[test]
    fn console_info_yields_type_and_firmware() {
        let tables = tables();
        let message = with_header(&tables, &[0x11, 0x01, 0x02, 0x05]);
        let expected = vec![
            SemanticEvent::ConsoleType {
                data: "Qu-16".into(),
            },
            SemanticEvent::ConsoleFirmware { data: "2.5".into() },
        ];
        assert_eq!(decode(&message, &tables).unwrap(), expected);
        assert_eq!(decode(&message, &tables).unwrap(), expected);
    }

    #[test]
    fn firmware_components_render_in_decimal() {
        let tables = tables();
        let message = with_header(&tables, &[0x11, 0x7e, 0x01, 0x10]);
        let events = decode(&message, &tables).unwrap();
        assert_eq!(
            events,
            vec![
                SemanticEvent::ConsoleType {
                    data: "Unknown".into()
                },
                SemanticEvent::ConsoleFirmware {
                    data: "1.16".into()
                },
            ]
        );
    }

    #[test]
    fn malformed_console_info_is_an_error() {
        let tables = tables();
        let message = with_header(&tables, &[0x11, 0x01, 0x02]);
        assert!(decode(&message, &tables).is_err());
    }

    #[test]
    fn channel_name_trims_nul_padding() {
        let tables = tables();
        let message = with_header(&tables, &[0x02, 0x00, b'C', b'h', b'1', 0x00, 0x00]);
        assert_eq!(
            decode(&message, &tables).unwrap(),
            vec![SemanticEvent::ChannelName {
                channel: "1".into(),
                data: "Ch1".into(),
            }]
        );
    }

    #[test]
    fn channel_name_with_unknown_index() {
        let tables = tables();
        let message = with_header(&tables, &[0x02, 0x7d, b'V', b'o', b'x']);
        assert_eq!(
            decode(&message, &tables).unwrap(),
            vec![SemanticEvent::ChannelName {
                channel: "Unknown".into(),
                data: "Vox".into(),
            }]
        );
    }

    #[test]
    fn end_of_sync_is_a_function_marker() {
        let tables = tables();
        let message = with_header(&tables, &[0x14, 0x00]);
        assert_eq!(
            decode(&message, &tables).unwrap(),
            vec![SemanticEvent::Function {
                function: END_OF_SYNC.into()
            }]
        );
    }

    #[test]
    fn mmc_without_console_header() {
        let tables = tables();
        let message = Message::from(&[0xf0u8, 0x7f, 0x7f, 0x06, 0x02, 0xf7][..]);
        assert_eq!(
            decode(&message, &tables).unwrap(),
            vec![SemanticEvent::MmcAction {
                action: "play".into()
            }]
        );

        let unknown = Message::from(&[0xf0u8, 0x7f, 0x7f, 0x06, 0x44, 0xf7][..]);
        assert_eq!(
            decode(&unknown, &tables).unwrap(),
            vec![SemanticEvent::MmcAction {
                action: "Unknown".into()
            }]
        );
    }

    #[test]
    fn short_mmc_is_an_error() {
        let tables = tables();
        let message = Message::from(&[0xf0u8, 0x7f, 0x7f, 0x06, 0xf7][..]);
        assert!(decode(&message, &tables).is_err());
    }

    #[test]
    fn meter_data_and_unknown_actions_yield_nothing() {
        let tables = tables();
        let meters = with_header(&tables, &[0x13, 0x01, 0x02, 0x03]);
        assert!(decode(&meters, &tables).unwrap().is_empty());
        let unknown = with_header(&tables, &[0x55, 0x01]);
        assert!(decode(&unknown, &tables).unwrap().is_empty());
    }

    #[test]
    fn too_short_or_empty_payload_is_an_error() {
        let tables = tables();
        assert!(decode(&Message::from(&[0xf0u8, 0xf7][..]), &tables).is_err());
        assert!(decode(&Message::from(&[0xf0u8, 0x14, 0xf7][..]), &tables).is_err());
        assert!(decode(&with_header(&tables, &[0x14]), &tables).is_err());
    }
}
