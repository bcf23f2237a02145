use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context};
use log::{debug, info};
use serde::Deserialize;

use super::messages::HexByte;

pub const UNKNOWN: &str = "Unknown";

/// How the total length of a non-SysEx message is found from its status byte.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum LengthRule {
    Fixed { length: usize },
    /// Keyed by the second byte of the message.
    BySubtype { subtype: HashMap<HexByte, usize> },
}

#[derive(Deserialize, Clone, Debug)]
pub struct SysexTemplates {
    pub sysex_header: Vec<HexByte>,
}

/// Parameter-id bytes of the NRPN parameters that are decoded. Pan ids live in
/// `mix_pan_definitions` because each one names the mix it pans into.
#[derive(Deserialize, Clone, Debug)]
pub struct ParameterIds {
    pub fader: HexByte,
    pub pafl_select: HexByte,
    pub preamp_source: HexByte,
    pub usb_source: HexByte,
}

impl Default for ParameterIds {
    fn default() -> Self {
        ParameterIds {
            fader: HexByte(0x17),
            pafl_select: HexByte(0x51),
            preamp_source: HexByte(0x57),
            usb_source: HexByte(0x58),
        }
    }
}

#[derive(Deserialize, Debug)]
struct TemplateFile {
    message_types: HashMap<String, LengthRule>,
    sysex_templates: SysexTemplates,
    #[serde(default)]
    console_types: HashMap<HexByte, String>,
    #[serde(default)]
    mmc_commands: HashMap<HexByte, String>,
    #[serde(default)]
    channel_definitions: HashMap<HexByte, String>,
    #[serde(default)]
    mix_pan_definitions: HashMap<HexByte, String>,
    #[serde(default)]
    parameter_ids: ParameterIds,
    #[serde(default = "default_address_templates")]
    address_templates: HashMap<String, String>,
}

/// The NRPN parameters this bridge understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Fader,
    Pan { mix: String },
    PaflSelect,
    PreampSource,
    UsbSource,
}

/// Read-only lookup data shared by the accumulator, decoders and mapper.
#[derive(Debug, Clone)]
pub struct Tables {
    message_types: HashMap<u8, LengthRule>,
    pub sysex_header: Vec<HexByte>,
    console_types: HashMap<HexByte, String>,
    mmc_commands: HashMap<HexByte, String>,
    channel_definitions: HashMap<HexByte, String>,
    mix_pan_definitions: HashMap<HexByte, String>,
    parameter_ids: ParameterIds,
    pub address_templates: HashMap<String, String>,
}

fn default_address_templates() -> HashMap<String, String> {
    [
        ("channel_name", "/qu/channel/{{channel}}/name"),
        ("channel_fader", "/qu/channel/{{channel}}/fader"),
        ("channel_pan", "/qu/channel/{{channel}}/pan/{{mix}}"),
        ("ch_preamp_source", "/qu/channel/{{channel}}/preamp-source"),
        ("ch_usb_source", "/qu/channel/{{channel}}/usb-source"),
        ("pafl_select", "/qu/channel/{{channel}}/pafl-select"),
        ("console_fwversion", "/qu/console/fw-version"),
        ("console_type", "/qu/console/type"),
        ("function", "/qu/function/{{function}}"),
        ("mmc_action", "/qu/mmc/{{action}}"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

impl Tables {
    /// The tables shipped with the binary.
    pub fn builtin() -> anyhow::Result<Self> {
        let json_str = include_str!("../../config/templates.json");
        Tables::from_json(json_str).context("built-in templates are invalid")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        debug!("Attempting to read templates file: {}", path.display());
        let json_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read templates file {}", path.display()))?;
        Tables::from_json(&json_str)
            .with_context(|| format!("invalid templates file {}", path.display()))
    }

    pub fn from_json(json_str: &str) -> anyhow::Result<Self> {
        let file: TemplateFile = serde_json::from_str(json_str)?;

        let mut message_types = HashMap::new();
        for (key, rule) in file.message_types {
            let nibble = u8::from_str_radix(key.trim(), 16)
                .ok()
                .filter(|n| *n < 0x10)
                .ok_or_else(|| anyhow!("message type key '{}' is not a single hex digit", key))?;
            message_types.insert(nibble, rule);
        }
        if file.sysex_templates.sysex_header.is_empty() {
            return Err(anyhow!("sysex_header must not be empty"));
        }

        info!(
            "...Loaded {} message types, {} channel definitions, {} address templates OK",
            message_types.len(),
            file.channel_definitions.len(),
            file.address_templates.len()
        );

        Ok(Tables {
            message_types,
            sysex_header: file.sysex_templates.sysex_header,
            console_types: file.console_types,
            mmc_commands: file.mmc_commands,
            channel_definitions: file.channel_definitions,
            mix_pan_definitions: file.mix_pan_definitions,
            parameter_ids: file.parameter_ids,
            address_templates: file.address_templates,
        })
    }

    pub fn length_rule(&self, status: HexByte) -> Option<&LengthRule> {
        self.message_types.get(&status.high_nibble())
    }

    pub fn console_type(&self, id: HexByte) -> String {
        lookup_or_unknown(&self.console_types, id)
    }

    pub fn mmc_command(&self, id: HexByte) -> String {
        lookup_or_unknown(&self.mmc_commands, id)
    }

    pub fn channel(&self, index: HexByte) -> String {
        lookup_or_unknown(&self.channel_definitions, index)
    }

    pub fn parameter(&self, id: HexByte) -> Option<Parameter> {
        let ids = &self.parameter_ids;
        if let Some(mix) = self.mix_pan_definitions.get(&id) {
            return Some(Parameter::Pan { mix: mix.clone() });
        }
        match id {
            _ if id == ids.fader => Some(Parameter::Fader),
            _ if id == ids.pafl_select => Some(Parameter::PaflSelect),
            _ if id == ids.preamp_source => Some(Parameter::PreampSource),
            _ if id == ids.usb_source => Some(Parameter::UsbSource),
            _ => None,
        }
    }
}

fn lookup_or_unknown(map: &HashMap<HexByte, String>, key: HexByte) -> String {
    map.get(&key).cloned().unwrap_or_else(|| UNKNOWN.to_owned())
}
