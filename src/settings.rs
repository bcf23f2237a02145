use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::osc_interface::DEFAULT_MAX_WORKERS;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Overrides app_options.log_level from the config file
    #[arg(long = "loglevel")]
    pub log_level: Option<String>,

    /// Flag to enable headless (no GUI) mode, suitable for server-type
    /// process
    #[arg(long = "headless")]
    pub headless_mode: bool,

    /// Application config (MIDI port, OSC targets)
    #[arg(long = "config", default_value = "config/app_config.json")]
    pub config: PathBuf,

    /// Lookup tables and OSC address templates; the built-in set is used if
    /// omitted
    #[arg(long = "templates")]
    pub templates: Option<PathBuf>,

    /// Override the MIDI input port name from the config file
    #[arg(long = "midi.port")]
    pub midi_port: Option<String>,

    /// Print the available MIDI input ports and exit
    #[arg(long = "midi.list")]
    pub list_ports: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppOptions {
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        AppOptions {
            application_name: default_application_name(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct MidiOptions {
    pub control_port_name: String,
    #[serde(default = "default_queue_size_limit")]
    pub queue_size_limit: usize,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TargetOptions {
    pub address: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
    All,
}

/// mDNS announcement of the OSC service.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ListenOptions {
    pub svc_name: String,
    pub svc_type: String,
    pub svc_port: u16,
    pub svc_addr: String,
    #[serde(default)]
    pub svc_props: HashMap<String, String>,
    #[serde(default = "default_ip_version")]
    pub svc_ipver: IpVersion,
}

#[derive(Deserialize, Debug, Clone)]
pub struct OscOptions {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetOptions>,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Service discovery is skipped when absent.
    #[serde(default)]
    pub listen: Option<ListenOptions>,
}

impl Default for OscOptions {
    fn default() -> Self {
        OscOptions {
            targets: BTreeMap::new(),
            max_workers: default_max_workers(),
            listen: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub app_options: AppOptions,
    pub midi_options: MidiOptions,
    #[serde(default)]
    pub osc_options: OscOptions,
}

fn default_application_name() -> String {
    String::from("qu-osc")
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_queue_size_limit() -> usize {
    1024
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_ip_version() -> IpVersion {
    IpVersion::V4
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        AppConfig::from_json(&json_str)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(json_str: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json_str)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_config_parses() {
        let config = AppConfig::from_json(include_str!("../config/app_config.json")).unwrap();
        assert_eq!(config.midi_options.queue_size_limit, 1024);
        assert_eq!(
            config.osc_options.targets.get("local"),
            Some(&TargetOptions {
                address: "127.0.0.1".into(),
                port: 9000
            })
        );
        let listen = config.osc_options.listen.unwrap();
        assert_eq!(listen.svc_type, "_osc._udp.local.");
        assert_eq!(listen.svc_ipver, IpVersion::V4);
    }

    #[test]
    fn shipped_config_is_the_default_path() {
        let cli = Cli::parse_from(["qu-osc"]);
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(&cli.config);
        assert!(AppConfig::load(&path).is_ok());
    }

    #[test]
    fn listen_ip_version_is_validated() {
        let config = AppConfig::from_json(
            r#"{
                "midi_options": { "control_port_name": "Qu-24" },
                "osc_options": { "listen": {
                    "svc_name": "qu-osc", "svc_type": "_osc._udp.local.",
                    "svc_port": 9000, "svc_addr": "qu-osc.local.", "svc_ipver": "all"
                } }
            }"#,
        )
        .unwrap();
        let listen = config.osc_options.listen.unwrap();
        assert_eq!(listen.svc_ipver, IpVersion::All);
        assert!(listen.svc_props.is_empty());

        assert!(AppConfig::from_json(
            r#"{
                "midi_options": { "control_port_name": "Qu-24" },
                "osc_options": { "listen": {
                    "svc_name": "qu-osc", "svc_type": "_osc._udp.local.",
                    "svc_port": 9000, "svc_addr": "qu-osc.local.", "svc_ipver": "v5"
                } }
            }"#,
        )
        .is_err());
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config =
            AppConfig::from_json(r#"{ "midi_options": { "control_port_name": "Qu-24" } }"#)
                .unwrap();
        assert_eq!(config.app_options.log_level, "info");
        assert_eq!(config.midi_options.queue_size_limit, 1024);
        assert!(config.osc_options.targets.is_empty());
        assert!(config.osc_options.listen.is_none());
        assert_eq!(config.osc_options.max_workers, DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn midi_port_is_required() {
        assert!(AppConfig::from_json(r#"{ "osc_options": {} }"#).is_err());
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::parse_from([
            "qu-osc",
            "--headless",
            "--loglevel",
            "debug",
            "--midi.port",
            "Qu-32 MIDI",
        ]);
        assert!(cli.headless_mode);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.midi_port.as_deref(), Some("Qu-32 MIDI"));
        assert_eq!(cli.config, PathBuf::from("config/app_config.json"));
        assert!(cli.templates.is_none());
    }
}
