use std::sync::mpsc::SyncSender;

use anyhow::{anyhow, Context};
use log::{debug, error, info};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};

use crate::mediation::messages::RawChunk;

const CLIENT_NAME: &str = "qu-osc reading input";

fn midi_input() -> anyhow::Result<MidiInput> {
    let mut midi_input = MidiInput::new(CLIENT_NAME).context("midir failure")?;
    // SysEx must come through; clock and active sensing would interleave with
    // multi-chunk messages.
    midi_input.ignore(Ignore::TimeAndActiveSense);
    Ok(midi_input)
}

pub fn list_midi_ports() -> anyhow::Result<Vec<String>> {
    let midi_input = midi_input()?;
    let mut names = Vec::new();
    for port in midi_input.ports().iter() {
        names.push(midi_input.port_name(port)?);
    }
    Ok(names)
}

fn find_port(midi_input: &MidiInput, port_name: &str) -> anyhow::Result<MidiInputPort> {
    let ports = midi_input.ports();
    if ports.is_empty() {
        return Err(anyhow!("No available MIDI input ports"));
    }
    debug!("Available MIDI ports:");
    for port in ports.iter() {
        let name = midi_input.port_name(port)?;
        debug!(" --> '{}'", name);
        if name == port_name {
            return Ok(port.clone());
        }
    }
    Err(anyhow!(
        "MIDI port '{}' was not found in available ports",
        port_name
    ))
}

/// Opens `port_name` and forwards every chunk the driver delivers into `tx`.
/// `tx` is bounded, so a slow consumer blocks the driver callback.
///
/// The connection must be kept alive for as long as input is wanted.
pub fn connect(port_name: &str, tx: SyncSender<RawChunk>) -> anyhow::Result<MidiInputConnection<()>> {
    let midi_input = midi_input()?;
    let port = find_port(&midi_input, port_name)?;

    let connection = midi_input
        .connect(
            &port,
            "qu-osc-read-input",
            move |stamp, midi_bytes, _| {
                let chunk = RawChunk {
                    bytes: midi_bytes.to_vec(),
                    stamp,
                };
                if let Err(e) = tx.send(chunk) {
                    error!("failed to send on MIDI thread: {}", e);
                }
            },
            (),
        )
        .map_err(|e| anyhow!("failed to open MIDI port '{}': {}", port_name, e))?;

    info!("MIDI connection open, reading input from '{}'.", port_name);
    Ok(connection)
}
