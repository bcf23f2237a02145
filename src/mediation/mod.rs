use std::{
    sync::mpsc::{Receiver, Sender},
    thread::{self, JoinHandle},
    time::SystemTime,
};

use anyhow::Context;
use circular_buffer::CircularBuffer;
use log::{debug, error, info, warn};

use crate::osc_interface::{Destination, Publisher, Transport};

pub mod accumulator;
pub mod addresses;
pub mod dispatch;
pub mod messages;
pub mod nrpn;
pub mod sysex;
pub mod tables;

use self::{
    accumulator::Accumulator,
    addresses::AddressMapper,
    dispatch::dispatch,
    messages::{RawChunk, SemanticEvent},
    tables::Tables,
};

pub const MONITOR_LOG_LENGTH: usize = 16;

/// What the mediator reports to the monitor window.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEntry {
    Midi(String),
    Osc(String),
}

/// Owns the framing state and turns MIDI chunks into OSC messages.
///
/// Exactly one thread drives a mediator (see [`Mediator::run`]); chunks are
/// processed one at a time and each publish completes before the next chunk
/// is taken.
pub struct Mediator<T: Transport> {
    accumulator: Accumulator,
    tables: Tables,
    mapper: AddressMapper,
    publisher: Publisher<T>,
    monitor_tx: Option<Sender<MonitorEntry>>,
}

impl<T: Transport> Mediator<T> {
    pub fn new(tables: Tables, publisher: Publisher<T>) -> Self {
        let mapper = AddressMapper::new(tables.address_templates.clone());
        Mediator {
            accumulator: Accumulator::new(),
            tables,
            mapper,
            publisher,
            monitor_tx: None,
        }
    }

    pub fn with_monitor(mut self, monitor_tx: Sender<MonitorEntry>) -> Self {
        self.monitor_tx = Some(monitor_tx);
        self
    }

    pub fn publisher(&self) -> &Publisher<T> {
        &self.publisher
    }

    /// Runs the mediator on its own thread. Closing the MIDI connection (the
    /// only sender) lets it publish what is still queued and then return.
    pub fn spawn(self, midi_rx: Receiver<RawChunk>) -> anyhow::Result<JoinHandle<()>>
    where
        T: 'static,
    {
        thread::Builder::new()
            .name("mediator".into())
            .spawn(move || self.run(midi_rx))
            .context("failed to start mediator thread")
    }

    /// Consumes chunks until every sender is gone.
    pub fn run(mut self, midi_rx: Receiver<RawChunk>) {
        while let Ok(chunk) = midi_rx.recv() {
            self.handle_incoming_midi(&chunk);
        }
        info!("MIDI input closed; mediator stopping");
    }

    /// Returns the events decoded from the message this chunk completed.
    pub fn handle_incoming_midi(&mut self, chunk: &RawChunk) -> Vec<SemanticEvent> {
        let message = match self.accumulator.accept(&chunk.bytes, &self.tables) {
            Ok(Some(message)) => message,
            Ok(None) => {
                if !self.accumulator.is_empty() {
                    debug!("{} bytes buffered, message incomplete", self.accumulator.len());
                }
                return Vec::new();
            }
            Err(e) => {
                error!("Framing error: {:#}", e);
                return Vec::new();
            }
        };
        debug!("Complete message @ {}us: {}", chunk.stamp, message);
        self.report(MonitorEntry::Midi(message.to_string()));

        let events = dispatch(&message, &self.tables);
        for event in &events {
            self.forward(event);
        }
        events
    }

    fn forward(&self, event: &SemanticEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!("Result: {}", json),
            Err(_) => info!("Result: {:?}", event),
        }

        let (address, value) = match self.mapper.map(event) {
            Ok(Some(mapped)) => mapped,
            Ok(None) => {
                debug!("No OSC address for {} events", event.result_type());
                return;
            }
            Err(e) => {
                error!("Failed to map event to OSC: {:#}", e);
                return;
            }
        };

        let summary = format!("{} {}", address, value);
        match self.publisher.publish(&address, value) {
            Ok(delivery) => {
                if !delivery.failed.is_empty() {
                    warn!(
                        "{} not delivered to: {}",
                        address,
                        delivery.failed.join(", ")
                    );
                }
                self.report(MonitorEntry::Osc(summary));
            }
            Err(e) => error!("Failed to publish {}: {:#}", address, e),
        }
    }

    fn report(&self, entry: MonitorEntry) {
        if let Some(tx) = &self.monitor_tx {
            if tx.send(entry).is_err() {
                debug!("Monitor is gone; entry dropped");
            }
        }
    }
}

pub struct PortInformation {
    pub full_name: String,
    pub last_received: Option<SystemTime>,
}

/// State behind the monitor window.
pub struct MonitorModel {
    pub midi_message_log: CircularBuffer<MONITOR_LOG_LENGTH, String>,
    pub osc_message_log: CircularBuffer<MONITOR_LOG_LENGTH, String>,
    pub port_info: PortInformation,
    pub destinations: Vec<Destination>,
    pub monitor_rx: Receiver<MonitorEntry>,
}

impl MonitorModel {
    pub fn new(
        port_name: String,
        destinations: Vec<Destination>,
        monitor_rx: Receiver<MonitorEntry>,
    ) -> Self {
        MonitorModel {
            midi_message_log: CircularBuffer::new(),
            osc_message_log: CircularBuffer::new(),
            port_info: PortInformation {
                full_name: port_name,
                last_received: None,
            },
            destinations,
            monitor_rx,
        }
    }

    /// Pulls everything the mediator reported since the last call.
    pub fn drain_monitor(&mut self) {
        while let Ok(entry) = self.monitor_rx.try_recv() {
            match entry {
                MonitorEntry::Midi(line) => {
                    self.port_info.last_received = Some(SystemTime::now());
                    self.midi_message_log.push_back(line);
                }
                MonitorEntry::Osc(line) => self.osc_message_log.push_back(line),
            }
        }
    }
}
