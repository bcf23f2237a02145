use std::{
    collections::BTreeMap,
    net::UdpSocket,
    sync::{Mutex, PoisonError},
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use log::{debug, error, warn};
use rosc::{encoder, OscMessage, OscPacket};

use crate::mediation::messages::EventValue;

pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const SEND_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq)]
pub struct Destination {
    pub name: String,
    pub address: String,
    pub port: u16,
}

/// Write-only sink for encoded OSC packets.
pub trait Transport: Send + Sync {
    fn send(&self, destination: &Destination, packet: &[u8]) -> anyhow::Result<()>;
}

/// Sends every packet from one ephemeral UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind() -> anyhow::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind OSC socket")?;
        socket
            .set_write_timeout(Some(SEND_TIMEOUT))
            .context("failed to set OSC socket write timeout")?;
        Ok(UdpTransport { socket })
    }
}

impl Transport for UdpTransport {
    fn send(&self, destination: &Destination, packet: &[u8]) -> anyhow::Result<()> {
        let sent = self
            .socket
            .send_to(packet, (destination.address.as_str(), destination.port))?;
        if sent != packet.len() {
            bail!("short write: {} of {} bytes", sent, packet.len());
        }
        Ok(())
    }
}

/// Names of the destinations a publish reached, and of those it did not.
#[derive(Debug, Default, PartialEq)]
pub struct Delivery {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

/// Fans each OSC message out to every registered destination, at most
/// `max_workers` sends at a time, and returns once all of them finished.
pub struct Publisher<T: Transport> {
    transport: T,
    destinations: BTreeMap<String, Destination>,
    max_workers: usize,
}

impl<T: Transport> Publisher<T> {
    pub fn new(transport: T, max_workers: usize) -> Self {
        Publisher {
            transport,
            destinations: BTreeMap::new(),
            max_workers: max_workers.max(1),
        }
    }

    pub fn register(&mut self, name: &str, address: &str, port: u16) {
        if self.destinations.contains_key(name) {
            warn!("Target '{}' is already registered. Overwriting.", name);
        }
        self.destinations.insert(
            name.to_owned(),
            Destination {
                name: name.to_owned(),
                address: address.to_owned(),
                port,
            },
        );
        debug!("Added OSC target '{}' ({}:{})", name, address, port);
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.values()
    }

    pub fn publish(&self, address: &str, value: EventValue) -> anyhow::Result<Delivery> {
        if !address.starts_with('/') {
            bail!(
                "invalid OSC address '{}': must start with '/'",
                address
            );
        }
        if self.destinations.is_empty() {
            warn!("No OSC targets registered. Message not sent.");
            return Ok(Delivery::default());
        }

        let message = OscMessage {
            addr: address.to_owned(),
            args: value.clone().into_osc_args(),
        };
        let packet = encoder::encode(&OscPacket::Message(message))
            .map_err(|e| anyhow!("failed to encode OSC message for {}: {:?}", address, e))?;

        let pending = Mutex::new(self.destinations.values());
        let outcomes = Mutex::new(Vec::with_capacity(self.destinations.len()));
        let workers = self.max_workers.min(self.destinations.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .next();
                    let Some(destination) = next else {
                        break;
                    };
                    let sent = match self.transport.send(destination, &packet) {
                        Ok(()) => {
                            debug!(
                                "Sent to '{}' - Path: {}, Value: {}",
                                destination.name, address, value
                            );
                            true
                        }
                        Err(e) => {
                            error!("Error sending to '{}': {:#}", destination.name, e);
                            false
                        }
                    };
                    outcomes
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((destination.name.clone(), sent));
                });
            }
        });

        let mut delivery = Delivery::default();
        for (name, sent) in outcomes.into_inner().unwrap_or_else(PoisonError::into_inner) {
            if sent {
                delivery.delivered.push(name);
            } else {
                delivery.failed.push(name);
            }
        }
        delivery.delivered.sort();
        delivery.failed.sort();
        Ok(delivery)
    }
}
