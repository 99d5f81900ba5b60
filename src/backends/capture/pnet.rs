// pnet-based live capture backend

use super::{CaptureBackend, Frame, PacketReader};
use crate::config::CaptureConfig;
use crate::interfaces::discover_interfaces;
use anyhow::{Context, Result};
use pnet::datalink::{self, Channel, DataLinkReceiver};
use std::io;
use std::time::{Duration, Instant};

/// Capture through pnet datalink channels (AF_PACKET raw sockets on Linux)
pub struct PnetCapture {
    read_buffer_size: usize,
    read_timeout: Duration,
    promiscuous: bool,
    prefixes: Vec<String>,
}

impl PnetCapture {
    pub fn new(config: &CaptureConfig, prefixes: Vec<String>) -> Self {
        Self {
            read_buffer_size: config.snaplen,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            promiscuous: config.promiscuous,
            prefixes,
        }
    }
}

impl CaptureBackend for PnetCapture {
    fn name(&self) -> &'static str {
        "pnet"
    }

    fn interfaces(&self) -> Vec<String> {
        discover_interfaces(&self.prefixes)
    }

    fn open(&self, interface: &str) -> Result<Box<dyn PacketReader>> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == interface)
            .with_context(|| format!("Interface {} not found", interface))?;

        let config = datalink::Config {
            read_buffer_size: self.read_buffer_size,
            read_timeout: Some(self.read_timeout),
            promiscuous: self.promiscuous,
            ..Default::default()
        };

        match datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => {
                log::debug!("Opened capture channel on {}", interface);
                Ok(Box::new(PnetReader { rx }))
            }
            Ok(_) => Err(anyhow::anyhow!(
                "Unsupported channel type for {}",
                interface
            )),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to create channel for {}: {}",
                interface,
                e
            )),
        }
    }
}

struct PnetReader {
    rx: Box<dyn DataLinkReceiver>,
}

impl PacketReader for PnetReader {
    fn next_frame(&mut self) -> io::Result<Option<Frame<'_>>> {
        match self.rx.next() {
            Ok(data) => Ok(Some(Frame {
                timestamp: Instant::now(),
                data,
            })),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
