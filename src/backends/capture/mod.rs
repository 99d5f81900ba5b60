// Live packet capture backend trait and implementations

use anyhow::Result;
use std::io;
use std::time::Instant;

pub mod pnet;

pub use self::pnet::PnetCapture;

/// One captured link-layer frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// When the frame was read off the interface
    pub timestamp: Instant,
    pub data: &'a [u8],
}

/// An open capture handle. Dropping it releases the handle.
pub trait PacketReader: Send {
    /// Block for the next frame.
    ///
    /// `Ok(None)` means the read timeout elapsed without traffic.
    fn next_frame(&mut self) -> io::Result<Option<Frame<'_>>>;
}

/// Live capture backend trait
pub trait CaptureBackend: Send + Sync {
    /// Backend name (e.g., "pnet")
    fn name(&self) -> &'static str;

    /// Interfaces eligible for capture, in capture order
    fn interfaces(&self) -> Vec<String>;

    /// Open a promiscuous capture handle on `interface`
    fn open(&self, interface: &str) -> Result<Box<dyn PacketReader>>;
}
