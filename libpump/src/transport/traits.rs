// libpump-rs/libpump/src/transport/traits.rs

//! The radio bridge as sessions see it.

use crate::utils::send_and_listen_timeout_ms;
use crate::{Error, Result};

/// Timing of one send-and-listen exchange through the radio bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenParams {
    /// Listen window after each transmission, in milliseconds.
    pub timeout_ms: u32,
    /// How many times the frame is repeated per attempt.
    pub repeat_count: u8,
    /// Gap between repeats.
    pub ms_between_packets: u32,
    /// Additional attempts when nothing is heard.
    pub retry_count: u8,
}

impl ListenParams {
    /// Params from their parts.
    pub fn new(timeout_ms: u32, repeat_count: u8, ms_between_packets: u32, retry_count: u8) -> Self {
        Self {
            timeout_ms,
            repeat_count,
            ms_between_packets,
            retry_count,
        }
    }

    /// End-to-end deadline for a frame of `frame_len` bytes, fixed before sending.
    pub fn total_timeout_ms(&self, frame_len: usize) -> u64 {
        send_and_listen_timeout_ms(
            frame_len,
            self.timeout_ms,
            self.repeat_count,
            self.ms_between_packets,
            self.retry_count,
        )
    }
}

impl Default for ListenParams {
    fn default() -> Self {
        Self::new(crate::constants::STANDARD_PUMP_RESPONSE_WINDOW_MS, 0, 0, 3)
    }
}

/// One frame heard by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFrame {
    /// On-air bytes, still line coded for Minimed traffic.
    pub data: Vec<u8>,
    /// Received signal strength in dBm.
    pub rssi: i8,
}

impl RadioFrame {
    /// Frame from its parts.
    pub fn new(data: Vec<u8>, rssi: i8) -> Self {
        Self { data, rssi }
    }
}

/// RadioTransport abstracts the radio bridge away from protocol/session logic.
///
/// Exactly one exchange is outstanding at a time; the protocol layer never
/// issues overlapping calls against the same device.
pub trait RadioTransport {
    /// Transmit `frame` and wait for a single response frame.
    ///
    /// Returns `Error::Timeout` when nothing is heard within
    /// `params.total_timeout_ms(frame.len())`.
    fn send_and_listen(&mut self, frame: &[u8], params: &ListenParams) -> Result<RadioFrame>;

    /// Transmit `frame` without listening for a reply.
    fn send_only(&mut self, frame: &[u8], repeat_count: u8, ms_between_packets: u32) -> Result<()>;

    /// Listen without sending. Bridges that cannot do this report it as unsupported.
    fn listen(&mut self, _timeout_ms: u32) -> Result<RadioFrame> {
        Err(Error::UnsupportedOperation("listen".into()))
    }

    /// Retune the radio. Default is a no-op for fixed-frequency links.
    fn set_base_frequency(&mut self, _mhz: f64) -> Result<()> {
        Ok(())
    }
}
