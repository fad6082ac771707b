// libpump-rs/libpump/src/transport/mock.rs

//! Scripted radio for tests.

use crate::transport::traits::{ListenParams, RadioFrame, RadioTransport};
use crate::{Error, Result};

/// Scripted outcome of one listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// A received frame.
    Frame(RadioFrame),
    /// Nothing heard.
    Timeout,
    /// The bridge itself reported a failure.
    Peripheral(String),
}

/// Mock radio for unit tests. It records sent frames and replays queued replies.
#[derive(Debug, Default)]
pub struct MockRadio {
    /// Every frame sent, in order.
    pub sent: Vec<Vec<u8>>,
    /// Params of each send_and_listen call, `None` for send_only.
    pub sent_params: Vec<Option<ListenParams>>,
    /// Queued replies, consumed front first.
    pub replies: Vec<MockReply>,
    /// Frequencies set, in order.
    pub frequencies: Vec<f64>,
}

impl MockRadio {
    /// Radio with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame.
    pub fn push_frame(&mut self, data: Vec<u8>, rssi: i8) {
        self.replies.push(MockReply::Frame(RadioFrame::new(data, rssi)));
    }

    /// Queue a timeout.
    pub fn push_timeout(&mut self) {
        self.replies.push(MockReply::Timeout);
    }

    /// Queue any reply.
    pub fn push_reply(&mut self, reply: MockReply) {
        self.replies.push(reply);
    }

    /// Take the last frame sent.
    pub fn pop_sent(&mut self) -> Option<Vec<u8>> {
        self.sent.pop()
    }

    fn next_reply(&mut self) -> Result<RadioFrame> {
        if self.replies.is_empty() {
            return Err(Error::Timeout);
        }
        match self.replies.remove(0) {
            MockReply::Frame(f) => Ok(f),
            MockReply::Timeout => Err(Error::Timeout),
            MockReply::Peripheral(msg) => Err(Error::PeripheralError(msg)),
        }
    }
}

impl RadioTransport for MockRadio {
    fn send_and_listen(&mut self, frame: &[u8], params: &ListenParams) -> Result<RadioFrame> {
        self.sent.push(frame.to_vec());
        self.sent_params.push(Some(*params));
        self.next_reply()
    }

    fn send_only(&mut self, frame: &[u8], _repeat_count: u8, _ms_between_packets: u32) -> Result<()> {
        self.sent.push(frame.to_vec());
        self.sent_params.push(None);
        Ok(())
    }

    fn listen(&mut self, _timeout_ms: u32) -> Result<RadioFrame> {
        self.next_reply()
    }

    fn set_base_frequency(&mut self, mhz: f64) -> Result<()> {
        self.frequencies.push(mhz);
        Ok(())
    }
}
