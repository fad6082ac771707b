// libpump-rs/libpump/src/error.rs

//! Error type shared by both pump families.

use derive_more::Display;
use thiserror::Error;

use crate::minimed::PumpErrorCode;

/// Whether a failed delivery command may still have reached the device.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeliveryCertainty {
    /// The command was never transmitted; nothing was delivered.
    #[display(fmt = "certain")]
    Certain,
    /// The command was transmitted but no confirmation came back.
    #[display(fmt = "uncertain")]
    Uncertain,
}

/// 共通エラー型
///
/// Framing and semantic errors come from decoders, transport errors from the
/// radio, and the rest from session logic checking the device's answer.
#[derive(Error, Debug)]
pub enum Error {
    /// A buffer is shorter or longer than its layout allows.
    #[error("invalid packet length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Length the layout requires.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// CRC trailer does not match the payload. 8-bit sums are widened.
    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Checksum computed over the payload.
        expected: u16,
        /// Checksum carried by the frame.
        actual: u16,
    },

    /// A received symbol is not a valid 4b6b code.
    #[error("4b6b line decoding failed")]
    LineDecode,

    /// A frame is malformed in a way no other variant covers.
    #[error("frame format error: {0}")]
    FrameFormat(String),

    /// A message is still incomplete; more packets are needed.
    #[error("not enough data: need {needed} bytes, have {available}")]
    NotEnoughData {
        /// Bytes the message needs.
        needed: usize,
        /// Bytes received so far.
        available: usize,
    },

    /// Decoded fields make no sense together.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A field holds a value outside its enumeration.
    #[error("unknown {what} value: {value:#04x}")]
    UnknownValue {
        /// Raw value.
        value: u8,
        /// Name of the field.
        what: &'static str,
    },

    /// Pump message type code not in the catalogue.
    #[error("unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    /// History opcode missing from the record table.
    #[error("unknown event type: {0:#04x}")]
    UnknownEventType(u8),

    /// Pod message block tag not in the catalogue.
    #[error("unknown block type: {0:#04x}")]
    UnknownBlockType(u8),

    /// Model string the pump reported is not supported.
    #[error("unknown pump model: {0}")]
    UnknownPumpModel(String),

    /// The reply is valid but answers a different command.
    #[error("unexpected response code: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedResponse {
        /// Type code the command expects back.
        expected: u8,
        /// Type code received.
        actual: u8,
    },

    /// Packet type byte does not fit the exchange.
    #[error("unexpected packet type: {0:#04x}")]
    UnexpectedPacketType(u8),

    /// Nothing was heard within the listen window.
    #[error("operation timed out")]
    Timeout,

    /// The device stayed silent through every retry.
    #[error("no response: {0}")]
    NoResponse(String),

    /// The radio bridge reported a failure of its own.
    #[error("peripheral error: {0}")]
    PeripheralError(String),

    /// The bridge itself stopped answering.
    #[error("radio bridge timed out")]
    RileyLinkTimeout,

    /// A reply came from another device than the one addressed.
    #[error("crosstalk: expected address {expected}, got {actual}")]
    Crosstalk {
        /// Address the command went to.
        expected: String,
        /// Address the reply carried.
        actual: String,
    },

    /// Replies were garbled often enough to suspect radio noise.
    #[error("possible interference: {0}")]
    PossibleInterference(String),

    /// The pump refused the command.
    #[error("pump error: {0}")]
    PumpError(PumpErrorCode),

    /// The pump is already delivering a bolus.
    #[error("bolus in progress")]
    BolusInProgress,

    /// The pump is suspended and will not deliver.
    #[error("pump is suspended")]
    PumpSuspended,

    /// The pod wants a different nonce; the state has been resynced.
    #[error("bad nonce (sync word {sync_word:#06x})")]
    BadNonce {
        /// Sync word from the pod's error response.
        sync_word: u16,
    },

    /// The pod has faulted and stopped delivering.
    #[error("pod fault: {code:#04x}")]
    PodFault {
        /// Fault event code.
        code: u8,
    },

    /// The pod answered with an error response other than a bad nonce.
    #[error("pod rejected the command (error code {code:#04x})")]
    RejectedMessage {
        /// Error code from the response.
        code: u8,
    },

    /// The pod acked the last packet but sent no reply message.
    #[error("pod acknowledged instead of returning a response")]
    PodAckedInsteadOfReturningResponse,

    /// A reply carried no message blocks.
    #[error("empty response")]
    EmptyResponse,

    /// A new bolus was asked for while the last one may still be running.
    #[error("an unfinalized bolus is still running")]
    UnfinalizedBolus,

    /// A temp basal may still be running.
    #[error("an unfinalized temp basal is still running")]
    UnfinalizedTempBasal,

    /// The command needs a paired pod.
    #[error("no pod paired")]
    NoPodPaired,

    /// The pod has not finished the setup step this command needs.
    #[error("pod setup incomplete: {0}")]
    SetupIncomplete(String),

    /// The session state does not allow the command.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A delivery command failed; `certainty` tells whether it may have run.
    #[error("delivery failed ({certainty}): {source}")]
    Delivery {
        /// Whether the device may have acted on the command.
        certainty: DeliveryCertainty,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The device or model cannot do what was asked.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A state blob could not be read or written.
    #[cfg(feature = "serde")]
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap `self` as a delivery failure with the given certainty.
    pub fn into_delivery(self, certainty: DeliveryCertainty) -> Self {
        match self {
            already @ Error::Delivery { .. } => already,
            other => Error::Delivery {
                certainty,
                source: Box::new(other),
            },
        }
    }

    /// True when the failure happened before anything reached the device.
    pub fn is_certain_failure(&self) -> bool {
        !matches!(
            self,
            Error::Delivery {
                certainty: DeliveryCertainty::Uncertain,
                ..
            }
        )
    }
}

/// Crate-wide result.
pub type Result<T> = std::result::Result<T, Error>;
