// libpump-rs/libpump/src/omnipod/blocks/error_response.rs

//! The pod's error response block.

use crate::omnipod::blocks::status::FaultEventCode;
use crate::omnipod::progress::PodProgressStatus;
use crate::protocol::parser::{be_u16_at, byte_at, expect_response_code, length_prefixed_block};
use crate::{Error, Result};

const ERROR_RESPONSE_TAG: u8 = 0x06;

/// Error code the pod sends when a command carried the wrong nonce.
pub const BAD_NONCE_CODE: u8 = 0x14;

/// `06 03 [code] ...`
///
/// A bad nonce reply carries the sync word needed to resynchronise; any
/// other code carries the fault code and progress of the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
    /// Code 0x14: the nonce was wrong.
    BadNonce {
        /// Sync word for resynchronising the nonce.
        nonce_search_key: u16,
    },
    /// Any other code.
    Rejected {
        /// Error code.
        code: u8,
        /// Fault the pod reports.
        fault: FaultEventCode,
        /// Pod lifecycle stage.
        progress_status: PodProgressStatus,
    },
}

impl ErrorResponse {
    /// Code byte.
    pub fn code(&self) -> u8 {
        match self {
            Self::BadNonce { .. } => BAD_NONCE_CODE,
            Self::Rejected { code, .. } => *code,
        }
    }

    /// Parse from the tag byte on.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let block = length_prefixed_block(data)?;
        expect_response_code(block, ERROR_RESPONSE_TAG)?;
        let code = byte_at(block, 2)?;
        if code == BAD_NONCE_CODE {
            return Ok(Self::BadNonce {
                nonce_search_key: be_u16_at(block, 3)?,
            });
        }
        Ok(Self::Rejected {
            code,
            fault: FaultEventCode(byte_at(block, 3)?),
            progress_status: PodProgressStatus::from_code(byte_at(block, 4)?)?,
        })
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![ERROR_RESPONSE_TAG, 3, self.code()];
        match self {
            Self::BadNonce { nonce_search_key } => out.extend_from_slice(&nonce_search_key.to_be_bytes()),
            Self::Rejected {
                fault,
                progress_status,
                ..
            } => out.extend_from_slice(&[fault.0, progress_status.code()]),
        }
        out
    }

    /// The error a command answered this way fails with.
    pub fn to_error(&self) -> Error {
        match self {
            Self::BadNonce { nonce_search_key } => Error::BadNonce {
                sync_word: *nonce_search_key,
            },
            Self::Rejected { code, .. } => Error::RejectedMessage { code: *code },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_hex;

    #[test]
    fn bad_nonce_reply() {
        let raw = parse_hex("060314217a").unwrap();
        let reply = ErrorResponse::decode(&raw).unwrap();
        assert_eq!(reply, ErrorResponse::BadNonce { nonce_search_key: 0x217a });
        assert!(matches!(reply.to_error(), Error::BadNonce { sync_word: 0x217a }));
        assert_eq!(reply.encode(), raw);
    }

    #[test]
    fn rejected_command_reply() {
        let raw = parse_hex("0603070008").unwrap();
        let reply = ErrorResponse::decode(&raw).unwrap();
        assert_eq!(
            reply,
            ErrorResponse::Rejected {
                code: 0x07,
                fault: FaultEventCode::NO_FAULTS,
                progress_status: PodProgressStatus::AboveFiftyUnits,
            }
        );
        assert!(matches!(reply.to_error(), Error::RejectedMessage { code: 0x07 }));
        assert_eq!(reply.encode(), raw);
    }

    #[test]
    fn truncated_reply() {
        assert!(matches!(
            ErrorResponse::decode(&[0x06, 0x03, 0x14]),
            Err(Error::NotEnoughData { .. })
        ));
    }
}
