//! Decoding of typed contract reverts out of RPC error strings.
//!
//! Execution clients surface custom solidity errors as the 4 byte selector of
//! the error signature, hex-encoded somewhere inside the error message. The
//! dictionary below maps the selectors of the quill contracts' errors back to
//! their signatures.

use once_cell::sync::Lazy;
use quill_eyre::eyre;
use regex::Regex;

static SELECTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("(0x[0-9a-fA-F]{8})").expect("selector regex is valid"));

/// A revert raised by one of the quill contracts, recovered from its selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("ArrayLengthMismatch()")]
    ArrayLengthMismatch,
    #[error("EmptyArray()")]
    EmptyArray,
    #[error("EndIndexOutOfRange()")]
    EndIndexOutOfRange,
    #[error("FromIndexOutOfRange()")]
    FromIndexOutOfRange,
    #[error("InvalidImplementation()")]
    InvalidImplementation,
    #[error("InvalidMaxPayloadSize()")]
    InvalidMaxPayloadSize,
    #[error("InvalidMinPayloadSize()")]
    InvalidMinPayloadSize,
    #[error("InvalidPayloadSize(uint256,uint256,uint256)")]
    InvalidPayloadSize,
    #[error("InvalidProtocolFeeRate()")]
    InvalidProtocolFeeRate,
    #[error("InvalidSequenceIds()")]
    InvalidSequenceIds,
    #[error("InvalidStartSequenceId(uint64,uint64)")]
    InvalidStartSequenceId,
    #[error("NoChange()")]
    NoChange,
    #[error("NotAdmin()")]
    NotAdmin,
    #[error("NotPaused()")]
    NotPaused,
    #[error("NotPayloadBootstrapper()")]
    NotPayloadBootstrapper,
    #[error("ParameterOutOfTypeBounds()")]
    ParameterOutOfTypeBounds,
    #[error("Paused()")]
    Paused,
    #[error("ZeroAdmin()")]
    ZeroAdmin,
    #[error("ZeroImplementation()")]
    ZeroImplementation,
    #[error("ZeroParameterRegistry()")]
    ZeroParameterRegistry,
}

impl ProtocolError {
    #[must_use]
    pub fn from_selector(selector: &str) -> Option<Self> {
        let selector = selector.to_ascii_lowercase();
        let protocol = match selector.as_str() {
            "0xa24a13a6" => Self::ArrayLengthMismatch,
            "0x521299a9" => Self::EmptyArray,
            "0xb6cc7531" => Self::EndIndexOutOfRange,
            "0xea61fe70" => Self::FromIndexOutOfRange,
            "0x68155f9a" => Self::InvalidImplementation,
            "0x1d8e7a4a" => Self::InvalidMaxPayloadSize,
            "0xe219e4f0" => Self::InvalidMinPayloadSize,
            "0x93b7abe6" => Self::InvalidPayloadSize,
            "0x82eeb3b2" => Self::InvalidProtocolFeeRate,
            "0xa7ee0517" => Self::InvalidSequenceIds,
            "0x84e23433" => Self::InvalidStartSequenceId,
            "0xa88ee577" => Self::NoChange,
            "0x7bfa4b9f" => Self::NotAdmin,
            "0x6cd60201" => Self::NotPaused,
            "0xc525f923" => Self::NotPayloadBootstrapper,
            "0x37f4f148" => Self::ParameterOutOfTypeBounds,
            "0x9e87fac8" => Self::Paused,
            "0x7289db0e" => Self::ZeroAdmin,
            "0x4208d2eb" => Self::ZeroImplementation,
            "0xd973fd8d" => Self::ZeroParameterRegistry,
            _ => return None,
        };
        Some(protocol)
    }

    #[must_use]
    pub fn is_no_change(self) -> bool {
        self == Self::NoChange
    }
}

/// Scans `message` for the first 4-byte hex selector and looks it up in the
/// dictionary.
#[must_use]
pub fn extract_protocol_error(message: &str) -> Option<ProtocolError> {
    let selector = SELECTOR_RE.find(message)?;
    ProtocolError::from_selector(selector.as_str())
}

/// An RPC error with the protocol revert recovered from it, if any.
///
/// Displays as the decoded revert signature when one was recognized, otherwise
/// as the original error text.
#[derive(Debug)]
pub struct BlockchainError {
    protocol: Option<ProtocolError>,
    message: String,
}

impl BlockchainError {
    #[must_use]
    pub fn new(report: &eyre::Report) -> Self {
        let message = report
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ");
        Self::from_message(message)
    }

    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let protocol = extract_protocol_error(&message);
        Self {
            protocol,
            message,
        }
    }

    #[must_use]
    pub fn protocol(&self) -> Option<ProtocolError> {
        self.protocol
    }

    #[must_use]
    pub fn is_no_change(&self) -> bool {
        self.protocol.is_some_and(ProtocolError::is_no_change)
    }
}

impl std::fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.protocol {
            Some(protocol) => protocol.fmt(f),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BlockchainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.protocol
            .as_ref()
            .map(|protocol| protocol as &(dyn std::error::Error + 'static))
    }
}
