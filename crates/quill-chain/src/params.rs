//! Canonical packing of governance parameter values into registry words.
//!
//! Values are right-aligned big-endian inside the 32-byte word. Decoding is
//! strict: any non-zero byte outside the value's width means the word was not
//! written for that type and is rejected.

use ethers::types::{
    Address,
    U256,
};

const WORD_SIZE: usize = 32;
const UINT96_SIZE: usize = 12;
const ADDRESS_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint96,
    Bool,
    Address,
}

impl ParamKind {
    fn width(self) -> usize {
        match self {
            Self::Bool | Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 => 4,
            Self::Uint64 => 8,
            Self::Uint96 => UINT96_SIZE,
            Self::Address => ADDRESS_SIZE,
        }
    }
}

/// A typed governance parameter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamValue {
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint96(U256),
    Bool(bool),
    Address(Address),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParamCodecError {
    #[error("uint96 value does not fit in {UINT96_SIZE} bytes")]
    Uint96OutOfRange,
    #[error("word carries non-zero bytes outside the {kind:?} value range")]
    NonCanonicalPadding { kind: ParamKind },
    #[error("bool word has a final byte greater than one")]
    InvalidBool,
}

impl ParamValue {
    #[must_use]
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Uint8(_) => ParamKind::Uint8,
            Self::Uint16(_) => ParamKind::Uint16,
            Self::Uint32(_) => ParamKind::Uint32,
            Self::Uint64(_) => ParamKind::Uint64,
            Self::Uint96(_) => ParamKind::Uint96,
            Self::Bool(_) => ParamKind::Bool,
            Self::Address(_) => ParamKind::Address,
        }
    }

    /// Packs the value into a right-aligned big-endian registry word.
    ///
    /// # Errors
    /// Fails only for `Uint96` values wider than 12 bytes.
    pub fn pack(&self) -> Result<[u8; WORD_SIZE], ParamCodecError> {
        let mut word = [0u8; WORD_SIZE];
        match self {
            Self::Uint8(value) => word[WORD_SIZE - 1] = *value,
            Self::Uint16(value) => word[WORD_SIZE - 2..].copy_from_slice(&value.to_be_bytes()),
            Self::Uint32(value) => word[WORD_SIZE - 4..].copy_from_slice(&value.to_be_bytes()),
            Self::Uint64(value) => word[WORD_SIZE - 8..].copy_from_slice(&value.to_be_bytes()),
            Self::Uint96(value) => {
                if value.bits() > UINT96_SIZE * 8 {
                    return Err(ParamCodecError::Uint96OutOfRange);
                }
                value.to_big_endian(&mut word);
            }
            Self::Bool(value) => word[WORD_SIZE - 1] = u8::from(*value),
            Self::Address(value) => {
                word[WORD_SIZE - ADDRESS_SIZE..].copy_from_slice(value.as_bytes());
            }
        }
        Ok(word)
    }

    /// Unpacks a registry word as a value of the given kind.
    ///
    /// # Errors
    /// Fails if the word carries non-zero padding outside the kind's width, or
    /// if a bool word holds a byte greater than one.
    pub fn unpack(kind: ParamKind, word: [u8; WORD_SIZE]) -> Result<Self, ParamCodecError> {
        let width = kind.width();
        if word[..WORD_SIZE - width].iter().any(|&byte| byte != 0) {
            return Err(ParamCodecError::NonCanonicalPadding {
                kind,
            });
        }
        let value = match kind {
            ParamKind::Uint8 => Self::Uint8(word[WORD_SIZE - 1]),
            ParamKind::Uint16 => {
                let mut bytes = [0u8; 2];
                bytes.copy_from_slice(&word[WORD_SIZE - 2..]);
                Self::Uint16(u16::from_be_bytes(bytes))
            }
            ParamKind::Uint32 => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&word[WORD_SIZE - 4..]);
                Self::Uint32(u32::from_be_bytes(bytes))
            }
            ParamKind::Uint64 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&word[WORD_SIZE - 8..]);
                Self::Uint64(u64::from_be_bytes(bytes))
            }
            ParamKind::Uint96 => Self::Uint96(U256::from_big_endian(&word)),
            ParamKind::Bool => match word[WORD_SIZE - 1] {
                0 => Self::Bool(false),
                1 => Self::Bool(true),
                _ => return Err(ParamCodecError::InvalidBool),
            },
            ParamKind::Address => Self::Address(Address::from_slice(&word[WORD_SIZE - ADDRESS_SIZE..])),
        };
        Ok(value)
    }
}
