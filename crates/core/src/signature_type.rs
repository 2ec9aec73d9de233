//! Signature type codes and their fixed field lengths.
//!
//! The numeric codes are part of the wire format and must never change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A signature scheme known to the node, identified by its wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum SignatureType {
    Arweave,
    Ed25519,
    Ethereum,
    Solana,
    InjectedAptos,
    MultiAptos,
    TypedEthereum,
}

impl SignatureType {
    /// All known signature types.
    pub const ALL: [SignatureType; 7] = [
        Self::Arweave,
        Self::Ed25519,
        Self::Ethereum,
        Self::Solana,
        Self::InjectedAptos,
        Self::MultiAptos,
        Self::TypedEthereum,
    ];

    /// Look up a signature type by its wire code.
    pub fn from_code(code: u16) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(crate::Error::UnknownSignatureType(code))
    }

    /// The wire code.
    pub fn code(self) -> u16 {
        match self {
            Self::Arweave => 1,
            Self::Ed25519 => 2,
            Self::Ethereum => 3,
            Self::Solana => 4,
            Self::InjectedAptos => 5,
            Self::MultiAptos => 6,
            Self::TypedEthereum => 7,
        }
    }

    /// Length of the signature field in bytes.
    pub fn signature_length(self) -> usize {
        match self {
            Self::Arweave => 512,
            Self::Ed25519 | Self::Solana | Self::InjectedAptos => 64,
            Self::Ethereum | Self::TypedEthereum => 65,
            Self::MultiAptos => 64 * 32 + 4,
        }
    }

    /// Length of the owner (public key) field in bytes.
    pub fn owner_length(self) -> usize {
        match self {
            Self::Arweave => 512,
            Self::Ed25519 | Self::Solana | Self::InjectedAptos => 32,
            Self::Ethereum => 65,
            Self::TypedEthereum => 42,
            Self::MultiAptos => 32 * 32 + 1,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Arweave => "arweave",
            Self::Ed25519 => "ed25519",
            Self::Ethereum => "ethereum",
            Self::Solana => "solana",
            Self::InjectedAptos => "injectedAptos",
            Self::MultiAptos => "multiAptos",
            Self::TypedEthereum => "typedEthereum",
        }
    }
}

impl TryFrom<u16> for SignatureType {
    type Error = crate::Error;

    fn try_from(code: u16) -> crate::Result<Self> {
        Self::from_code(code)
    }
}

impl From<SignatureType> for u16 {
    fn from(value: SignatureType) -> Self {
        value.code()
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
