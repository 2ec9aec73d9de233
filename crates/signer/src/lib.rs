//! Data item signing and verification.
//!
//! This crate provides:
//! - `Signer` / `Verifier` capabilities keyed by signature type code
//! - Ed25519 keys, signer and verifier
//! - Envelope creation, in-place signing and validation

pub mod error;
pub mod item;
pub mod key;
pub mod signer;

pub use error::{SignerError, SignerResult};
pub use item::{create_data, create_signed, sign_digest, sign_item, verify_item};
pub use key::{KeyPair, PublicKey, SecretKey};
pub use signer::{Ed25519Signer, Ed25519Verifier, Signer, Verifier, VerifierRegistry};
