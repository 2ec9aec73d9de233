//! Building, signing and validating data items.

use crate::error::{SignerError, SignerResult};
use crate::signer::{Signer, VerifierRegistry};
use bundler_core::hash::Digest;
use bundler_core::{DataItem, DataItemOptions, ItemId};

/// Build an unsigned envelope owned by `signer`.
pub fn create_data(
    data: &[u8],
    signer: &dyn Signer,
    opts: &DataItemOptions,
) -> SignerResult<DataItem> {
    Ok(DataItem::build(
        signer.signature_type(),
        signer.public_key(),
        data,
        opts,
    )?)
}

/// Sign a precomputed envelope digest, checking the signature length.
pub fn sign_digest(signer: &dyn Signer, digest: &Digest) -> SignerResult<Vec<u8>> {
    let signature = signer.sign(digest.as_bytes())?;
    let expected = signer.signature_type().signature_length();
    if signature.len() != expected {
        return Err(SignerError::InvalidSignature(format!(
            "signer produced {} bytes, {} requires {expected}",
            signature.len(),
            signer.signature_type()
        )));
    }
    Ok(signature)
}

/// Sign `item` in place and return its signature and ID.
pub async fn sign_item(
    item: &mut DataItem,
    signer: &dyn Signer,
) -> SignerResult<(Vec<u8>, ItemId)> {
    if item.signature_type() != signer.signature_type() || item.owner() != signer.public_key() {
        return Err(SignerError::Signing(
            "data item owner does not match signer".to_string(),
        ));
    }
    let digest = item.signature_digest().await?;
    let signature = sign_digest(signer, &digest)?;
    item.set_signature(&signature)?;
    Ok((signature, item.id()))
}

/// Build and sign an envelope in one step.
pub async fn create_signed(
    data: &[u8],
    signer: &dyn Signer,
    opts: &DataItemOptions,
) -> SignerResult<DataItem> {
    let mut item = create_data(data, signer, opts)?;
    sign_item(&mut item, signer).await?;
    Ok(item)
}

/// Whether the envelope's signature verifies against its own digest.
///
/// Envelopes whose signature type has no registered verifier are an error,
/// not `false`.
pub async fn verify_item(item: &DataItem, registry: &VerifierRegistry) -> SignerResult<bool> {
    let verifier = registry.get(item.signature_type().code())?;
    if !item.is_signed() {
        return Ok(false);
    }
    let digest = item.signature_digest().await?;
    verifier.verify(item.owner(), digest.as_bytes(), item.signature())
}
