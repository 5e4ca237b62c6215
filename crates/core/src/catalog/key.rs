//! Content key derivation.
//!
//! Every entity is keyed by the BitTorrent info hash of its descriptor,
//! normalized to 40 lowercase hex characters. Magnet links may carry the hash
//! either as hex or as base32, and links copied out of HTML pages often use
//! `&amp;` as the parameter separator.

use std::str::FromStr;

use librqbit_core::magnet::Magnet;
use librqbit_core::Id20;
use sha2::{Digest, Sha256};

use super::CatalogError;

const MAGNET_SCHEME: &str = "magnet:";

/// Derive the content key from an acquisition descriptor.
///
/// Accepts a magnet URI (`magnet:?xt=urn:btih:<hash>&...`) or a bare info hash.
pub fn derive_key(descriptor: &str) -> Result<String, CatalogError> {
    let descriptor = descriptor.trim();
    if descriptor.is_empty() {
        return Err(CatalogError::InvalidDescriptor(
            "descriptor is empty".to_string(),
        ));
    }

    let is_magnet = descriptor
        .get(..MAGNET_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(MAGNET_SCHEME));

    let id = if is_magnet {
        let magnet = Magnet::parse(&descriptor.replace("&amp;", "&")).map_err(|e| {
            CatalogError::InvalidDescriptor(format!("{}: {:#}", descriptor, e))
        })?;
        magnet.as_id20().ok_or_else(|| {
            CatalogError::InvalidDescriptor(format!("no v1 info hash in magnet: {}", descriptor))
        })?
    } else {
        // Base32 hashes are decoded with the upper-case alphabet
        let hash = if descriptor.len() == 32 {
            descriptor.to_ascii_uppercase()
        } else {
            descriptor.to_string()
        };
        Id20::from_str(&hash).map_err(|e| {
            CatalogError::InvalidDescriptor(format!("malformed info hash {}: {:#}", descriptor, e))
        })?
    };

    Ok(id.as_string())
}

/// Key for an entry discovered on disk without a descriptor.
///
/// Derived from the entry's file name so repeated scans yield the same key.
pub fn local_key(file_name: &str) -> String {
    let digest = Sha256::digest(file_name.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..40].to_string()
}
