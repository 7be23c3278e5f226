//! Local development signer.
//!
//! Holds 32-byte secrets in memory and authenticates payloads with a keyed
//! Keccak-256 digest. Suitable for local simulation against in-memory chains;
//! production deployments plug a custody-backed `SignerInterface` instead.

use crate::{AccountError, SignerInterface};
use async_trait::async_trait;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use wallet_types::{Address, ChainId};

const SIGNATURE_LEN: usize = 32;

pub struct LocalSigner {
	keys: HashMap<Address, [u8; 32]>,
}

impl LocalSigner {
	pub fn new() -> Self {
		Self {
			keys: HashMap::new(),
		}
	}

	/// Adds a hex-encoded 32-byte secret (with or without `0x`) for `address`.
	pub fn with_key(mut self, address: Address, secret_hex: &str) -> Result<Self, AccountError> {
		let stripped = secret_hex.strip_prefix("0x").unwrap_or(secret_hex);
		let bytes =
			hex::decode(stripped).map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		let secret: [u8; 32] = bytes.try_into().map_err(|_| {
			AccountError::InvalidKey("secret must be 64 hex characters (32 bytes)".to_string())
		})?;

		self.keys.insert(address, secret);
		Ok(self)
	}

	fn digest(secret: &[u8; 32], chain: &ChainId, payload: &[u8]) -> [u8; SIGNATURE_LEN] {
		let mut hasher = Keccak256::new();
		hasher.update(secret);
		hasher.update(chain.as_str().as_bytes());
		hasher.update(payload);

		let mut digest = [0u8; SIGNATURE_LEN];
		digest.copy_from_slice(&hasher.finalize());
		digest
	}

	/// Checks a payload produced by [`sign`](SignerInterface::sign) and
	/// returns the unsigned bytes it wraps.
	pub fn verify<'a>(
		&self,
		chain: &ChainId,
		from: &Address,
		signed: &'a [u8],
	) -> Result<&'a [u8], AccountError> {
		let secret = self
			.keys
			.get(from)
			.ok_or_else(|| AccountError::UnknownAccount(from.clone()))?;
		if signed.len() < SIGNATURE_LEN {
			return Err(AccountError::SigningFailed("payload too short".to_string()));
		}

		let (payload, signature) = signed.split_at(signed.len() - SIGNATURE_LEN);
		if signature != Self::digest(secret, chain, payload).as_slice() {
			return Err(AccountError::SigningFailed("signature mismatch".to_string()));
		}
		Ok(payload)
	}
}

impl Default for LocalSigner {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl SignerInterface for LocalSigner {
	async fn sign(
		&self,
		chain: &ChainId,
		from: &Address,
		payload: &[u8],
	) -> Result<Vec<u8>, AccountError> {
		let secret = self
			.keys
			.get(from)
			.ok_or_else(|| AccountError::UnknownAccount(from.clone()))?;

		let mut signed = Vec::with_capacity(payload.len() + SIGNATURE_LEN);
		signed.extend_from_slice(payload);
		signed.extend_from_slice(&Self::digest(secret, chain, payload));
		Ok(signed)
	}
}
