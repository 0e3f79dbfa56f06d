use aes_gcm::{
	Aes256Gcm, Key, Nonce,
	aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use uuid::Uuid;

use crate::{Error, Result};

const NONCE_LEN: usize = 12;

/// AES-256-GCM over mailbox refresh credentials; a random 96-bit nonce is
/// prepended to the ciphertext. The AAD binds the blob to its owner row so a
/// ciphertext copied across organizations fails to decrypt.
pub struct CredentialCipher {
	cipher: Aes256Gcm,
}
impl CredentialCipher {
	pub fn new(key: &[u8; 32]) -> Self {
		Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) }
	}

	pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
		let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
		let ciphertext = self
			.cipher
			.encrypt(&nonce, Payload { msg: plaintext, aad })
			.map_err(|_| Error::Crypto("Encryption failed.".to_string()))?;
		let mut out = nonce.to_vec();

		out.extend_from_slice(&ciphertext);

		Ok(out)
	}

	pub fn decrypt(&self, blob: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
		if blob.len() <= NONCE_LEN {
			return Err(Error::Crypto("Encrypted blob is too short.".to_string()));
		}

		let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

		self.cipher
			.decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
			.map_err(|_| Error::Crypto("Decryption failed.".to_string()))
	}
}

pub fn credential_aad(organization_id: Uuid, subject: &str) -> Vec<u8> {
	format!("mailbox_credentials:{organization_id}:google:{subject}").into_bytes()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cipher() -> CredentialCipher {
		CredentialCipher::new(&[7u8; 32])
	}

	#[test]
	fn roundtrips_with_matching_aad() {
		let org = Uuid::new_v4();
		let aad = credential_aad(org, "journal@example.com");
		let blob = cipher().encrypt(b"refresh-token", &aad).expect("Encrypt must succeed.");

		assert_eq!(
			cipher().decrypt(&blob, &aad).expect("Decrypt must succeed."),
			b"refresh-token"
		);
	}

	#[test]
	fn rejects_mismatched_aad() {
		let aad_a = credential_aad(Uuid::new_v4(), "a@example.com");
		let aad_b = credential_aad(Uuid::new_v4(), "a@example.com");
		let blob = cipher().encrypt(b"refresh-token", &aad_a).expect("Encrypt must succeed.");

		assert!(cipher().decrypt(&blob, &aad_b).is_err());
	}

	#[test]
	fn rejects_truncated_blobs() {
		assert!(cipher().decrypt(&[0u8; 12], b"aad").is_err());
	}

	#[test]
	fn nonces_differ_per_encryption() {
		let aad = credential_aad(Uuid::new_v4(), "a@example.com");
		let first = cipher().encrypt(b"x", &aad).expect("Encrypt must succeed.");
		let second = cipher().encrypt(b"x", &aad).expect("Encrypt must succeed.");

		assert_ne!(first, second);
	}
}
