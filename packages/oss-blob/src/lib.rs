pub mod fs;
pub mod memory;
pub mod s3;

mod error;

pub use error::{Error, Result};

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lowercase hex SHA-256 of a payload; the blob identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentHash(String);
impl ContentHash {
	pub fn of(data: &[u8]) -> Self {
		let digest = Sha256::digest(data);
		let mut hex = String::with_capacity(64);

		for byte in digest {
			hex.push_str(&format!("{byte:02x}"));
		}

		Self(hex)
	}

	pub fn from_hex(hex: &str) -> Result<Self> {
		let hex = hex.trim();

		if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
		{
			return Err(Error::InvalidHash(hex.to_string()));
		}

		Ok(Self(hex.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl fmt::Display for ContentHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Blob keys are `oss/<org_id>/<content_hash>`; content addressing makes
/// every put idempotent.
pub fn blob_key(organization_id: Uuid, content_hash: &ContentHash) -> Path {
	Path::from(format!("oss/{organization_id}/{content_hash}"))
}

#[async_trait]
pub trait BlobStore
where
	Self: Send + Sync,
{
	async fn put(&self, organization_id: Uuid, content: Bytes) -> Result<ContentHash>;

	async fn get(&self, organization_id: Uuid, content_hash: &ContentHash) -> Result<Bytes>;

	/// A short-lived direct URL when the backend supports presigning,
	/// `None` otherwise (callers stream through an authorized endpoint).
	async fn signed_url(
		&self,
		organization_id: Uuid,
		content_hash: &ContentHash,
		ttl: Duration,
	) -> Result<Option<String>>;
}

pub fn build_blob_store(cfg: &oss_config::Blob) -> Result<Arc<dyn BlobStore>> {
	match cfg.backend.as_str() {
		"fs" => {
			let root = cfg
				.root_dir
				.as_deref()
				.ok_or_else(|| Error::Config("fs backend requires root_dir".to_string()))?;

			Ok(Arc::new(fs::FsBlobStore::new(root)?))
		},
		"s3" => Ok(Arc::new(s3::S3BlobStore::new(cfg)?)),
		other => Err(Error::Config(format!("unknown blob backend {other:?}"))),
	}
}
