use std::{
	collections::HashMap,
	sync::RwLock,
	time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::{BlobStore, ContentHash, Error, Result, blob_key};

/// In-memory store for tests and local experiments.
#[derive(Default)]
pub struct MemoryBlobStore {
	objects: RwLock<HashMap<String, Bytes>>,
}
impl MemoryBlobStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.objects.read().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
	async fn put(&self, organization_id: Uuid, content: Bytes) -> Result<ContentHash> {
		let content_hash = ContentHash::of(&content);
		let key = blob_key(organization_id, &content_hash).to_string();

		self.objects.write().unwrap_or_else(|err| err.into_inner()).insert(key, content);

		Ok(content_hash)
	}

	async fn get(&self, organization_id: Uuid, content_hash: &ContentHash) -> Result<Bytes> {
		let key = blob_key(organization_id, content_hash).to_string();

		self.objects
			.read()
			.unwrap_or_else(|err| err.into_inner())
			.get(&key)
			.cloned()
			.ok_or(Error::NotFound(key))
	}

	async fn signed_url(
		&self,
		organization_id: Uuid,
		content_hash: &ContentHash,
		ttl: Duration,
	) -> Result<Option<String>> {
		let key = blob_key(organization_id, content_hash);

		Ok(Some(format!("memory://{key}?expires={}", ttl.as_secs())))
	}
}
