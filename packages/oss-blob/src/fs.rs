use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, local::LocalFileSystem};
use uuid::Uuid;

use crate::{BlobStore, ContentHash, Error, Result, blob_key};

pub struct FsBlobStore {
	store: LocalFileSystem,
}
impl FsBlobStore {
	pub fn new(root_dir: &str) -> Result<Self> {
		std::fs::create_dir_all(root_dir)
			.map_err(|err| Error::Config(format!("failed to create {root_dir}: {err}")))?;

		let store = LocalFileSystem::new_with_prefix(root_dir)?;

		Ok(Self { store })
	}
}

#[async_trait]
impl BlobStore for FsBlobStore {
	async fn put(&self, organization_id: Uuid, content: Bytes) -> Result<ContentHash> {
		let content_hash = ContentHash::of(&content);

		self.store.put(&blob_key(organization_id, &content_hash), content.into()).await?;

		Ok(content_hash)
	}

	async fn get(&self, organization_id: Uuid, content_hash: &ContentHash) -> Result<Bytes> {
		let key = blob_key(organization_id, content_hash);

		match self.store.get(&key).await {
			Ok(result) => Ok(result.bytes().await?),
			Err(object_store::Error::NotFound { .. }) => Err(Error::NotFound(key.to_string())),
			Err(err) => Err(err.into()),
		}
	}

	async fn signed_url(
		&self,
		_organization_id: Uuid,
		_content_hash: &ContentHash,
		_ttl: Duration,
	) -> Result<Option<String>> {
		// No presigning on a local filesystem; callers stream instead.
		Ok(None)
	}
}
