use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::{
	ObjectStore,
	aws::{AmazonS3, AmazonS3Builder},
	signer::Signer,
};
use uuid::Uuid;

use crate::{BlobStore, ContentHash, Error, Result, blob_key};

pub struct S3BlobStore {
	store: AmazonS3,
}
impl S3BlobStore {
	pub fn new(cfg: &oss_config::Blob) -> Result<Self> {
		let required = |label: &str, value: Option<&str>| {
			value
				.map(str::trim)
				.filter(|v| !v.is_empty())
				.map(str::to_string)
				.ok_or_else(|| Error::Config(format!("s3 backend requires {label}")))
		};
		let mut builder = AmazonS3Builder::new()
			.with_endpoint(required("endpoint", cfg.endpoint.as_deref())?)
			.with_bucket_name(required("bucket", cfg.bucket.as_deref())?)
			.with_access_key_id(required("access_key_id", cfg.access_key_id.as_deref())?)
			.with_secret_access_key(required(
				"secret_access_key",
				cfg.secret_access_key.as_deref(),
			)?)
			.with_region(cfg.region.clone().unwrap_or_else(|| "us-east-1".to_string()));

		if cfg.allow_http {
			builder = builder.with_allow_http(true);
		}

		Ok(Self { store: builder.build()? })
	}
}

#[async_trait]
impl BlobStore for S3BlobStore {
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
		organization_id: Uuid,
		content_hash: &ContentHash,
		ttl: Duration,
	) -> Result<Option<String>> {
		let url =
			self.store.signed_url(Method::GET, &blob_key(organization_id, content_hash), ttl).await?;

		Ok(Some(url.to_string()))
	}
}
