pub mod fetch;
pub mod jobs;
pub mod mailboxes;
pub mod ops;
pub mod parse;
pub mod route;
pub mod simulate;
pub mod stitch;
pub mod sync;

mod error;

pub use error::{Error, Result};
pub use jobs::{JobOutcome, MailboxSyncPayload, OccurrencePayload, RoutingPayload};

use std::sync::Arc;

use uuid::Uuid;

use oss_blob::BlobStore;
use oss_config::Config;
use oss_provider::MailProvider;
use oss_storage::{crypto::CredentialCipher, db::Db};

/// The ingestion core: sync controller, occurrence pipeline, routing, and the
/// ops surface, all scoped by organization at every query.
pub struct OssService {
	pub cfg: Config,
	pub db: Db,
	pub blobs: Arc<dyn BlobStore>,
	pub provider: Arc<dyn MailProvider>,
	pub(crate) http: reqwest::Client,
	pub(crate) cipher: CredentialCipher,
}
impl OssService {
	pub fn new(
		cfg: Config,
		db: Db,
		blobs: Arc<dyn BlobStore>,
		provider: Arc<dyn MailProvider>,
	) -> Result<Self> {
		let key = oss_config::encryption_key(&cfg)
			.map_err(|err| Error::Config { message: err.to_string() })?;
		let http = reqwest::Client::builder()
			.timeout(std::time::Duration::from_millis(cfg.provider.timeout_ms))
			.build()
			.map_err(|err| Error::Config { message: err.to_string() })?;

		Ok(Self { cfg, db, blobs, provider, http, cipher: CredentialCipher::new(&key) })
	}
}

/// Correlation id attached to every log record of one job execution.
pub fn correlation_id(organization_id: Option<Uuid>, job_id: Uuid, attempt: i32) -> String {
	let org = organization_id
		.map(|org| org.simple().to_string())
		.unwrap_or_else(|| "global".to_string());

	format!("{org}:{}:{attempt}", job_id.simple())
}
