use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub provider: Provider,
	pub security: Security,
	pub worker: Worker,
	pub sync: Sync,
	pub ingest: Ingest,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub blob: Blob,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Blob {
	pub backend: String,
	/// Filesystem backend only.
	pub root_dir: Option<String>,
	/// S3-compatible backend only.
	pub endpoint: Option<String>,
	pub region: Option<String>,
	pub bucket: Option<String>,
	pub access_key_id: Option<String>,
	pub secret_access_key: Option<String>,
	#[serde(default)]
	pub allow_http: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Provider {
	pub api_base: String,
	pub token_endpoint: String,
	pub client_id: String,
	pub client_secret: String,
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Security {
	/// 32 bytes of base64; AES-256-GCM key for mailbox refresh credentials.
	pub encryption_key_base64: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub reaper_interval_seconds: u64,
	pub shutdown_grace_seconds: u64,
	pub concurrency: JobTypeValues,
	pub visibility_seconds: JobTypeValues,
	pub backoff: Backoff,
}

/// One value per job family: sync covers backfill and history jobs.
#[derive(Clone, Debug, Deserialize)]
pub struct JobTypeValues {
	pub sync: u32,
	pub fetch: u32,
	pub parse: u32,
	pub stitch: u32,
	pub route: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Backoff {
	pub base_seconds: u64,
	pub cap_seconds: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Sync {
	pub cadence_seconds: u64,
	pub circuit_breaker_threshold: u32,
	pub pause_minutes: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Ingest {
	pub parser_version: i32,
	pub sanitizer_revision: String,
	pub snippet_max_chars: usize,
	pub subject_match_window_days: i64,
}
