mod types;

use std::{fs, path::Path};

use base64::Engine;
use color_eyre::eyre;

pub use types::{
	Backoff, Blob, Config, Ingest, JobTypeValues, Postgres, Provider, Security, Service, Storage,
	Sync, Worker,
};

pub fn load(path: &Path) -> color_eyre::Result<Config> {
	let raw = fs::read_to_string(path)?;

	let mut cfg: Config = toml::from_str(&raw)?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

fn normalize(cfg: &mut Config) {
	cfg.storage.blob.backend = cfg.storage.blob.backend.trim().to_lowercase();

	if cfg.storage.blob.root_dir.as_deref().map(|dir| dir.trim().is_empty()).unwrap_or(false) {
		cfg.storage.blob.root_dir = None;
	}
}

pub fn validate(cfg: &Config) -> color_eyre::Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(eyre::eyre!("service.http_bind must be non-empty."));
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(eyre::eyre!("service.admin_bind must be non-empty."));
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(eyre::eyre!("storage.postgres.dsn must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(eyre::eyre!("storage.postgres.pool_max_conns must be greater than zero."));
	}

	match cfg.storage.blob.backend.as_str() {
		"fs" =>
			if cfg.storage.blob.root_dir.is_none() {
				return Err(eyre::eyre!(
					"storage.blob.root_dir is required for the fs backend."
				));
			},
		"s3" => {
			for (label, value) in [
				("storage.blob.endpoint", &cfg.storage.blob.endpoint),
				("storage.blob.bucket", &cfg.storage.blob.bucket),
				("storage.blob.access_key_id", &cfg.storage.blob.access_key_id),
				("storage.blob.secret_access_key", &cfg.storage.blob.secret_access_key),
			] {
				if value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true) {
					return Err(eyre::eyre!("{label} is required for the s3 backend."));
				}
			}
		},
		other => return Err(eyre::eyre!("storage.blob.backend must be fs or s3, got {other:?}.")),
	}

	let key = base64::engine::general_purpose::STANDARD
		.decode(cfg.security.encryption_key_base64.trim())
		.map_err(|_| eyre::eyre!("security.encryption_key_base64 must be valid base64."))?;

	if key.len() != 32 {
		return Err(eyre::eyre!(
			"security.encryption_key_base64 must decode to 32 bytes (AES-256)."
		));
	}

	if cfg.provider.api_base.trim().is_empty() {
		return Err(eyre::eyre!("provider.api_base must be non-empty."));
	}
	if cfg.provider.token_endpoint.trim().is_empty() {
		return Err(eyre::eyre!("provider.token_endpoint must be non-empty."));
	}
	if cfg.provider.timeout_ms == 0 {
		return Err(eyre::eyre!("provider.timeout_ms must be greater than zero."));
	}

	for (label, value) in [
		("worker.concurrency.sync", cfg.worker.concurrency.sync),
		("worker.concurrency.fetch", cfg.worker.concurrency.fetch),
		("worker.concurrency.parse", cfg.worker.concurrency.parse),
		("worker.concurrency.stitch", cfg.worker.concurrency.stitch),
		("worker.concurrency.route", cfg.worker.concurrency.route),
		("worker.visibility_seconds.sync", cfg.worker.visibility_seconds.sync),
		("worker.visibility_seconds.fetch", cfg.worker.visibility_seconds.fetch),
		("worker.visibility_seconds.parse", cfg.worker.visibility_seconds.parse),
		("worker.visibility_seconds.stitch", cfg.worker.visibility_seconds.stitch),
		("worker.visibility_seconds.route", cfg.worker.visibility_seconds.route),
	] {
		if value == 0 {
			return Err(eyre::eyre!("{label} must be greater than zero."));
		}
	}

	if cfg.worker.poll_interval_ms == 0 {
		return Err(eyre::eyre!("worker.poll_interval_ms must be greater than zero."));
	}
	if cfg.worker.reaper_interval_seconds == 0 {
		return Err(eyre::eyre!("worker.reaper_interval_seconds must be greater than zero."));
	}
	if cfg.worker.backoff.base_seconds == 0 {
		return Err(eyre::eyre!("worker.backoff.base_seconds must be greater than zero."));
	}
	if cfg.worker.backoff.cap_seconds < cfg.worker.backoff.base_seconds {
		return Err(eyre::eyre!(
			"worker.backoff.cap_seconds must be at least worker.backoff.base_seconds."
		));
	}

	if cfg.sync.cadence_seconds == 0 {
		return Err(eyre::eyre!("sync.cadence_seconds must be greater than zero."));
	}
	if cfg.sync.circuit_breaker_threshold == 0 {
		return Err(eyre::eyre!("sync.circuit_breaker_threshold must be greater than zero."));
	}
	if cfg.sync.pause_minutes == 0 {
		return Err(eyre::eyre!("sync.pause_minutes must be greater than zero."));
	}

	if cfg.ingest.parser_version <= 0 {
		return Err(eyre::eyre!("ingest.parser_version must be greater than zero."));
	}
	if cfg.ingest.sanitizer_revision.trim().is_empty() {
		return Err(eyre::eyre!("ingest.sanitizer_revision must be non-empty."));
	}
	if cfg.ingest.snippet_max_chars == 0 {
		return Err(eyre::eyre!("ingest.snippet_max_chars must be greater than zero."));
	}
	if cfg.ingest.subject_match_window_days <= 0 {
		return Err(eyre::eyre!("ingest.subject_match_window_days must be greater than zero."));
	}

	Ok(())
}

/// The decoded AES-256 key. `validate` has already checked shape; this is for
/// callers that hold a validated config.
pub fn encryption_key(cfg: &Config) -> color_eyre::Result<[u8; 32]> {
	let raw = base64::engine::general_purpose::STANDARD
		.decode(cfg.security.encryption_key_base64.trim())
		.map_err(|_| eyre::eyre!("security.encryption_key_base64 must be valid base64."))?;

	raw.try_into()
		.map_err(|_| eyre::eyre!("security.encryption_key_base64 must decode to 32 bytes."))
}
