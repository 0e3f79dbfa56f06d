pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Blob not found: {0}")]
	NotFound(String),
	#[error("Invalid content hash: {0}")]
	InvalidHash(String),
	#[error("Blob store configuration: {0}")]
	Config(String),
	#[error(transparent)]
	ObjectStore(#[from] object_store::Error),
}
