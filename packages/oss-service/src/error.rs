pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid job payload: {message}")]
	InvalidPayload { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Malformed MIME: {message}")]
	MalformedMime { message: String },
	#[error("Configuration: {message}")]
	Config { message: String },
	#[error(transparent)]
	Provider(#[from] oss_provider::Error),
	#[error("Blob store: {0}")]
	Blob(#[from] oss_blob::Error),
	#[error("Storage: {message}")]
	Storage { message: String },
}
impl Error {
	/// Permanent errors go straight to the DLQ; retrying cannot fix them.
	pub fn is_permanent(&self) -> bool {
		matches!(
			self,
			Self::InvalidRequest { .. }
				| Self::InvalidPayload { .. }
				| Self::MalformedMime { .. }
				| Self::Config { .. }
		)
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<oss_storage::Error> for Error {
	fn from(err: oss_storage::Error) -> Self {
		match err {
			oss_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			oss_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			oss_storage::Error::NotFound(message) => Self::NotFound { message },
			oss_storage::Error::Conflict(message) => Self::Conflict { message },
			oss_storage::Error::Crypto(message) => Self::Storage { message },
		}
	}
}

impl From<oss_mail::Error> for Error {
	fn from(err: oss_mail::Error) -> Self {
		Self::MalformedMime { message: err.to_string() }
	}
}
