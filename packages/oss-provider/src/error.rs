pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Not retryable in place; deterministically triggers backfill recovery.
	#[error("Invalid history cursor.")]
	InvalidCursor,
	#[error("Provider authentication failed: {0}")]
	Auth(String),
	#[error("Transient provider error: {0}")]
	Transient(String),
	#[error("Provider response decode failed: {0}")]
	Decode(String),
}
impl Error {
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_))
	}
}
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		match err.status() {
			Some(status) if status.as_u16() == 401 || status.as_u16() == 403 =>
				Self::Auth(err.to_string()),
			_ => Self::Transient(err.to_string()),
		}
	}
}
