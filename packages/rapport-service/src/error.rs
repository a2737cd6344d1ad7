pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Malformed model reply: {message}")]
	MalformedReply { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<rapport_storage::Error> for Error {
	fn from(err: rapport_storage::Error) -> Self {
		match err {
			rapport_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			rapport_storage::Error::Settings(inner) =>
				Self::InvalidRequest { message: inner.to_string() },
			rapport_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			rapport_storage::Error::NotFound(message) => Self::NotFound { message },
			rapport_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}

impl From<rapport_providers::Error> for Error {
	fn from(err: rapport_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<rapport_config::Error> for Error {
	fn from(err: rapport_config::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
