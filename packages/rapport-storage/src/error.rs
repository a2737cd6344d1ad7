#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Settings(#[from] rapport_config::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
}
impl Error {
	/// True when the statement lost a race against a unique index.
	pub fn is_unique_violation(&self) -> bool {
		match self {
			Self::Sqlx(sqlx::Error::Database(err)) => err.is_unique_violation(),
			_ => false,
		}
	}
}
