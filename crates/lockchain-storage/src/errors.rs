#[derive(thiserror::Error, Debug)]
pub enum StorageError {
	#[error("key not found")]
	NotFound,
	#[error("database error: {0}")]
	Database(#[from] sled::Error),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}
