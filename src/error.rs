use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Wrong resource type: {}", .0.display())]
    WrongResourceType(PathBuf),

    #[error("Destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Cannot move across volumes: {} -> {}", .source_path.display(), .destination.display())]
    CrossDevice {
        source_path: PathBuf,
        destination: PathBuf,
    },

    #[error("Path error: {0}")]
    Path(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LocalStoreError>;
