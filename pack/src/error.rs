use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pack manifest not found at {0}")]
    ManifestNotFound(std::path::PathBuf),

    #[error("unknown phase: {0}")]
    UnknownPhase(String),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("unknown template: {0}")]
    UnknownTemplate(String),
}

pub type Result<T> = std::result::Result<T, PackError>;
