use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("detector failure: {0}")]
    Detector(String),

    #[error("metadata extraction error: {0}")]
    Metadata(String),

    #[error("text recognition error: {0}")]
    Recognition(String),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
