use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("buffer ended unexpectedly: needed {needed} more bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },
}

pub type BinaryResult<T> = std::result::Result<T, BinaryError>;
