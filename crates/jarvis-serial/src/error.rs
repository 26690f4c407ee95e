use thiserror::Error;

/// Endpoint failures. All of them end the bridge loop that hit them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PTY setup failed: {0}")]
    Pty(#[from] nix::Error),

    #[error("Transport closed by peer")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
