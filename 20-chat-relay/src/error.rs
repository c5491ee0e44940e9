use std::{io, net::SocketAddr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection")]
    Accept(#[source] io::Error),

    #[error("connection i/o failed")]
    Io(#[from] io::Error),

    #[error("no valid name after {attempts} attempts")]
    NameAttemptsExhausted { attempts: u32 },
}

pub type RelayResult<T> = Result<T, RelayError>;
