use scanport_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The pool has been closed; no further connections will be handed out.
    #[error("connection pool closed")]
    ClosedPool,

    /// No pool exists for the requested endpoint.
    #[error("no connection pool")]
    NoPool,

    /// The acquisition budget elapsed before a connection became available.
    #[error("connection pool acquire timed out")]
    PoolTimeout,

    /// The peer sent a frame of an unexpected type or out of order.
    #[error("protocol error: unexpected frame")]
    Protocol,

    /// Transport failure, including per-frame deadline expiry
    /// (`ErrorKind::TimedOut`) and end-of-input (`ErrorKind::UnexpectedEof`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encode/decode failure
    #[error("Wire error: {0}")]
    Wire(ProtocolError),

    /// The dialer could not produce a connection.
    #[error("dial error: {0}")]
    Dial(String),

    /// Failure reported by the server inside a response payload.
    #[error("server error: {0}")]
    Server(String),
}

// Transport failures inside the codec surface uniformly as `Error::Io`, so
// callers have a single place to test for deadline expiry and end-of-input.
impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(io) => Error::Io(io),
            other => Error::Wire(other),
        }
    }
}

impl Error {
    /// True when the error is the peer closing its end of the stream.
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_io_errors_surface_as_io() {
        let inner = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "early eof");
        let err: Error = ProtocolError::Io(inner).into();
        assert!(err.is_end_of_input());

        let err: Error = ProtocolError::Deserialization("bad".into()).into();
        assert!(matches!(err, Error::Wire(_)));
        assert!(!err.is_end_of_input());
    }
}
