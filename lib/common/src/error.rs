use std::io;

/// Error taxonomy shared across the control-plane substrate.
///
/// `Wait` is not a failure: it means "not enough data/resources yet, try
/// again later" and is handled the same way throughout conmgr, the wire
/// codec and the auth providers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("would block, need more data")]
    Wait,

    #[error("protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error("authentication invalid: {0}")]
    AuthInvalid(String),

    #[error("auth provider declined to handle credential")]
    AuthSkip,

    #[error("operation already done")]
    AlreadyDone,

    #[error("no such object: {0}")]
    InvalidObjectId(String),

    #[error("object transition pending, retry")]
    TransitionPending,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation disabled: {0}")]
    Disabled(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<io::ErrorKind> for Error {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::WouldBlock => Error::Wait,
            other => Error::Io(other.into()),
        }
    }
}

/// Mirrors the teacher's `NetworkResult` helper: distinguishes `Wait`
/// (not a failure) from every other error kind.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for Result<T> {
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(Error::Wait))
    }
}

impl Error {
    /// True for error kinds that require closing the owning connection.
    pub fn is_terminating(&self) -> bool {
        matches!(
            self,
            Error::ProtocolDecode(_)
                | Error::AuthInvalid(_)
                | Error::ResourceExhausted(_)
                | Error::Io(_)
                | Error::Fatal(_)
        )
    }

    /// Numeric response code sent back to a caller over the wire, for the
    /// RPC error kinds that are surfaced rather than closing the connection.
    pub fn rc(&self) -> u32 {
        match self {
            Error::AlreadyDone => 1,
            Error::InvalidObjectId(_) => 2,
            Error::TransitionPending => 3,
            Error::PermissionDenied(_) => 4,
            Error::Timeout => 5,
            Error::Disabled(_) => 6,
            Error::ResourceExhausted(_) => 7,
            Error::AuthInvalid(_) => 8,
            _ => u32::MAX,
        }
    }
}
