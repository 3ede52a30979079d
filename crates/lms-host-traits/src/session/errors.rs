use std::fmt;

/// The list of error codes a model-serving session can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// The model is not loaded, or is not visible in the requested namespace.
    ModelNotFound,
    /// Caller passed an identifier the host cannot resolve.
    InvalidModelName,
    /// The host could not be reached or the session is already closed.
    ConnectionFailed,
    /// The request timed out.
    Timeout,
    /// The host answered with an unexpected failure.
    RuntimeError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let description = match self {
            ErrorCode::ModelNotFound => "ModelNotFound",
            ErrorCode::InvalidModelName => "InvalidModelName",
            ErrorCode::ConnectionFailed => "ConnectionFailed",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::RuntimeError => "RuntimeError",
        };
        write!(f, "{}", description)
    }
}

/// Host side error.
#[derive(Debug)]
pub struct Error {
    pub code: ErrorCode,
    pub data: anyhow::Error,
}

impl Error {
    pub fn new(code: ErrorCode, data: impl Into<anyhow::Error>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }

    pub fn msg(code: ErrorCode, message: impl fmt::Display) -> Self {
        Self {
            code,
            data: anyhow::anyhow!("{}", message),
        }
    }

    pub fn is_model_not_found(&self) -> bool {
        self.code == ErrorCode::ModelNotFound
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.data)
    }
}

impl std::error::Error for Error {}
