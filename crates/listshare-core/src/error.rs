use thiserror::Error;

/// How the session recovers from a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The list does not exist. Terminal for the session.
    NotFound,
    /// Recovered by a full re-fetch of authoritative state.
    TransientNetwork,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Status(_) | Self::Transport(_) | Self::Decode(_) => ErrorKind::TransientNetwork,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::NOT_FOUND {
                return Self::NotFound(
                    err.url().map(|url| url.path().to_string()).unwrap_or_default(),
                );
            }
            return Self::Status(status.as_u16());
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_lists_are_terminal() {
        assert_eq!(RemoteError::NotFound("/api/lists/x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(RemoteError::Status(500).kind(), ErrorKind::TransientNetwork);
        assert_eq!(
            RemoteError::Transport("connection refused".into()).kind(),
            ErrorKind::TransientNetwork
        );
        assert!(!RemoteError::Decode("eof".into()).is_not_found());
    }
}
