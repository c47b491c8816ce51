use thiserror::Error;

/// Failure of a single controller operation or remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A local precondition failed; no request was sent.
    #[error("{0}")]
    Validation(String),
    /// The server answered with a failure status. `message` is the envelope's
    /// explanation when the body carried one.
    #[error("{}", server_reason(.status, .message))]
    Server { status: u16, message: Option<String> },
    /// Connection, timeout, or an undecodable response body.
    #[error("{0}")]
    Transport(String),
}

fn server_reason(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) if !message.is_empty() => message.clone(),
        _ => format!("Request failed with status code {status}"),
    }
}

#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
