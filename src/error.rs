use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server rejected control channel ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error(
        "Control channel closed by server: {}",
        .0.as_deref().unwrap_or("no reason given")
    )]
    StreamClosed(Option<String>),

    #[error("Failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Map a failed WebSocket handshake, keeping the response body of a
    /// refused upgrade so its text can be inspected by the caller.
    pub fn from_handshake(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => {
                let body = response.body().as_deref().unwrap_or_default();
                ClientError::Rejected {
                    status: response.status().as_u16(),
                    body: String::from_utf8_lossy(body).into_owned(),
                }
            }
            other => ClientError::WebSocket(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
