use thiserror::Error;

/// Failure of a call to the backend or the realtime channel.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network unreachable, timeout, or a body that could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx HTTP status.
    #[error("server responded with status {0}")]
    Status(reqwest::StatusCode),

    /// The server answered but reported an error (e.g. a GraphQL error).
    #[error("{0}")]
    Server(String),

    /// The server answered with a payload that does not fit the graph model.
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("realtime channel error: {0}")]
    Channel(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("realtime channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
