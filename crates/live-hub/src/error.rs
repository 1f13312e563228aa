use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid listen address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}
