//! Esplora client errors.

use satchel_wallet::WalletError;
use thiserror::Error;

/// Errors raised while talking to an Esplora indexer.
#[derive(Error, Debug)]
pub enum EsploraError {
    /// Transport failure: connect, timeout, TLS.
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status on a read endpoint.
    #[error("{path}: status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("decode: {0}")]
    Decode(String),

    /// The indexer refused a broadcast.
    #[error("{0}")]
    Rejected(String),
}

impl From<EsploraError> for WalletError {
    fn from(e: EsploraError) -> Self {
        match e {
            EsploraError::Rejected(reason) => WalletError::BroadcastRejected(reason),
            other => WalletError::NetworkError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_maps_to_broadcast_rejected() {
        let e: WalletError = EsploraError::Rejected("dust".into()).into();
        assert_eq!(e, WalletError::BroadcastRejected("dust".into()));
    }

    #[test]
    fn status_maps_to_network_error() {
        let e: WalletError = EsploraError::Status {
            path: "/address/x".into(),
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert_eq!(
            e,
            WalletError::NetworkError("/address/x: status 502: bad gateway".into())
        );
    }
}
