//! Transport failures reported by the messaging layer

use thiserror::Error;


/// Failure of a non-blocking operation, as reported by the messaging layer
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer in charge of the operation went away before completing it
    #[error("Peer dropped the operation before completing it")]
    ServerKilled,

    /// The transfer itself failed
    #[error("Transfer failed: {reason}")]
    Failed {
        /// What went wrong
        reason: String,
    },
}
