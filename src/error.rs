//! Error handling
//!
//! Communication failures are rare and non-recoverable at this layer: they
//! are propagated to the caller without retries, and the caller decides
//! whether to retry at a higher level. Precondition violations (using an
//! uninitialized transport runtime, describing an empty list) are programming
//! errors and fail fast via panics instead.

use thiserror::Error;

use crate::topology::Rank;
use crate::transport::TransportError;

/// Errors reported by endpoint and request operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A transport primitive reported failure for a send, receive or
    /// receive-post operation.
    #[error("rank {local}: communication with rank {peer} failed: {reason}")]
    Comm {
        /// Rank of the process the failure occurred on.
        local: Rank,
        /// Rank of the communication peer.
        peer: Rank,
        /// The transport's native diagnostic text.
        reason: String,
    },
    /// The status of a request was queried before the operation completed.
    #[error("operation has not completed")]
    NotComplete,
}

impl Error {
    pub(crate) fn comm(local: Rank, peer: Rank, source: TransportError) -> Error {
        Error::Comm {
            local,
            peer,
            reason: source.to_string(),
        }
    }
}
