//! Interface to the messaging layer's non-blocking primitive
//!
//! The messaging layer is in charge of issuing sends and receives, moving the
//! data around, and reporting completion. All that a [`Request`] needs from it
//! is an opaque token for the in-flight operation, a way to block until that
//! operation completes, and a way to poll it without blocking.
//!
//! [`Request`]: crate::request::Request

use std::error::Error;


/// Native non-blocking operation token
///
/// Cloning a token must be cheap and inert: the clone refers to the same
/// in-flight operation, it does not start another one.
///
pub trait NativeRequest: Clone {
    /// Completion status handed out by the messaging layer
    type Status;

    /// Transport failure reported by the messaging layer
    type Error: Error;

    /// Token which does not refer to any operation. Waiting on it completes
    /// immediately.
    fn null() -> Self;

    /// Block until the operation completes
    fn wait(&mut self) -> Result<Self::Status, Self::Error>;

    /// Check whether the operation has completed, without blocking
    fn test(&mut self) -> Result<Option<Self::Status>, Self::Error>;
}
