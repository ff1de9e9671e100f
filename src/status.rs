//! Facilities to represent the outcome of non-blocking operations
//!
//! A non-blocking send or receive starts in a pending state, and ends up
//! either successfully completed (in which case the messaging layer hands out
//! a completion status describing what was transferred) or failed. Once an
//! operation has reached one of these final states, it won't change anymore.

use crate::error::TransportError;


/// Completion status of a non-blocking operation
///
/// This record is only meaningful for an operation which has completed. Its
/// fields are filled by the messaging layer and carried through unchanged.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// Rank of the peer which sent the data
    pub source: usize,

    /// Tag of the message
    pub tag: i32,

    /// Amount of data which was transferred, in bytes
    pub size: usize,
}
//
impl Status {
    /// Create a new completion status
    pub fn new(source: usize, tag: i32, size: usize) -> Self {
        Status { source, tag, size }
    }

    /// Status reported by operations which never transferred anything, such
    /// as null requests
    pub fn empty() -> Self {
        Status::default()
    }
}


/// Lifecycle of a native non-blocking operation
///
/// Here are the possible state transitions:
///
/// - Pending -> Done / Failed
///
#[derive(Clone, Debug, PartialEq)]
pub enum OpState {
    /// The operation has been issued, but has not completed yet
    Pending,

    /// The operation has completed successfully
    Done(Status),

    /// The messaging layer failed to carry out the operation
    Failed(TransportError),
}


/// Check if an operation state is final (i.e. won't change anymore)
pub fn is_final(s: &OpState) -> bool {
    match *s {
        OpState::Pending => false,
        OpState::Done(_) | OpState::Failed(_) => true,
    }
}
