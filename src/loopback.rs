//! In-process messaging layer
//!
//! This module provides a native non-blocking operation whose completion is
//! signaled by another thread of the same OS process. It is the simplest
//! messaging layer which a [`Request`] can supervise, and is handy for
//! testing code which issues non-blocking operations without a real network.
//!
//! An operation is made of two halves: the server, which is handed to
//! whichever thread carries out the transfer and reports its outcome, and the
//! native request, which the issuing side waits on or polls. If the server is
//! dropped before reporting an outcome, the operation fails instead of
//! leaving its waiters hanging.
//!
//! [`Request`]: crate::request::Request

use crate::error::TransportError;
use crate::native::NativeRequest;
use crate::status::{self, OpState, Status};
use log::warn;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};


/// In-process non-blocking operation
pub struct LoopbackOp {
    /// Server interface used to report the outcome of the operation
    server: LoopbackServer,

    /// Native request used to synchronize with the operation
    request: LoopbackRequest,
}
//
impl LoopbackOp {
    /// Issue a new operation, initially pending
    pub fn new() -> Self {
        // Start by building the shared state...
        let shared = Arc::new(
            SharedState {
                state_lock: Mutex::new(OpState::Pending),
                update_cv: Condvar::new(),
            }
        );

        // ...then build the server and the request
        LoopbackOp {
            server: LoopbackServer {
                shared: shared.clone(),
                reached_final_state: false,
            },
            request: LoopbackRequest { shared: Some(shared) },
        }
    }

    /// Split the operation into the server, which can be sent to the thread
    /// doing the transfer, and the native request
    pub fn split(self) -> (LoopbackServer, LoopbackRequest) {
        (self.server, self.request)
    }
}
//
impl Default for LoopbackOp {
    fn default() -> Self {
        LoopbackOp::new()
    }
}


/// Server interface, used to report the outcome of an operation
pub struct LoopbackServer {
    /// Reference-counted shared state
    shared: Arc<SharedState>,

    /// Flag indicating that the operation has reached a final state
    reached_final_state: bool,
}
//
impl LoopbackServer {
    /// Report that the transfer succeeded
    pub fn complete(mut self, status: Status) {
        self.update(OpState::Done(status));
    }

    /// Report that the transfer failed
    pub fn fail<S: Into<String>>(mut self, reason: S) {
        self.update(OpState::Failed(
            TransportError::Failed { reason: reason.into() }
        ));
    }

    /// Publish a new operation state and wake up the waiters
    fn update(&mut self, state: OpState) {
        // This should only happen if we have not yet reached a final state
        debug_assert!(!self.reached_final_state);
        self.reached_final_state = status::is_final(&state);

        *self.shared.lock() = state;
        self.shared.update_cv.notify_all();
    }
}
//
impl Drop for LoopbackServer {
    /// If the server is dropped before the operation has reached its final
    /// state, fail the operation in order to prevent waiters from hanging
    fn drop(&mut self) {
        if !self.reached_final_state {
            warn!("Loopback server dropped before completing its operation");
            self.update(OpState::Failed(TransportError::ServerKilled));
        }
    }
}


/// Native request of the in-process messaging layer
///
/// Clones refer to the same operation. Once the operation has completed,
/// waiting on it or polling it keeps returning the same outcome.
///
#[derive(Clone, Debug)]
pub struct LoopbackRequest {
    /// Reference-counted shared state, absent for null requests
    shared: Option<Arc<SharedState>>,
}
//
impl LoopbackRequest {
    /// Truth that this request does not refer to any operation
    pub fn is_null(&self) -> bool {
        self.shared.is_none()
    }
}
//
impl NativeRequest for LoopbackRequest {
    type Status = Status;
    type Error = TransportError;

    fn null() -> Self {
        LoopbackRequest { shared: None }
    }

    fn wait(&mut self) -> Result<Status, TransportError> {
        let shared = match self.shared {
            Some(ref shared) => shared,
            None => return Ok(Status::empty()),
        };

        // Block until the server reports an outcome
        let mut state = shared.lock();
        while !status::is_final(&state) {
            state = shared.update_cv
                          .wait(state)
                          .unwrap_or_else(PoisonError::into_inner);
        }

        match *state {
            OpState::Done(status) => Ok(status),
            OpState::Failed(ref error) => Err(error.clone()),
            OpState::Pending => unreachable!("Woke up on a pending operation"),
        }
    }

    fn test(&mut self) -> Result<Option<Status>, TransportError> {
        let shared = match self.shared {
            Some(ref shared) => shared,
            None => return Ok(Some(Status::empty())),
        };

        match *shared.lock() {
            OpState::Pending => Ok(None),
            OpState::Done(status) => Ok(Some(status)),
            OpState::Failed(ref error) => Err(error.clone()),
        }
    }
}


/// State shared between the server and the requests
#[derive(Debug)]
struct SharedState {
    /// Current operation state (mutex-protected)
    state_lock: Mutex<OpState>,

    /// Condition variable used to notify waiters about state updates
    update_cv: Condvar,
}
//
impl SharedState {
    /// Lock the operation state. Updates are single assignments, so a
    /// poisoned lock still holds a valid state.
    fn lock(&self) -> MutexGuard<OpState> {
        self.state_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
