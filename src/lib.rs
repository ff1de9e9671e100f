//! Supervision of non-blocking communication
//!
//! Picture yourself exchanging data through a messaging layer which supports
//! non-blocking sends and receives: you start a transfer, go do something
//! else, and later wait for the transfer to complete. In practice, a single
//! logical transfer is often more than one native operation. A payload may be
//! too large for a single transfer and have to be split, a receive buffer may
//! have to be copied or unpacked once the data has arrived, a send buffer may
//! have to be kept alive until the data is out...
//!
//! This crate provides a request handle which takes care of all this. It wraps
//! the native operation token of the messaging layer, chains together the
//! operations which make up one logical transfer, and runs post-wait work
//! exactly once after the transfer has completed. Requests behave like values:
//! they can be cloned and stored in containers, and every clone refers to the
//! same logical transfer.
//!
//! The messaging layer itself is pluggable through the `NativeRequest` trait.
//! An in-process implementation is provided in the `loopback` module.

pub mod error;
pub mod loopback;
pub mod native;
pub mod request;
pub mod status;
pub mod work;

pub use crate::error::TransportError;
pub use crate::native::NativeRequest;
pub use crate::request::{wait, wait_all, Request};
pub use crate::status::Status;
pub use crate::work::PostWaitWork;
