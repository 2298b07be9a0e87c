//! Typed point-to-point message passing
//!
//! Processes (identified by their [`Rank`](topology::Rank) within a channel
//! context) exchange typed messages tagged with an integer label. This crate
//! maps native values, fixed-size arrays and variable-length sequences onto
//! the wire descriptors understood by an underlying rank-addressed transport,
//! so calling code never computes byte sizes, element counts or layout
//! descriptors by hand.
//!
//! The transport itself is a collaborator behind the
//! [`Transport`](transport::Transport) trait. It is expected to deliver
//! messages reliably, in order per (sender, tag) channel, and exactly once.
//! An in-process reference implementation that runs every rank on its own
//! thread is provided in [`transport::local`] and bootstrapped through
//! [`environment::Universe`].
//!
//! # Usage
//!
//! ```
//! use mpp::Universe;
//!
//! let universe = Universe::new(2);
//! universe.run(|world| {
//!     if world.rank() == 0 {
//!         world.at(1).send_value(vec![4.0f64, 8.0, 15.0]).unwrap();
//!     } else {
//!         let mut msg = vec![0.0f64; 3];
//!         let status = world.at(0).receive_into(&mut msg).unwrap();
//!         assert_eq!(status.source().rank(), 0);
//!         assert_eq!(msg, [4.0, 8.0, 15.0]);
//!     }
//! });
//! ```
//!
//! # Features
//!
//! Currently supported:
//!
//! - **Point to point communication**: standard mode send and receive in
//!   blocking variants, receive in a non-blocking variant resolved through a
//!   request future, wildcard-source receives.
//! - **Datatypes**: bridging between Rust types and the transport's wire
//!   kinds, including composite layouts for non-contiguous sequences which
//!   are registered with the transport for the duration of an operation.
//!
//! Not supported:
//!
//! - Collective operations
//! - Group and topology management
//! - Non-blocking send

#![warn(missing_docs)]

pub mod datatype;
pub mod environment;
pub mod error;
pub mod point_to_point;
pub mod raw;
pub mod request;
pub mod topology;
pub mod traits;
pub mod transport;

pub use crate::environment::{initialize, Universe};
pub use crate::error::Error;
pub use crate::topology::Rank;

/// Can be used to tag messages on the sender side and match on the receiver side.
pub type Tag = i32;
/// Encodes the number of elements in multi-element messages.
pub type Count = i32;
/// A byte offset between two addresses in memory.
pub type Address = isize;
