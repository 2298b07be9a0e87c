//! Organizing processes as groups
//!
//! A [`Communicator`] is one process's view of a channel context: a handle to
//! the transport plus this process's attachment to the transport's group.
//! Identity questions (own rank, group size) and peer selection go through
//! it. An [`Endpoint`] names one peer of the group (or any peer, for the
//! wildcard endpoint) relative to a communicator; the point to point
//! operations live on it.
//!
//! Communicators are plain values handed to the code that communicates.
//! There is no ambient global context; two independent communicators over
//! two transports can coexist in one process.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::transport::{Context, Transport, ANY_SOURCE};

/// An identifier for a process within a group, `0..size`.
pub type Rank = i32;

/// A communication context for a group of processes.
pub struct Communicator {
    transport: Arc<dyn Transport>,
    context: Context,
    identity: OnceCell<(Rank, Rank)>,
}

impl Communicator {
    pub(crate) fn new(transport: Arc<dyn Transport>, context: Context) -> Communicator {
        Communicator {
            transport,
            context,
            identity: OnceCell::new(),
        }
    }

    // rank and size are fixed for the lifetime of the communicator, so the
    // transport is asked once
    fn identity(&self) -> (Rank, Rank) {
        *self.identity.get_or_init(|| {
            assert!(
                self.transport.initialized(),
                "transport runtime not initialized"
            );
            (
                self.transport.rank_of(self.context),
                self.transport.size_of(self.context),
            )
        })
    }

    /// The rank of this process within the group.
    pub fn rank(&self) -> Rank {
        self.identity().0
    }

    /// The number of processes in the group.
    pub fn size(&self) -> Rank {
        self.identity().1
    }

    /// The endpoint addressing the process with rank `rank`.
    ///
    /// Panics if `rank` does not identify a member of the group.
    pub fn at(&self, rank: Rank) -> Endpoint<'_> {
        assert!(
            rank >= 0 && rank < self.size(),
            "rank {} is not a member of a group of size {}",
            rank,
            self.size()
        );
        Endpoint { rank, comm: self }
    }

    /// The wildcard endpoint, matching messages from any member of the
    /// group. Valid as a receive source only.
    pub fn any(&self) -> Endpoint<'_> {
        Endpoint {
            rank: ANY_SOURCE,
            comm: self,
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn context(&self) -> Context {
        self.context
    }
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

/// One peer of a communicator's group, or the wildcard peer.
///
/// Endpoints are cheap rank-plus-context values; they are created on demand
/// via [`Communicator::at`] and [`Communicator::any`] and are the object the
/// point to point operations are invoked on.
#[derive(Clone, Copy)]
pub struct Endpoint<'c> {
    rank: Rank,
    comm: &'c Communicator,
}

impl<'c> Endpoint<'c> {
    /// The rank this endpoint addresses, or [`ANY_SOURCE`] for the wildcard
    /// endpoint.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub(crate) fn comm(&self) -> &'c Communicator {
        self.comm
    }
}

impl<'c> fmt::Debug for Endpoint<'c> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rank == ANY_SOURCE {
            write!(f, "Endpoint(any)")
        } else {
            write!(f, "Endpoint({})", self.rank)
        }
    }
}
