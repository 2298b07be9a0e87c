//! Bootstrapping the in-process runtime
//!
//! A [`Universe`] owns a [`LocalTransport`] sized for a fixed number of
//! ranks and hands out one [`Communicator`] per rank. [`Universe::run`] is
//! the usual entry point: it spawns one thread per rank, calls the closure
//! with that rank's world communicator, and joins all threads before
//! returning. The transport is finalized when the universe is dropped.

use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::topology::{Communicator, Rank};
use crate::transport::local::LocalTransport;
use crate::transport::{Context, Transport};

/// Initializes an in-process runtime with `size` ranks.
pub fn initialize(size: Rank) -> Universe {
    Universe::new(size)
}

/// An in-process message-passing runtime of a fixed number of ranks.
pub struct Universe {
    transport: Arc<LocalTransport>,
    size: Rank,
}

impl Universe {
    /// A universe of `size` ranks. `size` must be positive.
    pub fn new(size: Rank) -> Universe {
        assert!(size > 0, "a universe needs at least one rank");
        debug!(size, "universe up");
        Universe {
            transport: Arc::new(LocalTransport::new(size)),
            size,
        }
    }

    /// The number of ranks in this universe.
    pub fn size(&self) -> Rank {
        self.size
    }

    /// The world communicator for `rank`. Each rank's communicator must only
    /// be driven by one thread at a time.
    pub fn world(&self, rank: Rank) -> Communicator {
        assert!(
            rank >= 0 && rank < self.size,
            "rank {} outside universe of size {}",
            rank,
            self.size
        );
        Communicator::new(
            Arc::clone(&self.transport) as Arc<dyn Transport>,
            Context(rank as usize),
        )
    }

    /// Runs `f` once per rank, each on its own thread, and waits for all of
    /// them to finish. A panic on any rank propagates after the join.
    pub fn run<F>(&self, f: F)
    where
        F: Fn(&Communicator) + Send + Sync,
    {
        thread::scope(|scope| {
            for rank in 0..self.size {
                let world = self.world(rank);
                let f = &f;
                scope.spawn(move || f(&world));
            }
        });
    }
}

impl Drop for Universe {
    fn drop(&mut self) {
        debug!(size = self.size, "universe down");
        self.transport.finalize();
    }
}
