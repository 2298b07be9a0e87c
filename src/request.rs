//! Request objects for non-blocking receives
//!
//! A [`Request`] is the future of a posted receive: it borrows the receive
//! buffer mutably, so the buffer cannot be touched while the transport may
//! still write to it. Completion is observed with [`Request::is_done`]
//! (non-blocking, checks at most once per call) or [`Request::get`]
//! (blocks, then hands out the filled buffer). A request that is dropped
//! while still pending withdraws the posted receive from the transport, so
//! the transport never holds a pointer into a buffer whose borrow has ended.

use tracing::debug;

use crate::datatype::traits::*;
use crate::datatype::AnyDatatype;
use crate::error::Error;
use crate::point_to_point::{MessageMut, Status};
use crate::topology::Communicator;
use crate::transport::{CompletionRecord, PendingReceive};

/// The future of a posted non-blocking receive.
///
/// `'c` ties the request to its communicator, `'b` to the receive buffer.
/// Requests must be completed or cancelled; letting one fall out of scope
/// silently discards the receive, which is almost always a bug.
#[must_use = "pending receives should be completed or cancelled explicitly"]
pub struct Request<'c, 'b, B>
where
    B: 'b + BufferMut + ?Sized,
{
    comm: &'c Communicator,
    pending: PendingReceive,
    msg: MessageMut<'b, B>,
    datatype: AnyDatatype,
    status: Option<Status<'c>>,
    cancelled: bool,
}

impl<'c, 'b, B> Request<'c, 'b, B>
where
    B: 'b + BufferMut + ?Sized,
{
    pub(crate) fn new(
        comm: &'c Communicator,
        pending: PendingReceive,
        msg: MessageMut<'b, B>,
        datatype: AnyDatatype,
    ) -> Request<'c, 'b, B> {
        Request {
            comm,
            pending,
            msg,
            datatype,
            status: None,
            cancelled: false,
        }
    }

    fn complete(&mut self, record: CompletionRecord) {
        if record.error != 0 {
            debug!(error = record.error, "receive completed with a fault");
        }
        self.status = Some(Status::new(self.comm, record, self.datatype.clone()));
    }

    /// Whether the receive has completed. Performs at most one completion
    /// check per call; once this returns `true` the outcome is cached and
    /// the transport is not asked again.
    pub fn is_done(&mut self) -> bool {
        if self.status.is_some() {
            return true;
        }
        match self.comm.transport().poll(self.pending) {
            Some(record) => {
                self.complete(record);
                true
            }
            None => false,
        }
    }

    /// Block until the receive completes, then return the filled buffer.
    ///
    /// Completion does not imply success: a faulted receive (for example a
    /// truncated message) leaves the buffer contents unspecified and is only
    /// visible through a nonzero [`Status::error`] on
    /// [`status`](Request::status).
    pub fn get(&mut self) -> &B {
        if self.status.is_none() {
            let record = self.comm.transport().wait(self.pending);
            self.complete(record);
        }
        self.msg.get()
    }

    /// The completion status, or [`Error::NotComplete`] while the receive is
    /// still pending.
    pub fn status(&self) -> Result<Status<'c>, Error> {
        self.status.clone().ok_or(Error::NotComplete)
    }

    /// Withdraw the posted receive. Returns `false` if the receive had
    /// already completed, in which case the buffer holds the message but the
    /// completion record is discarded with the request.
    pub fn cancel(mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        // the handle is resolved either way, drop must not touch it again
        self.cancelled = true;
        self.comm.transport().cancel(self.pending)
    }
}

impl<'c, 'b, B> Drop for Request<'c, 'b, B>
where
    B: 'b + BufferMut + ?Sized,
{
    fn drop(&mut self) {
        if self.status.is_none() && !self.cancelled {
            self.comm.transport().cancel(self.pending);
        }
    }
}
