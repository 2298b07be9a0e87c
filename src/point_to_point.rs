//! Point to point communication
//!
//! Endpoints move [`Message`]s: a value bound together with a tag. The
//! message borrows the value by default; [`Message::owned`] moves the value
//! in instead, for fire-and-forget sends where the payload should not
//! outlive the call site. Receives fill a [`MessageMut`] (or a plain mutable
//! buffer) and report the outcome through a [`Status`].
//!
//! The wire layout of the payload is resolved from the buffer's static type
//! via the [`datatype`](crate::datatype) traits at the moment of the
//! operation; composite layouts registered for the operation are released
//! automatically once nothing refers to them any more.

use std::fmt;

use tracing::trace;

use crate::datatype::traits::*;
use crate::datatype::AnyDatatype;
use crate::error::Error;
use crate::raw::AsRaw;
use crate::request::Request;
use crate::topology::{Communicator, Endpoint};
use crate::transport::{CompletionRecord, ANY_SOURCE};
use crate::{Count, Tag};

/// A tagged value to be sent.
///
/// The buffer is either borrowed for the message's lifetime or owned by the
/// message; either way [`Message::get`] exposes it for inspection.
pub struct Message<'a, B>
where
    B: 'a + Buffer + ?Sized,
{
    data: Binding<'a, B>,
    tag: Tag,
}

enum Binding<'a, B>
where
    B: 'a + ?Sized,
{
    Borrowed(&'a B),
    Owned(Box<B>),
}

impl<'a, B> Message<'a, B>
where
    B: 'a + Buffer + ?Sized,
{
    /// A message borrowing `data`, to be sent with tag `tag`.
    pub fn new(data: &'a B, tag: Tag) -> Message<'a, B> {
        Message {
            data: Binding::Borrowed(data),
            tag,
        }
    }

    /// The payload of the message.
    pub fn get(&self) -> &B {
        match &self.data {
            Binding::Borrowed(data) => data,
            Binding::Owned(data) => data,
        }
    }

    /// The tag of the message.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Re-tag the message.
    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = tag;
    }

    /// Number of elements in the payload.
    pub fn count(&self) -> Count {
        self.get().count()
    }

    pub(crate) fn datatype(&self, comm: &Communicator) -> AnyDatatype {
        self.get().as_datatype(comm).anonymize()
    }

    pub(crate) unsafe fn pointer(&self) -> *const u8 {
        self.get().pointer()
    }
}

impl<'a, B> Message<'a, B>
where
    B: 'a + Buffer,
{
    /// A message taking ownership of `value`, to be sent with tag `tag`.
    pub fn owned(value: B, tag: Tag) -> Message<'a, B> {
        Message {
            data: Binding::Owned(Box::new(value)),
            tag,
        }
    }
}

/// A tagged mutable buffer for a value to be received.
pub struct MessageMut<'a, B>
where
    B: 'a + BufferMut + ?Sized,
{
    data: &'a mut B,
    tag: Tag,
}

impl<'a, B> MessageMut<'a, B>
where
    B: 'a + BufferMut + ?Sized,
{
    /// A receive buffer borrowing `data`, matching messages tagged `tag`
    /// ([`ANY_TAG`](crate::transport::ANY_TAG) matches all).
    pub fn new(data: &'a mut B, tag: Tag) -> MessageMut<'a, B> {
        MessageMut { data, tag }
    }

    /// The received payload.
    pub fn get(&self) -> &B {
        self.data
    }

    /// The tag this buffer matches.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Change the tag this buffer matches.
    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = tag;
    }

    pub(crate) fn count(&self) -> Count {
        self.data.count()
    }

    pub(crate) fn datatype(&self, comm: &Communicator) -> AnyDatatype {
        self.data.as_datatype(comm).anonymize()
    }

    pub(crate) unsafe fn pointer_mut(&mut self) -> *mut u8 {
        self.data.pointer_mut()
    }
}

/// Describes a completed receive: who sent the message, which tag it
/// carried, and how much arrived.
#[derive(Clone)]
pub struct Status<'c> {
    comm: &'c Communicator,
    record: CompletionRecord,
    datatype: AnyDatatype,
}

impl<'c> Status<'c> {
    pub(crate) fn new(
        comm: &'c Communicator,
        record: CompletionRecord,
        datatype: AnyDatatype,
    ) -> Status<'c> {
        Status {
            comm,
            record,
            datatype,
        }
    }

    /// The endpoint the message was received from. Useful after a wildcard
    /// receive, e.g. to reply to whoever sent the message.
    pub fn source(&self) -> Endpoint<'c> {
        self.comm.at(self.record.source)
    }

    /// The tag the message was sent with.
    pub fn tag(&self) -> Tag {
        self.record.tag
    }

    /// The transport's raw completion code, `0` on success.
    pub fn error(&self) -> i32 {
        self.record.error
    }

    /// The number of elements received.
    pub fn count(&self) -> Count {
        self.comm
            .transport()
            .count_received(&self.record, self.datatype.as_raw())
    }
}

impl<'c> fmt::Debug for Status<'c> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Status")
            .field("source", &self.record.source)
            .field("tag", &self.record.tag)
            .field("error", &self.record.error)
            .finish()
    }
}

impl<'c> Endpoint<'c> {
    /// Blocking send of `msg` to this endpoint.
    ///
    /// Returns the endpoint again on success, so sends can be chained:
    /// `ep.send(&a)?.send(&b)?`.
    pub fn send<B>(&self, msg: &Message<'_, B>) -> Result<Endpoint<'c>, Error>
    where
        B: Buffer + ?Sized,
    {
        assert_ne!(self.rank(), ANY_SOURCE, "cannot send to the wildcard endpoint");
        let comm = self.comm();
        let datatype = msg.datatype(comm);
        trace!(dest = self.rank(), tag = msg.tag(), count = msg.count(), "send");
        let result = comm.transport().blocking_send(
            unsafe { msg.pointer() },
            msg.count(),
            datatype.as_raw(),
            self.rank(),
            msg.tag(),
            comm.context(),
        );
        // a composite registration must outlive the blocking call
        drop(datatype);
        result.map_err(|e| Error::comm(comm.rank(), self.rank(), e))?;
        Ok(*self)
    }

    /// Blocking send of `value` with the default tag, consuming the value.
    pub fn send_value<B>(&self, value: B) -> Result<Endpoint<'c>, Error>
    where
        B: Buffer,
    {
        self.send(&Message::owned(value, Tag::default()))
    }

    /// Blocking receive into `msg`, matching this endpoint's rank and the
    /// buffer's tag.
    pub fn receive_msg<B>(&self, msg: &mut MessageMut<'_, B>) -> Result<Status<'c>, Error>
    where
        B: BufferMut + ?Sized,
    {
        let comm = self.comm();
        let datatype = msg.datatype(comm);
        let record = comm
            .transport()
            .blocking_receive(
                unsafe { msg.pointer_mut() },
                msg.count(),
                datatype.as_raw(),
                self.rank(),
                msg.tag(),
                comm.context(),
            )
            .map_err(|e| Error::comm(comm.rank(), self.rank(), e))?;
        trace!(source = record.source, tag = record.tag, "received");
        Ok(Status::new(comm, record, datatype))
    }

    /// Blocking receive of a default-tagged message into `buf`.
    pub fn receive_into<B>(&self, buf: &mut B) -> Result<Status<'c>, Error>
    where
        B: BufferMut + ?Sized,
    {
        self.receive_msg(&mut MessageMut::new(buf, Tag::default()))
    }

    /// Post a non-blocking receive into `msg`. The buffer stays borrowed by
    /// the returned [`Request`] until the request completes or is cancelled.
    pub fn immediate_receive_msg<'b, B>(
        &self,
        mut msg: MessageMut<'b, B>,
    ) -> Result<Request<'c, 'b, B>, Error>
    where
        B: BufferMut + ?Sized,
    {
        let comm = self.comm();
        let datatype = msg.datatype(comm);
        let pending = comm
            .transport()
            .post_receive(
                unsafe { msg.pointer_mut() },
                msg.count(),
                datatype.as_raw(),
                self.rank(),
                msg.tag(),
                comm.context(),
            )
            .map_err(|e| Error::comm(comm.rank(), self.rank(), e))?;
        Ok(Request::new(comm, pending, msg, datatype))
    }

    /// Post a non-blocking receive of a default-tagged message into `buf`.
    pub fn immediate_receive_into<'b, B>(
        &self,
        buf: &'b mut B,
    ) -> Result<Request<'c, 'b, B>, Error>
    where
        B: BufferMut + ?Sized,
    {
        self.immediate_receive_msg(MessageMut::new(buf, Tag::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_bindings() {
        let v = vec![1i32, 2, 3];
        let borrowed = Message::new(&v[..], 4);
        assert_eq!(borrowed.tag(), 4);
        assert_eq!(borrowed.count(), 3);
        assert_eq!(borrowed.get(), &[1, 2, 3]);

        let mut owned = Message::owned(7u8, 0);
        assert_eq!(*owned.get(), 7);
        owned.set_tag(9);
        assert_eq!(owned.tag(), 9);
    }
}
