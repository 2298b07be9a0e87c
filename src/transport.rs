//! The transport collaborator contract
//!
//! The typed layer consumes a small set of primitives from the underlying
//! message-passing runtime: blocking send, blocking receive, posting a
//! non-blocking receive, and polling/waiting for its completion, plus the
//! registry calls for composite wire kinds. Everything else (process
//! management, the concrete wire transmission, flow control) stays on the
//! transport's side of the seam. The transport is assumed to deliver
//! reliably, exactly once, and in order per (sender, tag) channel.
//!
//! [`local::LocalTransport`] is an in-process reference implementation.

use thiserror::Error;

use crate::topology::Rank;
use crate::{Address, Count, Tag};

pub mod local;

/// Wildcard sentinel accepted wherever a source rank is expected:
/// matches messages from any sender.
pub const ANY_SOURCE: Rank = -1;

/// Wildcard sentinel accepted wherever a receive tag is expected:
/// matches messages with any tag.
pub const ANY_TAG: Tag = -2;

/// First handle value available for registered composite kinds. Smaller
/// values identify the system wire kinds.
pub(crate) const USER_KIND_BASE: u32 = 0x1000;

/// A raw transport-level datatype handle.
///
/// Handles below [`USER_KIND_BASE`] denote system wire kinds; the rest are
/// allocated by [`Transport::register_structured`] and stay valid until
/// [`Transport::free_structured`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawDatatype(pub(crate) u32);

/// A handle to a posted non-blocking receive operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingReceive(pub(crate) u64);

/// Identifies one rank's attachment to the transport's process group.
///
/// Every [`Communicator`](crate::topology::Communicator) carries one; the
/// transport resolves it to a rank and drives that rank's mailbox.
#[derive(Clone, Copy, Debug)]
pub struct Context(pub(crate) usize);

/// One block of a structured (composite) kind: `count` elements of `kind`
/// located `offset` bytes from the base address of the message.
#[derive(Clone, Copy, Debug)]
pub struct StructBlock {
    /// Byte offset of the block relative to the message base address.
    pub offset: Address,
    /// Number of `kind` elements in the block.
    pub count: Count,
    /// Wire kind of the block's elements.
    pub kind: RawDatatype,
}

/// Transport-native record describing a finished receive.
#[derive(Clone, Copy, Debug)]
pub struct CompletionRecord {
    /// Rank the message was sent from.
    pub source: Rank,
    /// Tag the message was sent with.
    pub tag: Tag,
    /// Raw completion code, `0` on success.
    pub error: i32,
    /// Raw size of the received payload in bytes.
    pub bytes: usize,
}

/// A failure reported by a transport primitive, carrying the transport's
/// native diagnostic text.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The primitive operations the typed layer requires from a message-passing
/// runtime.
///
/// Buffer pointers passed to the communication primitives must stay valid
/// until the operation completes (or, for posted receives, until the
/// operation is cancelled); the typed layer enforces this through borrows on
/// its message and request types. [`poll`](Transport::poll) and
/// [`wait`](Transport::wait) have no failure channel; completion problems
/// are reported through [`CompletionRecord::error`].
pub trait Transport: Send + Sync {
    /// Whether the runtime is initialized and may be queried for ranks.
    fn initialized(&self) -> bool;

    /// Rank of the process behind `ctx`.
    fn rank_of(&self, ctx: Context) -> Rank;

    /// Number of processes in the group behind `ctx`.
    fn size_of(&self, ctx: Context) -> Rank;

    /// Blocking standard-mode send of `count` elements of `kind` starting at
    /// `buf` to `dest`.
    fn blocking_send(
        &self,
        buf: *const u8,
        count: Count,
        kind: RawDatatype,
        dest: Rank,
        tag: Tag,
        ctx: Context,
    ) -> Result<(), TransportError>;

    /// Blocking receive into `count` elements of `kind` starting at `buf`.
    /// `source` may be [`ANY_SOURCE`] and `tag` may be [`ANY_TAG`].
    #[allow(clippy::too_many_arguments)]
    fn blocking_receive(
        &self,
        buf: *mut u8,
        count: Count,
        kind: RawDatatype,
        source: Rank,
        tag: Tag,
        ctx: Context,
    ) -> Result<CompletionRecord, TransportError>;

    /// Post a non-blocking receive. The returned handle must be resolved via
    /// [`poll`](Transport::poll) or [`wait`](Transport::wait), or withdrawn
    /// via [`cancel`](Transport::cancel), by the posting rank.
    #[allow(clippy::too_many_arguments)]
    fn post_receive(
        &self,
        buf: *mut u8,
        count: Count,
        kind: RawDatatype,
        source: Rank,
        tag: Tag,
        ctx: Context,
    ) -> Result<PendingReceive, TransportError>;

    /// One non-blocking completion check of a posted receive. Returns the
    /// completion record if the operation finished, `None` otherwise. Never
    /// blocks.
    fn poll(&self, pending: PendingReceive) -> Option<CompletionRecord>;

    /// Block until the posted receive completes.
    fn wait(&self, pending: PendingReceive) -> CompletionRecord;

    /// Withdraw a posted receive. Returns `false` if the operation already
    /// completed. A matching message that arrives later is left for other
    /// receives.
    fn cancel(&self, pending: PendingReceive) -> bool;

    /// Register a composite wire kind described by `blocks`. The handle must
    /// be released with [`free_structured`](Transport::free_structured) once
    /// no operation refers to it any more.
    fn register_structured(&self, blocks: &[StructBlock]) -> RawDatatype;

    /// Release a handle obtained from
    /// [`register_structured`](Transport::register_structured).
    fn free_structured(&self, kind: RawDatatype);

    /// Number of `kind` elements described by a completion record, or `-1`
    /// if the received payload is not a whole number of elements.
    fn count_received(&self, record: &CompletionRecord, kind: RawDatatype) -> Count;

    /// Shut the runtime down. Using any context afterwards is a programming
    /// error.
    fn finalize(&self);
}
