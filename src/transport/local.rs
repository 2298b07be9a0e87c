//! An in-process transport
//!
//! Every rank of the process group lives on its own thread inside the
//! current OS process. Each rank owns a FIFO mailbox; a send packs the source
//! layout into an owned byte envelope and appends it to the destination's
//! mailbox, a receive matches (source, tag) against the mailbox in arrival
//! order and unpacks the envelope into the destination layout. Per
//! (sender, tag) pair this yields exactly the in-order, exactly-once
//! delivery the typed layer relies on.
//!
//! Posted non-blocking receives live in a table keyed by their handle and
//! are resolved (or cancelled) only by the rank that posted them, matching
//! the one-logical-thread-per-rank execution model of the crate.

use std::collections::{HashMap, VecDeque};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::datatype::WireKind;
use crate::topology::Rank;
use crate::transport::{
    CompletionRecord, Context, PendingReceive, RawDatatype, StructBlock, Transport,
    TransportError, ANY_SOURCE, ANY_TAG, USER_KIND_BASE,
};
use crate::{Count, Tag};

/// A message at rest: packed payload plus its matching metadata.
struct Envelope {
    source: Rank,
    tag: Tag,
    bytes: Vec<u8>,
}

impl Envelope {
    fn matches(&self, source: Rank, tag: Tag) -> bool {
        (source == ANY_SOURCE || self.source == source) && (tag == ANY_TAG || self.tag == tag)
    }
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    arrived: Condvar,
}

/// Descriptor of a posted non-blocking receive. The buffer address is stored
/// as an integer; it is only turned back into a pointer on the thread that
/// posted the operation.
#[derive(Clone, Copy)]
struct PostedReceive {
    buf: usize,
    count: Count,
    kind: RawDatatype,
    source: Rank,
    tag: Tag,
    mailbox: usize,
}

/// The in-process reference transport.
pub struct LocalTransport {
    boxes: Vec<Mailbox>,
    kinds: Mutex<HashMap<u32, Vec<StructBlock>>>,
    next_kind: AtomicU32,
    posted: Mutex<HashMap<u64, PostedReceive>>,
    next_posted: AtomicU64,
    up: AtomicBool,
}

impl LocalTransport {
    /// Create a runtime for a group of `size` ranks.
    pub fn new(size: Rank) -> LocalTransport {
        assert!(size > 0, "a process group needs at least one rank");
        LocalTransport {
            boxes: (0..size).map(|_| Mailbox::default()).collect(),
            kinds: Mutex::new(HashMap::new()),
            next_kind: AtomicU32::new(USER_KIND_BASE),
            posted: Mutex::new(HashMap::new()),
            next_posted: AtomicU64::new(0),
            up: AtomicBool::new(true),
        }
    }

    /// Number of composite kinds currently registered. Every send of a
    /// non-contiguous sequence must leave this where it found it.
    pub fn composite_count(&self) -> usize {
        self.kinds.lock().len()
    }

    fn check_up(&self) -> Result<(), TransportError> {
        if self.up.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError("transport runtime is finalized".to_owned()))
        }
    }

    fn check_rank(&self, rank: Rank, what: &str) -> Result<(), TransportError> {
        if rank < 0 || rank as usize >= self.boxes.len() {
            Err(TransportError(format!("invalid {} rank {}", what, rank)))
        } else {
            Ok(())
        }
    }

    /// Packed byte size of `count` elements of `kind`.
    fn extent(&self, kind: RawDatatype, count: Count) -> usize {
        if let Some(k) = WireKind::from_code(kind.0) {
            k.size() * count as usize
        } else {
            let blocks = self.resolve(kind);
            let one: usize = blocks.iter().map(|b| self.extent(b.kind, b.count)).sum();
            one * count as usize
        }
    }

    fn resolve(&self, kind: RawDatatype) -> Vec<StructBlock> {
        self.kinds
            .lock()
            .get(&kind.0)
            .cloned()
            .expect("unknown composite kind handle")
    }

    fn pack(&self, buf: *const u8, count: Count, kind: RawDatatype) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.extent(kind, count));
        self.pack_into(buf, count, kind, &mut out);
        out
    }

    fn pack_into(&self, buf: *const u8, count: Count, kind: RawDatatype, out: &mut Vec<u8>) {
        if let Some(k) = WireKind::from_code(kind.0) {
            let n = k.size() * count as usize;
            out.extend_from_slice(unsafe { slice::from_raw_parts(buf, n) });
        } else {
            let blocks = self.resolve(kind);
            for _ in 0..count {
                // block order defines the byte layout
                for b in &blocks {
                    self.pack_into(unsafe { buf.offset(b.offset) }, b.count, b.kind, out);
                }
            }
        }
    }

    fn unpack_from(
        &self,
        bytes: &[u8],
        cursor: &mut usize,
        buf: *mut u8,
        count: Count,
        kind: RawDatatype,
    ) {
        if let Some(k) = WireKind::from_code(kind.0) {
            let capacity = k.size() * count as usize;
            let n = capacity.min(bytes.len() - *cursor);
            unsafe {
                ptr::copy_nonoverlapping(bytes[*cursor..].as_ptr(), buf, n);
            }
            *cursor += n;
        } else {
            let blocks = self.resolve(kind);
            for _ in 0..count {
                for b in &blocks {
                    self.unpack_from(
                        bytes,
                        cursor,
                        unsafe { buf.offset(b.offset) },
                        b.count,
                        b.kind,
                    );
                }
            }
        }
    }

    /// Move a matched envelope into the destination buffer.
    fn deliver(
        &self,
        env: &Envelope,
        buf: *mut u8,
        count: Count,
        kind: RawDatatype,
    ) -> Result<CompletionRecord, TransportError> {
        let capacity = self.extent(kind, count);
        if env.bytes.len() > capacity {
            return Err(TransportError(format!(
                "message truncated: {} bytes incoming, {} byte buffer",
                env.bytes.len(),
                capacity
            )));
        }
        let mut cursor = 0;
        self.unpack_from(&env.bytes, &mut cursor, buf, count, kind);
        Ok(CompletionRecord {
            source: env.source,
            tag: env.tag,
            error: 0,
            bytes: env.bytes.len(),
        })
    }

    /// Take the first envelope in `mailbox` matching (source, tag), if any.
    fn take_match(&self, mailbox: usize, source: Rank, tag: Tag) -> Option<Envelope> {
        let mut queue = self.boxes[mailbox].queue.lock();
        let pos = queue.iter().position(|env| env.matches(source, tag))?;
        queue.remove(pos)
    }

    /// Resolve a posted receive against an envelope; poll/wait have no
    /// failure channel, so a delivery fault surfaces in the record.
    fn complete_posted(&self, op: &PostedReceive, env: Envelope) -> CompletionRecord {
        match self.deliver(&env, op.buf as *mut u8, op.count, op.kind) {
            Ok(record) => record,
            Err(fault) => {
                debug!(%fault, "posted receive failed");
                CompletionRecord {
                    source: env.source,
                    tag: env.tag,
                    error: 1,
                    bytes: 0,
                }
            }
        }
    }
}

impl Transport for LocalTransport {
    fn initialized(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    fn rank_of(&self, ctx: Context) -> Rank {
        ctx.0 as Rank
    }

    fn size_of(&self, _ctx: Context) -> Rank {
        self.boxes.len() as Rank
    }

    fn blocking_send(
        &self,
        buf: *const u8,
        count: Count,
        kind: RawDatatype,
        dest: Rank,
        tag: Tag,
        ctx: Context,
    ) -> Result<(), TransportError> {
        self.check_up()?;
        self.check_rank(dest, "destination")?;
        let bytes = self.pack(buf, count, kind);
        trace!(from = ctx.0, to = dest, tag, len = bytes.len(), "enqueue");
        let mailbox = &self.boxes[dest as usize];
        mailbox.queue.lock().push_back(Envelope {
            source: ctx.0 as Rank,
            tag,
            bytes,
        });
        mailbox.arrived.notify_all();
        Ok(())
    }

    fn blocking_receive(
        &self,
        buf: *mut u8,
        count: Count,
        kind: RawDatatype,
        source: Rank,
        tag: Tag,
        ctx: Context,
    ) -> Result<CompletionRecord, TransportError> {
        self.check_up()?;
        if source != ANY_SOURCE {
            self.check_rank(source, "source")?;
        }
        loop {
            let mut queue = self.boxes[ctx.0].queue.lock();
            if let Some(pos) = queue.iter().position(|env| env.matches(source, tag)) {
                let env = queue.remove(pos).expect("matched position is in range");
                drop(queue);
                return self.deliver(&env, buf, count, kind);
            }
            self.boxes[ctx.0].arrived.wait(&mut queue);
        }
    }

    fn post_receive(
        &self,
        buf: *mut u8,
        count: Count,
        kind: RawDatatype,
        source: Rank,
        tag: Tag,
        ctx: Context,
    ) -> Result<PendingReceive, TransportError> {
        self.check_up()?;
        if source != ANY_SOURCE {
            self.check_rank(source, "source")?;
        }
        let id = self.next_posted.fetch_add(1, Ordering::Relaxed);
        self.posted.lock().insert(
            id,
            PostedReceive {
                buf: buf as usize,
                count,
                kind,
                source,
                tag,
                mailbox: ctx.0,
            },
        );
        trace!(from = ?source, tag, handle = id, "receive posted");
        Ok(PendingReceive(id))
    }

    fn poll(&self, pending: PendingReceive) -> Option<CompletionRecord> {
        let op = *self
            .posted
            .lock()
            .get(&pending.0)
            .expect("unknown pending receive handle");
        let env = self.take_match(op.mailbox, op.source, op.tag)?;
        self.posted.lock().remove(&pending.0);
        Some(self.complete_posted(&op, env))
    }

    fn wait(&self, pending: PendingReceive) -> CompletionRecord {
        let op = *self
            .posted
            .lock()
            .get(&pending.0)
            .expect("unknown pending receive handle");
        loop {
            let mut queue = self.boxes[op.mailbox].queue.lock();
            if let Some(pos) = queue.iter().position(|env| env.matches(op.source, op.tag)) {
                let env = queue.remove(pos).expect("matched position is in range");
                drop(queue);
                self.posted.lock().remove(&pending.0);
                return self.complete_posted(&op, env);
            }
            self.boxes[op.mailbox].arrived.wait(&mut queue);
        }
    }

    fn cancel(&self, pending: PendingReceive) -> bool {
        self.posted.lock().remove(&pending.0).is_some()
    }

    fn register_structured(&self, blocks: &[StructBlock]) -> RawDatatype {
        assert!(!blocks.is_empty(), "composite kind must not be empty");
        let id = self.next_kind.fetch_add(1, Ordering::Relaxed);
        self.kinds.lock().insert(id, blocks.to_vec());
        RawDatatype(id)
    }

    fn free_structured(&self, kind: RawDatatype) {
        debug_assert!(kind.0 >= USER_KIND_BASE, "cannot free a system kind");
        self.kinds.lock().remove(&kind.0);
    }

    fn count_received(&self, record: &CompletionRecord, kind: RawDatatype) -> Count {
        let element = self.extent(kind, 1);
        if element == 0 || record.bytes % element != 0 {
            -1
        } else {
            (record.bytes / element) as Count
        }
    }

    fn finalize(&self) {
        self.up.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const I32: RawDatatype = RawDatatype(WireKind::Int32.code());

    fn ctx(rank: usize) -> Context {
        Context(rank)
    }

    #[test]
    fn send_to_self_roundtrip() {
        let t = LocalTransport::new(1);
        let out = [7i32, 8, 9];
        t.blocking_send(out.as_ptr() as *const u8, 3, I32, 0, 4, ctx(0))
            .unwrap();
        let mut buf = [0i32; 3];
        let record = t
            .blocking_receive(buf.as_mut_ptr() as *mut u8, 3, I32, 0, 4, ctx(0))
            .unwrap();
        assert_eq!(buf, out);
        assert_eq!(record.source, 0);
        assert_eq!(record.tag, 4);
        assert_eq!(record.error, 0);
        assert_eq!(t.count_received(&record, I32), 3);
    }

    #[test]
    fn structured_kind_gathers_blocks_in_order() {
        let t = LocalTransport::new(1);
        // every other element of a 4-element array
        let kind = t.register_structured(&[
            StructBlock {
                offset: 0,
                count: 1,
                kind: I32,
            },
            StructBlock {
                offset: 8,
                count: 1,
                kind: I32,
            },
        ]);
        let out = [1i32, 2, 3, 4];
        t.blocking_send(out.as_ptr() as *const u8, 1, kind, 0, 0, ctx(0))
            .unwrap();
        let mut buf = [0i32; 2];
        let record = t
            .blocking_receive(buf.as_mut_ptr() as *mut u8, 2, I32, 0, 0, ctx(0))
            .unwrap();
        assert_eq!(buf, [1, 3]);
        assert_eq!(t.count_received(&record, I32), 2);
        t.free_structured(kind);
        assert_eq!(t.composite_count(), 0);
    }

    #[test]
    fn oversized_message_is_a_truncation_fault() {
        let t = LocalTransport::new(1);
        let out = [1i32, 2, 3];
        t.blocking_send(out.as_ptr() as *const u8, 3, I32, 0, 0, ctx(0))
            .unwrap();
        let mut buf = [0i32; 2];
        let fault = t
            .blocking_receive(buf.as_mut_ptr() as *mut u8, 2, I32, 0, 0, ctx(0))
            .unwrap_err();
        assert!(fault.to_string().contains("truncated"));
    }

    #[test]
    fn tag_matching_skips_earlier_envelopes() {
        let t = LocalTransport::new(1);
        let first = 100i32;
        let second = 101i32;
        t.blocking_send(&first as *const i32 as *const u8, 1, I32, 0, 11, ctx(0))
            .unwrap();
        t.blocking_send(&second as *const i32 as *const u8, 1, I32, 0, 0, ctx(0))
            .unwrap();
        let mut buf = 0i32;
        let record = t
            .blocking_receive(&mut buf as *mut i32 as *mut u8, 1, I32, 0, 0, ctx(0))
            .unwrap();
        assert_eq!((buf, record.tag), (101, 0));
        let record = t
            .blocking_receive(&mut buf as *mut i32 as *mut u8, 1, I32, 0, 11, ctx(0))
            .unwrap();
        assert_eq!((buf, record.tag), (100, 11));
    }

    #[test]
    fn cancelled_post_leaves_the_message() {
        let t = LocalTransport::new(1);
        let mut buf = 0i32;
        let pending = t
            .post_receive(&mut buf as *mut i32 as *mut u8, 1, I32, ANY_SOURCE, 0, ctx(0))
            .unwrap();
        assert!(t.poll(pending).is_none());
        assert!(t.cancel(pending));
        assert!(!t.cancel(pending));

        let payload = 55i32;
        t.blocking_send(&payload as *const i32 as *const u8, 1, I32, 0, 0, ctx(0))
            .unwrap();
        let record = t
            .blocking_receive(&mut buf as *mut i32 as *mut u8, 1, I32, ANY_SOURCE, 0, ctx(0))
            .unwrap();
        assert_eq!(buf, 55);
        assert_eq!(record.source, 0);
    }

    #[test]
    fn finalized_runtime_rejects_operations() {
        let t = LocalTransport::new(1);
        t.finalize();
        let val = 1i32;
        assert!(t
            .blocking_send(&val as *const i32 as *const u8, 1, I32, 0, 0, ctx(0))
            .is_err());
    }
}
