//! Describing data
//!
//! The core function of this crate is getting data from rank A to rank B.
//! The transport interprets raw bytes through wire kinds that go beyond a
//! start address and a number of bytes: a [`WireKind`] is an enumerated wire
//! primitive such as "4-byte signed integer", and composite kinds describe a
//! sequence of differently-located sub-elements as a single logical unit.
//!
//! A direct relationship between a Rust scalar type and a system wire kind
//! is covered by the [`Equivalence`] trait. Whole values are mapped to their
//! wire descriptor purely by their static type through [`AsDatatype`] (base
//! kind), [`Collection`] (element count) and [`Pointer`]/[`PointerMut`]
//! (base address); [`Buffer`] and [`BufferMut`] bundle those capabilities.
//! The descriptors exist for plain scalars, fixed-size arrays, contiguous
//! sequences (`Vec<T>`, slices) and the non-contiguous
//! [`LinkedList`](std::collections::LinkedList), whose nodes are gathered
//! into a composite layout registered with the transport.
//!
//! Composite registration is scoped: a [`UserDatatype`] releases its
//! transport registration on last drop, so a send of a non-contiguous
//! sequence never leaks transport resources.

use std::collections::LinkedList;
use std::marker::PhantomData;
use std::sync::Arc;

use conv::ConvUtil;
use smallvec::SmallVec;

use crate::raw::AsRaw;
use crate::topology::Communicator;
use crate::transport::{RawDatatype, StructBlock, Transport};
use crate::{Address, Count};

/// Datatype traits
pub mod traits {
    pub use super::{
        AsDatatype, Buffer, BufferMut, Collection, Datatype, Equivalence, Pointer, PointerMut,
    };
}

/// An enumerated wire primitive understood by every transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireKind {
    /// 1-byte signed integer
    Int8,
    /// 2-byte signed integer
    Int16,
    /// 4-byte signed integer
    Int32,
    /// 8-byte signed integer
    Int64,
    /// 1-byte unsigned integer
    Uint8,
    /// 2-byte unsigned integer
    Uint16,
    /// 4-byte unsigned integer
    Uint32,
    /// 8-byte unsigned integer
    Uint64,
    /// 4-byte IEEE 754 floating point number
    Float32,
    /// 8-byte IEEE 754 floating point number
    Float64,
    /// Boolean value
    Bool,
    /// Unicode scalar value
    Char,
    /// Complex number of two 4-byte floats
    Complex32,
    /// Complex number of two 8-byte floats
    Complex64,
}

impl WireKind {
    /// Size of one element of this kind in bytes.
    pub const fn size(self) -> usize {
        match self {
            WireKind::Int8 | WireKind::Uint8 | WireKind::Bool => 1,
            WireKind::Int16 | WireKind::Uint16 => 2,
            WireKind::Int32 | WireKind::Uint32 | WireKind::Float32 | WireKind::Char => 4,
            WireKind::Int64 | WireKind::Uint64 | WireKind::Float64 | WireKind::Complex32 => 8,
            WireKind::Complex64 => 16,
        }
    }

    pub(crate) const fn code(self) -> u32 {
        self as u32
    }

    pub(crate) const fn from_code(code: u32) -> Option<WireKind> {
        Some(match code {
            0 => WireKind::Int8,
            1 => WireKind::Int16,
            2 => WireKind::Int32,
            3 => WireKind::Int64,
            4 => WireKind::Uint8,
            5 => WireKind::Uint16,
            6 => WireKind::Uint32,
            7 => WireKind::Uint64,
            8 => WireKind::Float32,
            9 => WireKind::Float64,
            10 => WireKind::Bool,
            11 => WireKind::Char,
            12 => WireKind::Complex32,
            13 => WireKind::Complex64,
            _ => return None,
        })
    }
}

/// A reference to a transport data type.
///
/// This is similar to a raw [`RawDatatype`] but is guaranteed to be valid
/// for `'a`.
#[derive(Copy, Clone, Debug)]
pub struct DatatypeRef<'a> {
    datatype: RawDatatype,
    phantom: PhantomData<&'a ()>,
}

unsafe impl<'a> AsRaw for DatatypeRef<'a> {
    type Raw = RawDatatype;
    fn as_raw(&self) -> Self::Raw {
        self.datatype
    }
}

impl<'a> Datatype for DatatypeRef<'a> {
    fn anonymize(&self) -> AnyDatatype {
        // references to system kinds are valid forever
        AnyDatatype::System(DatatypeRef {
            datatype: self.datatype,
            phantom: PhantomData,
        })
    }
}

impl DatatypeRef<'static> {
    pub(crate) const fn system(kind: WireKind) -> Self {
        DatatypeRef {
            datatype: RawDatatype(kind.code()),
            phantom: PhantomData,
        }
    }
}

/// A system datatype, directly corresponding to a [`WireKind`].
pub type SystemDatatype = DatatypeRef<'static>;

/// A Datatype describes the layout of messages in memory.
pub trait Datatype: AsRaw<Raw = RawDatatype> {
    /// A clone-able, owner-independent handle that keeps the underlying kind
    /// registered for as long as it is held (needed by
    /// [`Status`](crate::point_to_point::Status)).
    fn anonymize(&self) -> AnyDatatype;
}

impl<'a, D> Datatype for &'a D
where
    D: 'a + Datatype,
{
    fn anonymize(&self) -> AnyDatatype {
        (**self).anonymize()
    }
}

/// A type-erased datatype handle.
#[derive(Clone)]
pub enum AnyDatatype {
    /// A system wire kind.
    System(SystemDatatype),
    /// A registered composite kind; holding the value keeps the registration
    /// alive.
    User(UserDatatype),
}

unsafe impl AsRaw for AnyDatatype {
    type Raw = RawDatatype;
    fn as_raw(&self) -> Self::Raw {
        match self {
            AnyDatatype::System(d) => d.as_raw(),
            AnyDatatype::User(d) => d.as_raw(),
        }
    }
}

struct UserInner {
    raw: RawDatatype,
    transport: Arc<dyn Transport>,
}

impl Drop for UserInner {
    fn drop(&mut self) {
        self.transport.free_structured(self.raw);
    }
}

/// A user defined composite datatype, registered with the transport at
/// construction and released on last drop.
#[derive(Clone)]
pub struct UserDatatype {
    inner: Arc<UserInner>,
}

impl UserDatatype {
    /// Register a composite kind out of multiple blocks of individual length
    /// and displacement. Block `i` will be `blocklengths[i]` elements of
    /// `kinds[i]`, displaced by `displacements[i]` bytes from the base
    /// address. Block order defines the byte layout of the packed message.
    ///
    /// Any composite kind referenced by `kinds` must outlive the result.
    pub fn structured(
        comm: &Communicator,
        blocklengths: &[Count],
        displacements: &[Address],
        kinds: &[&dyn Datatype],
    ) -> UserDatatype {
        assert_eq!(blocklengths.len(), displacements.len());
        assert_eq!(blocklengths.len(), kinds.len());
        assert!(!blocklengths.is_empty(), "composite layout must be non-empty");
        let blocks: SmallVec<[StructBlock; 8]> = blocklengths
            .iter()
            .zip(displacements)
            .zip(kinds)
            .map(|((&count, &offset), kind)| StructBlock {
                offset,
                count,
                kind: kind.as_raw(),
            })
            .collect();
        let transport = Arc::clone(comm.transport());
        let raw = transport.register_structured(&blocks);
        UserDatatype {
            inner: Arc::new(UserInner { raw, transport }),
        }
    }
}

unsafe impl AsRaw for UserDatatype {
    type Raw = RawDatatype;
    fn as_raw(&self) -> Self::Raw {
        self.inner.raw
    }
}

impl Datatype for UserDatatype {
    fn anonymize(&self) -> AnyDatatype {
        AnyDatatype::User(self.clone())
    }
}

/// A direct equivalence exists between the implementing type and a system
/// wire kind.
///
/// # Safety
///
/// The memory representation of the implementing type must match the wire
/// kind returned by `equivalent_datatype()` exactly.
pub unsafe trait Equivalence {
    /// The type of the equivalent datatype (e.g. `SystemDatatype`)
    type Out: Datatype;
    /// The datatype that is equivalent to this Rust type
    fn equivalent_datatype() -> Self::Out;
}

/// Something that has an associated transport datatype
///
/// Resolution is driven purely by the static type of the value. Composite
/// kinds must be registered with the channel context's transport, which is
/// why the context is threaded through here; contiguous types ignore it.
///
/// # Safety
///
/// The returned datatype must describe the memory reachable through
/// [`Pointer`]/[`PointerMut`] on the same value.
pub unsafe trait AsDatatype {
    /// The type of the associated datatype (e.g. `SystemDatatype` or
    /// `UserDatatype`)
    type Out: Datatype;
    /// The associated datatype
    fn as_datatype(&self, comm: &Communicator) -> Self::Out;
}

/// A countable collection of things.
///
/// # Safety
///
/// `count()` must not exceed the number of elements reachable through
/// [`Pointer`]/[`PointerMut`] on the same value.
pub unsafe trait Collection {
    /// How many things are in this collection.
    fn count(&self) -> Count;
}

/// Provides a pointer to the starting address in memory.
///
/// # Safety
///
/// The pointer must stay valid while the value is borrowed.
pub unsafe trait Pointer {
    /// A pointer to the starting address in memory
    unsafe fn pointer(&self) -> *const u8;
}

/// Provides a mutable pointer to the starting address in memory.
///
/// # Safety
///
/// The pointer must stay valid while the value is borrowed.
pub unsafe trait PointerMut {
    /// A mutable pointer to the starting address in memory
    unsafe fn pointer_mut(&mut self) -> *mut u8;
}

/// A buffer is a region in memory that starts at `pointer()` and contains
/// `count()` copies of `as_datatype()`.
pub unsafe trait Buffer: Pointer + Collection + AsDatatype {}

/// A mutable buffer is a region in memory that starts at `pointer_mut()` and
/// contains `count()` copies of `as_datatype()`.
pub unsafe trait BufferMut: PointerMut + Collection + AsDatatype {}

// Scalars are their own one-element buffer.
macro_rules! system_scalar {
    ($rstype:path, $kind:expr) => {
        unsafe impl Equivalence for $rstype {
            type Out = SystemDatatype;
            fn equivalent_datatype() -> Self::Out {
                DatatypeRef::system($kind)
            }
        }

        unsafe impl AsDatatype for $rstype {
            type Out = SystemDatatype;
            fn as_datatype(&self, _comm: &Communicator) -> Self::Out {
                <$rstype as Equivalence>::equivalent_datatype()
            }
        }

        unsafe impl Collection for $rstype {
            fn count(&self) -> Count {
                1
            }
        }

        unsafe impl Pointer for $rstype {
            unsafe fn pointer(&self) -> *const u8 {
                let p: *const $rstype = self;
                p as *const u8
            }
        }

        unsafe impl PointerMut for $rstype {
            unsafe fn pointer_mut(&mut self) -> *mut u8 {
                let p: *mut $rstype = self;
                p as *mut u8
            }
        }

        unsafe impl Buffer for $rstype {}
        unsafe impl BufferMut for $rstype {}
    };
}

system_scalar!(bool, WireKind::Bool);
system_scalar!(char, WireKind::Char);

system_scalar!(f32, WireKind::Float32);
system_scalar!(f64, WireKind::Float64);

system_scalar!(i8, WireKind::Int8);
system_scalar!(i16, WireKind::Int16);
system_scalar!(i32, WireKind::Int32);
system_scalar!(i64, WireKind::Int64);

system_scalar!(u8, WireKind::Uint8);
system_scalar!(u16, WireKind::Uint16);
system_scalar!(u32, WireKind::Uint32);
system_scalar!(u64, WireKind::Uint64);

#[cfg(target_pointer_width = "32")]
system_scalar!(usize, WireKind::Uint32);
#[cfg(target_pointer_width = "32")]
system_scalar!(isize, WireKind::Int32);

#[cfg(target_pointer_width = "64")]
system_scalar!(usize, WireKind::Uint64);
#[cfg(target_pointer_width = "64")]
system_scalar!(isize, WireKind::Int64);

#[cfg(feature = "complex")]
system_scalar!(num_complex::Complex32, WireKind::Complex32);
#[cfg(feature = "complex")]
system_scalar!(num_complex::Complex64, WireKind::Complex64);

// Contiguous sequences: fixed-size arrays, slices and vectors of scalars.
// The element count is the current logical length, the base address is the
// address of the first element. A zero-length sequence is representable
// (`as_ptr` is always valid), it simply describes an empty message.

unsafe impl<T> AsDatatype for [T]
where
    T: Equivalence,
{
    type Out = <T as Equivalence>::Out;
    fn as_datatype(&self, _comm: &Communicator) -> Self::Out {
        <T as Equivalence>::equivalent_datatype()
    }
}

unsafe impl<T, const N: usize> AsDatatype for [T; N]
where
    T: Equivalence,
{
    type Out = <T as Equivalence>::Out;
    fn as_datatype(&self, _comm: &Communicator) -> Self::Out {
        <T as Equivalence>::equivalent_datatype()
    }
}

unsafe impl<T> AsDatatype for Vec<T>
where
    T: Equivalence,
{
    type Out = <T as Equivalence>::Out;
    fn as_datatype(&self, _comm: &Communicator) -> Self::Out {
        <T as Equivalence>::equivalent_datatype()
    }
}

unsafe impl<T> Collection for [T]
where
    T: Equivalence,
{
    fn count(&self) -> Count {
        self.len()
            .value_as()
            .expect("length of slice cannot be expressed as a Count")
    }
}

unsafe impl<T, const N: usize> Collection for [T; N]
where
    T: Equivalence,
{
    fn count(&self) -> Count {
        N.value_as()
            .expect("length of array cannot be expressed as a Count")
    }
}

unsafe impl<T> Collection for Vec<T>
where
    T: Equivalence,
{
    fn count(&self) -> Count {
        self.len()
            .value_as()
            .expect("length of vector cannot be expressed as a Count")
    }
}

unsafe impl<T> Pointer for [T]
where
    T: Equivalence,
{
    unsafe fn pointer(&self) -> *const u8 {
        self.as_ptr() as *const u8
    }
}

unsafe impl<T, const N: usize> Pointer for [T; N]
where
    T: Equivalence,
{
    unsafe fn pointer(&self) -> *const u8 {
        self.as_ptr() as *const u8
    }
}

unsafe impl<T> Pointer for Vec<T>
where
    T: Equivalence,
{
    unsafe fn pointer(&self) -> *const u8 {
        self.as_ptr() as *const u8
    }
}

unsafe impl<T> PointerMut for [T]
where
    T: Equivalence,
{
    unsafe fn pointer_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr() as *mut u8
    }
}

unsafe impl<T, const N: usize> PointerMut for [T; N]
where
    T: Equivalence,
{
    unsafe fn pointer_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr() as *mut u8
    }
}

unsafe impl<T> PointerMut for Vec<T>
where
    T: Equivalence,
{
    unsafe fn pointer_mut(&mut self) -> *mut u8 {
        self.as_mut_ptr() as *mut u8
    }
}

unsafe impl<T> Buffer for [T] where T: Equivalence {}
unsafe impl<T, const N: usize> Buffer for [T; N] where T: Equivalence {}
unsafe impl<T> Buffer for Vec<T> where T: Equivalence {}

unsafe impl<T> BufferMut for [T] where T: Equivalence {}
unsafe impl<T, const N: usize> BufferMut for [T; N] where T: Equivalence {}
unsafe impl<T> BufferMut for Vec<T> where T: Equivalence {}

// Node-based lists: one logical element of a composite kind built from the
// node addresses. Taking the descriptor of an empty list is a programming
// error, not a recoverable failure.

unsafe impl<T> AsDatatype for LinkedList<T>
where
    T: Equivalence,
{
    type Out = UserDatatype;

    /// Walks the list once, recording each node's payload address relative
    /// to the first node, and registers the resulting layout as one
    /// composite kind. The layout preserves list iteration order exactly
    /// and is rebuilt on every call; the registration is released when the
    /// returned handle is dropped.
    fn as_datatype(&self, comm: &Communicator) -> Self::Out {
        assert!(!self.is_empty(), "cannot describe an empty list");
        let base = self.front().expect("list is non-empty") as *const T as Address;
        let kind = <T as Equivalence>::equivalent_datatype();
        let blocklengths: SmallVec<[Count; 8]> = self.iter().map(|_| 1).collect();
        let displacements: SmallVec<[Address; 8]> = self
            .iter()
            .map(|node| node as *const T as Address - base)
            .collect();
        let kinds: SmallVec<[&dyn Datatype; 8]> =
            self.iter().map(|_| &kind as &dyn Datatype).collect();
        UserDatatype::structured(comm, &blocklengths, &displacements, &kinds)
    }
}

unsafe impl<T> Collection for LinkedList<T>
where
    T: Equivalence,
{
    // a list is one element of its composite kind
    fn count(&self) -> Count {
        1
    }
}

unsafe impl<T> Pointer for LinkedList<T>
where
    T: Equivalence,
{
    unsafe fn pointer(&self) -> *const u8 {
        self.front().expect("cannot address an empty list") as *const T as *const u8
    }
}

unsafe impl<T> PointerMut for LinkedList<T>
where
    T: Equivalence,
{
    unsafe fn pointer_mut(&mut self) -> *mut u8 {
        self.front_mut().expect("cannot address an empty list") as *mut T as *mut u8
    }
}

unsafe impl<T> Buffer for LinkedList<T> where T: Equivalence {}
unsafe impl<T> BufferMut for LinkedList<T> where T: Equivalence {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Communicator;
    use crate::transport::local::LocalTransport;
    use crate::transport::Context;

    fn single_rank() -> (Arc<LocalTransport>, Communicator) {
        let transport = Arc::new(LocalTransport::new(1));
        let comm = Communicator::new(transport.clone(), Context(0));
        (transport, comm)
    }

    #[test]
    fn scalar_descriptors() {
        let (_, comm) = single_rank();
        let x = 3.25f64;
        assert_eq!(x.count(), 1);
        assert_eq!(
            x.as_datatype(&comm).as_raw(),
            RawDatatype(WireKind::Float64.code())
        );
    }

    #[test]
    fn sequence_descriptors() {
        let (_, comm) = single_rank();
        let v = vec![1u16, 2, 3];
        assert_eq!(v.count(), 3);
        assert_eq!(
            v.as_datatype(&comm).as_raw(),
            RawDatatype(WireKind::Uint16.code())
        );
        let a = [true, false];
        assert_eq!(a.count(), 2);
        assert_eq!(unsafe { a.pointer() }, a.as_ptr() as *const u8);
    }

    #[test]
    fn list_registration_is_released_on_drop() {
        let (transport, comm) = single_rank();
        let list: LinkedList<i32> = [1, 2, 3].into_iter().collect();
        assert_eq!(list.count(), 1);
        let kind = list.as_datatype(&comm);
        assert_eq!(transport.composite_count(), 1);
        let erased = kind.anonymize();
        drop(kind);
        // the erased handle still keeps the registration alive
        assert_eq!(transport.composite_count(), 1);
        drop(erased);
        assert_eq!(transport.composite_count(), 0);
    }

    #[test]
    #[should_panic(expected = "empty list")]
    fn empty_list_is_rejected() {
        let (_, comm) = single_rank();
        let list: LinkedList<i32> = LinkedList::new();
        let _ = list.as_datatype(&comm);
    }
}
