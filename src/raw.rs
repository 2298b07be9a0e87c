//! Bridge between the typed layer and raw transport handles

/// Raw handle traits
pub mod traits {
    pub use super::AsRaw;
}

/// A rust type than can identify as a raw transport handle
///
/// # Safety
///
/// The handle returned by `as_raw()` must remain valid for as long as the
/// implementing object is alive.
pub unsafe trait AsRaw {
    /// The raw handle type
    type Raw;
    /// The raw value of the handle
    fn as_raw(&self) -> Self::Raw;
}

unsafe impl<'a, T> AsRaw for &'a T
where
    T: 'a + AsRaw,
{
    type Raw = <T as AsRaw>::Raw;
    fn as_raw(&self) -> Self::Raw {
        (*self).as_raw()
    }
}
