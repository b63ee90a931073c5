//! Utilities for indexing.

/// Index into an object, returning an owned value.
///
/// Unlike [`std::ops::Index`], implementors build a new value
/// (for example a bit slice expression) instead of handing out a reference.
pub trait IndexOwned<Idx>
where
    Idx: ?Sized,
{
    type Output;

    fn index(&self, index: Idx) -> Self::Output;
}
