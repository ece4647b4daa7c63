//! Byte-size accounting for in-flight traversal state.
//!
//! Sizes here are estimates of heap and inline footprint, good enough to
//! compare against a configured ceiling. They are not allocator-exact.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// A count of bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Size(pub u64);

const MEBIBYTE: u64 = 1024 * 1024;

impl Size {
    pub const fn bytes(self) -> u64 {
        self.0
    }

    pub const fn from_mebibytes(mebibytes: u64) -> Self {
        Size(mebibytes * MEBIBYTE)
    }

    pub const fn from_gibibytes(gibibytes: u64) -> Self {
        Size(gibibytes * 1024 * MEBIBYTE)
    }

    pub fn mebibytes(self) -> f64 {
        self.0 as f64 / MEBIBYTE as f64
    }

    /// Inline size of a value of type `T`.
    pub const fn of<T>() -> Self {
        Size(std::mem::size_of::<T>() as u64)
    }

    /// Size of `capacity` slots of `T`, as held by a `Vec` backing buffer.
    pub const fn of_slots<T>(capacity: usize) -> Self {
        Size((std::mem::size_of::<T>() * capacity) as u64)
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        Size(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, rhs: Size) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for Size {
    fn sum<I: Iterator<Item = Size>>(iter: I) -> Size {
        iter.fold(Size::default(), Add::add)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} MB", self.mebibytes())
    }
}

/// Estimated memory footprint of a value, including what it owns on the heap.
pub trait SizeOf {
    fn size_of(&self) -> Size;
}

impl SizeOf for String {
    fn size_of(&self) -> Size {
        Size::of::<String>() + Size(self.capacity() as u64)
    }
}

impl<T: SizeOf> SizeOf for Option<T> {
    fn size_of(&self) -> Size {
        match self {
            Some(inner) => inner.size_of(),
            None => Size::of::<Option<T>>(),
        }
    }
}
