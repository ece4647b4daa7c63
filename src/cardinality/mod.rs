//! # Cardinality Providers
//!
//! Set structures over 32- and 64-bit integer identifier spaces, exposed in
//! two capability tiers:
//!
//! | Tier | Backings | Capabilities |
//! |------|----------|--------------|
//! | [`Simplex`] | [`HyperLogLog32`], [`HyperLogLog64`] | write-only add, merge, approximate cardinality |
//! | [`Duplex`] | [`Bitmap32`], [`Bitmap64`] | exact add/remove/contains/enumerate and set algebra |
//!
//! Operations between two providers of the same concrete type take the
//! backing's native fast path. Anything else falls back to enumerating the
//! other operand through [`Duplex::each`], so the cost of a cross-type
//! operation depends on which side is `self`.
//!
//! `or` against a provider that is neither the same concrete type nor a
//! [`Duplex`] (for example, merging a sketch into a bitmap) is a silent no-op.
//!
//! None of these types lock. Wrap them in [`ThreadSafeDuplex`] or
//! [`ThreadSafeSimplex`] to share them across workers.

mod bitmap;
mod hyperloglog;
mod thread_safe;

use std::any::Any;

pub use bitmap::{Bitmap32, Bitmap64};
pub use hyperloglog::{HyperLogLog, HyperLogLog32, HyperLogLog64, SketchValue, DEFAULT_PRECISION};
pub use thread_safe::{ThreadSafeDuplex, ThreadSafeSimplex};

use crate::model::NodeId;

/// Common contract of every cardinality provider.
pub trait Provider: Any + Send + Sync {
    /// The identifier universe, `u32` or `u64`.
    type Value: Copy + Eq + Send + Sync + 'static;

    fn add(&mut self, values: &[Self::Value]);

    /// Merge `other` into this provider.
    fn or(&mut self, other: &dyn Provider<Value = Self::Value>);

    fn clear(&mut self);

    fn cardinality(&self) -> u64;

    fn clone_provider(&self) -> Box<dyn Provider<Value = Self::Value>>;

    fn as_any(&self) -> &dyn Any;

    /// The exact view of this provider, if it has one.
    fn as_duplex(&self) -> Option<&dyn Duplex<Value = Self::Value>> {
        None
    }
}

/// One-way approximate provider. Re-adding a value never changes the estimate.
pub trait Simplex: Provider {
    fn clone_simplex(&self) -> Box<dyn Simplex<Value = Self::Value>>;
}

/// Exact, reversible provider.
pub trait Duplex: Provider {
    fn xor(&mut self, other: &dyn Duplex<Value = Self::Value>);

    fn and(&mut self, other: &dyn Duplex<Value = Self::Value>);

    fn and_not(&mut self, other: &dyn Duplex<Value = Self::Value>);

    fn remove(&mut self, value: Self::Value);

    /// Every member in ascending order.
    fn slice(&self) -> Vec<Self::Value>;

    fn contains(&self, value: Self::Value) -> bool;

    /// Visit members in ascending order until the delegate returns false.
    fn each(&self, delegate: &mut dyn FnMut(Self::Value) -> bool);

    /// Adds `value`, returning true if it was not already present.
    fn checked_add(&mut self, value: Self::Value) -> bool;

    fn clone_duplex(&self) -> Box<dyn Duplex<Value = Self::Value>>;
}

pub fn new_bitmap32() -> Bitmap32 {
    Bitmap32::new()
}

pub fn new_bitmap64() -> Bitmap64 {
    Bitmap64::new()
}

pub fn new_hyperloglog32() -> HyperLogLog32 {
    HyperLogLog32::new()
}

pub fn new_hyperloglog64() -> HyperLogLog64 {
    HyperLogLog64::new()
}

/// Members of a 32-bit exact set as node ids.
pub fn duplex_to_node_ids(provider: &dyn Duplex<Value = u32>) -> Vec<NodeId> {
    let mut ids = Vec::with_capacity(provider.cardinality() as usize);
    provider.each(&mut |value| {
        ids.push(NodeId::from(value));
        true
    });
    ids
}
