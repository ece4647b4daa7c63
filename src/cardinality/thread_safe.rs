//! Locking decorators for sharing providers across workers.
//!
//! Each method takes the single lock for its own duration only. Two calls in
//! a row are not atomic together; use `checked_add` rather than
//! `contains` followed by `add`.

use std::any::Any;

use parking_lot::Mutex;

use super::{Duplex, Provider, Simplex};

/// A [`Duplex`] provider behind one mutex.
#[derive(Debug, Default)]
pub struct ThreadSafeDuplex<D> {
    inner: Mutex<D>,
}

impl<D: Duplex + Clone> ThreadSafeDuplex<D> {
    pub fn new(provider: D) -> Self {
        Self {
            inner: Mutex::new(provider),
        }
    }

    pub fn add(&self, values: &[D::Value]) {
        self.inner.lock().add(values);
    }

    /// Atomic test-and-insert.
    pub fn checked_add(&self, value: D::Value) -> bool {
        self.inner.lock().checked_add(value)
    }

    pub fn contains(&self, value: D::Value) -> bool {
        self.inner.lock().contains(value)
    }

    pub fn remove(&self, value: D::Value) {
        self.inner.lock().remove(value);
    }

    pub fn cardinality(&self) -> u64 {
        self.inner.lock().cardinality()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn slice(&self) -> Vec<D::Value> {
        self.inner.lock().slice()
    }

    /// Merge `other` into this set. `other` must not be this same instance.
    pub fn or(&self, other: &dyn Provider<Value = D::Value>) {
        self.inner.lock().or(other);
    }

    /// Copy of the wrapped provider taken under the lock.
    pub fn snapshot(&self) -> D {
        self.inner.lock().clone()
    }

    pub fn into_inner(self) -> D {
        self.inner.into_inner()
    }
}

impl<D: Duplex + Clone> Provider for ThreadSafeDuplex<D> {
    type Value = D::Value;

    fn add(&mut self, values: &[D::Value]) {
        self.inner.get_mut().add(values);
    }

    fn or(&mut self, other: &dyn Provider<Value = D::Value>) {
        self.inner.get_mut().or(other);
    }

    fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    fn cardinality(&self) -> u64 {
        self.inner.lock().cardinality()
    }

    fn clone_provider(&self) -> Box<dyn Provider<Value = D::Value>> {
        Box::new(ThreadSafeDuplex::new(self.snapshot()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_duplex(&self) -> Option<&dyn Duplex<Value = D::Value>> {
        Some(self)
    }
}

impl<D: Duplex + Clone> Duplex for ThreadSafeDuplex<D> {
    fn xor(&mut self, other: &dyn Duplex<Value = D::Value>) {
        self.inner.get_mut().xor(other);
    }

    fn and(&mut self, other: &dyn Duplex<Value = D::Value>) {
        self.inner.get_mut().and(other);
    }

    fn and_not(&mut self, other: &dyn Duplex<Value = D::Value>) {
        self.inner.get_mut().and_not(other);
    }

    fn remove(&mut self, value: D::Value) {
        self.inner.get_mut().remove(value);
    }

    fn slice(&self) -> Vec<D::Value> {
        self.inner.lock().slice()
    }

    fn contains(&self, value: D::Value) -> bool {
        self.inner.lock().contains(value)
    }

    /// Holds the lock for the whole enumeration.
    fn each(&self, delegate: &mut dyn FnMut(D::Value) -> bool) {
        self.inner.lock().each(delegate);
    }

    fn checked_add(&mut self, value: D::Value) -> bool {
        self.inner.get_mut().checked_add(value)
    }

    fn clone_duplex(&self) -> Box<dyn Duplex<Value = D::Value>> {
        Box::new(ThreadSafeDuplex::new(self.snapshot()))
    }
}

/// A [`Simplex`] provider behind one mutex.
#[derive(Debug, Default)]
pub struct ThreadSafeSimplex<S> {
    inner: Mutex<S>,
}

impl<S: Simplex + Clone> ThreadSafeSimplex<S> {
    pub fn new(provider: S) -> Self {
        Self {
            inner: Mutex::new(provider),
        }
    }

    pub fn add(&self, values: &[S::Value]) {
        self.inner.lock().add(values);
    }

    pub fn cardinality(&self) -> u64 {
        self.inner.lock().cardinality()
    }

    pub fn or(&self, other: &dyn Provider<Value = S::Value>) {
        self.inner.lock().or(other);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn snapshot(&self) -> S {
        self.inner.lock().clone()
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

impl<S: Simplex + Clone> Provider for ThreadSafeSimplex<S> {
    type Value = S::Value;

    fn add(&mut self, values: &[S::Value]) {
        self.inner.get_mut().add(values);
    }

    fn or(&mut self, other: &dyn Provider<Value = S::Value>) {
        self.inner.get_mut().or(other);
    }

    fn clear(&mut self) {
        self.inner.get_mut().clear();
    }

    fn cardinality(&self) -> u64 {
        self.inner.lock().cardinality()
    }

    fn clone_provider(&self) -> Box<dyn Provider<Value = S::Value>> {
        Box::new(ThreadSafeSimplex::new(self.snapshot()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S: Simplex + Clone> Simplex for ThreadSafeSimplex<S> {
    fn clone_simplex(&self) -> Box<dyn Simplex<Value = S::Value>> {
        Box::new(ThreadSafeSimplex::new(self.snapshot()))
    }
}
