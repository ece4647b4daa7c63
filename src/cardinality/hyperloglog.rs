//! Simplex providers: fixed-register HyperLogLog sketches.
//!
//! Values are hashed from their little-endian encoding with xxh64. The top
//! `precision` bits of the hash select a register; the register keeps the
//! largest leading-zero rank seen in the remaining bits. Cardinality uses
//! Ertl's improved raw estimator, which needs neither bias tables nor a
//! separate linear-counting range.
//!
//! At the default precision of 16 (65 536 one-byte registers) the standard
//! error is about 0.41%; ten million distinct 64-bit values estimate within
//! 0.58% of the true count.

use std::any::Any;
use std::marker::PhantomData;

use xxhash_rust::xxh64::xxh64;

use super::{Provider, Simplex};

pub const DEFAULT_PRECISION: u8 = 16;

const MIN_PRECISION: u8 = 4;
const MAX_PRECISION: u8 = 18;

/// `1 / (2 ln 2)`, the asymptotic bias constant of the estimator.
const ALPHA_INF: f64 = 0.721_347_520_444_481_7;

/// A value that can be inserted into a sketch.
pub trait SketchValue: Copy + Eq + Send + Sync + 'static {
    fn sketch_hash(self) -> u64;
}

impl SketchValue for u32 {
    fn sketch_hash(self) -> u64 {
        xxh64(&self.to_le_bytes(), 0)
    }
}

impl SketchValue for u64 {
    fn sketch_hash(self) -> u64 {
        xxh64(&self.to_le_bytes(), 0)
    }
}

/// HyperLogLog sketch over values of type `T`.
#[derive(Debug, Clone)]
pub struct HyperLogLog<T> {
    precision: u8,
    registers: Vec<u8>,
    _value: PhantomData<fn(T)>,
}

/// Sketch with 32-bit insertion width.
pub type HyperLogLog32 = HyperLogLog<u32>;

/// Sketch with 64-bit insertion width.
pub type HyperLogLog64 = HyperLogLog<u64>;

impl<T: SketchValue> Default for HyperLogLog<T> {
    fn default() -> Self {
        Self::with_precision(DEFAULT_PRECISION)
    }
}

impl<T: SketchValue> HyperLogLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sketch with `2^precision` registers. Precision is clamped to `4..=18`.
    pub fn with_precision(precision: u8) -> Self {
        let precision = precision.clamp(MIN_PRECISION, MAX_PRECISION);

        Self {
            precision,
            registers: vec![0; 1 << precision],
            _value: PhantomData,
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    fn insert_hash(&mut self, hash: u64) {
        let index = (hash >> (64 - self.precision)) as usize;
        let remainder = hash << self.precision;
        let max_rank = 64 - self.precision + 1;
        let rank = (remainder.leading_zeros() as u8 + 1).min(max_rank);

        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    /// Register-wise max. Only valid for sketches of equal precision.
    fn merge(&mut self, other: &HyperLogLog<T>) {
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
    }

    fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let q = 64 - self.precision as usize;

        let mut histogram = vec![0u64; q + 2];
        for register in &self.registers {
            histogram[*register as usize] += 1;
        }

        let mut z = m * tau((m - histogram[q + 1] as f64) / m);
        for k in (1..=q).rev() {
            z += histogram[k] as f64;
            z *= 0.5;
        }
        z += m * sigma(histogram[0] as f64 / m);

        ALPHA_INF * m * m / z
    }
}

fn sigma(mut x: f64) -> f64 {
    if x == 1.0 {
        return f64::INFINITY;
    }

    let mut y = 1.0;
    let mut z = x;

    loop {
        x *= x;
        let previous = z;
        z += x * y;
        y += y;

        if previous == z {
            return z;
        }
    }
}

fn tau(mut x: f64) -> f64 {
    if x == 0.0 || x == 1.0 {
        return 0.0;
    }

    let mut y = 1.0;
    let mut z = 1.0 - x;

    loop {
        x = x.sqrt();
        let previous = z;
        y *= 0.5;
        z -= (1.0 - x).powi(2) * y;

        if previous == z {
            return z / 3.0;
        }
    }
}

impl<T: SketchValue> Provider for HyperLogLog<T> {
    type Value = T;

    fn add(&mut self, values: &[T]) {
        for value in values {
            self.insert_hash(value.sketch_hash());
        }
    }

    /// Merges another sketch of the same width and precision, or enumerates
    /// an exact provider into this one. Anything else is ignored.
    fn or(&mut self, other: &dyn Provider<Value = T>) {
        if let Some(other) = other.as_any().downcast_ref::<HyperLogLog<T>>() {
            if other.precision == self.precision {
                self.merge(other);
            }
        } else if let Some(other) = other.as_duplex() {
            other.each(&mut |value| {
                self.insert_hash(value.sketch_hash());
                true
            });
        }
    }

    fn clear(&mut self) {
        self.registers.fill(0);
    }

    fn cardinality(&self) -> u64 {
        self.estimate().round() as u64
    }

    fn clone_provider(&self) -> Box<dyn Provider<Value = T>> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T: SketchValue> Simplex for HyperLogLog<T> {
    fn clone_simplex(&self) -> Box<dyn Simplex<Value = T>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relative_error(estimate: u64, actual: u64) -> f64 {
        (estimate as f64 - actual as f64).abs() / actual as f64
    }

    #[test]
    fn test_empty_sketch_is_zero() {
        assert_eq!(HyperLogLog64::new().cardinality(), 0);
        assert_eq!(HyperLogLog32::new().cardinality(), 0);
    }

    #[test]
    fn test_small_cardinalities_are_near_exact() {
        let mut sketch = HyperLogLog64::new();
        sketch.add(&(0..100).collect::<Vec<u64>>());

        assert!(relative_error(sketch.cardinality(), 100) < 0.02);
    }

    #[test]
    fn test_readding_does_not_change_estimate() {
        let values: Vec<u64> = (0..50_000).map(|v| v * 7919).collect();

        let mut sketch = HyperLogLog64::new();
        sketch.add(&values);
        let first = sketch.cardinality();

        sketch.add(&values);
        sketch.add(&values[..1000]);
        assert_eq!(sketch.cardinality(), first);
    }

    #[test]
    fn test_large_cardinality_within_bound() {
        let mut sketch = HyperLogLog64::new();
        let values: Vec<u64> = (0..1_000_000).collect();
        sketch.add(&values);

        assert!(relative_error(sketch.cardinality(), 1_000_000) < 0.02);
    }

    #[test]
    #[ignore = "inserts ten million values; run with --release -- --ignored"]
    fn test_ten_million_within_documented_bound() {
        let mut sketch = HyperLogLog64::new();
        let mut chunk = Vec::with_capacity(1_000_000);

        for start in (0..10_000_000u64).step_by(1_000_000) {
            chunk.clear();
            chunk.extend(start..start + 1_000_000);
            sketch.add(&chunk);
        }

        let err = relative_error(sketch.cardinality(), 10_000_000);
        assert!(err < 0.0058, "relative error {err} at 10M");
    }

    #[test]
    fn test_merge_approximates_union() {
        let mut left = HyperLogLog32::new();
        let mut right = HyperLogLog32::new();

        left.add(&(0..300_000).collect::<Vec<u32>>());
        right.add(&(200_000..500_000).collect::<Vec<u32>>());

        let mut merged = left.clone();
        merged.or(&right);
        assert!(relative_error(merged.cardinality(), 500_000) < 0.02);

        // Merge is commutative.
        let mut reversed = right.clone();
        reversed.or(&left);
        assert_eq!(merged.cardinality(), reversed.cardinality());
    }

    #[test]
    fn test_merge_ignores_mismatched_precision() {
        let mut left = HyperLogLog64::with_precision(12);
        let mut right = HyperLogLog64::with_precision(14);
        right.add(&[1, 2, 3]);

        left.or(&right);
        assert_eq!(left.cardinality(), 0);
    }

    #[test]
    fn test_clear() {
        let mut sketch = HyperLogLog64::new();
        sketch.add(&[1, 2, 3]);
        sketch.clear();
        assert_eq!(sketch.cardinality(), 0);
    }
}
