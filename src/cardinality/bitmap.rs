//! Exact Duplex providers backed by roaring bitmaps.

use std::any::Any;

use roaring::{RoaringBitmap, RoaringTreemap};

use super::{Duplex, Provider};

macro_rules! roaring_duplex {
    ($(#[$meta:meta])* $name:ident, $backing:ty, $value:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            bitmap: $backing,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    bitmap: <$backing>::new(),
                }
            }
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn is_empty(&self) -> bool {
                self.bitmap.is_empty()
            }

            /// Borrow the underlying roaring structure.
            pub fn as_roaring(&self) -> &$backing {
                &self.bitmap
            }
        }

        impl FromIterator<$value> for $name {
            fn from_iter<I: IntoIterator<Item = $value>>(iter: I) -> Self {
                Self {
                    bitmap: iter.into_iter().collect(),
                }
            }
        }

        impl Provider for $name {
            type Value = $value;

            fn add(&mut self, values: &[$value]) {
                self.bitmap.extend(values.iter().copied());
            }

            fn or(&mut self, other: &dyn Provider<Value = $value>) {
                if let Some(other) = other.as_any().downcast_ref::<$name>() {
                    self.bitmap |= &other.bitmap;
                } else if let Some(other) = other.as_duplex() {
                    other.each(&mut |value| {
                        self.bitmap.insert(value);
                        true
                    });
                }
            }

            fn clear(&mut self) {
                self.bitmap.clear();
            }

            fn cardinality(&self) -> u64 {
                self.bitmap.len()
            }

            fn clone_provider(&self) -> Box<dyn Provider<Value = $value>> {
                Box::new(self.clone())
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_duplex(&self) -> Option<&dyn Duplex<Value = $value>> {
                Some(self)
            }
        }

        impl Duplex for $name {
            fn xor(&mut self, other: &dyn Duplex<Value = $value>) {
                if let Some(other) = other.as_any().downcast_ref::<$name>() {
                    self.bitmap ^= &other.bitmap;
                } else {
                    other.each(&mut |value| {
                        if !self.bitmap.remove(value) {
                            self.bitmap.insert(value);
                        }
                        true
                    });
                }
            }

            fn and(&mut self, other: &dyn Duplex<Value = $value>) {
                if let Some(other) = other.as_any().downcast_ref::<$name>() {
                    self.bitmap &= &other.bitmap;
                } else {
                    let missing: Vec<$value> = self
                        .bitmap
                        .iter()
                        .filter(|value| !other.contains(*value))
                        .collect();

                    for value in missing {
                        self.bitmap.remove(value);
                    }
                }
            }

            fn and_not(&mut self, other: &dyn Duplex<Value = $value>) {
                if let Some(other) = other.as_any().downcast_ref::<$name>() {
                    self.bitmap -= &other.bitmap;
                } else {
                    other.each(&mut |value| {
                        self.bitmap.remove(value);
                        true
                    });
                }
            }

            fn remove(&mut self, value: $value) {
                self.bitmap.remove(value);
            }

            fn slice(&self) -> Vec<$value> {
                self.bitmap.iter().collect()
            }

            fn contains(&self, value: $value) -> bool {
                self.bitmap.contains(value)
            }

            fn each(&self, delegate: &mut dyn FnMut($value) -> bool) {
                for value in self.bitmap.iter() {
                    if !delegate(value) {
                        break;
                    }
                }
            }

            fn checked_add(&mut self, value: $value) -> bool {
                self.bitmap.insert(value)
            }

            fn clone_duplex(&self) -> Box<dyn Duplex<Value = $value>> {
                Box::new(self.clone())
            }
        }
    };
}

roaring_duplex!(
    /// Exact set over the 32-bit universe.
    Bitmap32, RoaringBitmap, u32
);

roaring_duplex!(
    /// Exact set over the 64-bit universe.
    Bitmap64, RoaringTreemap, u64
);
