//! PropertyMap — the key-value store on nodes and relationships.

use std::collections::HashMap;

use super::Value;
use crate::size::{Size, SizeOf};

/// A map of property names to values.
pub type PropertyMap = HashMap<String, Value>;

impl SizeOf for PropertyMap {
    fn size_of(&self) -> Size {
        Size::of::<PropertyMap>()
            + Size::of_slots::<(String, Value)>(self.capacity())
            + self
                .iter()
                .map(|(k, v)| Size(k.capacity() as u64) + v.size_of())
                .sum()
    }
}
