//! The browse catalog: image key -> optional annotation reference.

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

/// Annotation reference for one image, with content embedded on request.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub annotation: String,
    pub content: Option<Value>,
}

/// Ordered mapping that serializes as a JSON object in listing order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    entries: Vec<(String, Option<CatalogEntry>)>,
}

impl Catalog {
    pub fn push(&mut self, image: String, entry: Option<CatalogEntry>) {
        self.entries.push((image, entry));
    }

    #[cfg(test)]
    pub fn get(&self, image: &str) -> Option<&Option<CatalogEntry>> {
        self.entries
            .iter()
            .find(|(name, _)| name == image)
            .map(|(_, entry)| entry)
    }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}
