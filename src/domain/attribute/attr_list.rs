use serde::{Deserialize, Serialize};

use crate::domain::attribute::flags::AttrFlags;

/// One encoded attribute (or attribute resource) as exchanged with the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrListEntry {
    pub name: String,
    pub resc: Option<String>,
    pub value: String,
    pub flags: AttrFlags,
}

impl AttrListEntry {
    /// Storage key, `name` or `name.resource`.
    pub fn key(&self) -> String {
        match &self.resc {
            Some(resc) => format!("{}.{}", self.name, resc),
            None => self.name.clone(),
        }
    }
}

/// Attribute list ordered by insertion; `(name, resc)` is unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrList {
    entries: Vec<AttrListEntry>,
}

impl AttrList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry; an existing entry with the same key is overwritten in place.
    pub fn add(&mut self, name: &str, resc: Option<&str>, value: impl Into<String>, flags: AttrFlags) {
        let value = value.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name && e.resc.as_deref() == resc) {
            existing.value = value;
            existing.flags = flags;
            return;
        }
        self.entries.push(AttrListEntry { name: name.to_string(), resc: resc.map(str::to_string), value, flags });
    }

    pub fn find(&self, name: &str, resc: Option<&str>) -> Option<&AttrListEntry> {
        self.entries.iter().find(|e| e.name == name && e.resc.as_deref() == resc)
    }

    pub fn remove(&mut self, name: &str, resc: Option<&str>) -> Option<AttrListEntry> {
        let pos = self.entries.iter().position(|e| e.name == name && e.resc.as_deref() == resc)?;
        Some(self.entries.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttrListEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, other: &AttrList) {
        for entry in other.iter() {
            self.add(&entry.name, entry.resc.as_deref(), entry.value.clone(), entry.flags);
        }
    }
}

impl FromIterator<AttrListEntry> for AttrList {
    fn from_iter<I: IntoIterator<Item = AttrListEntry>>(iter: I) -> Self {
        let mut list = AttrList::new();
        for entry in iter {
            list.add(&entry.name, entry.resc.as_deref(), entry.value, entry.flags);
        }
        list
    }
}
