use serde::{Deserialize, Serialize};

use crate::domain::attribute::flags::AttrFlags;
use crate::domain::attribute::resource::ResourceList;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttrValue {
    #[default]
    Unset,
    Long(i64),
    Bool(bool),
    Char(char),
    Str(String),
    StrArray(Vec<String>),
    Resources(ResourceList),
}

/// A typed attribute slot with its status flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attribute {
    pub value: AttrValue,
    pub flags: AttrFlags,
}

impl Attribute {
    pub fn is_set(&self) -> bool {
        self.flags.contains(AttrFlags::SET)
    }

    pub fn is_modified(&self) -> bool {
        self.flags.contains(AttrFlags::MODIFY)
    }

    pub fn is_default(&self) -> bool {
        self.flags.contains(AttrFlags::DEFLT)
    }

    /// Explicit assignment: set, modified, cache stale, no longer a default.
    pub fn set(&mut self, value: AttrValue) {
        self.value = value;
        self.flags.insert(AttrFlags::SET | AttrFlags::MODIFY | AttrFlags::MODCACHE);
        self.flags.remove(AttrFlags::DEFLT);
    }

    pub fn set_default(&mut self, value: AttrValue) {
        self.value = value;
        self.flags.insert(AttrFlags::SET | AttrFlags::DEFLT | AttrFlags::MODCACHE);
    }

    /// Drops the value; the slot stays flagged as modified so the removal gets saved.
    pub fn clear(&mut self) {
        self.value = AttrValue::Unset;
        self.flags.remove(AttrFlags::SET | AttrFlags::DEFLT);
        self.flags.insert(AttrFlags::MODIFY | AttrFlags::MODCACHE);
    }

    pub fn as_long(&self) -> Option<i64> {
        match (&self.value, self.is_set()) {
            (AttrValue::Long(v), true) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match (&self.value, self.is_set()) {
            (AttrValue::Str(v), true) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match (&self.value, self.is_set()) {
            (AttrValue::Char(v), true) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str_array(&self) -> &[String] {
        match &self.value {
            AttrValue::StrArray(v) => v,
            _ => &[],
        }
    }

    pub fn resources(&self) -> Option<&ResourceList> {
        match &self.value {
            AttrValue::Resources(list) => Some(list),
            _ => None,
        }
    }

    /// Resource list of this slot, turning the slot into an empty list first when needed.
    pub fn resources_mut(&mut self) -> &mut ResourceList {
        if !matches!(self.value, AttrValue::Resources(_)) {
            self.value = AttrValue::Resources(ResourceList::new());
        }
        match &mut self.value {
            AttrValue::Resources(list) => list,
            _ => unreachable!("slot was just converted to a resource list"),
        }
    }

    pub fn clear_modify(&mut self) {
        self.flags.remove(AttrFlags::MODIFY);
        if let AttrValue::Resources(list) = &mut self.value {
            list.clear_modify();
        }
    }
}
