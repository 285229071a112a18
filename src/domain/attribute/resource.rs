use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::attribute::flags::AttrFlags;
use crate::error::{ConversionError, PbsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    Long,
    Size,
    String,
    Boolean,
    StringArray,
}

impl FromStr for ResourceType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(ResourceType::Long),
            "size" => Ok(ResourceType::Size),
            "string" => Ok(ResourceType::String),
            "boolean" => Ok(ResourceType::Boolean),
            "string_array" => Ok(ResourceType::StringArray),
            _ => Err(ConversionError::UnknownResourceType(s.to_string())),
        }
    }
}

/// Definition-level flags, parsed from the letters used in resource definition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceDefFlags {
    /// `n`: consumable at the host (vnode) level.
    pub host_consumable: bool,
    /// `f`: consumable at the chunk level.
    pub chunk_consumable: bool,
    /// `h`: host-level resource.
    pub host_level: bool,
}

impl ResourceDefFlags {
    pub fn parse(letters: &str, resource: &str) -> Result<Self, ConversionError> {
        let mut flags = ResourceDefFlags::default();
        for letter in letters.chars() {
            match letter {
                'n' => flags.host_consumable = true,
                'f' => flags.chunk_consumable = true,
                'h' => flags.host_level = true,
                'q' | 'r' | 'i' | 'm' => {}
                other => return Err(ConversionError::UnknownResourceFlag(other, resource.to_string())),
            }
        }
        Ok(flags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    pub rtype: ResourceType,
    pub flags: ResourceDefFlags,
}

impl ResourceDef {
    pub fn new(name: impl Into<String>, rtype: ResourceType, flags: ResourceDefFlags) -> Self {
        ResourceDef { name: name.into(), rtype, flags }
    }

    /// Consumable resources are tracked in resources_assigned as well as resources_available.
    pub fn is_consumable(&self) -> bool {
        self.flags.host_consumable || self.flags.chunk_consumable
    }
}

/// The server's table of known resource definitions.
#[derive(Debug, Clone, Default)]
pub struct ResourceDefs {
    defs: Vec<ResourceDef>,
    index: HashMap<String, usize>,
}

impl ResourceDefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Definitions every server has, independent of site configuration.
    pub fn builtin() -> Self {
        let consumable = ResourceDefFlags { host_consumable: true, chunk_consumable: false, host_level: true };
        let host_level = ResourceDefFlags { host_level: true, ..Default::default() };

        let mut defs = ResourceDefs::new();
        defs.add(ResourceDef::new("arch", ResourceType::String, ResourceDefFlags::default()));
        defs.add(ResourceDef::new("host", ResourceType::String, host_level));
        defs.add(ResourceDef::new("vnode", ResourceType::String, host_level));
        defs.add(ResourceDef::new("aoe", ResourceType::StringArray, ResourceDefFlags::default()));
        defs.add(ResourceDef::new("mem", ResourceType::Size, consumable));
        defs.add(ResourceDef::new("vmem", ResourceType::Size, consumable));
        defs.add(ResourceDef::new("ncpus", ResourceType::Long, consumable));
        defs.add(ResourceDef::new("naccelerators", ResourceType::Long, consumable));
        defs
    }

    /// Adds or replaces a definition.
    pub fn add(&mut self, def: ResourceDef) {
        match self.index.get(&def.name) {
            Some(&pos) => self.defs[pos] = def,
            None => {
                self.index.insert(def.name.clone(), self.defs.len());
                self.defs.push(def);
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&ResourceDef> {
        self.index.get(name).map(|&pos| &self.defs[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceValue {
    Unset,
    Long(i64),
    Size(String),
    Str(String),
    Bool(bool),
    StrArray(Vec<String>),
}

impl ResourceValue {
    /// Decodes `text` for a resource of type `rtype`. A leading `@` always yields a string
    /// (the indirect reference) regardless of the declared type.
    pub fn decode(rtype: ResourceType, text: &str) -> Result<ResourceValue, PbsError> {
        if text.starts_with('@') {
            return Ok(ResourceValue::Str(text.to_string()));
        }
        match rtype {
            ResourceType::Long => text.trim().parse::<i64>().map(ResourceValue::Long).map_err(|_| PbsError::BadAtVal),
            ResourceType::Size => {
                let text = text.trim().to_ascii_lowercase();
                let digits = text.trim_end_matches(|c: char| c.is_ascii_alphabetic());
                let unit = &text[digits.len()..];
                if digits.is_empty() || digits.parse::<u64>().is_err() {
                    return Err(PbsError::BadAtVal);
                }
                match unit {
                    "" | "b" | "w" | "kb" | "kw" | "mb" | "mw" | "gb" | "gw" | "tb" | "tw" | "pb" | "pw" => Ok(ResourceValue::Size(text)),
                    _ => Err(PbsError::BadAtVal),
                }
            }
            ResourceType::String => Ok(ResourceValue::Str(text.to_string())),
            ResourceType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "y" | "1" => Ok(ResourceValue::Bool(true)),
                "false" | "f" | "n" | "0" => Ok(ResourceValue::Bool(false)),
                _ => Err(PbsError::BadAtVal),
            },
            ResourceType::StringArray => Ok(ResourceValue::StrArray(text.split(',').map(|s| s.trim().to_string()).collect())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ResourceValue::Unset => String::new(),
            ResourceValue::Long(v) => v.to_string(),
            ResourceValue::Size(v) | ResourceValue::Str(v) => v.clone(),
            ResourceValue::Bool(true) => "True".to_string(),
            ResourceValue::Bool(false) => "False".to_string(),
            ResourceValue::StrArray(v) => v.join(","),
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            ResourceValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

/// One (definition, value) pair of a resource-list attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: ResourceValue,
    pub flags: AttrFlags,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Resource { name: name.into(), value: ResourceValue::Unset, flags: AttrFlags::NONE }
    }

    pub fn is_set(&self) -> bool {
        self.flags.contains(AttrFlags::SET)
    }

    pub fn is_indirect(&self) -> bool {
        self.flags.contains(AttrFlags::INDIRECT)
    }

    pub fn is_target(&self) -> bool {
        self.flags.contains(AttrFlags::TARGET)
    }

    pub fn is_modified(&self) -> bool {
        self.flags.contains(AttrFlags::MODIFY)
    }

    /// Name of the node an indirect value points at (the text after `@`).
    pub fn indirect_target(&self) -> Option<&str> {
        match &self.value {
            ResourceValue::Str(s) => s.strip_prefix('@'),
            _ => None,
        }
    }

    /// Installs a decoded value, marking the entry set, modified and indirect when it is a reference.
    pub fn set_value(&mut self, value: ResourceValue) {
        let indirect = matches!(&value, ResourceValue::Str(s) if s.starts_with('@'));
        self.value = value;
        self.flags.insert(AttrFlags::SET | AttrFlags::MODIFY | AttrFlags::MODCACHE);
        if indirect {
            self.flags.insert(AttrFlags::INDIRECT);
        } else {
            self.flags.remove(AttrFlags::INDIRECT);
        }
    }
}

/// Ordered list of resources making up resources_available or resources_assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    entries: Vec<Resource>,
}

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&Resource> {
        self.entries.iter().find(|r| r.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.entries.iter_mut().find(|r| r.name == name)
    }

    /// Returns the entry for `name`, appending an unset one if absent.
    pub fn add_entry(&mut self, name: &str) -> &mut Resource {
        let pos = match self.entries.iter().position(|r| r.name == name) {
            Some(pos) => pos,
            None => {
                self.entries.push(Resource::new(name));
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos]
    }

    pub fn remove(&mut self, name: &str) -> Option<Resource> {
        let pos = self.entries.iter().position(|r| r.name == name)?;
        Some(self.entries.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear_modify(&mut self) {
        for entry in &mut self.entries {
            entry.flags.remove(AttrFlags::MODIFY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_reference_decodes_as_string_for_any_type() {
        let value = ResourceValue::decode(ResourceType::Long, "@n2").unwrap();
        let mut entry = Resource::new("ncpus");
        entry.set_value(value);

        assert!(entry.is_indirect());
        assert_eq!(entry.indirect_target(), Some("n2"));

        entry.set_value(ResourceValue::Long(4));
        assert!(!entry.is_indirect(), "A direct value must clear the indirect flag");
    }

    #[test]
    fn size_values_require_a_known_unit() {
        assert_eq!(ResourceValue::decode(ResourceType::Size, "8GB").unwrap(), ResourceValue::Size("8gb".into()));
        assert_eq!(ResourceValue::decode(ResourceType::Size, "8zz"), Err(PbsError::BadAtVal));
        assert_eq!(ResourceValue::decode(ResourceType::Size, "gb"), Err(PbsError::BadAtVal));
    }

    #[test]
    fn flag_letters_parse() {
        let flags = ResourceDefFlags::parse("nh", "foo").unwrap();
        assert!(flags.host_consumable && flags.host_level && !flags.chunk_consumable);
        assert!(ResourceDefFlags::parse("x", "foo").is_err());
    }
}
