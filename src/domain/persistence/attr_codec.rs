//! Conversion between attribute lists and the store's flat associative array,
//! `[key, value, key, value, ...]` with `key = name[.resource]` and `value = <flags>.<text>`.

use crate::domain::attribute::attr_list::AttrList;
use crate::domain::attribute::flags::AttrFlags;
use crate::error::DbError;

/// Flags that describe the stored value. Modify/cache bits are in-memory bookkeeping only.
const PERSISTED_FLAGS: AttrFlags =
    AttrFlags::from_bits(AttrFlags::SET.bits() | AttrFlags::DEFLT.bits() | AttrFlags::INDIRECT.bits() | AttrFlags::TARGET.bits());

pub fn attrlist_to_dbarray(list: &AttrList) -> Vec<String> {
    let mut raw = Vec::with_capacity(list.len() * 2);
    for entry in list.iter() {
        raw.push(entry.key());
        raw.push(format!("{}.{}", (entry.flags & PERSISTED_FLAGS).bits(), entry.value));
    }
    raw
}

pub fn dbarray_to_attrlist(raw: &[String]) -> Result<AttrList, DbError> {
    if raw.len() % 2 != 0 {
        return Err(DbError::Codec(format!("odd number of elements ({})", raw.len())));
    }

    let mut list = AttrList::new();
    for pair in raw.chunks(2) {
        let (key, encoded) = (&pair[0], &pair[1]);
        if key.is_empty() {
            return Err(DbError::Codec("empty attribute key".to_string()));
        }
        let (name, resc) = match key.split_once('.') {
            Some((name, resc)) => (name, Some(resc)),
            None => (key.as_str(), None),
        };
        let (flags, value) = encoded.split_once('.').ok_or_else(|| DbError::Codec(format!("value of '{}' has no flags", key)))?;
        let flags: u32 = flags.parse().map_err(|_| DbError::Codec(format!("bad flags '{}' on '{}'", flags, key)))?;

        list.add(name, resc, value, AttrFlags::from_bits(flags));
    }
    Ok(list)
}
