use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// A name tagged with the kind of object it names, so a queue name cannot be passed where a
/// node name is expected.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T> {
    name: String,
    #[serde(skip)]
    _kind: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Id { name: name.into(), _kind: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl<T> AsRef<str> for Id<T> {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl<T> From<&str> for Id<T> {
    fn from(name: &str) -> Self {
        Id::new(name)
    }
}

impl<T> From<Id<T>> for String {
    fn from(id: Id<T>) -> Self {
        id.name
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<T: Kind> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", T::LABEL, self.name)
    }
}

pub trait Kind {
    const LABEL: &'static str;
}

macro_rules! id_kind {
    ($tag:ident, $alias:ident, $label:literal) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
        pub struct $tag;
        impl Kind for $tag {
            const LABEL: &'static str = $label;
        }
        pub type $alias = Id<$tag>;
    };
}

id_kind!(NodeTag, NodeName, "Node");
id_kind!(QueueTag, QueueName, "Queue");
id_kind!(SchedTag, SchedName, "Sched");
id_kind!(JobTag, JobId, "Job");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", NodeName::new("n1")), "Node(\"n1\")");
        assert_eq!(QueueName::from("workq").to_string(), "workq");
    }
}
