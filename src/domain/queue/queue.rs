use std::str::FromStr;

use crate::domain::utils::id::QueueName;
use crate::error::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    Execution,
    Route,
}

impl FromStr for QueueType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "execution" | "e" => Ok(QueueType::Execution),
            "route" | "r" => Ok(QueueType::Route),
            _ => Err(ConversionError::InvalidServerConfig(format!("unknown queue type '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    pub name: QueueName,
    pub qtype: QueueType,
    pub partition: Option<String>,
    /// Some node is associated with this queue.
    pub has_nodes: bool,
}

impl Queue {
    pub fn new(name: impl Into<String>, qtype: QueueType, partition: Option<String>) -> Self {
        Queue { name: QueueName::new(name), qtype, partition, has_nodes: false }
    }
}
