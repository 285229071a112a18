//! Reader for the legacy flat-file node description (`server_priv/nodes`) and its
//! companion state file (`server_priv/node_state`).

use std::fs;
use std::path::Path;

use crate::domain::node::node::VnodeSharing;
use crate::error::{NodesFileError, Result};

/// The only version of the nodes file format that can be read.
pub const NODES_FILE_VERSION: i64 = 2;

const VERSION_KEYWORD: &str = "node_file_ver";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFileAttr {
    pub name: String,
    pub resc: Option<String>,
    pub value: String,
}

/// One node line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodesFileEntry {
    pub name: String,
    pub line: usize,
    pub attrs: Vec<NodeFileAttr>,
    /// Bare words, old style boolean properties.
    pub properties: Vec<String>,
    pub mom_modtime: Option<i64>,
    pub sharing: Option<VnodeSharing>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodesFile {
    /// `$modtime=<time>.<generation>` header.
    pub modtime: Option<(i64, i32)>,
    pub entries: Vec<NodesFileEntry>,
}

/// One line of the node_state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStateRecord {
    pub name: String,
    pub state: u64,
    pub comment: Option<String>,
}

/// Splits on whitespace; double quotes group words and are removed.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        tokens.push(current);
    }
    tokens
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn parse_modtime(value: &str, line: usize) -> std::result::Result<(i64, i32), NodesFileError> {
    let err = || NodesFileError::InvalidModtime { line, value: value.to_string() };
    let (time, generation) = value.split_once('.').unwrap_or((value, "0"));
    Ok((time.parse().map_err(|_| err())?, generation.parse().map_err(|_| err())?))
}

fn parse_sharing(value: &str, line: usize) -> std::result::Result<VnodeSharing, NodesFileError> {
    let by_number = value.parse::<i64>().ok().and_then(VnodeSharing::from_legacy);
    by_number.or_else(|| VnodeSharing::from_name(value)).ok_or_else(|| NodesFileError::InvalidSharing { line, value: value.to_string() })
}

fn parse_entry(tokens: &[String], line: usize) -> std::result::Result<NodesFileEntry, NodesFileError> {
    let name = &tokens[0];
    if name.is_empty() || name.contains('=') || name.starts_with('[') || name.starts_with('$') {
        return Err(NodesFileError::InvalidNodeName { line, name: name.clone() });
    }
    let mut entry =
        NodesFileEntry { name: name.clone(), line, attrs: Vec::new(), properties: Vec::new(), mom_modtime: None, sharing: None };

    for token in &tokens[1..] {
        let Some((key, value)) = token.split_once('=') else {
            if !is_word(token) {
                return Err(NodesFileError::InvalidToken { line, token: token.clone() });
            }
            entry.properties.push(token.clone());
            continue;
        };
        match key {
            "[ts]" => {
                let ts = value.parse().map_err(|_| NodesFileError::InvalidToken { line, token: token.clone() })?;
                entry.mom_modtime = Some(ts);
            }
            "[sharing]" => entry.sharing = Some(parse_sharing(value, line)?),
            "np" | "ncpus" => entry.attrs.push(NodeFileAttr {
                name: "resources_available".to_string(),
                resc: Some("ncpus".to_string()),
                value: value.to_string(),
            }),
            "host" => entry.attrs.push(NodeFileAttr { name: "Mom".to_string(), resc: None, value: value.to_string() }),
            _ if key.is_empty() => return Err(NodesFileError::InvalidToken { line, token: token.clone() }),
            _ => {
                let (name, resc) = match key.split_once('.') {
                    Some((name, resc)) => (name.to_string(), Some(resc.to_string())),
                    None => (key.to_string(), None),
                };
                entry.attrs.push(NodeFileAttr { name, resc, value: value.to_string() });
            }
        }
    }
    Ok(entry)
}

/// Parses the text of a nodes file.
pub fn parse_nodes(text: &str) -> std::result::Result<NodesFile, NodesFileError> {
    let mut file = NodesFile::default();
    let mut version_seen = false;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(value) = trimmed.strip_prefix("$modtime=") {
            file.modtime = Some(parse_modtime(value.trim(), line)?);
            continue;
        }

        let tokens = tokenize(trimmed);
        if tokens[0] == VERSION_KEYWORD {
            let version = tokens.get(1).and_then(|v| v.parse::<i64>().ok());
            if version_seen || version != Some(NODES_FILE_VERSION) || tokens.len() != 2 {
                return Err(NodesFileError::InvalidVersion { line });
            }
            version_seen = true;
            continue;
        }

        let entry = parse_entry(&tokens, line)?;
        if file.entries.iter().any(|e| e.name == entry.name) {
            return Err(NodesFileError::DuplicateNode { line, name: entry.name });
        }
        file.entries.push(entry);
    }
    Ok(file)
}

pub fn read_nodes_file(path: impl AsRef<Path>) -> Result<NodesFile> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(parse_nodes(&text)?)
}

/// Parses node_state lines of the form `name state [comment...]`. Malformed lines are skipped.
pub fn parse_node_state(text: &str) -> Vec<NodeStateRecord> {
    let mut records = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let mut parts = raw.trim().splitn(3, char::is_whitespace);
        let (Some(name), Some(state)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(state) = state.parse::<u64>() else {
            log::warn!("node_state line {}: bad state value '{}'", index + 1, state);
            continue;
        };
        let comment = parts.next().map(str::trim).filter(|c| !c.is_empty()).map(str::to_string);
        records.push(NodeStateRecord { name: name.to_string(), state, comment });
    }
    records
}

pub fn read_node_state_file(path: impl AsRef<Path>) -> Result<Vec<NodeStateRecord>> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(parse_node_state(&text))
}
