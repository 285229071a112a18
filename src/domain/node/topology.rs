use std::fs;
use std::io::ErrorKind;

use crate::domain::attribute::value::AttrValue;
use crate::domain::license::license::LicenseBackend;
use crate::domain::node::actions::ActionMode;
use crate::domain::node::node::{LICENSED_LOCKED, NodeAttr, NodeModified};
use crate::domain::node::node_store::NodeKey;
use crate::domain::server::server::Server;
use crate::error::PbsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyType {
    Hwloc,
    Cray,
    Windows,
}

impl TopologyType {
    const PREFIXES: [(TopologyType, &'static str); 3] =
        [(TopologyType::Hwloc, "hwloc:"), (TopologyType::Cray, "Cray:"), (TopologyType::Windows, "Windows:")];

    /// Splits a topology payload into its type and body.
    pub fn split(payload: &str) -> Option<(TopologyType, &str)> {
        TopologyType::PREFIXES.iter().find_map(|(ttype, prefix)| payload.strip_prefix(prefix).map(|body| (*ttype, body)))
    }
}

/// Number of sockets described by a topology body.
///
/// hwloc bodies are XML where each socket is an object of type `Package` (older releases
/// used `Socket`). Cray bodies carry one `<socket` element per socket. Windows bodies are
/// a comma separated `key=value` list with a `sockets` entry.
pub fn nsockets_from_topology(body: &str, ttype: TopologyType) -> i64 {
    match ttype {
        TopologyType::Hwloc => {
            let packages = body.matches("type=\"Package\"").count();
            let count = if packages > 0 { packages } else { body.matches("type=\"Socket\"").count() };
            count as i64
        }
        TopologyType::Cray => body.to_ascii_lowercase().matches("<socket").count() as i64,
        TopologyType::Windows => body
            .split(',')
            .filter_map(|kv| kv.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("sockets"))
            .and_then(|(_, v)| v.trim().parse().ok())
            .unwrap_or(0),
    }
}

impl Server {
    /// Writes the topology body to the node's file under the topology directory.
    /// Failures are logged and otherwise ignored.
    pub fn record_node_topology(&self, node_name: &str, body: &str) {
        let dir = self.topology_dir();
        if dir.exists() && !dir.is_dir() {
            log::debug!("topology directory path exists but is not a directory");
            return;
        }
        if let Err(e) = fs::create_dir_all(&dir) {
            log::error!("failed to create topology directory {}: {}", dir.display(), e);
            return;
        }
        if let Err(e) = fs::write(dir.join(node_name), body) {
            log::error!("failed to write node topology for node {}: {}", node_name, e);
        }
    }

    pub fn remove_node_topology(&self, node_name: &str) {
        match fs::remove_file(self.topology_dir().join(node_name)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => log::debug!("no topology file for node {}", node_name),
            Err(e) => log::error!("unlink of topology file for node {} failed: {}", node_name, e),
        }
    }

    /// Action routine of topology_info: stores the payload on disk and settles node-locked licenses.
    pub fn set_node_topology(&mut self, key: NodeKey, payload: &str, mode: ActionMode) -> Result<(), PbsError> {
        match mode {
            ActionMode::Noop => return Ok(()),
            ActionMode::New | ActionMode::Alter => {}
            ActionMode::Recov | ActionMode::Free => return Err(PbsError::Internal),
        }

        let name = self.nodes.get(key).ok_or(PbsError::UnkNode)?.name.to_string();
        let Some((ttype, body)) = TopologyType::split(payload) else {
            log::debug!("unknown topology type in topology attribute for node {}", name);
            return Err(PbsError::Internal);
        };
        self.record_node_topology(&name, body);
        let nsockets = nsockets_from_topology(body, ttype);

        let (backend, license_type) =
            if self.licenses.is_up(LicenseBackend::Sockets) { (LicenseBackend::Sockets, "socket") } else { (LicenseBackend::Nodes, "node") };
        let licenses_up = self.licenses.is_up(backend);

        let node = self.nodes.get_mut(key).ok_or(PbsError::UnkNode)?;
        let locked = node.attr(NodeAttr::License).as_char() == Some(LICENSED_LOCKED);

        if locked {
            let held = node.attr(NodeAttr::LicenseInfo).as_long().unwrap_or(0);
            if held != nsockets {
                node.attr_mut(NodeAttr::License).clear();
                node.modified.insert(NodeModified::UPDATE_OTHERS);
                self.licenses.release(held);
                if self.licenses.consume(nsockets) {
                    node.attr_mut(NodeAttr::License).set(AttrValue::Char(LICENSED_LOCKED));
                }
                log::debug!("node {}:  node reporting {} {} licenses, has licenses for {}", name, nsockets, license_type, held);
                node.attr_mut(NodeAttr::LicenseInfo).set(AttrValue::Long(nsockets));
            } else if licenses_up {
                node.attr_mut(NodeAttr::License).set(AttrValue::Char(LICENSED_LOCKED));
                node.modified.insert(NodeModified::UPDATE_OTHERS);
                log::debug!("node {} already assigned license for {} {}(s)", name, nsockets, license_type);
            }
        } else if nsockets > 0 && licenses_up && self.licenses.consume(nsockets) {
            node.attr_mut(NodeAttr::License).set(AttrValue::Char(LICENSED_LOCKED));
            node.attr_mut(NodeAttr::LicenseInfo).set(AttrValue::Long(nsockets));
            node.modified.insert(NodeModified::UPDATE_OTHERS);
            log::debug!("node {} assigned {} {} license(s)", name, nsockets, license_type);
        } else {
            node.attr_mut(NodeAttr::License).clear();
            node.attr_mut(NodeAttr::LicenseInfo).set(AttrValue::Long(nsockets));
        }

        node.attr_mut(NodeAttr::TopologyInfo).set(AttrValue::Str(payload.to_string()));
        Ok(())
    }
}
