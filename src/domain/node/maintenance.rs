use crate::domain::attribute::value::AttrValue;
use crate::domain::node::node::{NodeAttr, NodeModified, NodeState};
use crate::domain::server::server::Server;
use crate::domain::utils::id::JobId;
use crate::error::{PbsError, Result};

/// Vnode names of an exec_vnode string such as `(n1:ncpus=2)+(n2:ncpus=1:mem=1gb)`.
pub fn exec_vnode_names(exec_vnode: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for chunk in exec_vnode.split('+') {
        let chunk = chunk.trim().trim_start_matches('(').trim_end_matches(')');
        let name = chunk.split(':').next().unwrap_or_default().trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

impl Server {
    /// Puts the vnodes of `exec_vnode` into maintenance on behalf of `job` (`suspend`),
    /// or takes them out again, then saves the node table.
    pub fn set_admin_suspend(&mut self, job: &JobId, exec_vnode: &str, suspend: bool) -> Result<()> {
        let suspended = self.admin_suspended.contains(job);
        if suspend && suspended {
            return Err(PbsError::BadState.into());
        }
        if !suspend && !suspended {
            return Err(PbsError::WrongResume.into());
        }

        for name in exec_vnode_names(exec_vnode) {
            let Some(node) = self.find_nodebyname(&name).and_then(|key| self.nodes.get_mut(key)) else {
                log::warn!("admin suspend of job {}: unknown vnode {}", job, name);
                continue;
            };
            let mut jobs = node.attr(NodeAttr::MaintJobs).as_str_array().to_vec();
            if suspend {
                if !jobs.iter().any(|j| j == job.as_str()) {
                    jobs.push(job.to_string());
                }
                node.set_state(NodeState::MAINTENANCE);
            } else {
                jobs.retain(|j| j != job.as_str());
                if jobs.is_empty() {
                    node.clear_state(NodeState::MAINTENANCE);
                }
            }
            if jobs.is_empty() {
                node.attr_mut(NodeAttr::MaintJobs).clear();
            } else {
                node.attr_mut(NodeAttr::MaintJobs).set(AttrValue::StrArray(jobs));
            }
            node.modified.insert(NodeModified::UPDATE_OTHERS);
        }

        if suspend {
            self.admin_suspended.insert(job.clone());
        } else {
            self.admin_suspended.remove(job);
        }
        self.save_nodes_db(false, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_vnode_names_are_unique_and_ordered() {
        assert_eq!(exec_vnode_names("(n1:ncpus=2)+(n2:ncpus=1:mem=1gb)+(n1:ncpus=1)"), vec!["n1", "n2"]);
        assert_eq!(exec_vnode_names("n3"), vec!["n3"]);
        assert!(exec_vnode_names("").is_empty());
    }
}
