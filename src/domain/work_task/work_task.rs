use std::collections::VecDeque;

/// Deferred server work, drained by `Server::run_work_tasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkTask {
    /// Re-assert the target flag on every resource referenced indirectly.
    IndirectTargetCheck,
}

#[derive(Debug, Default)]
pub struct WorkTaskQueue {
    tasks: VecDeque<WorkTask>,
}

impl WorkTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` unless an identical task is already pending.
    pub fn schedule(&mut self, task: WorkTask) {
        if !self.tasks.contains(&task) {
            self.tasks.push_back(task);
        }
    }

    pub fn pop(&mut self) -> Option<WorkTask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task: WorkTask) -> bool {
        self.tasks.contains(&task)
    }
}
