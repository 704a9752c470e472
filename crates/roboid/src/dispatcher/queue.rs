use crate::Task;
use std::collections::VecDeque;

/// Strict FIFO backlog of tasks waiting for a worker.
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    tasks: VecDeque<Task>,
}

impl WorkQueue {
    pub(crate) fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
