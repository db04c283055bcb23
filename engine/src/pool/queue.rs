//! Priority task queue for a Worker Pool (spec.md §4.7): ordered by
//! `priority` descending, ties broken by `enqueuedAt` ascending.

use std::collections::VecDeque;

use crate::domain::PoolTask;

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<PoolTask>,
    max_size: usize,
}

impl TaskQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.max_size
    }

    /// Inserts keeping the queue sorted by `priority` descending, with
    /// `enqueuedAt` ascending breaking ties, so `pop_front` always returns
    /// the highest-priority ready task regardless of submission order.
    pub fn push(&mut self, task: PoolTask) -> bool {
        if self.is_full() {
            return false;
        }
        let insert_at = self
            .tasks
            .iter()
            .position(|existing| {
                existing.priority < task.priority
                    || (existing.priority == task.priority && existing.enqueued_at > task.enqueued_at)
            })
            .unwrap_or(self.tasks.len());
        self.tasks.insert(insert_at, task);
        true
    }

    pub fn pop_front(&mut self) -> Option<PoolTask> {
        self.tasks.pop_front()
    }

    pub fn remove(&mut self, task_id: uuid::Uuid) -> Option<PoolTask> {
        let index = self.tasks.iter().position(|t| t.task_id == task_id)?;
        self.tasks.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolTask> {
        self.tasks.iter()
    }

    /// Re-enqueues at the front so retried tasks are dispatched before
    /// freshly submitted work of equal priority.
    pub fn push_front(&mut self, task: PoolTask) {
        self.tasks.push_front(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(priority: i32, now: chrono::DateTime<Utc>) -> PoolTask {
        let mut t = PoolTask::new("run".into(), vec![], now);
        t.priority = priority;
        t
    }

    #[test]
    fn fifo_order_is_preserved_for_distinct_timestamps() {
        let mut queue = TaskQueue::new(10);
        let t0 = Utc::now();
        queue.push(task(0, t0));
        queue.push(task(0, t0 + chrono::Duration::milliseconds(1)));
        let first = queue.pop_front().unwrap();
        assert_eq!(first.enqueued_at, t0);
    }

    #[test]
    fn equal_timestamp_ties_break_by_priority_descending() {
        let mut queue = TaskQueue::new(10);
        let t0 = Utc::now();
        queue.push(task(1, t0));
        queue.push(task(5, t0));
        let first = queue.pop_front().unwrap();
        assert_eq!(first.priority, 5);
    }

    #[test]
    fn higher_priority_preempts_an_earlier_lower_priority_task() {
        let mut queue = TaskQueue::new(10);
        let t0 = Utc::now();
        queue.push(task(0, t0));
        queue.push(task(10, t0 + chrono::Duration::milliseconds(1)));
        let first = queue.pop_front().unwrap();
        assert_eq!(first.priority, 10);
    }

    #[test]
    fn push_fails_once_queue_is_full() {
        let mut queue = TaskQueue::new(1);
        assert!(queue.push(task(0, Utc::now())));
        assert!(!queue.push(task(0, Utc::now())));
    }
}
