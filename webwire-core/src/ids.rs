use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromiseId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        TaskId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FrameId {
    pub fn new(value: u64) -> Self {
        FrameId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl PromiseId {
    pub fn new(value: u64) -> Self {
        PromiseId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PromiseId({})", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        TaskId::new(value)
    }
}

impl From<u64> for FrameId {
    fn from(value: u64) -> Self {
        FrameId::new(value)
    }
}

impl From<u64> for PromiseId {
    fn from(value: u64) -> Self {
        PromiseId::new(value)
    }
}

/// Monotonic allocator shared by the id families; each scheduler instance
/// owns one allocator per id kind so ids are unique within a flow.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_id_creation_and_display() {
        let task_id = TaskId::new(42);
        assert_eq!(task_id.as_u64(), 42);
        assert_eq!(format!("{}", task_id), "TaskId(42)");

        let frame_id = FrameId::new(100);
        assert_eq!(frame_id.as_u64(), 100);
        assert_eq!(format!("{}", frame_id), "FrameId(100)");

        let promise_id = PromiseId::new(999);
        assert_eq!(promise_id.as_u64(), 999);
        assert_eq!(format!("{}", promise_id), "PromiseId(999)");
    }

    #[test]
    fn test_id_equality_and_hash() {
        let id1 = PromiseId::new(42);
        let id2 = PromiseId::new(42);
        let id3 = PromiseId::new(43);

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);

        let mut set = HashSet::new();
        set.insert(id1);
        assert!(set.contains(&id2));
        assert!(!set.contains(&id3));
    }

    #[test]
    fn test_allocator_monotonic() {
        let allocator = IdAllocator::new();

        assert_eq!(allocator.allocate(), 1);
        assert_eq!(allocator.allocate(), 2);
        assert_eq!(allocator.allocate(), 3);
        assert_eq!(allocator.peek_next(), 4);
    }

    #[test]
    fn test_allocator_thread_safety() {
        let allocator = Arc::new(IdAllocator::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let alloc = Arc::clone(&allocator);
            handles.push(thread::spawn(move || {
                (0..100).map(|_| alloc.allocate()).collect::<Vec<_>>()
            }));
        }

        let mut all_ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all_ids.insert(id), "Duplicate ID found: {}", id);
            }
        }

        assert_eq!(all_ids.len(), 800);
    }

    #[test]
    fn test_serialization() {
        let task_id = TaskId::new(7);
        let json = serde_json::to_string(&task_id).unwrap();
        assert_eq!(json, "7");

        let deserialized: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, task_id);
    }
}
