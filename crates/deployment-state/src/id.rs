//! Record id generation.

use std::sync::Mutex;

/// Source of stable, internally generated record ids.
pub trait IdGenerator: Send + Sync {
    /// Generate a new unique id.
    fn generate(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Predictable ids (`<prefix>-0`, `<prefix>-1`, ...) for tests.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: Mutex<u64>,
}

impl SequentialIdGenerator {
    /// Create a generator producing ids with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Mutex::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let id = format!("{}-{}", self.prefix, *next);
        *next += 1;
        id
    }
}
