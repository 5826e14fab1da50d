//! # Change Trail
//!
//! Size-bounded, append-only ring buffer of [`Change`] records. This is
//! the sole audit trail for the design session; once the buffer is full
//! the oldest entry is dropped on every append.

use crate::model::Change;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct ChangeTrail {
    entries: VecDeque<Change>,
    capacity: usize,
}

impl Default for ChangeTrail {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ChangeTrail {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, change: Change) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(change);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Change> {
        self.entries.back()
    }

    /// Most recent entries, newest last
    pub fn recent(&self, count: usize) -> Vec<Change> {
        self.entries
            .iter()
            .skip(self.entries.len().saturating_sub(count))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn change(path: &str) -> Change {
        Change {
            agent: "test".to_string(),
            timestamp: Utc::now(),
            previous_value: json!(null),
            new_value: json!(1),
            property_path: path.to_string(),
            reason: None,
        }
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut trail = ChangeTrail::with_capacity(3);
        for i in 0..5 {
            trail.push(change(&format!("p{}", i)));
        }

        assert_eq!(trail.len(), 3);
        let paths: Vec<_> = trail.iter().map(|c| c.property_path.clone()).collect();
        assert_eq!(paths, vec!["p2", "p3", "p4"]);
        assert_eq!(trail.latest().unwrap().property_path, "p4");
    }

    #[test]
    fn test_clear_empties_the_trail() {
        let mut trail = ChangeTrail::default();
        trail.push(change("design"));
        trail.clear();
        assert!(trail.is_empty());
    }
}
