//! Send buffer
//!
//! Ordered, append-only list of prepared commands. Any thread may append;
//! the sender reads by index behind its own cursor.

use printlink_core::{thread_safe_rw, ThreadSafeRw};

/// Commands waiting to be (or already) streamed to the printer
#[derive(Debug, Clone)]
pub struct SendBuffer {
    lines: ThreadSafeRw<Vec<String>>,
}

impl SendBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            lines: thread_safe_rw(Vec::new()),
        }
    }

    /// Append a command, returning its 1-based position
    pub fn push(&self, line: String) -> usize {
        let mut lines = self.lines.write();
        lines.push(line);
        lines.len()
    }

    /// Append several commands, returning the new length
    pub fn extend<I>(&self, new_lines: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut lines = self.lines.write();
        lines.extend(new_lines);
        lines.len()
    }

    /// Command stored at `index`
    pub fn get(&self, index: usize) -> Option<String> {
        self.lines.read().get(index).cloned()
    }

    /// Number of buffered commands, sent or not
    pub fn len(&self) -> usize {
        self.lines.read().len()
    }

    /// Whether nothing was ever buffered
    pub fn is_empty(&self) -> bool {
        self.lines.read().is_empty()
    }

    /// Copy of every buffered command
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.read().clone()
    }

    /// Drop every buffered command
    pub fn clear(&self) {
        self.lines.write().clear();
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_returns_position() {
        let buffer = SendBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.push("G90".to_string()), 1);
        assert_eq!(buffer.push("G1 X10".to_string()), 2);
        assert_eq!(buffer.get(1).as_deref(), Some("G1 X10"));
        assert!(buffer.get(2).is_none());
    }

    #[test]
    fn test_concurrent_appends() {
        let buffer = SendBuffer::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        buffer.push(format!("G1 X{} Y{}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.len(), 400);
        let snapshot = buffer.snapshot();
        for t in 0..8 {
            let ours: Vec<_> = snapshot
                .iter()
                .filter(|l| l.starts_with(&format!("G1 X{} ", t)))
                .collect();
            assert_eq!(ours.len(), 50);
            assert_eq!(ours[0], &format!("G1 X{} Y0", t));
            assert_eq!(ours[49], &format!("G1 X{} Y49", t));
        }
    }

    #[test]
    fn test_extend_and_clear() {
        let buffer = SendBuffer::new();
        let len = buffer.extend(vec!["M900".to_string(), "G90".to_string()]);
        assert_eq!(len, 2);
        buffer.clear();
        assert_eq!(buffer.len(), 0);
    }
}
