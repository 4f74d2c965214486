//! Bounded ring buffer of JS dialog records (§4.12).

use pagemap_domain::model::{DialogKind, DialogRecord};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Single-writer (the browser's dialog event callback), multi-reader
/// (drained under the session's tool_lock) ring buffer.
pub struct DialogBuffer {
    inner: Mutex<VecDeque<DialogRecord>>,
    capacity: usize,
}

impl DialogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a dialog. If the buffer is full, the oldest record is
    /// dropped to make room — dialogs are a best-effort audit trail, not
    /// a delivery guarantee.
    pub fn push(&self, record: DialogRecord) {
        let mut buf = self.inner.lock();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(record);
    }

    /// Return and clear all buffered dialogs.
    pub fn drain(&self) -> Vec<DialogRecord> {
        let mut buf = self.inner.lock();
        buf.drain(..).collect()
    }
}

/// Decide how to auto-handle a given dialog kind, per §4.12.
pub fn auto_action(kind: DialogKind) -> bool {
    match kind {
        DialogKind::Alert => true,       // accept
        DialogKind::Confirm => false,    // dismiss
        DialogKind::Prompt => false,     // dismiss
        DialogKind::Beforeunload => true, // accept, so navigation proceeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_when_full() {
        let buf = DialogBuffer::new(2);
        for i in 0..3 {
            buf.push(DialogRecord {
                kind: DialogKind::Alert,
                message: format!("msg{i}"),
                dismissed: false,
            });
        }
        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "msg1");
        assert_eq!(drained[1].message, "msg2");
    }

    #[test]
    fn drain_clears_buffer() {
        let buf = DialogBuffer::new(4);
        buf.push(DialogRecord {
            kind: DialogKind::Confirm,
            message: "ok?".into(),
            dismissed: true,
        });
        assert_eq!(buf.drain().len(), 1);
        assert_eq!(buf.drain().len(), 0);
    }

    #[test]
    fn auto_action_matches_spec_table() {
        assert!(auto_action(DialogKind::Alert));
        assert!(!auto_action(DialogKind::Confirm));
        assert!(!auto_action(DialogKind::Prompt));
        assert!(auto_action(DialogKind::Beforeunload));
    }
}
