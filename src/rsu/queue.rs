//! The RSU send queue (§3 "RSU queue element").

use std::collections::VecDeque;

/// One queued, not-yet-acknowledged datagram.
pub struct QueueElement {
    /// The payload with its leading per-sender sequence-number byte already
    /// prepended.
    pub envelope: Vec<u8>,
    pub tries: u8,
}

/// FIFO send queue (§3, §5 "Send order is FIFO in the queue").
#[derive(Default)]
pub struct SendQueue {
    elements: VecDeque<QueueElement>,
}

impl SendQueue {
    pub fn new() -> Self {
        SendQueue {
            elements: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn push_back(&mut self, envelope: Vec<u8>) {
        self.elements.push_back(QueueElement { envelope, tries: 0 });
    }

    pub fn head(&self) -> Option<&QueueElement> {
        self.elements.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut QueueElement> {
        self.elements.front_mut()
    }

    pub fn pop_head(&mut self) -> Option<QueueElement> {
        self.elements.pop_front()
    }
}
