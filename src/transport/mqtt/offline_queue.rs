//! Messages held back while the broker is unreachable
//!
//! A limit of `None` makes the queue unbounded. `Some(0)` disables offline
//! queueing entirely. When a bounded queue is full the incoming message is
//! rejected and everything already queued is kept.

use super::connection::MqttError;
use crate::config::QosLevel;
use bytes::Bytes;
use std::collections::VecDeque;

/// A publish waiting for the connection to come back
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
}

/// FIFO of pending publishes
#[derive(Debug, Default)]
pub struct OfflineQueue {
    messages: VecDeque<QueuedMessage>,
    limit: Option<usize>,
    rejected: u64,
}

impl OfflineQueue {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            messages: VecDeque::new(),
            limit,
            rejected: 0,
        }
    }

    /// Append a message, returning the new queue length
    pub fn enqueue(&mut self, message: QueuedMessage) -> Result<usize, MqttError> {
        if let Some(limit) = self.limit {
            if self.messages.len() >= limit {
                self.rejected += 1;
                return Err(MqttError::QueueFull { limit });
            }
        }
        self.messages.push_back(message);
        Ok(self.messages.len())
    }

    /// Take the oldest message
    pub fn pop_front(&mut self) -> Option<QueuedMessage> {
        self.messages.pop_front()
    }

    /// Put back a message whose drain attempt failed. Ignores the limit.
    pub fn requeue_front(&mut self, message: QueuedMessage) {
        self.messages.push_front(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages turned away because the queue was full
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(n: u8) -> QueuedMessage {
        QueuedMessage {
            topic: "iot/device/sensordata".to_string(),
            payload: Bytes::from(vec![n]),
            qos: QosLevel::AtMostOnce,
        }
    }

    #[test]
    fn test_unbounded_queue_is_fifo() {
        let mut queue = OfflineQueue::new(None);
        for n in 0..100 {
            queue.enqueue(message(n)).unwrap();
        }
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.pop_front(), Some(message(0)));
        assert_eq!(queue.pop_front(), Some(message(1)));
    }

    #[test]
    fn test_full_queue_rejects_newest() {
        let mut queue = OfflineQueue::new(Some(2));
        queue.enqueue(message(1)).unwrap();
        queue.enqueue(message(2)).unwrap();

        let err = queue.enqueue(message(3)).unwrap_err();
        assert!(matches!(err, MqttError::QueueFull { limit: 2 }));
        assert_eq!(queue.rejected(), 1);

        assert_eq!(queue.pop_front(), Some(message(1)));
        assert_eq!(queue.pop_front(), Some(message(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_limit_disables_queueing() {
        let mut queue = OfflineQueue::new(Some(0));
        assert!(queue.enqueue(message(1)).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_keeps_order_and_bypasses_limit() {
        let mut queue = OfflineQueue::new(Some(1));
        queue.enqueue(message(1)).unwrap();
        let first = queue.pop_front().unwrap();
        queue.enqueue(message(2)).unwrap();

        queue.requeue_front(first);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front(), Some(message(1)));
    }
}
