//! Common types for the ThreatGlobe environment abstraction.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A decoded image ready to be used as a texture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBitmap {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// RGBA8 pixel data (may be empty for placeholders)
    pub pixels: Vec<u8>,
}

impl ImageBitmap {
    /// Creates a new bitmap.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Width divided by height, 1.0 for degenerate images.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// Multi-producer queue with atomic "take everything" semantics.
///
/// Producers may push from any task at any time. The consumer removes the
/// entire pending content in one step, so it never observes a half-drained
/// queue.
#[derive(Debug)]
pub struct InboundQueue<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> InboundQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Appends an item.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Removes and returns every item currently present, in arrival order.
    pub fn take_all(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Removes the oldest item, if any.
    pub fn pop_front(&self) -> Option<T> {
        let mut items = self.lock();
        if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        }
    }

    /// Drops every pending item.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        // A producer that panicked mid-push leaves a valid Vec behind
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Default for InboundQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones share the same underlying queue.
impl<T> Clone for InboundQueue<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_all_drains_in_order() {
        let queue = InboundQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.take_all(), vec![1, 2, 3]);
        assert!(queue.is_empty());
        assert!(queue.take_all().is_empty());
    }

    #[test]
    fn test_clone_shares_queue() {
        let producer = InboundQueue::new();
        let consumer = producer.clone();

        producer.push("a");
        assert_eq!(consumer.len(), 1);
        assert_eq!(consumer.pop_front(), Some("a"));
        assert_eq!(producer.len(), 0);
    }

    #[test]
    fn test_push_from_threads() {
        let queue = InboundQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let q = queue.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        q.push(i * 100 + j);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(queue.take_all().len(), 400);
    }

    #[test]
    fn test_bitmap_aspect_ratio() {
        assert_eq!(ImageBitmap::new(200, 100, vec![]).aspect_ratio(), 2.0);
        assert_eq!(ImageBitmap::new(10, 0, vec![]).aspect_ratio(), 1.0);
    }
}
