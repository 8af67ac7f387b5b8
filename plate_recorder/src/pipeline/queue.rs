use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::SendError;
use crossbeam::channel::Sender;
use crossbeam::channel::TrySendError;

use crate::frame::Frame;

#[derive(Debug)]
pub enum QueueItem {
    Frame(Frame),
    /// Sent once by `stop()`; the worker exits when it reaches it.
    Shutdown,
}

/// Producers never block: a full queue drops the frame.
#[derive(Clone)]
pub struct FrameQueue {
    tx: Sender<QueueItem>,
    capacity: usize,
}

impl FrameQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<QueueItem>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx, capacity }, rx)
    }

    pub fn offer(&self, frame: Frame) -> bool {
        match self.tx.try_send(QueueItem::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queue the shutdown sentinel behind every frame already queued. Blocks
    /// while the queue is full, the worker drains it.
    pub fn close(&self) -> Result<(), SendError<QueueItem>> {
        self.tx.send(QueueItem::Shutdown)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::prelude::Mat;

    fn frame(sequence: u64) -> Frame {
        Frame::new(Mat::default(), sequence)
    }

    #[test]
    fn drops_beyond_capacity() {
        let (queue, _rx) = FrameQueue::bounded(10);
        for i in 0..10 {
            assert!(queue.offer(frame(i)));
        }
        assert!(!queue.offer(frame(10)));
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.capacity(), 10);
    }

    #[test]
    fn fifo_with_sentinel_last() {
        let (queue, rx) = FrameQueue::bounded(4);
        for i in 1..=3 {
            assert!(queue.offer(frame(i)));
        }
        queue.close().unwrap();

        let mut seen = vec![];
        loop {
            match rx.recv().unwrap() {
                QueueItem::Frame(f) => seen.push(f.sequence),
                QueueItem::Shutdown => break,
            }
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn close_waits_for_room() {
        let (queue, rx) = FrameQueue::bounded(1);
        assert!(queue.offer(frame(1)));

        let closer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.close().unwrap())
        };
        assert!(matches!(rx.recv().unwrap(), QueueItem::Frame(_)));
        assert!(matches!(rx.recv().unwrap(), QueueItem::Shutdown));
        closer.join().unwrap();
    }

    #[test]
    fn close_fails_without_worker() {
        let (queue, rx) = FrameQueue::bounded(1);
        assert!(queue.offer(frame(1)));
        drop(rx);
        assert!(queue.close().is_err());
        assert!(!queue.offer(frame(2)));
    }
}
