//! Buffer — accumulates items and hands them to a sender in batches.
//!
//! A batch is sent when it reaches `bufsize` (synchronously, from the
//! `append` that filled it) or when the flush timer fires, whichever comes
//! first. Delivery is at most once: a batch the sender rejects is dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("failed to encode batch: {0}")]
    Encode(String),
    #[error("failed to send batch: {0}")]
    Send(String),
}

type Sender<T> = Box<dyn Fn(Vec<T>) -> Result<(), BatchError> + Send + Sync>;

pub struct BatchBuffer<T> {
    bufsize: usize,
    batch: Mutex<Vec<T>>,
    sender: Sender<T>,
}

impl<T: Send + 'static> BatchBuffer<T> {
    /// Create the buffer and start its flush timer. Must be called from
    /// within a tokio runtime. The timer stops once the buffer is dropped.
    pub fn new<F>(bufsize: usize, flush_interval: Duration, sender: F) -> Arc<Self>
    where
        F: Fn(Vec<T>) -> Result<(), BatchError> + Send + Sync + 'static,
    {
        let bufsize = bufsize.max(1);
        let buffer = Arc::new(Self {
            bufsize,
            batch: Mutex::new(Vec::with_capacity(bufsize)),
            sender: Box::new(sender),
        });

        let period = flush_interval.max(Duration::from_millis(1));
        tokio::spawn(flush_on_timer(Arc::downgrade(&buffer), period));
        buffer
    }

    /// Add an item. Flushes, on the caller's task, when the batch is full.
    pub fn append(&self, item: T) {
        let full = {
            let mut batch = self.batch.lock();
            batch.push(item);
            if batch.len() >= self.bufsize {
                Some(std::mem::replace(&mut *batch, Vec::with_capacity(self.bufsize)))
            } else {
                None
            }
        };

        if let Some(items) = full {
            self.send(items);
        }
    }

    /// Send whatever is pending. No-op when nothing is.
    pub fn flush(&self) {
        let items = std::mem::take(&mut *self.batch.lock());
        if items.is_empty() {
            return;
        }
        self.send(items);
    }

    /// Items waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.batch.lock().len()
    }

    fn send(&self, items: Vec<T>) {
        let count = items.len();
        match (self.sender)(items) {
            Ok(()) => debug!(items = count, "batch flushed"),
            Err(e) => warn!(items = count, error = %e, "dropping batch"),
        }
    }
}

async fn flush_on_timer<T: Send + 'static>(buffer: Weak<BatchBuffer<T>>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match buffer.upgrade() {
            Some(buffer) => buffer.flush(),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Sent = Arc<Mutex<Vec<Vec<u32>>>>;

    fn recording(bufsize: usize, every: Duration) -> (Arc<BatchBuffer<u32>>, Sent) {
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let buffer = BatchBuffer::new(bufsize, every, move |items| {
            sink.lock().push(items);
            Ok(())
        });
        (buffer, sent)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_synchronously_in_order() {
        let (buffer, sent) = recording(3, Duration::from_secs(30));

        buffer.append(1);
        buffer.append(2);
        assert!(sent.lock().is_empty());
        buffer.append(3);

        assert_eq!(*sent.lock(), vec![vec![1, 2, 3]]);
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_partial_batch_once() {
        let (buffer, sent) = recording(10, Duration::from_secs(1));

        buffer.append(7);
        buffer.append(8);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*sent.lock(), vec![vec![7, 8]]);

        // later ticks find nothing pending
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_flush_does_not_send() {
        let (buffer, sent) = recording(10, Duration::from_secs(1));

        buffer.flush();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(sent.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_drops_batch() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let buffer = BatchBuffer::new(2, Duration::from_secs(30), move |_items: Vec<u32>| {
            *counter.lock() += 1;
            Err(BatchError::Send("endpoint down".into()))
        });

        buffer.append(1);
        buffer.append(2);
        buffer.append(3);

        assert_eq!(*calls.lock(), 1);
        assert_eq!(buffer.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_appends_are_not_blocked_by_sender() {
        let buffer = Arc::new(Mutex::new(None::<Arc<BatchBuffer<u32>>>));
        let reentrant = Arc::clone(&buffer);
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        let created = BatchBuffer::new(1, Duration::from_secs(30), move |items: Vec<u32>| {
            // appending from inside the sender would deadlock if the batch
            // lock were held
            if items == vec![1] {
                if let Some(b) = reentrant.lock().clone() {
                    b.append(2);
                }
            }
            sink.lock().push(items);
            Ok(())
        });
        *buffer.lock() = Some(Arc::clone(&created));

        created.append(1);

        assert_eq!(*sent.lock(), vec![vec![2], vec![1]]);
        buffer.lock().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_when_buffer_dropped() {
        let (buffer, sent) = recording(10, Duration::from_secs(1));
        let weak = Arc::downgrade(&buffer);
        buffer.append(1);
        drop(buffer);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(weak.upgrade().is_none());
        assert!(sent.lock().is_empty());
    }
}
