//! Bounded FIFO with timed enqueue/dequeue.
//!
//! A thin wrapper over an embassy `Channel`: all exclusion happens inside the
//! channel's critical-section mutex, callers never hold a lock and cannot
//! inspect the contents. A zero timeout makes the call non-blocking and
//! reports `Full`/`Empty`; any other timeout waits at most that long and
//! reports `TimedOut`.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{with_timeout, Duration};

use crate::error::QueueError;

pub struct TimedQueue<T, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, T, N>,
}

impl<T, const N: usize> TimedQueue<T, N> {
    pub const fn new() -> Self {
        Self { channel: Channel::new() }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub async fn enqueue(&self, item: T, timeout: Duration) -> Result<(), QueueError> {
        if timeout.as_ticks() == 0 {
            return self.channel.try_send(item).map_err(|_| QueueError::Full);
        }
        with_timeout(timeout, self.channel.send(item))
            .await
            .map_err(|_| QueueError::TimedOut)
    }

    pub async fn dequeue(&self, timeout: Duration) -> Result<T, QueueError> {
        if timeout.as_ticks() == 0 {
            return self.channel.try_receive().map_err(|_| QueueError::Empty);
        }
        with_timeout(timeout, self.channel.receive())
            .await
            .map_err(|_| QueueError::TimedOut)
    }
}

impl<T, const N: usize> Default for TimedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_time::Instant;

    const WAIT: Duration = Duration::from_millis(100);

    #[test]
    fn dequeues_in_arrival_order() {
        let queue: TimedQueue<u8, 3> = TimedQueue::new();
        block_on(async {
            for p in [1u8, 2, 3] {
                queue.enqueue(p, WAIT).await.unwrap();
            }
            assert_eq!(queue.dequeue(WAIT).await, Ok(1));
            assert_eq!(queue.dequeue(WAIT).await, Ok(2));
            assert_eq!(queue.dequeue(WAIT).await, Ok(3));
        });
    }

    #[test]
    fn zero_timeout_reports_full_and_empty() {
        let queue: TimedQueue<u8, 1> = TimedQueue::new();
        block_on(async {
            assert_eq!(queue.dequeue(Duration::from_ticks(0)).await, Err(QueueError::Empty));
            queue.enqueue(7, Duration::from_ticks(0)).await.unwrap();
            assert_eq!(queue.enqueue(8, Duration::from_ticks(0)).await, Err(QueueError::Full));
            assert_eq!(queue.dequeue(Duration::from_ticks(0)).await, Ok(7));
        });
    }

    #[test]
    fn bounded_wait_reports_timed_out_after_budget() {
        let queue: TimedQueue<u8, 1> = TimedQueue::new();
        block_on(async {
            let start = Instant::now();
            assert_eq!(queue.dequeue(Duration::from_millis(20)).await, Err(QueueError::TimedOut));
            assert!(start.elapsed() >= Duration::from_millis(20));

            queue.enqueue(1, WAIT).await.unwrap();
            assert_eq!(
                queue.enqueue(2, Duration::from_millis(20)).await,
                Err(QueueError::TimedOut)
            );
        });
    }
}
