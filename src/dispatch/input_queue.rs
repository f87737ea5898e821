use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::message::{BatchOfLists, MsgList};

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    msgs: MsgList,
}

/// Cross-task handoff between the router and one connector. The router
/// pushes message lists; the connector drains the lists whose batch deadline
/// has passed and learns when the next one expires. The `Notify` plays the
/// role of the sender-notification descriptor: it becomes "readable"
/// whenever something was enqueued since the last drain.
#[derive(Debug)]
pub struct InputQueue {
    batch_time_limit: Duration,
    inner: Mutex<VecDeque<Entry>>,
    notify: Notify,
}

impl InputQueue {
    pub fn new(batch_time_limit: Duration) -> InputQueue {
        InputQueue {
            batch_time_limit,
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Normal (batching) path: the list becomes ready once the batch time
    /// limit elapses.
    pub fn put(&self, msgs: MsgList) {
        self.put_with_deadline(msgs, Instant::now() + self.batch_time_limit);
    }

    /// Bypasses batching: the list is ready immediately.
    pub fn put_now(&self, msgs: MsgList) {
        self.put_with_deadline(msgs, Instant::now());
    }

    pub fn put_batch_now(&self, batch: BatchOfLists) {
        let now = Instant::now();
        for msgs in batch {
            self.put_with_deadline(msgs, now);
        }
    }

    fn put_with_deadline(&self, msgs: MsgList, deadline: Instant) {
        if msgs.is_empty() {
            return;
        }
        self.inner
            .lock()
            .expect("input queue lock poisoned")
            .push_back(Entry { deadline, msgs });
        self.notify.notify_one();
    }

    /// Resolves when something has been enqueued since the last drain.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Drains every batch-ready list into `out` and reports the next
    /// upcoming deadline, if any messages are still batching. Also consumes
    /// a pending wakeup so the notification is not spent twice on the same
    /// enqueue.
    pub fn get(&self, now: Instant, out: &mut BatchOfLists) -> Option<Instant> {
        let _ = self.notify.notified().now_or_never();
        self.drain_ready(now, out)
    }

    /// Same drain semantics as `get` without touching the notification.
    pub fn nonblocking_get(&self, now: Instant, out: &mut BatchOfLists) -> Option<Instant> {
        self.drain_ready(now, out)
    }

    /// Flushes everything, including lists whose deadline has not passed.
    pub fn get_all_on_shutdown(&self) -> BatchOfLists {
        self.drain_all()
    }

    /// Terminal drain after the connector has been joined.
    pub fn reset(&self) -> BatchOfLists {
        self.drain_all()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .expect("input queue lock poisoned")
            .is_empty()
    }

    fn drain_ready(&self, now: Instant, out: &mut BatchOfLists) -> Option<Instant> {
        let mut inner = self.inner.lock().expect("input queue lock poisoned");
        let mut next_expiry: Option<Instant> = None;
        let mut remaining = VecDeque::with_capacity(inner.len());
        while let Some(entry) = inner.pop_front() {
            if entry.deadline <= now {
                out.push(entry.msgs);
            } else {
                next_expiry = Some(match next_expiry {
                    Some(expiry) => expiry.min(entry.deadline),
                    None => entry.deadline,
                });
                remaining.push_back(entry);
            }
        }
        *inner = remaining;
        next_expiry
    }

    fn drain_all(&self) -> BatchOfLists {
        let mut inner = self.inner.lock().expect("input queue lock poisoned");
        inner.drain(..).map(|entry| entry.msgs).collect()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::time::{advance, Duration};

    use crate::message::Msg;

    use super::*;

    fn msgs(payload: &'static [u8]) -> MsgList {
        vec![Msg::new("t", None, 0, Bytes::from_static(payload), 1)]
    }

    #[tokio::test(start_paused = true)]
    async fn batching_lists_become_ready_at_the_deadline() {
        let queue = InputQueue::new(Duration::from_millis(100));
        queue.put(msgs(b"a"));
        queue.put(msgs(b"b"));

        let mut out = BatchOfLists::new();
        let expiry = queue.get(Instant::now(), &mut out);
        assert!(out.is_empty());
        let expiry = expiry.expect("messages still batching");

        advance(Duration::from_millis(150)).await;
        assert!(expiry <= Instant::now());
        let mut out = BatchOfLists::new();
        let expiry = queue.nonblocking_get(Instant::now(), &mut out);
        assert_eq!(out.len(), 2);
        assert!(expiry.is_none());
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn put_now_is_ready_immediately() {
        let queue = InputQueue::new(Duration::from_secs(10));
        queue.put(msgs(b"later"));
        queue.put_now(msgs(b"now"));

        let mut out = BatchOfLists::new();
        let expiry = queue.get(Instant::now(), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0].payload().as_ref(), b"now");
        assert!(expiry.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drain_flushes_unexpired_batches() {
        let queue = InputQueue::new(Duration::from_secs(10));
        queue.put(msgs(b"a"));
        queue.put(msgs(b"b"));

        let all = queue.get_all_on_shutdown();
        assert_eq!(all.len(), 2);
        assert!(queue.is_empty());
        assert!(queue.reset().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn notification_fires_on_enqueue() {
        let queue = std::sync::Arc::new(InputQueue::new(Duration::from_millis(1)));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.notified().await })
        };
        tokio::task::yield_now().await;
        queue.put(msgs(b"x"));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("notified")
            .unwrap();
    }
}
