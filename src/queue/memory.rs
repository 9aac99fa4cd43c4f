//! In-process queue gateway with visibility timeouts.
//!
//! Behaves like a hosted queue closely enough to drive the engine without a
//! database: received messages are hidden for a visibility timeout, each
//! receive issues a fresh receipt token, and redelivery counts grow per receive.

use super::{AckToken, QueueGateway, WorkItem};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct Stored {
    id: String,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    receipt: Option<String>,
}

#[derive(Default)]
struct Inner {
    messages: Vec<Stored>,
    next_id: u64,
    receive_calls: usize,
    fail_receives: usize,
    fail_extends: bool,
    fail_acks: bool,
    acknowledged: Vec<String>,
    extended: Vec<(String, Duration)>,
}

pub struct MemoryQueue {
    inner: Mutex<Inner>,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            visibility_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a fresh message. Returns its id.
    pub fn push(&self, body: impl Into<String>) -> String {
        self.push_redelivered(body, 0)
    }

    /// Enqueue a message that has already been received `prior_receives` times.
    pub fn push_redelivered(&self, body: impl Into<String>, prior_receives: u32) -> String {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("m-{}", inner.next_id);
        inner.messages.push(Stored {
            id: id.clone(),
            body: body.into(),
            receive_count: prior_receives,
            visible_at: Instant::now(),
            receipt: None,
        });
        id
    }

    /// Make the next `n` receive calls fail with a transport error.
    pub fn fail_next_receives(&self, n: usize) {
        self.lock().fail_receives = n;
    }

    /// Make every `extend_invisibility` call fail.
    pub fn fail_extends(&self, fail: bool) {
        self.lock().fail_extends = fail;
    }

    /// Make every `acknowledge` call fail.
    pub fn fail_acks(&self, fail: bool) {
        self.lock().fail_acks = fail;
    }

    /// Messages still stored (visible or not).
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn receive_calls(&self) -> usize {
        self.lock().receive_calls
    }

    /// Ids of acknowledged messages, in acknowledgement order.
    pub fn acknowledged(&self) -> Vec<String> {
        self.lock().acknowledged.clone()
    }

    /// `(id, delay)` of every successful invisibility extension.
    pub fn extensions(&self) -> Vec<(String, Duration)> {
        self.lock().extended.clone()
    }
}

#[async_trait]
impl QueueGateway for MemoryQueue {
    async fn receive(&self, max_count: usize) -> Result<Vec<WorkItem>> {
        let mut inner = self.lock();
        inner.receive_calls += 1;
        if inner.fail_receives > 0 {
            inner.fail_receives -= 1;
            return Err(Error::Transport("memory queue: injected receive failure".into()));
        }

        let now = Instant::now();
        let hidden_until = now + self.visibility_timeout;
        let mut batch = Vec::new();
        for msg in inner
            .messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(max_count)
        {
            msg.receive_count += 1;
            msg.visible_at = hidden_until;
            let receipt = format!("{}#{}", msg.id, msg.receive_count);
            msg.receipt = Some(receipt.clone());
            batch.push(WorkItem::new(
                msg.id.clone(),
                msg.body.clone(),
                msg.receive_count,
                AckToken::new(receipt),
            ));
        }
        Ok(batch)
    }

    async fn acknowledge(&self, token: AckToken) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_acks {
            return Err(Error::Transport("memory queue: injected ack failure".into()));
        }
        let pos = inner
            .messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(token.as_str()));
        if let Some(pos) = pos {
            let msg = inner.messages.remove(pos);
            inner.acknowledged.push(msg.id);
        }
        Ok(())
    }

    async fn extend_invisibility(&self, token: AckToken, delay: Duration) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_extends {
            return Err(Error::Transport("memory queue: injected extend failure".into()));
        }
        let visible_at = Instant::now()
            .checked_add(delay)
            .ok_or_else(|| Error::Transport(format!("visibility delay {delay:?} out of range")))?;
        let msg = inner
            .messages
            .iter_mut()
            .find(|m| m.receipt.as_deref() == Some(token.as_str()))
            .ok_or_else(|| Error::Transport(format!("receipt {token} is no longer valid")))?;
        msg.visible_at = visible_at;
        let id = msg.id.clone();
        inner.extended.push((id, delay));
        Ok(())
    }
}
