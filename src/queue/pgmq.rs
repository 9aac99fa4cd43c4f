//! pgmq-backed queue gateway.

use super::{AckToken, QueueGateway, WorkItem};
use crate::db::{Db, PgmqMessage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Gateway over a single pgmq queue.
///
/// The pgmq `msg_id` is the ack token and `read_ct` is the redelivery count.
pub struct PgmqGateway {
    db: Arc<Db>,
    queue_name: String,
    /// Visibility timeout applied on read, in seconds.
    vt_seconds: i32,
}

impl PgmqGateway {
    pub fn new(db: Arc<Db>, queue_name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            db,
            queue_name: queue_name.into(),
            vt_seconds: seconds(visibility_timeout),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

/// Clamp a duration into pgmq's integer-seconds argument, rounding up so a
/// sub-second delay still hides the message.
fn seconds(d: Duration) -> i32 {
    let secs = d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0));
    i32::try_from(secs).unwrap_or(i32::MAX)
}

fn msg_id(token: &AckToken) -> Result<i64> {
    token
        .as_str()
        .parse()
        .map_err(|_| Error::Transport(format!("malformed pgmq ack token: {token}")))
}

/// JSON strings are unwrapped; anything else is handed on as its JSON text.
fn body_of(message: &serde_json::Value) -> String {
    match message {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<PgmqMessage> for WorkItem {
    fn from(msg: PgmqMessage) -> Self {
        WorkItem::new(
            msg.msg_id.to_string(),
            body_of(&msg.message),
            u32::try_from(msg.read_ct).unwrap_or(1),
            AckToken::new(msg.msg_id.to_string()),
        )
    }
}

#[async_trait]
impl QueueGateway for PgmqGateway {
    async fn receive(&self, max_count: usize) -> Result<Vec<WorkItem>> {
        let qty = i32::try_from(max_count).unwrap_or(i32::MAX);
        let messages = self
            .db
            .read_batch(&self.queue_name, self.vt_seconds, qty)
            .await
            .map_err(Error::transport)?;
        Ok(messages.into_iter().map(WorkItem::from).collect())
    }

    async fn acknowledge(&self, token: AckToken) -> Result<()> {
        let id = msg_id(&token)?;
        let deleted = self
            .db
            .delete_message(&self.queue_name, id)
            .await
            .map_err(Error::transport)?;
        if !deleted {
            tracing::debug!(msg_id = id, "message already deleted");
        }
        Ok(())
    }

    async fn extend_invisibility(&self, token: AckToken, delay: Duration) -> Result<()> {
        let id = msg_id(&token)?;
        let found = self
            .db
            .set_visibility(&self.queue_name, id, seconds(delay))
            .await
            .map_err(Error::transport)?;
        if found {
            Ok(())
        } else {
            Err(Error::Transport(format!("message {id} no longer exists")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seconds_rounds_up_partial_seconds() {
        assert_eq!(seconds(Duration::from_secs(20)), 20);
        assert_eq!(seconds(Duration::from_millis(1500)), 2);
        assert_eq!(seconds(Duration::ZERO), 0);
        assert_eq!(seconds(Duration::MAX), i32::MAX);
    }

    #[test]
    fn string_payloads_are_unwrapped() {
        assert_eq!(body_of(&json!("hello")), "hello");
        assert_eq!(body_of(&json!({"k": 1})), r#"{"k":1}"#);
    }

    #[test]
    fn malformed_token_is_a_transport_error() {
        let err = msg_id(&AckToken::new("not-a-number")).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
