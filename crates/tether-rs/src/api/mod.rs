//! Reply generation seam and API retry policy.
//!
//! - [`ReplyClient`]: the only interface the orchestrator needs from a
//!   model: a message list plus the latest user text in, reply text out.
//!   [`OpenRouterClient`](crate::OpenRouterClient) implements it over HTTP.
//! - [`retry`]: transient error detection with exponential backoff.

pub mod retry;

pub use retry::RetryConfig;

use crate::{Message, OpenRouterClient};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Boxed future returned by [`ReplyClient::generate`].
pub type ReplyFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Generates a reply for a conversation.
///
/// `messages` is the (possibly reduced) history including any tool results
/// appended this turn; `user_text` is the turn's input, not yet part of
/// `messages`.
pub trait ReplyClient: Send + Sync {
    fn generate<'a>(&'a self, messages: &'a [Message], user_text: &'a str) -> ReplyFuture<'a>;

    /// Model identifier used to resolve the context window size.
    fn model(&self) -> &str;
}

impl ReplyClient for OpenRouterClient {
    fn generate<'a>(&'a self, messages: &'a [Message], user_text: &'a str) -> ReplyFuture<'a> {
        Box::pin(async move {
            let mut history = messages.to_vec();
            history.push(Message::user(user_text));
            let body = self.build_request(&history);

            let mut attempt = 0;
            loop {
                match self.chat(&body).await {
                    Ok(text) => return Ok(text),
                    Err(e) if attempt < self.retry.max_retries && retry::is_transient_error(&e) => {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!(
                            "Transient API error (attempt {}/{}), retrying in {:.1}s: {e}",
                            attempt + 1,
                            self.retry.max_retries,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        debug!("Reply generation failed after {attempt} retries");
                        return Err(e);
                    }
                }
            }
        })
    }

    fn model(&self) -> &str {
        OpenRouterClient::model(self)
    }
}
