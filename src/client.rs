use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;

use crate::decode::NdjsonDecoder;
use crate::error::ChatError;

pub const CHAT_PATH: &str = "/v1/chat";

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Progress of one streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// One decoded record's content, in arrival order.
    Fragment(String),
    /// Whether bytes of an unfinished record are buffered.
    Pending(bool),
}

#[derive(Clone)]
pub struct StreamingChatClient {
    client: Client,
    base_url: String,
}

impl StreamingChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, CHAT_PATH)
    }

    /// POST `message` and stream the reply, reporting each fragment to
    /// `on_event`. Returns the whole reply once the stream ends.
    pub async fn stream_reply<F>(&self, message: &str, on_event: F) -> Result<String, ChatError>
    where
        F: FnMut(ReplyEvent),
    {
        let url = self.endpoint();
        tracing::debug!(%url, chars = message.chars().count(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest { message })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Status(response.status()));
        }

        fold_reply(response.bytes_stream(), on_event).await
    }
}

/// Decode an NDJSON byte stream into one reply string.
///
/// Every complete line found in a chunk is handled before the next chunk is
/// awaited. A residual line at end of stream counts as a normal record. On a
/// malformed line, fragments before it have already been reported.
pub async fn fold_reply<S, B, E, F>(chunks: S, mut on_event: F) -> Result<String, ChatError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    ChatError: From<E>,
    F: FnMut(ReplyEvent),
{
    futures_util::pin_mut!(chunks);

    let mut decoder = NdjsonDecoder::new();
    let mut assembled_message = String::new();
    let mut pending = false;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        decoder.feed(chunk.as_ref(), |fragment| {
            assembled_message.push_str(&fragment.content);
            pending = false;
            on_event(ReplyEvent::Fragment(fragment.content));
        })?;

        let now_pending = !decoder.pending().is_empty();
        if now_pending != pending {
            pending = now_pending;
            on_event(ReplyEvent::Pending(pending));
        }
    }

    if let Some(fragment) = decoder.finish()? {
        assembled_message.push_str(&fragment.content);
        on_event(ReplyEvent::Fragment(fragment.content));
    }

    Ok(assembled_message)
}
