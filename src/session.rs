//! One chat conversation: history, what is on screen, and the reply in flight.
//!
//! A turn goes through [`ChatSession::begin_turn`], any number of
//! [`ChatSession::apply`] calls, and exactly one of [`ChatSession::complete`],
//! [`ChatSession::fail`] or [`ChatSession::cancel`]. Each of the three exits
//! clears the in-flight state, which is what re-enables the input.

use tokio::task::AbortHandle;

use crate::client::{ReplyEvent, StreamingChatClient};
use crate::error::ChatError;
use crate::history::{History, Role, Turn};
use crate::render::{Placeholder, RenderSurface};

/// Identifies a turn so late events from an earlier stream can be dropped.
pub type TurnId = u64;

/// State owned by the reply currently streaming.
struct InFlight {
    id: TurnId,
    placeholder: Placeholder,
    assembled_message: String,
    abort: Option<AbortHandle>,
}

pub struct ChatSession<R: RenderSurface> {
    history: History,
    surface: R,
    in_flight: Option<InFlight>,
    next_turn: TurnId,
    last_error: Option<String>,
}

impl<R: RenderSurface> ChatSession<R> {
    pub fn new(history: History, surface: R) -> Self {
        Self {
            history,
            surface,
            in_flight: None,
            next_turn: 0,
            last_error: None,
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    /// True while a reply streams; the input stays disabled meanwhile.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Load persisted turns and replay them onto the surface.
    pub fn restore(&mut self) {
        self.surface.reset();
        let turns = self.history.load().to_vec();
        for turn in &turns {
            self.surface.append_turn(turn.role, &turn.message);
        }
        tracing::info!(turns = turns.len(), "history restored");
    }

    /// Wipe the persisted history and reload the view from the empty store.
    pub fn clear(&mut self) {
        self.cancel();
        if let Err(e) = self.history.clear() {
            tracing::error!(error = %e, "failed to clear history");
        }
        self.last_error = None;
        self.restore();
    }

    /// Record the user turn, open a live placeholder and lock the input.
    ///
    /// Returns the turn id and the trimmed message to send.
    pub fn begin_turn(&mut self, text: &str) -> Result<(TurnId, String), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.is_busy() {
            return Err(ChatError::Busy);
        }

        self.history.push(Turn::user(text));
        self.persist();
        self.surface.append_turn(Role::User, text);

        let id = self.next_turn;
        self.next_turn += 1;
        self.in_flight = Some(InFlight {
            id,
            placeholder: self.surface.open_placeholder(),
            assembled_message: String::new(),
            abort: None,
        });
        self.last_error = None;

        Ok((id, text.to_string()))
    }

    /// Tie the task streaming turn `id` to the in-flight state so it can be
    /// cancelled.
    pub fn attach_abort(&mut self, id: TurnId, abort: AbortHandle) {
        match self.in_flight.as_mut() {
            Some(turn) if turn.id == id => turn.abort = Some(abort),
            _ => abort.abort(),
        }
    }

    /// Render one stream event into the live placeholder.
    pub fn apply(&mut self, id: TurnId, event: ReplyEvent) {
        let Some(turn) = self.in_flight.as_mut().filter(|t| t.id == id) else {
            tracing::trace!(id, "dropping event for a finished turn");
            return;
        };

        match event {
            ReplyEvent::Fragment(fragment) => {
                turn.assembled_message.push_str(&fragment);
                self.surface.append_fragment(&turn.placeholder, &fragment);
            }
            ReplyEvent::Pending(pending) => {
                self.surface.set_pending(&turn.placeholder, pending);
            }
        }
    }

    /// The stream ended; store the folded reply as a bot turn.
    pub fn complete(&mut self, id: TurnId, message: String) {
        let Some(turn) = self.take_turn(id) else {
            return;
        };

        if message != turn.assembled_message {
            tracing::warn!(id, "rendered reply differs from folded reply");
        }

        tracing::info!(id, chars = message.chars().count(), "reply complete");
        self.history.push(Turn::bot(message));
        self.persist();
        self.surface.finalize(turn.placeholder);
    }

    /// The stream failed. Nothing is added to history; what was already
    /// rendered stays as it is.
    ///
    /// Returns false when `id` is no longer in flight and nothing changed.
    pub fn fail(&mut self, id: TurnId, error: ChatError) -> bool {
        let Some(turn) = self.take_turn(id) else {
            tracing::debug!(id, error = %error, "ignoring failure of a finished turn");
            return false;
        };

        if error.is_network() {
            tracing::error!(id, error = %error, "chat request failed");
        } else {
            tracing::error!(id, error = %error, "reply stream aborted");
        }

        let reason = error.to_string();
        self.surface.abandon(turn.placeholder, &reason);
        self.last_error = Some(reason);
        true
    }

    /// Stop the reply in flight, if any.
    pub fn cancel(&mut self) {
        let Some(turn) = self.in_flight.take() else {
            return;
        };

        if let Some(abort) = turn.abort {
            abort.abort();
        }
        tracing::info!(id = turn.id, "reply cancelled");
        self.surface.abandon(turn.placeholder, "cancelled");
    }

    fn take_turn(&mut self, id: TurnId) -> Option<InFlight> {
        if self.in_flight.as_ref().is_some_and(|t| t.id == id) {
            self.in_flight.take()
        } else {
            None
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.history.save() {
            tracing::error!(error = %e, "failed to persist history");
        }
    }

    /// Send `text` and stream the reply inline.
    ///
    /// Every failure is logged and reflected on the surface; nothing is
    /// returned to the caller.
    pub async fn send(&mut self, client: &StreamingChatClient, text: &str) {
        let (id, message) = match self.begin_turn(text) {
            Ok(turn) => turn,
            Err(e) => {
                tracing::warn!(error = %e, "message not sent");
                return;
            }
        };

        let result = client
            .stream_reply(&message, |event| self.apply(id, event))
            .await;

        match result {
            Ok(reply) => self.complete(id, reply),
            Err(e) => {
                self.fail(id, e);
            }
        }
    }

    /// Send the most recent user message again.
    pub async fn regenerate(&mut self, client: &StreamingChatClient) {
        let Some(text) = self.history.last_user_message().map(str::to_string) else {
            tracing::debug!("nothing to regenerate");
            return;
        };
        self.send(client, &text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fold_reply;
    use crate::history::DEFAULT_HISTORY_KEY;
    use crate::render::{EntryState, Transcript};
    use crate::store::testing::SharedStore;
    use crate::store::SessionStore;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Surface that records every call, to check the render path.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        next: usize,
    }

    impl RenderSurface for Recorder {
        fn append_turn(&mut self, role: Role, message: &str) {
            self.calls.push(format!("turn {:?} {}", role, message));
        }
        fn open_placeholder(&mut self) -> Placeholder {
            self.calls.push("open".into());
            self.next += 1;
            Placeholder::new(self.next)
        }
        fn append_fragment(&mut self, _: &Placeholder, fragment: &str) {
            self.calls.push(format!("fragment {}", fragment));
        }
        fn set_pending(&mut self, _: &Placeholder, pending: bool) {
            self.calls.push(format!("pending {}", pending));
        }
        fn finalize(&mut self, _: Placeholder) {
            self.calls.push("finalize".into());
        }
        fn abandon(&mut self, _: Placeholder, _: &str) {
            self.calls.push("abandon".into());
        }
        fn reset(&mut self) {
            self.calls.push("reset".into());
        }
    }

    fn session(store: &SharedStore) -> ChatSession<Transcript> {
        let history = History::new(Box::new(store.clone()), DEFAULT_HISTORY_KEY);
        ChatSession::new(history, Transcript::new())
    }

    async fn backend(body: &'static str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat"))
            .respond_with(ResponseTemplate::new(status).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;
        server
    }

    fn stored(store: &SharedStore) -> Vec<Turn> {
        let value = store.get(DEFAULT_HISTORY_KEY).unwrap().unwrap();
        serde_json::from_str(&value).unwrap()
    }

    #[tokio::test]
    async fn test_hello_hi_there() {
        let server = backend("{\"content\":\"Hi\"}\n{\"content\":\" there\"}\n", 200).await;
        let client = StreamingChatClient::new(&server.uri());
        let store = SharedStore::default();
        let mut chat = session(&store);

        chat.send(&client, "hello").await;

        let expected = vec![Turn::user("hello"), Turn::bot("Hi there")];
        assert_eq!(chat.history().turns(), expected.as_slice());
        assert_eq!(stored(&store), expected);

        let entries = chat.surface().entries();
        assert_eq!(entries[1].text, "Hi there");
        assert_eq!(entries[1].state, EntryState::Final);
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn test_fragment_renders_match_lines() {
        let server = backend("{\"content\":\"a\"}\n{\"content\":\"b\"}\n{\"content\":\"c\"}\n", 200).await;
        let client = StreamingChatClient::new(&server.uri());
        let history = History::new(Box::new(SharedStore::default()), DEFAULT_HISTORY_KEY);
        let mut chat = ChatSession::new(history, Recorder::default());

        chat.send(&client, "  letters  ").await;

        let fragments: Vec<_> = chat
            .surface()
            .calls
            .iter()
            .filter(|c| c.starts_with("fragment"))
            .collect();
        assert_eq!(fragments, vec!["fragment a", "fragment b", "fragment c"]);
        assert_eq!(chat.surface().calls.first().unwrap(), "turn User letters");
        assert_eq!(chat.surface().calls.last().unwrap(), "finalize");
        assert_eq!(chat.history().turns().last(), Some(&Turn::bot("abc")));
    }

    #[tokio::test]
    async fn test_unterminated_final_line() {
        let server = backend("{\"content\":\"partial\"}", 200).await;
        let client = StreamingChatClient::new(&server.uri());
        let store = SharedStore::default();
        let mut chat = session(&store);

        chat.send(&client, "go").await;

        assert_eq!(chat.history().turns()[1], Turn::bot("partial"));
    }

    #[tokio::test]
    async fn test_error_status_keeps_only_user_turn() {
        let server = backend("", 500).await;
        let client = StreamingChatClient::new(&server.uri());
        let store = SharedStore::default();
        let mut chat = session(&store);

        chat.send(&client, "hello").await;

        assert_eq!(chat.history().turns(), &[Turn::user("hello")]);
        assert_eq!(stored(&store), vec![Turn::user("hello")]);
        assert!(!chat.is_busy());
        assert!(!chat.surface().has_live_entry());
        assert_eq!(chat.surface().entries().len(), 1);
        assert!(chat.last_error().is_some());
    }

    #[tokio::test]
    async fn test_decode_error_freezes_partial_reply() {
        let server = backend("{\"content\":\"Hi\"}\nnot json\n{\"content\":\"!\"}\n", 200).await;
        let client = StreamingChatClient::new(&server.uri());
        let store = SharedStore::default();
        let mut chat = session(&store);

        chat.send(&client, "hello").await;

        assert_eq!(chat.history().len(), 1);
        let reply = &chat.surface().entries()[1];
        assert_eq!(reply.text, "Hi");
        assert_eq!(reply.state, EntryState::Failed);
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn test_decode_error_in_later_chunk_keeps_earlier_text() {
        let chunks = futures_util::stream::iter(
            ["{\"content\":\"Hi\"}\n", "{\"content\":\" there\"}\n", "oops\n"]
                .map(|part| Ok::<_, std::convert::Infallible>(part.as_bytes())),
        );
        let store = SharedStore::default();
        let mut chat = session(&store);
        let (id, _) = chat.begin_turn("hello").unwrap();

        let result = fold_reply(chunks, |event| chat.apply(id, event)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ChatError::Decode { .. }));
        assert!(chat.fail(id, err));

        assert_eq!(stored(&store), vec![Turn::user("hello")]);
        let reply = &chat.surface().entries()[1];
        assert_eq!(reply.text, "Hi there");
        assert_eq!(reply.state, EntryState::Failed);
        assert!(!chat.is_busy());
    }

    #[test]
    fn test_failure_of_cancelled_turn_is_ignored() {
        let mut chat = session(&SharedStore::default());
        let (id, _) = chat.begin_turn("hello").unwrap();
        chat.cancel();

        assert!(!chat.fail(id, ChatError::Busy));
        assert_eq!(chat.last_error(), None);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_logged_not_raised() {
        // Nothing listens on port 9 in the test environment
        let client = StreamingChatClient::new("http://127.0.0.1:9");
        let mut chat = session(&SharedStore::default());

        chat.send(&client, "hello").await;

        assert!(!chat.is_busy());
        assert_eq!(chat.history().len(), 1);
    }

    #[test]
    fn test_second_send_rejected_while_busy() {
        let mut chat = session(&SharedStore::default());
        let (first, _) = chat.begin_turn("one").unwrap();

        assert!(matches!(chat.begin_turn("two"), Err(ChatError::Busy)));
        assert_eq!(chat.history().len(), 1);

        chat.complete(first, String::new());
        assert!(chat.begin_turn("two").is_ok());
    }

    #[test]
    fn test_blank_message_is_ignored() {
        let mut chat = session(&SharedStore::default());
        assert!(matches!(chat.begin_turn("   \n"), Err(ChatError::EmptyMessage)));
        assert!(chat.history().is_empty());
        assert!(!chat.is_busy());
    }

    #[test]
    fn test_stale_events_are_dropped() {
        let mut chat = session(&SharedStore::default());
        let (first, _) = chat.begin_turn("one").unwrap();
        chat.cancel();
        let (second, _) = chat.begin_turn("two").unwrap();

        chat.apply(first, ReplyEvent::Fragment("old".into()));
        chat.complete(first, "old".into());
        assert!(chat.is_busy());

        chat.apply(second, ReplyEvent::Fragment("new".into()));
        chat.complete(second, "new".into());

        let bots: Vec<_> = chat
            .history()
            .turns()
            .iter()
            .filter(|t| t.role == Role::Bot)
            .collect();
        assert_eq!(bots, vec![&Turn::bot("new")]);
    }

    #[test]
    fn test_restore_replays_in_order() {
        let store = SharedStore::default();
        {
            let mut chat = session(&store);
            let (id, _) = chat.begin_turn("hello").unwrap();
            chat.apply(id, ReplyEvent::Fragment("Hi".into()));
            chat.complete(id, "Hi".into());
        }

        let history = History::new(Box::new(store), DEFAULT_HISTORY_KEY);
        let mut fresh = ChatSession::new(history, Recorder::default());
        fresh.restore();

        assert_eq!(
            fresh.surface().calls,
            vec!["reset", "turn User hello", "turn Bot Hi"]
        );
    }

    #[test]
    fn test_clear_then_restore_is_empty() {
        let store = SharedStore::default();
        let mut chat = session(&store);
        let (id, _) = chat.begin_turn("hello").unwrap();
        chat.complete(id, "Hi".into());

        chat.clear();

        assert!(chat.history().is_empty());
        assert!(chat.surface().entries().is_empty());
        assert_eq!(store.get(DEFAULT_HISTORY_KEY).unwrap(), None);

        let mut fresh = session(&store);
        fresh.restore();
        assert!(fresh.history().is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_resends_last_user_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat"))
            .and(body_json(serde_json::json!({ "message": "again" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{\"content\":\"ok\"}\n", "application/x-ndjson"))
            .expect(2)
            .mount(&server)
            .await;

        let client = StreamingChatClient::new(&server.uri());
        let mut chat = session(&SharedStore::default());
        chat.send(&client, "again").await;
        chat.regenerate(&client).await;

        let turns = chat.history().turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2], Turn::user("again"));
        assert_eq!(turns[3], Turn::bot("ok"));
    }
}
