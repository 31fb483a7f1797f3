use tokio::sync::mpsc::UnboundedSender;

use crate::client::{ReplyEvent, StreamingChatClient};
use crate::config::Config;
use crate::error::ChatError;
use crate::history::History;
use crate::layout::Panels;
use crate::render::{Entry, EntryState, Transcript};
use crate::session::{ChatSession, TurnId};
use crate::store::{FileStore, MemoryStore, SessionStore};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,

    // Input line
    pub input: String,
    pub cursor: usize, // cursor position in chars

    // Conversation
    pub session: ChatSession<Transcript>,
    pub client: StreamingChatClient,
    pub store_label: String,

    // View state
    pub panels: Panels,
    pub scroll: u16,
    pub follow: bool, // keep the newest line in view
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub status: Option<String>,

    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: &Config, events: UnboundedSender<AppEvent>) -> Self {
        let (store, store_label): (Box<dyn SessionStore>, String) = match &config.session_dir {
            Some(dir) => {
                let store = FileStore::new(dir);
                let label = store.dir().display().to_string();
                (Box::new(store), label)
            }
            None => (Box::new(MemoryStore::new()), "memory".to_string()),
        };

        let history = History::new(store, config.history_key.as_str());
        let mut session = ChatSession::new(history, Transcript::new());
        session.restore();

        Self {
            should_quit: false,
            input: String::new(),
            cursor: 0,
            session,
            client: StreamingChatClient::new(&config.base_url),
            store_label,
            panels: Panels::default(),
            scroll: 0,
            follow: true,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            status: None,
            events,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    /// Send whatever is in the input line.
    pub fn submit(&mut self) {
        if self.is_busy() {
            self.status = Some("Reply in progress (Esc to cancel)".to_string());
            return;
        }
        if self.input.trim().is_empty() {
            return;
        }

        let text = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.start_turn(&text);
    }

    /// Resend the most recent user message.
    pub fn regenerate(&mut self) {
        if self.is_busy() {
            return;
        }
        match self.session.history().last_user_message().map(str::to_string) {
            Some(text) => self.start_turn(&text),
            None => self.status = Some("Nothing to regenerate".to_string()),
        }
    }

    fn start_turn(&mut self, text: &str) {
        let (id, message) = match self.session.begin_turn(text) {
            Ok(turn) => turn,
            Err(e) => {
                tracing::warn!(error = %e, "message not sent");
                self.status = Some(e.to_string());
                return;
            }
        };

        self.status = None;
        self.follow = true;

        let client = self.client.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let progress = events.clone();
            let result = client
                .stream_reply(&message, |event| {
                    let _ = progress.send(AppEvent::Reply(id, event));
                })
                .await;
            let _ = events.send(AppEvent::ReplyDone(id, result));
        });
        self.session.attach_abort(id, task.abort_handle());
    }

    pub fn on_reply(&mut self, id: TurnId, event: ReplyEvent) {
        self.session.apply(id, event);
    }

    pub fn on_reply_done(&mut self, id: TurnId, result: Result<String, ChatError>) {
        match result {
            Ok(message) => self.session.complete(id, message),
            Err(e) => {
                if self.session.fail(id, e) {
                    self.status = self.session.last_error().map(|e| format!("Error: {}", e));
                }
            }
        }
    }

    pub fn cancel_reply(&mut self) {
        if self.is_busy() {
            self.session.cancel();
            self.status = Some("Reply cancelled".to_string());
        }
    }

    /// Wipe the stored history and start over with an empty view.
    pub fn clear_history(&mut self) {
        self.session.clear();
        self.scroll = 0;
        self.follow = true;
        self.status = Some("History cleared".to_string());
    }

    pub fn quit(&mut self) {
        self.session.cancel();
        self.should_quit = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    // Scrolling

    fn max_scroll(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        transcript_height(self.session.surface().entries(), wrap_width).saturating_sub(visible_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.min(self.max_scroll()).saturating_sub(lines);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max);
        self.follow = self.scroll >= max;
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    /// Keep the newest line visible while following the conversation.
    pub fn sync_scroll(&mut self) {
        let max = self.max_scroll();
        if self.follow || self.scroll > max {
            self.scroll = max;
        }
    }
}

/// Lines the transcript takes once wrapped to `wrap_width` columns.
pub fn transcript_height(entries: &[Entry], wrap_width: usize) -> u16 {
    let wrap_width = wrap_width.max(1);
    let mut total_lines: usize = 0;

    for entry in entries {
        total_lines += 1; // Role line ("You:" or "Bot:")
        if entry.text.is_empty() {
            total_lines += 1; // "Thinking..." while nothing has arrived
        }
        for line in entry.text.lines() {
            // Use character count, not byte length, for proper UTF-8 handling
            let char_count = line.chars().count();
            total_lines += char_count.div_ceil(wrap_width).max(1);
        }
        if entry.state == EntryState::Failed {
            total_lines += 1; // "(reply interrupted)"
        }
        total_lines += 1; // Blank line after message
    }

    total_lines.min(u16::MAX as usize) as u16
}
