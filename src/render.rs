//! Message list model the chat session renders into.
//!
//! The session never looks a placeholder up by name: [`RenderSurface::open_placeholder`]
//! hands back a [`Placeholder`] handle, the stream loop threads it through every
//! update, and [`RenderSurface::finalize`] or [`RenderSurface::abandon`] consumes it.

use crate::history::Role;

/// Handle to a reply that is still streaming. Not `Clone`, so exactly one
/// owner can finalize or abandon it.
#[derive(Debug, PartialEq, Eq)]
pub struct Placeholder(usize);

impl Placeholder {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Something that can show a conversation.
pub trait RenderSurface {
    /// Show a finalized turn.
    fn append_turn(&mut self, role: Role, message: &str);

    /// Start an empty, live bot entry.
    fn open_placeholder(&mut self) -> Placeholder;

    /// Append one fragment to a live entry.
    fn append_fragment(&mut self, placeholder: &Placeholder, fragment: &str);

    /// Mark that unconfirmed bytes are buffered behind the last fragment.
    fn set_pending(&mut self, placeholder: &Placeholder, pending: bool);

    /// The reply completed; the entry stops being live.
    fn finalize(&mut self, placeholder: Placeholder);

    /// The reply failed. Empty entries are removed, others are frozen as-is.
    fn abandon(&mut self, placeholder: Placeholder, reason: &str);

    /// Wipe everything shown.
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Final,
    Live { pending: bool },
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub role: Role,
    pub text: String,
    pub state: EntryState,
}

impl Entry {
    pub fn is_live(&self) -> bool {
        matches!(self.state, EntryState::Live { .. })
    }
}

/// The message list shown by the terminal UI.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn has_live_entry(&self) -> bool {
        self.entries.iter().any(Entry::is_live)
    }

    fn live_mut(&mut self, placeholder: &Placeholder) -> Option<&mut Entry> {
        self.entries.get_mut(placeholder.0).filter(|e| e.is_live())
    }
}

impl RenderSurface for Transcript {
    fn append_turn(&mut self, role: Role, message: &str) {
        self.entries.push(Entry {
            role,
            text: message.to_string(),
            state: EntryState::Final,
        });
    }

    fn open_placeholder(&mut self) -> Placeholder {
        self.entries.push(Entry {
            role: Role::Bot,
            text: String::new(),
            state: EntryState::Live { pending: false },
        });
        Placeholder(self.entries.len() - 1)
    }

    fn append_fragment(&mut self, placeholder: &Placeholder, fragment: &str) {
        if let Some(entry) = self.live_mut(placeholder) {
            entry.text.push_str(fragment);
            entry.state = EntryState::Live { pending: false };
        }
    }

    fn set_pending(&mut self, placeholder: &Placeholder, pending: bool) {
        if let Some(entry) = self.live_mut(placeholder) {
            entry.state = EntryState::Live { pending };
        }
    }

    fn finalize(&mut self, placeholder: Placeholder) {
        if let Some(entry) = self.live_mut(&placeholder) {
            entry.state = EntryState::Final;
        }
    }

    fn abandon(&mut self, placeholder: Placeholder, reason: &str) {
        let Some(entry) = self.live_mut(&placeholder) else {
            return;
        };

        if entry.text.is_empty() {
            self.entries.remove(placeholder.0);
        } else {
            entry.state = EntryState::Failed;
        }
        tracing::debug!(reason, "placeholder abandoned");
    }

    fn reset(&mut self) {
        self.entries.clear();
    }
}
