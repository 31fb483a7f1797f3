//! Conversation history and its persisted form
//!
//! Only finalized turns ever reach the store. A reply that is still
//! streaming lives in the session's in-flight state instead.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::SessionStore;

pub const DEFAULT_HISTORY_KEY: &str = "chatMessageHistory";

/// A finalized chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub message: String,
}

impl Turn {
    pub fn user(message: impl Into<String>) -> Self {
        Self { role: Role::User, message: message.into() }
    }

    pub fn bot(message: impl Into<String>) -> Self {
        Self { role: Role::Bot, message: message.into() }
    }
}

/// Who sent a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// Ordered, append-only list of turns backed by one store slot.
pub struct History {
    turns: Vec<Turn>,
    store: Box<dyn SessionStore>,
    key: String,
}

impl History {
    pub fn new(store: Box<dyn SessionStore>, key: impl Into<String>) -> Self {
        Self {
            turns: Vec::new(),
            store,
            key: key.into(),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.message.as_str())
    }

    /// Write every turn to the slot.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let value = serde_json::to_string(&self.turns)?;
        self.store.set(&self.key, &value)?;
        Ok(())
    }

    /// Replace the in-memory turns with what the slot holds.
    ///
    /// A missing slot is an empty history. A corrupt or unreadable one is
    /// logged and also treated as empty.
    pub fn load(&mut self) -> &[Turn] {
        self.turns = match self.read_slot() {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "discarding unreadable history");
                Vec::new()
            }
        };
        &self.turns
    }

    fn read_slot(&self) -> Result<Vec<Turn>, StoreError> {
        match self.store.get(&self.key)? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Drop every turn and remove the slot.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.turns.clear();
        self.store.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::SharedStore;
    use crate::store::MemoryStore;

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&vec![Turn::user("hello"), Turn::bot("Hi there")]).unwrap();
        assert_eq!(
            json,
            r#"[{"role":"user","message":"hello"},{"role":"bot","message":"Hi there"}]"#
        );
    }

    #[test]
    fn test_save_then_load_in_fresh_history() {
        let store = SharedStore::default();

        let mut first = History::new(Box::new(store.clone()), DEFAULT_HISTORY_KEY);
        first.push(Turn::user("hello"));
        first.push(Turn::bot("Hi there"));
        first.save().unwrap();

        let mut second = History::new(Box::new(store), DEFAULT_HISTORY_KEY);
        assert_eq!(second.load(), first.turns());
    }

    #[test]
    fn test_corrupt_slot_loads_empty() {
        let mut store = MemoryStore::new();
        store.set(DEFAULT_HISTORY_KEY, "{not an array").unwrap();

        let mut history = History::new(Box::new(store), DEFAULT_HISTORY_KEY);
        assert!(history.load().is_empty());
    }

    #[test]
    fn test_clear_removes_slot() {
        let store = SharedStore::default();
        let mut history = History::new(Box::new(store.clone()), DEFAULT_HISTORY_KEY);
        history.push(Turn::user("hello"));
        history.save().unwrap();

        history.clear().unwrap();
        assert!(history.is_empty());
        assert_eq!(store.get(DEFAULT_HISTORY_KEY).unwrap(), None);

        let mut reloaded = History::new(Box::new(store), DEFAULT_HISTORY_KEY);
        assert!(reloaded.load().is_empty());
    }

    #[test]
    fn test_last_user_message() {
        let mut history = History::new(Box::new(MemoryStore::new()), DEFAULT_HISTORY_KEY);
        assert_eq!(history.last_user_message(), None);

        history.push(Turn::user("first"));
        history.push(Turn::bot("reply"));
        history.push(Turn::user("second"));
        history.push(Turn::bot("reply"));
        assert_eq!(history.last_user_message(), Some("second"));
    }
}
