use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "You"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// In-memory transcript of one shell run. Entries are only ever appended;
/// the session is never written to the store as a whole.
#[derive(Debug, Default)]
pub struct ConversationSession {
    messages: Vec<Message>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that opens with the assistant's greeting.
    pub fn with_greeting(greeting: &str) -> Self {
        let mut session = Self::new();
        session.push(Role::Assistant, greeting);
        session
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_first_assistant_entry() {
        let session = ConversationSession::with_greeting("Hello");
        assert_eq!(session.len(), 1);
        assert_eq!(session.messages()[0].role, Role::Assistant);
        assert_eq!(session.last_assistant().unwrap().content, "Hello");
    }

    #[test]
    fn last_assistant_skips_trailing_user_entry() {
        let mut session = ConversationSession::new();
        assert!(session.is_empty());
        assert!(session.last_assistant().is_none());

        session.push(Role::User, "first");
        session.push(Role::Assistant, "reply");
        session.push(Role::User, "second");

        assert_eq!(session.last_assistant().unwrap().content, "reply");
    }
}
