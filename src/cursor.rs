//! Resumable iteration over a user's filtered candidates
//!
//! The list is materialized once at user start rather than streamed from
//! the network, so progress reporting and ordering stay stable even if the
//! store connection degrades mid-run. Single pass, forward only.

use crate::models::MessageCandidate;

pub struct MessageCursor {
    messages: Vec<MessageCandidate>,
    index: usize,
}

impl MessageCursor {
    /// Wrap an already filtered and sorted candidate list
    pub fn new(messages: Vec<MessageCandidate>) -> Self {
        Self { messages, index: 0 }
    }

    pub fn has_next(&self) -> bool {
        self.index < self.messages.len()
    }

    pub fn next(&mut self) -> Option<MessageCandidate> {
        let message = self.messages.get(self.index).cloned()?;
        self.index += 1;
        Some(message)
    }

    /// (messages yielded so far, total)
    pub fn progress(&self) -> (usize, usize) {
        (self.index, self.messages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRef;

    fn candidate(uid: &str) -> MessageCandidate {
        MessageCandidate {
            message_ref: MessageRef::new(uid),
            message_ids: vec![],
            from: vec![],
            subject: None,
            received_date: None,
            sent_date: None,
        }
    }

    #[test]
    fn test_empty_cursor() {
        let mut cursor = MessageCursor::new(vec![]);
        assert!(!cursor.has_next());
        assert!(cursor.next().is_none());
        assert_eq!(cursor.progress(), (0, 0));
    }

    #[test]
    fn test_forward_iteration() {
        let mut cursor = MessageCursor::new(vec![candidate("a"), candidate("b")]);
        assert!(cursor.has_next());
        assert_eq!(cursor.progress(), (0, 2));

        assert_eq!(cursor.next().unwrap().message_ref.as_str(), "a");
        assert_eq!(cursor.progress(), (1, 2));

        assert_eq!(cursor.next().unwrap().message_ref.as_str(), "b");
        assert_eq!(cursor.progress(), (2, 2));

        assert!(!cursor.has_next());
        assert!(cursor.next().is_none());
        // exhausted cursor does not advance past the end
        assert_eq!(cursor.progress(), (2, 2));
    }
}
