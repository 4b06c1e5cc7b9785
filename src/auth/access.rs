//! Access tiers for canvas operations

use std::fmt;

use crate::canvas::Canvas;

/// Access tier required by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// Owner or share-set member
    Read,
    /// Owner only
    Write,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::Read => write!(f, "READ"),
            AccessLevel::Write => write!(f, "WRITE"),
        }
    }
}

/// Highest access tier `identity_id` holds on `canvas`, if any
pub fn granted_access(canvas: &Canvas, identity_id: &str) -> Option<AccessLevel> {
    if canvas.owner_id == identity_id {
        Some(AccessLevel::Write)
    } else if canvas.is_shared_with(identity_id) {
        Some(AccessLevel::Read)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;

    fn canvas() -> Canvas {
        let mut canvas = Canvas::new("deck".into(), "owner1".into(), Payload::new());
        canvas.shared_with.insert("user2".into());
        canvas
    }

    #[test]
    fn test_owner_has_write() {
        let canvas = canvas();
        assert_eq!(granted_access(&canvas, "owner1"), Some(AccessLevel::Write));
    }

    #[test]
    fn test_shared_user_has_read_only() {
        let canvas = canvas();
        assert_eq!(granted_access(&canvas, "user2"), Some(AccessLevel::Read));
        assert!(granted_access(&canvas, "user2") < Some(AccessLevel::Write));
    }

    #[test]
    fn test_stranger_has_nothing() {
        let canvas = canvas();
        assert_eq!(granted_access(&canvas, "user3"), None);
    }

    #[test]
    fn test_level_ordering() {
        assert!(AccessLevel::Write > AccessLevel::Read);
        assert_eq!(AccessLevel::Write.to_string(), "WRITE");
    }
}
