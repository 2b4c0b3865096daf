/// Separator between the two sorted participant ids.
pub const KEY_SEPARATOR: char = '_';

/// Canonical conversation key for a pair of participants.
///
/// Both ids are ordered lexicographically before joining, so
/// `conversation_key(a, b) == conversation_key(b, a)` and either party
/// resolves to the same conversation no matter who opens it first.
pub fn conversation_key(viewer: &str, counterpart: &str) -> String {
    let (first, second) = if viewer <= counterpart {
        (viewer, counterpart)
    } else {
        (counterpart, viewer)
    };
    format!("{first}{KEY_SEPARATOR}{second}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_lexicographic_join() {
        assert_eq!(conversation_key("u1", "u2"), "u1_u2");
        assert_eq!(conversation_key("u2", "u1"), "u1_u2");
    }

    #[test]
    fn test_key_is_order_independent() {
        let pairs = [
            ("alice", "bob"),
            ("Zed", "amy"),
            ("user-10", "user-9"),
            ("same", "same"),
            ("", "x"),
        ];
        for (a, b) in pairs {
            assert_eq!(conversation_key(a, b), conversation_key(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn test_uppercase_sorts_before_lowercase() {
        // Byte order, not locale order
        assert_eq!(conversation_key("bob", "Alice"), "Alice_bob");
    }
}
