//! Member value object.

use serde::{Deserialize, Serialize};

/// A person listed on a project or task.
///
/// This is a snapshot copied from the users service at the time the member
/// was added, not a live reference. Two members are the same person when
/// their usernames match; display fields may drift.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub username: String,
    #[serde(rename = "name", default)]
    pub display_name: String,
    #[serde(rename = "surname", default)]
    pub display_surname: String,
}

impl Member {
    /// Creates a member snapshot.
    pub fn new(
        username: impl Into<String>,
        display_name: impl Into<String>,
        display_surname: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            display_surname: display_surname.into(),
        }
    }

    /// Creates a snapshot that only carries the username.
    pub fn with_username(username: impl Into<String>) -> Self {
        Self::new(username, "", "")
    }

    /// Returns true if this snapshot refers to the given username.
    pub fn is(&self, username: &str) -> bool {
        self.username == username
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() && self.display_surname.is_empty() {
            write!(f, "{}", self.username)
        } else {
            write!(
                f,
                "{} {} ({})",
                self.display_name, self.display_surname, self.username
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_username() {
        let alice = Member::new("alice", "Alice", "Smith");
        assert!(alice.is("alice"));
        assert!(!alice.is("Alice"));
    }

    #[test]
    fn test_peer_wire_shape() {
        let member: Member =
            serde_json::from_str(r#"{"username":"bob","name":"Bob","surname":"Jones"}"#).unwrap();
        assert_eq!(member, Member::new("bob", "Bob", "Jones"));

        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json["name"], "Bob");
        assert_eq!(json["surname"], "Jones");
    }

    #[test]
    fn test_display_fields_are_optional_on_the_wire() {
        let member: Member = serde_json::from_str(r#"{"username":"carol"}"#).unwrap();
        assert_eq!(member, Member::with_username("carol"));
        assert_eq!(member.to_string(), "carol");
    }
}
