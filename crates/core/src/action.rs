use serde::{Deserialize, Serialize};

/// The kind of outbound side effect a task body performs.
///
/// Rate limits are configured per `(project, action type)`. Unknown names
/// round-trip through [`ActionType::Custom`] so new interaction kinds can be
/// limited from configuration alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Comment,
    Reply,
    Like,
    Follow,
    DirectMessage,
    /// A scheduled post published on behalf of a project.
    Post,
    Custom(String),
}

impl ActionType {
    /// Return a string representation of the action type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Comment => "comment",
            Self::Reply => "reply",
            Self::Like => "like",
            Self::Follow => "follow",
            Self::DirectMessage => "direct_message",
            Self::Post => "post",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "comment" => Self::Comment,
            "reply" => Self::Reply,
            "like" => Self::Like,
            "follow" => Self::Follow,
            "direct_message" => Self::DirectMessage,
            "post" => Self::Post,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        match value {
            ActionType::Custom(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_as_str() {
        assert_eq!(ActionType::Comment.as_str(), "comment");
        assert_eq!(ActionType::Reply.as_str(), "reply");
        assert_eq!(ActionType::Like.as_str(), "like");
        assert_eq!(ActionType::Follow.as_str(), "follow");
        assert_eq!(ActionType::DirectMessage.as_str(), "direct_message");
        assert_eq!(ActionType::Post.as_str(), "post");
        assert_eq!(ActionType::Custom("repost".into()).as_str(), "repost");
    }

    #[test]
    fn parses_known_names() {
        assert_eq!(ActionType::from("direct_message"), ActionType::DirectMessage);
        assert_eq!(ActionType::from("like"), ActionType::Like);
    }

    #[test]
    fn unknown_names_become_custom() {
        assert_eq!(
            ActionType::from("connection_request"),
            ActionType::Custom("connection_request".into())
        );
    }

    #[test]
    fn serde_uses_plain_strings() {
        let json = serde_json::to_string(&ActionType::DirectMessage).unwrap();
        assert_eq!(json, "\"direct_message\"");
        let back: ActionType = serde_json::from_str("\"comment\"").unwrap();
        assert_eq!(back, ActionType::Comment);
    }
}
