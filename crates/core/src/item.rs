use serde::{Deserialize, Serialize};

use crate::action::ActionType;

/// Stable identifier of a logical unit of work.
///
/// Composite keys join their parts with `:` (for example
/// `organization_id:tracker_id` or `project_id:action_type`), so two items that
/// describe the same resource always produce the same key across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Wrap an already-rendered key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build a key by joining `parts` with `:`.
    #[must_use]
    pub fn composite(parts: &[&str]) -> Self {
        Self(parts.join(":"))
    }

    /// Key of a keyword-tracking run.
    #[must_use]
    pub fn tracker(org_id: &str, tracker_id: &str) -> Self {
        Self::composite(&[org_id, tracker_id])
    }

    /// Key of a project's outbound interaction batch of one type.
    #[must_use]
    pub fn interaction(project_id: &str, action_type: &ActionType) -> Self {
        Self::composite(&[project_id, action_type.as_str()])
    }

    /// Key of a scheduled post.
    #[must_use]
    pub fn post(post_id: &str) -> Self {
        Self(post_id.to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Which shared exclusion primitive guards a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionScope {
    /// A single TTL lock on `<scope>:<id>`.
    Resource { scope: String, id: String },
    /// One slot in the organization's bounded set of active trackers.
    Tracker { org_id: String, tracker_id: String },
}

impl std::fmt::Display for ExclusionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource { scope, id } => write!(f, "{scope}:{id}"),
            Self::Tracker { org_id, tracker_id } => write!(f, "org:{org_id}:tracker:{tracker_id}"),
        }
    }
}

/// A due unit of work and the payload its task body needs.
///
/// Created when a poller discovers a due row and forgotten once a worker
/// has finished with it, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem<P> {
    pub key: ItemKey,
    pub scope: ExclusionScope,
    pub payload: P,
}

impl<P> WorkItem<P> {
    #[must_use]
    pub fn new(key: ItemKey, scope: ExclusionScope, payload: P) -> Self {
        Self {
            key,
            scope,
            payload,
        }
    }

    /// A keyword-tracking run gated by the organization's tracker semaphore.
    #[must_use]
    pub fn tracker(org_id: &str, tracker_id: &str, payload: P) -> Self {
        Self {
            key: ItemKey::tracker(org_id, tracker_id),
            scope: ExclusionScope::Tracker {
                org_id: org_id.to_owned(),
                tracker_id: tracker_id.to_owned(),
            },
            payload,
        }
    }

    /// A project's interaction batch gated by a single lock per
    /// `(project, action type)`.
    #[must_use]
    pub fn interaction(project_id: &str, action_type: &ActionType, payload: P) -> Self {
        let key = ItemKey::interaction(project_id, action_type);
        Self {
            scope: ExclusionScope::Resource {
                scope: "interaction".to_owned(),
                id: key.as_str().to_owned(),
            },
            key,
            payload,
        }
    }

    /// A scheduled post gated by a single lock per post.
    #[must_use]
    pub fn post(post_id: &str, payload: P) -> Self {
        Self {
            key: ItemKey::post(post_id),
            scope: ExclusionScope::Resource {
                scope: "post".to_owned(),
                id: post_id.to_owned(),
            },
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_joins_parts() {
        assert_eq!(ItemKey::composite(&["a", "b", "c"]).as_str(), "a:b:c");
        assert_eq!(ItemKey::tracker("org-1", "trk-9").as_str(), "org-1:trk-9");
    }

    #[test]
    fn interaction_key_uses_action_name() {
        let key = ItemKey::interaction("proj-3", &ActionType::DirectMessage);
        assert_eq!(key.to_string(), "proj-3:direct_message");
    }

    #[test]
    fn tracker_item_is_semaphore_scoped() {
        let item = WorkItem::tracker("org-1", "trk-2", ());
        assert_eq!(
            item.scope,
            ExclusionScope::Tracker {
                org_id: "org-1".into(),
                tracker_id: "trk-2".into(),
            }
        );
        assert_eq!(item.scope.to_string(), "org:org-1:tracker:trk-2");
    }

    #[test]
    fn post_item_is_lock_scoped() {
        let item = WorkItem::post("post-7", 42u32);
        assert_eq!(item.key.as_str(), "post-7");
        assert_eq!(item.scope.to_string(), "post:post-7");
        assert_eq!(item.payload, 42);
    }

    #[test]
    fn interaction_items_share_a_key_per_type() {
        let a = WorkItem::interaction("p", &ActionType::Like, 1);
        let b = WorkItem::interaction("p", &ActionType::Like, 2);
        let c = WorkItem::interaction("p", &ActionType::Comment, 3);
        assert_eq!(a.key, b.key);
        assert_ne!(a.key, c.key);
        assert_eq!(a.scope, b.scope);
    }
}
