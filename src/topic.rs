//! Topic registry: subscription membership and fan-out, including
//! wildcard group-publish.

use dashmap::{DashMap, DashSet};

/// Tracks which connections belong to which topics, in both directions,
/// so a single connection's teardown can unsubscribe it from everything
/// in one pass.
///
/// Forward and reverse indices are each backed by `DashMap`/`DashSet` for
/// lock-free concurrent membership updates, following the pattern the
/// teacher's `ConnectionRegistry` uses for its own concurrent map.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    by_topic: DashMap<String, DashSet<String>>,
    by_connection: DashMap<String, DashSet<String>>,
}

impl TopicRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection_id` to `topic`'s membership. Idempotent.
    pub fn join(&self, topic: &str, connection_id: &str) {
        self.by_topic
            .entry(topic.to_string())
            .or_default()
            .insert(connection_id.to_string());
        self.by_connection
            .entry(connection_id.to_string())
            .or_default()
            .insert(topic.to_string());
    }

    /// Removes `connection_id` from `topic`'s membership. Idempotent; a
    /// topic with no remaining members is dropped from the forward index.
    pub fn leave(&self, topic: &str, connection_id: &str) {
        if let Some(members) = self.by_topic.get(topic) {
            members.remove(connection_id);
            if members.is_empty() {
                drop(members);
                self.by_topic.remove(topic);
            }
        }
        if let Some(topics) = self.by_connection.get(connection_id) {
            topics.remove(topic);
            if topics.is_empty() {
                drop(topics);
                self.by_connection.remove(connection_id);
            }
        }
    }

    /// Removes `connection_id` from every topic it belongs to. Called on
    /// connection teardown.
    pub fn leave_all(&self, connection_id: &str) {
        let Some((_, topics)) = self.by_connection.remove(connection_id) else {
            return;
        };
        for topic in topics {
            if let Some(members) = self.by_topic.get(&topic) {
                members.remove(connection_id);
                if members.is_empty() {
                    drop(members);
                    self.by_topic.remove(&topic);
                }
            }
        }
    }

    /// Returns a snapshot of every topic and its current member IDs.
    ///
    /// Collected eagerly so callers never hold a `DashMap` guard across
    /// an await point or a blocking send.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Vec<String>)> {
        self.by_topic
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().map(|m| m.clone()).collect()))
            .collect()
    }

    /// Returns the current member IDs of `topic`, or an empty vec if the
    /// topic has no subscribers.
    #[must_use]
    pub fn members(&self, topic: &str) -> Vec<String> {
        self.by_topic
            .get(topic)
            .map(|members| members.iter().map(|m| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the member IDs of every topic whose name starts with
    /// `group_prefix` followed by `/` -- i.e. every topic reachable by a
    /// `<group_prefix>/*` wildcard publish.
    ///
    /// A topic exactly equal to `group_prefix` is never included: the
    /// remainder after stripping the prefix must be non-empty and start
    /// with `/`.
    #[must_use]
    pub fn group_members(&self, group_prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        for entry in &self.by_topic {
            let topic = entry.key();
            if let Some(rest) = topic.strip_prefix(group_prefix) {
                if rest.starts_with('/') {
                    out.extend(entry.value().iter().map(|m| m.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_members() {
        let reg = TopicRegistry::new();
        reg.join("chat", "a");
        reg.join("chat", "b");
        let mut members = reg.members("chat");
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn join_is_idempotent() {
        let reg = TopicRegistry::new();
        reg.join("chat", "a");
        reg.join("chat", "a");
        assert_eq!(reg.members("chat"), vec!["a".to_string()]);
    }

    #[test]
    fn leave_removes_member_and_empty_topic() {
        let reg = TopicRegistry::new();
        reg.join("chat", "a");
        reg.leave("chat", "a");
        assert!(reg.members("chat").is_empty());
        assert!(reg.snapshot().is_empty());
    }

    #[test]
    fn leave_all_clears_every_topic_for_connection() {
        let reg = TopicRegistry::new();
        reg.join("chat", "a");
        reg.join("news", "a");
        reg.join("chat", "b");
        reg.leave_all("a");
        assert_eq!(reg.members("chat"), vec!["b".to_string()]);
        assert!(reg.members("news").is_empty());
    }

    #[test]
    fn group_members_matches_prefixed_subtopics_only() {
        let reg = TopicRegistry::new();
        reg.join("room/1", "a");
        reg.join("room/2", "b");
        reg.join("room", "c");
        reg.join("roomX", "d");

        let mut members = reg.group_members("room");
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let reg = TopicRegistry::new();
        reg.join("chat", "a");
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, "chat");
        assert_eq!(snap[0].1, vec!["a".to_string()]);
    }
}
