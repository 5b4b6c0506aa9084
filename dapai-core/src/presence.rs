//! Online-user snapshots.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::session::avatar_text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub nickname: String,
    pub avatar_text: String,
    /// The entry is the local user.
    pub is_self: bool,
}

/// The online users, deduplicated and sorted by nickname (byte order,
/// case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceSnapshot {
    pub users: Vec<PresenceEntry>,
    pub online_count: usize,
}

impl PresenceSnapshot {
    pub fn new(users: Vec<String>, own_nickname: Option<&str>) -> Self {
        let sorted: BTreeSet<String> = users.into_iter().collect();
        let users: Vec<PresenceEntry> = sorted
            .into_iter()
            .map(|nickname| PresenceEntry {
                avatar_text: avatar_text(&nickname),
                is_self: own_nickname == Some(nickname.as_str()),
                nickname,
            })
            .collect();
        Self {
            online_count: users.len(),
            users,
        }
    }

    pub fn nicknames(&self) -> Vec<&str> {
        self.users.iter().map(|u| u.nickname.as_str()).collect()
    }
}
