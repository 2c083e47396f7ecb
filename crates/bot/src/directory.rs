use std::collections::BTreeMap;

use plugin_core::User;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryEntry {
    #[serde(default)]
    pub email: Option<String>,
}

/// Known users keyed by Matrix ID (`@jane:example.org`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Directory {
    users: BTreeMap<String, DirectoryEntry>,
}

/// `jane` and `example.org` for `@jane:example.org`.
fn split_matrix_id(user_id: &str) -> Option<(&str, &str)> {
    let (localpart, server) = user_id.strip_prefix('@')?.split_once(':')?;
    (!localpart.is_empty() && !server.is_empty()).then_some((localpart, server))
}

impl Directory {
    /// Any well-formed Matrix ID is a user. Without a configured email the
    /// address defaults to `<localpart>@<server>`.
    pub fn user(&self, user_id: &str) -> Option<User> {
        let (localpart, server) = split_matrix_id(user_id)?;
        let email = self
            .users
            .get(user_id)
            .and_then(|entry| entry.email.clone())
            .unwrap_or_else(|| format!("{localpart}@{server}"));
        Some(User {
            id: user_id.to_owned(),
            username: localpart.to_owned(),
            email,
        })
    }

    /// Configured user whose localpart is `username`.
    pub fn user_by_username(&self, username: &str) -> Option<User> {
        self.users
            .keys()
            .find(|id| {
                split_matrix_id(id).is_some_and(|(localpart, _)| localpart.eq_ignore_ascii_case(username))
            })
            .and_then(|id| self.user(id))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
