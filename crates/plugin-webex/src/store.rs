use core::fmt;
use std::sync::Arc;

use plugin_core::{AppError, PluginApi};
use sha2::{Digest as _, Sha256};

use crate::user::{IdentityError, UserInfo, resolve_identity};

const PREFIX_USER_INFO: &str = "user_info_";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to get {key} from store: {source}")]
    Get {
        key: String,
        #[source]
        source: AppError,
    },

    #[error("failed to store {key}: {source}")]
    Set {
        key: String,
        #[source]
        source: AppError,
    },

    #[error("failed to (de)serialize user info: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to resolve email before storing: {0}")]
    Identity(#[from] IdentityError),
}

/// Stable KV key for `key` under `prefix`.
#[must_use]
pub fn hash_key(prefix: &str, key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{prefix}{digest:x}")
}

/// Per-user [`UserInfo`] records in the host KV store.
#[derive(Clone)]
pub struct UserStore {
    api: Arc<dyn PluginApi>,
}

impl fmt::Debug for UserStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserStore").finish_non_exhaustive()
    }
}

impl UserStore {
    #[must_use]
    pub fn new(api: Arc<dyn PluginApi>) -> Self {
        Self { api }
    }

    /// `Ok(None)` when nothing is stored for the user, or the stored record
    /// has no email.
    pub async fn load(&self, user_id: &str) -> Result<Option<UserInfo>, StoreError> {
        let key = hash_key(PREFIX_USER_INFO, user_id);
        let data = self
            .api
            .kv_get(&key)
            .await
            .map_err(|source| StoreError::Get { key, source })?;

        let Some(data) = data else {
            return Ok(None);
        };
        let info: UserInfo = serde_json::from_slice(&data)?;
        if info.email.is_empty() {
            return Ok(None);
        }
        Ok(Some(info))
    }

    /// Writes `info`, filling in the user's email first if it is missing.
    pub async fn store(&self, user_id: &str, mut info: UserInfo) -> Result<(), StoreError> {
        if info.email.is_empty() {
            info.email = resolve_identity(self.api.as_ref(), user_id).await?.email;
        }
        let key = hash_key(PREFIX_USER_INFO, user_id);
        let data = serde_json::to_vec(&info)?;
        self.api
            .kv_set(&key, &data)
            .await
            .map_err(|source| StoreError::Set { key, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;

    fn store_with(api: &Arc<MockApi>) -> UserStore {
        UserStore::new(Arc::clone(api) as Arc<dyn PluginApi>)
    }

    #[test]
    fn keys_are_prefixed_and_stable() {
        let a = hash_key(PREFIX_USER_INFO, "u1");
        assert!(a.starts_with("user_info_"));
        assert_eq!(a.len(), PREFIX_USER_INFO.len() + 64);
        assert_eq!(a, hash_key(PREFIX_USER_INFO, "u1"));
        assert_ne!(a, hash_key(PREFIX_USER_INFO, "u2"));
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let api = Arc::new(MockApi::new());
        assert_eq!(store_with(&api).load("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_fills_email() {
        let api = Arc::new(MockApi::new().with_user("u1", "u1", "u1@co.com"));
        let store = store_with(&api);
        store
            .store(
                "u1",
                UserInfo {
                    email: String::new(),
                    room_id: "room1".to_owned(),
                },
            )
            .await
            .unwrap();

        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.email, "u1@co.com");
        assert_eq!(loaded.room_id, "room1");

        let raw = api.kv_raw(&hash_key(PREFIX_USER_INFO, "u1")).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["email"], "u1@co.com");
        assert_eq!(json["room_id"], "room1");
    }

    #[tokio::test]
    async fn empty_email_loads_as_missing() {
        let api = Arc::new(MockApi::new());
        api.kv_put(
            &hash_key(PREFIX_USER_INFO, "u1"),
            br#"{"email":"","room_id":"room1"}"#,
        );
        assert_eq!(store_with(&api).load("u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn reset_room_stays_found() {
        let api = Arc::new(MockApi::new().with_user("u1", "u1", "u1@co.com"));
        let store = store_with(&api);
        store.store("u1", UserInfo::default()).await.unwrap();

        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.room_id, "");
        assert_eq!(loaded.email, "u1@co.com");
    }

    #[tokio::test]
    async fn kv_failures_propagate() {
        let api = Arc::new(MockApi::new().failing_kv());
        assert!(matches!(
            store_with(&api).load("u1").await,
            Err(StoreError::Get { .. })
        ));
    }

    #[tokio::test]
    async fn storing_without_identity_fails() {
        let api = Arc::new(MockApi::new());
        assert!(matches!(
            store_with(&api).store("ghost", UserInfo::default()).await,
            Err(StoreError::Identity(_))
        ));
    }
}
