use plugin_core::{AppError, PluginApi};
use serde::{Deserialize, Serialize};
use tracing::error;

/// What the plugin remembers about a user. `email` is always set on stored
/// records; an empty `room_id` means "use the default room".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub room_id: String,
}

/// A user's identity as far as Webex is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub username: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("error getting user {user_id}: {source}")]
    Lookup {
        user_id: String,
        #[source]
        source: AppError,
    },

    #[error("error getting userName from email address `{0}`")]
    NoUsername(String),
}

/// The Webex username guessed from an email: everything before the last `@`.
#[must_use]
pub fn username_from_email(email: &str) -> Option<&str> {
    email
        .rsplit_once('@')
        .map(|(local, _)| local)
        .filter(|local| !local.is_empty())
}

pub async fn resolve_identity(
    api: &dyn PluginApi,
    user_id: &str,
) -> Result<Identity, IdentityError> {
    let user = api.get_user(user_id).await.map_err(|source| {
        error!(user_id = %user_id, error = %source, "Error getting user");
        IdentityError::Lookup {
            user_id: user_id.to_owned(),
            source,
        }
    })?;

    let Some(username) = username_from_email(&user.email) else {
        error!(user_id = %user_id, email = %user.email, "Error getting userName from email address");
        return Err(IdentityError::NoUsername(user.email));
    };

    Ok(Identity {
        username: username.to_owned(),
        email: user.email.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;

    #[test]
    fn username_is_local_part() {
        assert_eq!(username_from_email("u1@co.com"), Some("u1"));
        assert_eq!(username_from_email("odd@name@co.com"), Some("odd@name"));
        assert_eq!(username_from_email("@co.com"), None);
        assert_eq!(username_from_email("nobody"), None);
    }

    #[tokio::test]
    async fn identity_comes_from_directory() {
        let api = MockApi::new().with_user("u1", "u1", "u1@co.com");
        let identity = resolve_identity(&api, "u1").await.unwrap();
        assert_eq!(identity.email, "u1@co.com");
        assert_eq!(identity.username, "u1");
    }

    #[tokio::test]
    async fn unknown_user_and_bad_email_fail() {
        let api = MockApi::new().with_user("u2", "u2", "no-at-sign");
        assert!(matches!(
            resolve_identity(&api, "missing").await,
            Err(IdentityError::Lookup { .. })
        ));
        assert!(matches!(
            resolve_identity(&api, "u2").await,
            Err(IdentityError::NoUsername(_))
        ));
    }
}
