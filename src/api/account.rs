use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::ApiClient;
use crate::error::Error;
use crate::types::{Role, UserId};

/// Account details as the server reports them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UserProfile {
    #[serde(default, deserialize_with = "string_or_number_id")]
    pub id: Option<UserId>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Fields to change on the signed-in account; unset fields are left as they
/// are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

// Numeric ids keep their decimal form, as in credential claims.
fn string_or_number_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<UserId>, D::Error> {
    Ok(match Option::<JsonValue>::deserialize(d)? {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(UserId(s)),
        Some(JsonValue::Number(n)) => Some(UserId(n.to_string())),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    #[must_use]
    pub fn new(current_password: impl Into<String>, new_password: impl Into<String>) -> Self {
        Self {
            current_password: current_password.into(),
            new_password: new_password.into(),
        }
    }
}

// These are authenticated calls: a rejected credential revokes the session
// like any other request.
impl ApiClient {
    /// The signed-in user's account.
    ///
    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn current_user(&self) -> Result<UserProfile, Error> {
        let request = self.get("auth/me")?;
        self.send(request).await
    }

    /// # Errors
    ///
    /// See the [module documentation](super) for the failure classes.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, Error> {
        let request = self.put("auth/profile")?.json(update);
        self.send(request).await
    }

    /// # Errors
    ///
    /// [`Error::Server`] with the server's message when the current password
    /// is wrong, plus the failure classes of the
    /// [module documentation](super).
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), Error> {
        let request = self.put("auth/change-password")?.json(change);
        self.send_discarding(request).await
    }
}
