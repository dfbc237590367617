//! Bearer credential payload decoding.
//!
//! The credential is a three-part dot-delimited token whose middle part is a
//! base64url-encoded JSON object. Only the payload is read; the signature is
//! the server's concern.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::error::Error;
use crate::types::{Role, UserId};

/// User identity derived from a credential payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Identity {
    pub id: Option<UserId>,
    pub username: String,
    pub role: Role,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// `exp` claim, when the issuer set one.
    pub expires_at: Option<OffsetDateTime>,
}

impl Identity {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Whether the `exp` claim lies at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Name to greet the user with.
    #[must_use]
    pub fn greeting_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    fn from_claims(claims: &JsonValue) -> Result<Self, Error> {
        let role = first_str(claims, &["role"])
            .ok_or_else(|| Error::CredentialDecode("missing claim: role".into()))?;
        let username = first_str(claims, &["username", "sub", "email"])
            .ok_or_else(|| Error::CredentialDecode("missing claim: username".into()))?;

        let id = ["id", "userId"]
            .iter()
            .filter_map(|key| claims.get(*key))
            .find_map(|v| match v {
                JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .map(UserId);

        let expires_at = match claims.get("exp") {
            None | Some(JsonValue::Null) => None,
            Some(v) => {
                let secs = v
                    .as_i64()
                    .ok_or_else(|| Error::CredentialDecode("invalid claim: exp".into()))?;
                Some(
                    OffsetDateTime::from_unix_timestamp(secs)
                        .map_err(|e| Error::CredentialDecode(format!("exp: {e}")))?,
                )
            }
        };

        Ok(Self {
            id,
            username: username.to_owned(),
            role: Role(role.to_owned()),
            display_name: first_str(claims, &["displayName", "name", "fullName"])
                .map(str::to_owned),
            email: first_str(claims, &["email"]).map(str::to_owned),
            expires_at,
        })
    }
}

/// Decodes the identity carried by a bearer credential.
///
/// # Errors
///
/// Returns [`Error::CredentialDecode`] if the credential is empty, is not
/// three dot-separated parts, the payload is not base64url JSON, or the
/// `role`/username claims are missing.
pub fn decode_identity(credential: &str) -> Result<Identity, Error> {
    let claims = decode_payload(credential)?;
    Identity::from_claims(&claims)
}

/// Decodes the raw JSON payload of a bearer credential without interpreting it.
///
/// # Errors
///
/// Returns [`Error::CredentialDecode`] on any structural or encoding problem.
pub fn decode_payload(credential: &str) -> Result<JsonValue, Error> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(Error::CredentialDecode("empty credential".into()));
    }

    let parts: Vec<&str> = credential.split('.').collect();
    if parts.len() != 3 || parts[1].is_empty() {
        return Err(Error::CredentialDecode("invalid credential format".into()));
    }

    // Some issuers keep the padding; the engine is strict about it.
    let payload_b64 = parts[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| Error::CredentialDecode("invalid payload encoding".into()))?;

    let claims: JsonValue = serde_json::from_slice(&bytes)
        .map_err(|e| Error::CredentialDecode(format!("invalid payload: {e}")))?;
    if !claims.is_object() {
        return Err(Error::CredentialDecode("payload is not a JSON object".into()));
    }
    Ok(claims)
}

fn first_str<'a>(claims: &'a JsonValue, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| claims.get(*key).and_then(JsonValue::as_str))
        .find(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) fn encode_for_test(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
