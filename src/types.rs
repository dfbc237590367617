use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Role claim carried in the credential payload.
///
/// Opaque apart from the admin check: `"ADMIN"` (case-sensitive) is the only
/// privileged role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub const ADMIN: &'static str = "ADMIN";

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.0 == Self::ADMIN
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Backend user identifier, as found in the credential payload.
///
/// Numeric ids are kept in their decimal string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Flood report identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct ReportId(pub i64);
