//! User identity types and the persisted record format.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Characters escaped inside storage-key components: everything except the
/// RFC 3986 unreserved set, so the `|` separator can never collide with
/// field contents.
const KEY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub const KEY_SEPARATOR: char = '|';

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("malformed storage key; expected <tenant>|<user>")]
    MalformedKey,
    #[error("storage key component is not valid percent-encoded UTF-8")]
    InvalidEscape,
    #[error("unknown user group: {0}")]
    UnknownUserGroup(String),
}

/// The OPAQUE-level identity: which tenant, which user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoreUser {
    pub tenant_id: String,
    pub user_id: String,
}

impl CoreUser {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Storage key: percent-escaped fields joined by a literal `|`.
    pub fn encode_key(&self) -> String {
        format!(
            "{}{}{}",
            utf8_percent_encode(&self.tenant_id, KEY_ESCAPE),
            KEY_SEPARATOR,
            utf8_percent_encode(&self.user_id, KEY_ESCAPE),
        )
    }

    pub fn decode_key(key: &str) -> Result<Self, IdentityError> {
        let mut parts = key.split(KEY_SEPARATOR);
        let (Some(tenant), Some(user), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(IdentityError::MalformedKey);
        };
        let decode = |part: &str| {
            percent_decode_str(part)
                .decode_utf8()
                .map(|s| s.into_owned())
                .map_err(|_| IdentityError::InvalidEscape)
        };
        Ok(Self {
            tenant_id: decode(tenant)?,
            user_id: decode(user)?,
        })
    }
}

impl fmt::Display for CoreUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode_key())
    }
}

/// Closed set of roles a user can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserGroup {
    #[serde(rename = "USER_GROUP_ADULT")]
    Adult,
    #[serde(rename = "USER_GROUP_COACH")]
    Coach,
    #[serde(rename = "USER_GROUP_DEVELOPER")]
    Developer,
    #[serde(rename = "USER_GROUP_STAFF")]
    Staff,
    #[serde(rename = "USER_GROUP_PARENT")]
    Parent,
    #[serde(rename = "USER_GROUP_CHILD")]
    Child,
}

impl UserGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserGroup::Adult => "USER_GROUP_ADULT",
            UserGroup::Coach => "USER_GROUP_COACH",
            UserGroup::Developer => "USER_GROUP_DEVELOPER",
            UserGroup::Staff => "USER_GROUP_STAFF",
            UserGroup::Parent => "USER_GROUP_PARENT",
            UserGroup::Child => "USER_GROUP_CHILD",
        }
    }

    /// Display name shown to end users when picking a role.
    pub fn friendly_name(&self) -> &'static str {
        match self {
            UserGroup::Adult => "Adult Member",
            UserGroup::Coach => "Coach",
            UserGroup::Developer => "Developer",
            UserGroup::Staff => "Staff",
            UserGroup::Parent => "Parent",
            UserGroup::Child => "Child Member",
        }
    }
}

impl std::str::FromStr for UserGroup {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER_GROUP_ADULT" => Ok(UserGroup::Adult),
            "USER_GROUP_COACH" => Ok(UserGroup::Coach),
            "USER_GROUP_DEVELOPER" => Ok(UserGroup::Developer),
            "USER_GROUP_STAFF" => Ok(UserGroup::Staff),
            "USER_GROUP_PARENT" => Ok(UserGroup::Parent),
            "USER_GROUP_CHILD" => Ok(UserGroup::Child),
            other => Err(IdentityError::UnknownUserGroup(other.to_string())),
        }
    }
}

impl fmt::Display for UserGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role assignment for a [`CoreUser`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroupBinding {
    pub core_user: CoreUser,
    pub user_group_id: UserGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<String>,
}

impl UserGroupBinding {
    pub fn new(core_user: CoreUser, user_group_id: UserGroup) -> Self {
        Self {
            core_user,
            user_group_id,
            sub_id: None,
        }
    }

    /// Two bindings are the same role assignment iff group and sub id match;
    /// the user they attach to is not part of the identity.
    pub fn same_role(&self, other: &Self) -> bool {
        self.user_group_id == other.user_group_id && self.sub_id == other.sub_id
    }
}

/// Drops duplicate role assignments, keeping the first occurrence.
pub fn dedup_roles(roles: &[UserGroupBinding]) -> Vec<UserGroupBinding> {
    let mut out: Vec<UserGroupBinding> = Vec::with_capacity(roles.len());
    for role in roles {
        if !out.iter().any(|existing| existing.same_role(role)) {
            out.push(role.clone());
        }
    }
    out
}

/// A [`CoreUser`] tagged with the role in effect for one session; this is
/// the identity that goes inside tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueUser {
    pub tenant_id: String,
    pub user_id: String,
    pub user_group_id: UserGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<String>,
}

impl UniqueUser {
    pub fn from_binding(user: &CoreUser, binding: &UserGroupBinding) -> Self {
        Self {
            tenant_id: user.tenant_id.clone(),
            user_id: user.user_id.clone(),
            user_group_id: binding.user_group_id,
            sub_id: binding.sub_id.clone(),
        }
    }
}

/// The record persisted per [`CoreUser`]: the OPAQUE registration blob plus
/// the user's role bindings. `user_groups` is deduplicated on both read and
/// write; `opaque_record` round-trips bit-exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpaqueUserRecord {
    #[serde(with = "serde_b64")]
    pub opaque_record: Vec<u8>,
    pub user_groups: Vec<UserGroupBinding>,
}

impl OpaqueUserRecord {
    pub fn new(opaque_record: Vec<u8>) -> Self {
        Self {
            opaque_record,
            user_groups: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let normalized = Self {
            opaque_record: self.opaque_record.clone(),
            user_groups: dedup_roles(&self.user_groups),
        };
        serde_json::to_vec(&normalized)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_slice(data)?;
        record.user_groups = dedup_roles(&record.user_groups);
        Ok(record)
    }
}

/// Base64url (unpadded) encoding for binary fields in JSON records.
pub(crate) mod serde_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::B64;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        B64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
