// ── Role-scoped visibility ──

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::record::Record;

/// Role of the signed-in operator.
///
/// `user` sees only records for devices they own; `operator` and `admin`
/// see everything. `viewer` is accepted as an alias of `user`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[strum(to_string = "user", serialize = "viewer")]
    #[serde(alias = "viewer")]
    User,
    Operator,
    Admin,
}

impl Role {
    pub fn sees_everything(self) -> bool {
        matches!(self, Self::Operator | Self::Admin)
    }
}

/// Who is looking: a role plus the devices they own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub role: Role,
    pub owned_device_ids: HashSet<String>,
}

impl Viewer {
    pub fn new<I, S>(role: Role, owned_device_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role,
            owned_device_ids: owned_device_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// An operator with no owned devices.
    pub fn operator() -> Self {
        Self::new(Role::Operator, std::iter::empty::<String>())
    }

    pub fn can_see(&self, record: &Record) -> bool {
        self.role.sees_everything() || self.owned_device_ids.contains(&record.device_id)
    }
}
