//! Registration records and their lifecycle status.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::field::FieldValue;

/// Custom field values keyed by definition name.
pub type CustomValues = BTreeMap<String, FieldValue>;

/// Lifecycle status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Banned,
}

impl RegistrationStatus {
    pub const ALL: [RegistrationStatus; 4] = [
        RegistrationStatus::Pending,
        RegistrationStatus::Approved,
        RegistrationStatus::Rejected,
        RegistrationStatus::Banned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Banned => "banned",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown registration status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for RegistrationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegistrationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A submitted registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Store-assigned primary key
    pub id: i64,
    /// Store-assigned opaque identifier
    pub uuid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Display name or nickname
    pub profile: String,
    /// User-chosen identifier, unique and immutable
    pub user_id: String,
    /// Contact handle (WhatsApp number with country code)
    pub whatsapp: String,
    pub country: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub status: RegistrationStatus,
    #[serde(default)]
    pub approval_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_fields: CustomValues,
}

/// Treat an explicit JSON `null` like a missing key.
pub(crate) fn null_as_default<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Payload for creating a registration.
///
/// Identifiers, timestamps and status are assigned by the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewRegistration {
    pub profile: String,
    pub user_id: String,
    pub whatsapp: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub custom_fields: CustomValues,
}

/// Partial update of a registration.
///
/// Only mutable attributes exist on this type, so primary key, uuid,
/// user id and timestamps can never be sent; unknown keys in incoming JSON
/// are ignored. For the nullable attributes `Some(None)` clears the value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistrationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RegistrationStatus>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub approval_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomValues>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RegistrationPatch {
    pub fn is_empty(&self) -> bool {
        *self == RegistrationPatch::default()
    }

    /// Drop every entry whose value already matches `current`.
    pub fn retain_changes(&mut self, current: &Registration) {
        if self.profile.as_ref() == Some(&current.profile) {
            self.profile = None;
        }
        if self.whatsapp.as_ref() == Some(&current.whatsapp) {
            self.whatsapp = None;
        }
        if self.country.as_ref() == Some(&current.country) {
            self.country = None;
        }
        if self.url.as_ref() == Some(&current.url) {
            self.url = None;
        }
        if self.is_admin == Some(current.is_admin) {
            self.is_admin = None;
        }
        if self.status == Some(current.status) {
            self.status = None;
        }
        if self.approval_date == Some(current.approval_date) {
            self.approval_date = None;
        }
        if self.approved_by.as_ref() == Some(&current.approved_by) {
            self.approved_by = None;
        }
        if self.custom_fields.as_ref() == Some(&current.custom_fields) {
            self.custom_fields = None;
        }
    }

    /// Apply the patch to a record in place.
    pub fn apply(&self, record: &mut Registration) {
        if let Some(profile) = &self.profile {
            record.profile = profile.clone();
        }
        if let Some(whatsapp) = &self.whatsapp {
            record.whatsapp = whatsapp.clone();
        }
        if let Some(country) = &self.country {
            record.country = country.clone();
        }
        if let Some(url) = &self.url {
            record.url = url.clone();
        }
        if let Some(is_admin) = self.is_admin {
            record.is_admin = is_admin;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(approval_date) = self.approval_date {
            record.approval_date = approval_date;
        }
        if let Some(approved_by) = &self.approved_by {
            record.approved_by = approved_by.clone();
        }
        if let Some(custom_fields) = &self.custom_fields {
            record.custom_fields = custom_fields.clone();
        }
    }
}
