//! Search and sort rules for the review table.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use portal_common::{FieldDefinition, FieldValue, Registration, RegistrationStatus};
use serde::{Deserialize, Serialize};

/// Case-insensitive free-text match over the fixed columns and every
/// custom key or value, including keys of deleted definitions. Falsy
/// custom values (`false`, `0`, blank text) only match through their key.
///
/// A blank term matches everything.
pub fn matches_search(record: &Registration, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }

    let contains = |s: &str| s.to_lowercase().contains(&term);

    contains(&record.profile)
        || contains(&record.user_id)
        || contains(&record.whatsapp)
        || contains(&record.country)
        || record.custom_fields.iter().any(|(key, value)| {
            contains(key) || (is_truthy(value) && contains(&value.to_string()))
        })
}

fn is_truthy(value: &FieldValue) -> bool {
    match value {
        FieldValue::Bool(b) => *b,
        FieldValue::Number(n) => *n != 0.0 && n.is_finite(),
        FieldValue::Text(_) => !value.is_empty(),
    }
}

/// Status filter for the review table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(RegistrationStatus),
}

impl StatusFilter {
    pub fn matches(&self, record: &Registration) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(status) => record.status == *status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = portal_common::UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(StatusFilter::All),
            other => other.parse().map(StatusFilter::Only),
        }
    }
}

/// Column the table is ordered by.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortField {
    Profile,
    UserId,
    Whatsapp,
    Country,
    Status,
    #[default]
    CreatedAt,
    ApprovalDate,
    /// Order by one custom field. `None` picks the first definition.
    Custom(Option<String>),
}

impl SortField {
    /// Parse a column name, with an optional custom field selector.
    pub fn parse(column: &str, selector: Option<&str>) -> Option<Self> {
        let field = match column {
            "profile" => SortField::Profile,
            "user_id" => SortField::UserId,
            "whatsapp" => SortField::Whatsapp,
            "country" => SortField::Country,
            "status" => SortField::Status,
            "created_at" => SortField::CreatedAt,
            "approval_date" => SortField::ApprovalDate,
            "custom_fields" => SortField::Custom(selector.map(str::to_string)),
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// Current ordering of the table. Starts newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Column header click: the same column flips direction, another
    /// column becomes the sort key in ascending order.
    pub fn select(&mut self, field: SortField) {
        if self.field == field {
            self.direction = self.direction.flipped();
        } else {
            self.field = field;
            self.direction = SortDirection::Asc;
        }
    }
}

/// Sort records in place. Ties keep their existing relative order.
pub fn sort_records(records: &mut [Registration], state: &SortState, definitions: &[FieldDefinition]) {
    let custom_key = match &state.field {
        SortField::Custom(Some(name)) => Some(name.as_str()),
        SortField::Custom(None) => definitions.first().map(|d| d.name.as_str()),
        _ => None,
    };

    records.sort_by(|a, b| {
        let ordering = compare_by(a, b, &state.field, custom_key);
        match state.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_by(a: &Registration, b: &Registration, field: &SortField, custom_key: Option<&str>) -> Ordering {
    match field {
        SortField::Profile => a.profile.cmp(&b.profile),
        SortField::UserId => a.user_id.cmp(&b.user_id),
        SortField::Whatsapp => a.whatsapp.cmp(&b.whatsapp),
        SortField::Country => a.country.cmp(&b.country),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::ApprovalDate => a.approval_date.cmp(&b.approval_date),
        SortField::Custom(_) => match custom_key {
            Some(key) => custom_sort_value(a, key).compare(&custom_sort_value(b, key)),
            None => Ordering::Equal,
        },
    }
}

fn custom_sort_value(record: &Registration, key: &str) -> FieldValue {
    record
        .custom_fields
        .get(key)
        .cloned()
        .unwrap_or_else(|| FieldValue::text(""))
}
