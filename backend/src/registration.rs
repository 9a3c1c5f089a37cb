//! Public registration flow.
//!
//! A prospective user submits the fixed attributes plus one value per
//! custom field definition. Everything is validated locally before the
//! store is asked anything; the new record always starts `pending`.

use portal_common::{CustomValues, NewRegistration, Registration};
use serde::Deserialize;

use crate::fields::{build_custom_values, FieldError};
use crate::store::{RecordStore, StoreError};

/// Submitted registration form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub whatsapp: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Values keyed by definition name
    #[serde(default, alias = "custom_fields")]
    pub custom: CustomValues,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("This ID is already in use, please choose another one")]
    DuplicateUserId,
    #[error("Please enter a valid WhatsApp number including the country code")]
    InvalidPhone,
    #[error("Invalid URL '{0}': must be an absolute http or https address")]
    InvalidUrl(String),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Apply the contact number input mask: `+CC (AA) NNNNN-NNNN`.
///
/// Everything except digits is dropped and a leading `+` is added. Partial
/// input is masked as far as it goes.
pub fn format_phone_number(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    let cleaned = format!("+{}", digits);

    if cleaned.len() <= 2 {
        return cleaned;
    }
    let mut formatted = format!("{} ({}", &cleaned[..3], &cleaned[3..]);
    if cleaned.len() > 5 {
        formatted = format!("{}) {}", &formatted[..7], &formatted[7..]);
        if cleaned.len() > 9 {
            let split = formatted.len() - 4;
            formatted = format!("{}-{}", &formatted[..split], &formatted[split..]);
        }
    }
    formatted
}

/// Whether `phone` is a valid number in international form. The number must
/// carry its country code and belong to that country's numbering plan.
pub fn validate_phone_number(phone: &str) -> bool {
    match phonenumber::parse(None, phone.trim()) {
        Ok(number) => phonenumber::is_valid(&number),
        Err(e) => {
            tracing::debug!("Unparsable phone number {:?}: {}", phone, e);
            false
        }
    }
}

/// Normalize an optional URL. Blank means absent; anything else must parse
/// as an absolute http(s) URL.
pub fn validate_url(url: Option<&str>) -> Result<Option<String>, RegistrationError> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(None);
    };

    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {
            Ok(Some(url.to_string()))
        }
        _ => Err(RegistrationError::InvalidUrl(url.to_string())),
    }
}

/// Trimmed value of a fixed attribute that must not be blank.
fn required(value: &str, name: &'static str) -> Result<String, RegistrationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RegistrationError::MissingField(name));
    }
    Ok(value.to_string())
}

/// Whether `user_id` is still free.
pub async fn check_user_id(store: &dyn RecordStore, user_id: &str) -> Result<bool, StoreError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Ok(false);
    }
    Ok(!store.exists_user_id(user_id).await?)
}

/// Validate a form and create the pending record.
pub async fn submit(store: &dyn RecordStore, form: RegistrationForm) -> Result<Registration, RegistrationError> {
    let profile = required(&form.profile, "profile")?;
    let user_id = required(&form.user_id, "user_id")?;
    let whatsapp = required(&form.whatsapp, "whatsapp")?;
    let country = required(&form.country, "country")?;

    let whatsapp = format_phone_number(&whatsapp);
    if !validate_phone_number(&whatsapp) {
        return Err(RegistrationError::InvalidPhone);
    }
    let url = validate_url(form.url.as_deref())?;

    let definitions = store.list_field_definitions().await?;
    let custom_fields = build_custom_values(&definitions, &form.custom)?;

    if store.exists_user_id(&user_id).await? {
        return Err(RegistrationError::DuplicateUserId);
    }

    let record = NewRegistration {
        profile,
        user_id,
        whatsapp,
        country,
        url,
        is_admin: false,
        custom_fields,
    };

    match store.create_record(&record).await {
        Ok(created) => {
            tracing::info!("New registration {} ({}) pending review", created.id, created.user_id);
            Ok(created)
        }
        Err(StoreError::UniqueViolation(_)) => Err(RegistrationError::DuplicateUserId),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use portal_common::{FieldKind, FieldValue, NewFieldDefinition, RegistrationStatus};

    fn form(user_id: &str) -> RegistrationForm {
        RegistrationForm {
            profile: "Alice".to_string(),
            user_id: user_id.to_string(),
            whatsapp: "+5511987654321".to_string(),
            country: "Brasil".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_phone_number_full() {
        assert_eq!(format_phone_number("+5511987654321"), "+55 (11) 98765-4321");
        assert_eq!(format_phone_number("55 11 98765 4321"), "+55 (11) 98765-4321");
    }

    #[test]
    fn test_format_phone_number_partial() {
        assert_eq!(format_phone_number(""), "+");
        assert_eq!(format_phone_number("5"), "+5");
        assert_eq!(format_phone_number("551"), "+55 (1");
        assert_eq!(format_phone_number("55119"), "+55 (11) 9");
    }

    #[test]
    fn test_validate_phone_number() {
        assert!(validate_phone_number("+55 (11) 98765-4321"));
        assert!(validate_phone_number("+44 20 8366 1177"));
        assert!(!validate_phone_number("5511987654321"));
        assert!(!validate_phone_number("+123"));
        assert!(!validate_phone_number(""));
    }

    #[test]
    fn test_validate_phone_number_outside_numbering_plans() {
        assert!(!validate_phone_number("+00000000"));
        assert!(!validate_phone_number("+99 (99) 99999-9999"));
        assert!(!validate_phone_number("+55 (11) 00000-0000"));
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(validate_url(None).unwrap(), None);
        assert_eq!(validate_url(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_url(Some(" https://example.com/me ")).unwrap().as_deref(),
            Some("https://example.com/me")
        );
        assert!(matches!(
            validate_url(Some("ftp://example.com")),
            Err(RegistrationError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url(Some("example.com")),
            Err(RegistrationError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_creates_pending_record() {
        let store = SqliteStore::new(":memory:").unwrap();
        let created = submit(&store, form("A1")).await.unwrap();
        assert_eq!(created.status, RegistrationStatus::Pending);
        assert_eq!(created.whatsapp, "+55 (11) 98765-4321");
        assert!(!created.is_admin);
        assert!(!check_user_id(&store, "A1").await.unwrap());
        assert!(check_user_id(&store, "B2").await.unwrap());
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_fixed_field() {
        let store = SqliteStore::new(":memory:").unwrap();
        let mut incomplete = form("A1");
        incomplete.country = "  ".to_string();
        assert!(matches!(
            submit(&store, incomplete).await,
            Err(RegistrationError::MissingField("country"))
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_duplicate_user_id() {
        let store = SqliteStore::new(":memory:").unwrap();
        submit(&store, form("A1")).await.unwrap();
        assert!(matches!(
            submit(&store, form("A1")).await,
            Err(RegistrationError::DuplicateUserId)
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_phone() {
        let store = SqliteStore::new(":memory:").unwrap();
        let mut bad = form("A1");
        bad.whatsapp = "12".to_string();
        assert!(matches!(submit(&store, bad).await, Err(RegistrationError::InvalidPhone)));
    }

    #[tokio::test]
    async fn test_submit_names_missing_required_custom_field() {
        let store = SqliteStore::new(":memory:").unwrap();
        store
            .create_field_definition(&NewFieldDefinition {
                name: "Team".to_string(),
                kind: FieldKind::Text,
                required: true,
                options: vec![],
            })
            .await
            .unwrap();

        let err = submit(&store, form("A1")).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Field(FieldError::Required(ref f)) if f == "Team"));
        assert!(store.list_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_keeps_only_defined_custom_keys() {
        let store = SqliteStore::new(":memory:").unwrap();
        store
            .create_field_definition(&NewFieldDefinition {
                name: "Age".to_string(),
                kind: FieldKind::Number,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut with_custom = form("A1");
        with_custom.custom.insert("Age".to_string(), FieldValue::text("31"));
        with_custom.custom.insert("Nickname".to_string(), FieldValue::text("al"));

        let created = submit(&store, with_custom).await.unwrap();
        assert_eq!(created.custom_fields.get("Age"), Some(&FieldValue::Number(31.0)));
        assert!(!created.custom_fields.contains_key("Nickname"));
    }
}
