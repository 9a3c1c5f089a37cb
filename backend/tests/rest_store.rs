use approval_portal::{RecordStore, RestStore, StoreError};
use portal_common::{
    FieldDefinitionPatch, FieldKind, NewRegistration, RegistrationPatch, RegistrationStatus,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "public-anon-key";

fn user_row(id: i64, user_id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "uuid": format!("00000000-0000-4000-8000-00000000000{}", id),
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z",
        "profile": "Alice",
        "user_id": user_id,
        "whatsapp": "+55 (11) 98765-4321",
        "country": "Brasil",
        "url": null,
        "is_admin": false,
        "status": status,
        "approval_date": null,
        "approved_by": null,
        "custom_fields": null
    })
}

#[tokio::test]
async fn test_sends_api_key_headers_and_orders_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(header("apikey", API_KEY))
        .and(header("authorization", format!("Bearer {}", API_KEY).as_str()))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            user_row(2, "B2", "pending"),
            user_row(1, "A1", "approved")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let store = RestStore::new(&server.uri(), API_KEY);
    let records = store.list_records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].user_id, "B2");
    assert_eq!(records[1].status, RegistrationStatus::Approved);
    assert!(records[0].custom_fields.is_empty());
}

#[tokio::test]
async fn test_exists_user_id_filters_by_eq() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("user_id", "eq.A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("user_id", "eq.B2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = RestStore::new(&server.uri(), API_KEY);
    assert!(store.exists_user_id("A1").await.unwrap());
    assert!(!store.exists_user_id("B2").await.unwrap());
}

#[tokio::test]
async fn test_create_posts_pending_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!({
            "profile": "Alice",
            "user_id": "A1",
            "whatsapp": "+55 (11) 98765-4321",
            "country": "Brasil",
            "is_admin": false,
            "custom_fields": {},
            "status": "pending"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([user_row(1, "A1", "pending")])))
        .expect(1)
        .mount(&server)
        .await;

    let store = RestStore::new(&server.uri(), API_KEY);
    let created = store
        .create_record(&NewRegistration {
            profile: "Alice".to_string(),
            user_id: "A1".to_string(),
            whatsapp: "+55 (11) 98765-4321".to_string(),
            country: "Brasil".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.status, RegistrationStatus::Pending);
}

#[tokio::test]
async fn test_unique_violation_code_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"users_user_id_key\"",
            "details": null,
            "hint": null
        })))
        .mount(&server)
        .await;

    let store = RestStore::new(&server.uri(), API_KEY);
    let err = store
        .create_record(&NewRegistration {
            user_id: "A1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(msg) if msg.contains("users_user_id_key")));
}

#[tokio::test]
async fn test_update_sends_only_patch_and_maps_missing_row() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.1"))
        .and(body_json(json!({"status": "banned", "approval_date": null, "approved_by": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_row(1, "A1", "banned")])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = RestStore::new(&server.uri(), API_KEY);
    let patch = RegistrationPatch {
        status: Some(RegistrationStatus::Banned),
        approval_date: Some(None),
        approved_by: Some(None),
        ..Default::default()
    };

    let updated = store.update_record(1, &patch).await.unwrap();
    assert_eq!(updated.status, RegistrationStatus::Banned);

    assert!(matches!(
        store.update_record(2, &patch).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_no_rows_code_mapped_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/custom_fields"))
        .respond_with(ResponseTemplate::new(406).set_body_json(json!({
            "code": "PGRST116",
            "message": "JSON object requested, multiple (or no) rows returned"
        })))
        .mount(&server)
        .await;

    let store = RestStore::new(&server.uri(), API_KEY);
    let patch = FieldDefinitionPatch {
        required: Some(true),
        ..Default::default()
    };
    assert!(matches!(
        store.update_field_definition("f1", &patch).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_field_definitions_ordered_and_null_options() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/custom_fields"))
        .and(query_param("order", "created_at.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "f1", "name": "Team", "type": "select", "required": true,
             "options": ["red", "blue"], "created_at": "2024-01-01T00:00:00Z"},
            {"id": "f2", "name": "Age", "type": "number", "required": false,
             "options": null, "created_at": "2024-01-02T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let store = RestStore::new(&server.uri(), API_KEY);
    let fields = store.list_field_definitions().await.unwrap();
    assert_eq!(fields[0].kind, FieldKind::Select);
    assert_eq!(fields[0].options, vec!["red", "blue"]);
    assert_eq!(fields[1].kind, FieldKind::Number);
    assert!(fields[1].options.is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    // Nothing listens on port 9 (discard) on test hosts.
    let store = RestStore::new("http://127.0.0.1:9", API_KEY);
    assert!(matches!(
        store.list_records().await,
        Err(StoreError::Transport(_))
    ));
}
