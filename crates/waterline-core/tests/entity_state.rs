// crates/waterline-core/tests/entity_state.rs
// ============================================================================
// Module: Entity State Tests
// Description: Versioned upserts, additive merges, snapshots, and freshness.
// ============================================================================
//! ## Overview
//! Validates the canonical write path: monotonic versions, pre-image
//! snapshot capture, additive non-null merges, natural-key adoption, and
//! the freshness check contract.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::json;
use waterline_core::ContextMap;
use waterline_core::EntityProjection;
use waterline_core::EntityStateError;
use waterline_core::EntityStateService;
use waterline_core::EntityTableStore;
use waterline_core::EntityType;
use waterline_core::InMemoryEntityStore;
use waterline_core::OrgId;
use waterline_core::Timestamp;
use waterline_core::UpsertRequest;

fn org() -> OrgId {
    OrgId::parse("11111111-1111-1111-1111-111111111111").unwrap()
}

fn service() -> EntityStateService<InMemoryEntityStore> {
    EntityStateService::new(InMemoryEntityStore::new())
}

fn company_request(fields: serde_json::Value) -> UpsertRequest {
    UpsertRequest {
        org_id: org(),
        company_id: None,
        entity_type: EntityType::Company,
        canonical_fields: ContextMap::from_json(fields),
        entity_id: None,
        last_operation_id: None,
        last_run_id: None,
        incoming_record_version: None,
    }
}

fn hours_ago(hours: i64) -> Timestamp {
    let seconds = Timestamp::now_utc().as_datetime().unix_timestamp() - hours * 3600;
    Timestamp::from_unix_seconds(seconds).unwrap()
}

#[tokio::test]
async fn first_upsert_inserts_at_version_one() {
    let service = service();
    let record = service
        .upsert(company_request(json!({"domain": "acme.com", "name": "Acme"})), Timestamp::now_utc())
        .await
        .unwrap();
    assert_eq!(record.record_version, 1);
    assert!(service.store().all_snapshots().is_empty());
    let EntityProjection::Company(fields) = &record.projection else {
        panic!("expected company projection");
    };
    assert_eq!(fields.canonical_domain.as_deref(), Some("acme.com"));
}

#[tokio::test]
async fn additive_merge_keeps_existing_non_null_fields() {
    let service = service();
    let now = Timestamp::now_utc();

    let first = company_request(json!({
        "domain": "acme.com",
        "name": "Old",
        "industry": "Software",
        "description": "d1",
    }));
    let v1 = service.upsert(first, now).await.unwrap();
    let v2 = service
        .upsert(company_request(json!({"domain": "acme.com", "name": "A2"})), now)
        .await
        .unwrap();
    let v3 = service
        .upsert(company_request(json!({"domain": "acme.com", "name": "A3"})), now)
        .await
        .unwrap();
    assert_eq!((v1.record_version, v2.record_version, v3.record_version), (1, 2, 3));

    // Null never wins; non-null overwrites per key.
    let incoming = company_request(json!({
        "domain": "acme.com",
        "name": "New",
        "industry": null,
        "description": "d2",
    }));
    let v4 = service.upsert(incoming, now).await.unwrap();

    assert_eq!(v4.record_version, 4);
    assert_eq!(v4.canonical_payload.get_text("name"), Some("New"));
    assert_eq!(v4.canonical_payload.get_text("industry"), Some("Software"));
    assert_eq!(v4.canonical_payload.get_text("description"), Some("d2"));

    // Exactly one pre-image snapshot exists at the prior version.
    let snapshots = service
        .store()
        .recent_snapshots(&org(), EntityType::Company, &v4.entity_id, 10)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[0].record_version, 3);
    assert_eq!(snapshots[0].canonical_payload.get_text("name"), Some("A3"));
}

#[tokio::test]
async fn explicit_version_must_be_monotonic() {
    let service = service();
    let now = Timestamp::now_utc();
    let mut request = company_request(json!({"domain": "acme.com"}));
    request.incoming_record_version = Some(5);
    let record = service.upsert(request, now).await.unwrap();
    assert_eq!(record.record_version, 5);

    // Two writers race version 6: the first commits, the second conflicts.
    let mut winner = company_request(json!({"domain": "acme.com", "industry": "Software"}));
    winner.incoming_record_version = Some(6);
    service.upsert(winner, now).await.unwrap();

    let mut loser = company_request(json!({"domain": "acme.com", "industry": "Fintech"}));
    loser.incoming_record_version = Some(6);
    let error = service.upsert(loser, now).await.unwrap_err();
    assert!(matches!(error, EntityStateError::VersionConflict(_)));
}

#[tokio::test]
async fn concurrent_cas_update_detects_stale_version() {
    let service = service();
    let now = Timestamp::now_utc();
    let record =
        service.upsert(company_request(json!({"domain": "acme.com"})), now).await.unwrap();

    // Simulate a concurrent writer bumping the row between read and write.
    let mut stolen = record.clone();
    stolen.record_version = 2;
    let affected =
        service.store().update_entity_versioned(&stolen, record.record_version).await.unwrap();
    assert_eq!(affected, 1);

    let mut late = stolen.clone();
    late.record_version = 3;
    let affected = service.store().update_entity_versioned(&late, 1).await.unwrap();
    assert_eq!(affected, 0, "stale expected version must update zero rows");
}

#[tokio::test]
async fn natural_key_adoption_reuses_existing_row() {
    let service = service();
    let now = Timestamp::now_utc();
    let first = service
        .upsert(company_request(json!({"domain": "acme.com", "name": "Acme"})), now)
        .await
        .unwrap();

    // A later write spelled via URL adopts the same entity row.
    let second = service
        .upsert(
            company_request(json!({"company_domain": "https://www.acme.com/", "hq_country": "US"})),
            now,
        )
        .await
        .unwrap();
    assert_eq!(second.entity_id, first.entity_id);
    assert_eq!(second.record_version, 2);
    assert_eq!(second.canonical_payload.get_text("name"), Some("Acme"));
}

#[tokio::test]
async fn source_providers_union_preserves_order() {
    let service = service();
    let now = Timestamp::now_utc();
    service
        .upsert(
            company_request(json!({"domain": "acme.com", "source_providers": ["apollo"]})),
            now,
        )
        .await
        .unwrap();
    let record = service
        .upsert(
            company_request(
                json!({"domain": "acme.com", "source_providers": ["shovels", "apollo"]}),
            ),
            now,
        )
        .await
        .unwrap();
    assert_eq!(record.source_providers, vec!["apollo".to_string(), "shovels".to_string()]);
}

#[tokio::test]
async fn snapshot_write_failure_never_blocks_the_upsert() {
    let store = InMemoryEntityStore::new();
    let service = EntityStateService::new(store.clone());
    let now = Timestamp::now_utc();
    service.upsert(company_request(json!({"domain": "acme.com"})), now).await.unwrap();

    store.fail_snapshot_writes(true);
    let record = service
        .upsert(company_request(json!({"domain": "acme.com", "industry": "Software"})), now)
        .await
        .unwrap();
    assert_eq!(record.record_version, 2);
    assert!(store.all_snapshots().is_empty(), "failed snapshot is swallowed, not retried");
}

#[tokio::test]
async fn freshness_check_returns_payload_within_window() {
    let service = service();
    let record = service
        .upsert(
            company_request(json!({"domain": "acme.com", "industry": "Software"})),
            hours_ago(24),
        )
        .await
        .unwrap();

    let identifiers = ContextMap::from_json(json!({"company_domain": "acme.com"}));
    let report = service
        .check_freshness(&org(), EntityType::Company, &identifiers, 72.0, Timestamp::now_utc())
        .await
        .unwrap();
    assert!(report.fresh);
    assert_eq!(report.entity_id, Some(record.entity_id));
    let age = report.age_hours.unwrap();
    assert!((23.9..=24.1).contains(&age), "age should be about 24h, got {age}");
    assert_eq!(report.canonical_payload, Some(record.canonical_payload));
}

#[tokio::test]
async fn freshness_check_rejects_stale_and_unknown_entities() {
    let service = service();
    service
        .upsert(company_request(json!({"domain": "acme.com"})), hours_ago(100))
        .await
        .unwrap();

    let identifiers = ContextMap::from_json(json!({"company_domain": "acme.com"}));
    let stale = service
        .check_freshness(&org(), EntityType::Company, &identifiers, 72.0, Timestamp::now_utc())
        .await
        .unwrap();
    assert!(!stale.fresh);
    assert!(stale.canonical_payload.is_none());

    let unknown = ContextMap::from_json(json!({"company_domain": "unknown.example"}));
    let missing = service
        .check_freshness(&org(), EntityType::Company, &unknown, 72.0, Timestamp::now_utc())
        .await
        .unwrap();
    assert!(!missing.fresh);
    assert!(missing.entity_id.is_none());
}

#[tokio::test]
async fn person_lookup_prefers_linkedin_then_email() {
    let service = service();
    let now = Timestamp::now_utc();
    let mut request = company_request(json!({
        "linkedin_url": "https://linkedin.com/in/alex",
        "email": "alex@acme.com",
        "full_name": "Alex Moore",
    }));
    request.entity_type = EntityType::Person;
    let record = service.upsert(request, now).await.unwrap();

    let by_email = ContextMap::from_json(json!({"email": "ALEX@acme.com"}));
    let found = service
        .lookup_by_natural_key(&org(), EntityType::Person, &by_email)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.entity_id, record.entity_id);
}
