// crates/waterline-core/src/core/identity.rs
// ============================================================================
// Module: Waterline Entity Identity
// Description: Deterministic entity identifier derivation and dedup keys.
// Purpose: Map normalized identity fields onto stable UUIDv5 identifiers.
// Dependencies: crate::core::{context, entity, identifiers}, serde_jcs, uuid
// ============================================================================

//! ## Overview
//! Pure functions, no I/O. Identity derivation is UUIDv5 over the URL
//! namespace keyed by a per-type identity string scoped to the tenant, so the
//! same normalized identity always lands on the same row across processes and
//! time. When no identity-bearing field is present, the fallback hashes the
//! RFC 8785 (JCS) canonical JSON of the canonical fields, which sorts keys
//! deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use uuid::Uuid;

use crate::core::context::ContextMap;
use crate::core::entity::CompanyFields;
use crate::core::entity::EntityProjection;
use crate::core::entity::EntityType;
use crate::core::entity::JobPostingFields;
use crate::core::entity::PersonFields;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::OrgId;

// ============================================================================
// SECTION: Identity Resolution
// ============================================================================

/// Derives the deterministic entity identifier for canonical fields.
///
/// The projection supplies normalized identity candidates in priority order;
/// the raw canonical fields feed the stable fallback hash when no candidate
/// is available.
#[must_use]
pub fn derive_entity_id(
    org_id: &OrgId,
    projection: &EntityProjection,
    canonical_fields: &ContextMap,
) -> EntityId {
    match projection {
        EntityProjection::Company(fields) => derive_company_id(org_id, fields, canonical_fields),
        EntityProjection::Person(fields) => derive_person_id(org_id, fields, canonical_fields),
        EntityProjection::Job(fields) => derive_job_id(org_id, fields, canonical_fields),
    }
}

/// Derives the deterministic identifier for a company.
#[must_use]
pub fn derive_company_id(
    org_id: &OrgId,
    fields: &CompanyFields,
    canonical_fields: &ContextMap,
) -> EntityId {
    if let Some(domain) = &fields.canonical_domain {
        return uuid_for(&format!("company:{org_id}:domain:{domain}"));
    }
    if let Some(url) = &fields.linkedin_url {
        return uuid_for(&format!("company:{org_id}:linkedin:{url}"));
    }
    if let Some(name) = &fields.canonical_name {
        return uuid_for(&format!("company:{org_id}:name:{}", name.to_lowercase()));
    }
    stable_identity_fallback("company", org_id, canonical_fields)
}

/// Derives the deterministic identifier for a person.
#[must_use]
pub fn derive_person_id(
    org_id: &OrgId,
    fields: &PersonFields,
    canonical_fields: &ContextMap,
) -> EntityId {
    if let Some(url) = &fields.linkedin_url {
        return uuid_for(&format!("person:{org_id}:linkedin:{url}"));
    }
    if let Some(email) = &fields.work_email {
        return uuid_for(&format!("person:{org_id}:work_email:{email}"));
    }
    if let Some(name) = &fields.full_name {
        return uuid_for(&format!("person:{org_id}:full_name:{}", name.to_lowercase()));
    }
    stable_identity_fallback("person", org_id, canonical_fields)
}

/// Derives the deterministic identifier for a job posting.
#[must_use]
pub fn derive_job_id(
    org_id: &OrgId,
    fields: &JobPostingFields,
    canonical_fields: &ContextMap,
) -> EntityId {
    if let Some(job_id) = fields.theirstack_job_id {
        return uuid_for(&format!("job:{org_id}:theirstack:{job_id}"));
    }
    if let Some(url) = &fields.job_url {
        return uuid_for(&format!("job:{org_id}:url:{url}"));
    }
    if let (Some(title), Some(domain)) = (&fields.job_title, &fields.company_domain) {
        return uuid_for(&format!("job:{org_id}:title_domain:{}:{domain}", title.to_lowercase()));
    }
    stable_identity_fallback("job", org_id, canonical_fields)
}

/// Stable fallback identifier over the JCS canonical form of the fields.
fn stable_identity_fallback(
    prefix: &str,
    org_id: &OrgId,
    canonical_fields: &ContextMap,
) -> EntityId {
    let canonical = serde_jcs::to_string(&canonical_fields.to_json()).unwrap_or_default();
    uuid_for(&format!("{prefix}:{org_id}:fallback:{canonical}"))
}

/// UUIDv5 over the URL namespace for an identity string.
fn uuid_for(identity: &str) -> EntityId {
    EntityId::new(Uuid::new_v5(&Uuid::NAMESPACE_URL, identity.as_bytes()))
}

// ============================================================================
// SECTION: Fan-Out Dedup Keys
// ============================================================================

/// Derives the dedup key for a fan-out entity.
///
/// Evaluated in priority order per entity type; the first available
/// normalized identity wins. Entities with no identity-bearing field fall
/// back to a stable hash of their sorted canonical fields.
#[must_use]
pub fn fan_out_dedup_key(entity_type: EntityType, fields: &ContextMap) -> String {
    match entity_type {
        EntityType::Company => {
            let projection = CompanyFields::from_context(fields);
            if let Some(domain) = &projection.canonical_domain {
                return format!("company:domain:{domain}");
            }
            if let Some(url) = &projection.linkedin_url {
                return format!("company:linkedin:{url}");
            }
            if let Some(name) = &projection.canonical_name {
                return format!("company:name:{}", name.to_lowercase());
            }
        }
        EntityType::Person => {
            let projection = PersonFields::from_context(fields);
            if let Some(url) = &projection.linkedin_url {
                return format!("person:linkedin:{url}");
            }
            if let Some(email) = &projection.work_email {
                return format!("person:email:{email}");
            }
            if let Some(name) = &projection.full_name {
                return format!("person:name:{}", name.to_lowercase());
            }
        }
        EntityType::Job => {
            let projection = JobPostingFields::from_context(fields);
            if let Some(job_id) = projection.theirstack_job_id {
                return format!("job:theirstack:{job_id}");
            }
            if let Some(url) = &projection.job_url {
                return format!("job:url:{url}");
            }
            if let (Some(title), Some(domain)) =
                (&projection.job_title, &projection.company_domain)
            {
                return format!("job:title_domain:{}:{domain}", title.to_lowercase());
            }
        }
    }
    let canonical = serde_jcs::to_string(&fields.to_json()).unwrap_or_default();
    format!(
        "{}:hash:{}",
        entity_type.as_str(),
        Uuid::new_v5(&Uuid::NAMESPACE_URL, canonical.as_bytes())
    )
}
