// crates/waterline-core/src/core/entity.rs
// ============================================================================
// Module: Waterline Entity Model
// Description: Canonical entity records, typed projections, and snapshots.
// Purpose: Encode the closed per-type canonical field sets with alias collapse.
// Dependencies: crate::core::{context, identifiers, normalize, time}, serde
// ============================================================================

//! ## Overview
//! Canonical entity rows carry a merged JSON payload plus typed projected
//! columns per entity type. Projections are built from a cumulative context
//! with alias collapse (`company_domain` / `domain` / `canonical_domain`, …)
//! and normalization, so natural-key lookups and identity derivation always
//! see canonical forms.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::context::ContextMap;
use crate::core::identifiers::CompanyId;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::OperationId;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::PipelineRunId;
use crate::core::normalize::coerce_bool;
use crate::core::normalize::coerce_float;
use crate::core::normalize::coerce_int;
use crate::core::normalize::coerce_string_list;
use crate::core::normalize::coerce_text;
use crate::core::normalize::normalize_domain;
use crate::core::normalize::normalize_email;
use crate::core::normalize::normalize_linkedin_url;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Entity Type
// ============================================================================

/// Entity families handled by the engine.
///
/// # Invariants
/// - Variants are stable for serialization and dedup key prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Company entity.
    Company,
    /// Person entity.
    Person,
    /// Job posting entity.
    Job,
}

impl EntityType {
    /// Returns the stable wire string for this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Person => "person",
            Self::Job => "job",
        }
    }

    /// Parses an entity type from its wire string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "company" => Some(Self::Company),
            "person" => Some(Self::Person),
            "job" => Some(Self::Job),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Natural Keys
// ============================================================================

/// Natural key used for entity lookup against projected columns.
///
/// # Invariants
/// - Key values are already normalized by the projection builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NaturalKey {
    /// Company canonical domain.
    CompanyDomain(String),
    /// Company LinkedIn URL.
    CompanyLinkedin(String),
    /// Person LinkedIn URL.
    PersonLinkedin(String),
    /// Person work email.
    PersonEmail(String),
    /// Job posting TheirStack identifier.
    JobTheirstackId(i64),
}

impl NaturalKey {
    /// Returns the entity type this key selects.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::CompanyDomain(_) | Self::CompanyLinkedin(_) => EntityType::Company,
            Self::PersonLinkedin(_) | Self::PersonEmail(_) => EntityType::Person,
            Self::JobTheirstackId(_) => EntityType::Job,
        }
    }
}

// ============================================================================
// SECTION: Projection Helpers
// ============================================================================

/// Returns the first non-empty text among the aliases, cleaned by `normalize`.
fn first_normalized(
    fields: &ContextMap,
    aliases: &[&str],
    normalize: fn(&str) -> Option<String>,
) -> Option<String> {
    aliases
        .iter()
        .filter_map(|alias| fields.get_non_null(alias))
        .filter_map(coerce_text)
        .find_map(|text| normalize(&text))
}

/// Returns the first trimmed text among the aliases.
fn first_text(fields: &ContextMap, aliases: &[&str]) -> Option<String> {
    aliases.iter().filter_map(|alias| fields.get_non_null(alias)).find_map(coerce_text)
}

/// Returns the first integer among the aliases.
fn first_int(fields: &ContextMap, aliases: &[&str]) -> Option<i64> {
    aliases.iter().filter_map(|alias| fields.get_non_null(alias)).find_map(coerce_int)
}

/// Returns the first float among the aliases.
fn first_float(fields: &ContextMap, aliases: &[&str]) -> Option<f64> {
    aliases.iter().filter_map(|alias| fields.get_non_null(alias)).find_map(coerce_float)
}

/// Returns the boolean under the key when it is a real boolean.
fn bool_field(fields: &ContextMap, key: &str) -> Option<bool> {
    fields.get_non_null(key).and_then(coerce_bool)
}

/// Returns the cleaned string list under the key.
fn list_field(fields: &ContextMap, key: &str) -> Option<Vec<String>> {
    fields.get_non_null(key).and_then(coerce_string_list)
}

// ============================================================================
// SECTION: Company Projection
// ============================================================================

/// Typed projected columns for a company entity.
///
/// # Invariants
/// - Identity-bearing fields hold normalized values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyFields {
    /// Canonical domain (normalized).
    pub canonical_domain: Option<String>,
    /// Canonical display name (case preserved).
    pub canonical_name: Option<String>,
    /// Company LinkedIn URL (normalized).
    pub linkedin_url: Option<String>,
    /// Primary industry label.
    pub industry: Option<String>,
    /// Headcount.
    pub employee_count: Option<i64>,
    /// Headcount band label.
    pub employee_range: Option<String>,
    /// Revenue band label.
    pub revenue_band: Option<String>,
    /// Headquarters country.
    pub hq_country: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Confidence score attached by enrichment.
    pub enrichment_confidence: Option<f64>,
}

impl CompanyFields {
    /// Builds the projection from canonical fields with alias collapse.
    #[must_use]
    pub fn from_context(fields: &ContextMap) -> Self {
        Self {
            canonical_domain: first_normalized(
                fields,
                &["canonical_domain", "company_domain", "domain"],
                normalize_domain,
            ),
            canonical_name: first_text(fields, &["canonical_name", "company_name", "name"]),
            linkedin_url: first_normalized(
                fields,
                &["linkedin_url", "company_linkedin_url"],
                normalize_linkedin_url,
            ),
            industry: first_text(fields, &["industry", "industry_primary"]),
            employee_count: first_int(fields, &["employee_count"]),
            employee_range: first_text(fields, &["employee_range"]),
            revenue_band: first_text(fields, &["revenue_band", "annual_revenue_range"]),
            hq_country: first_text(fields, &["hq_country", "hq_country_code"]),
            description: first_text(fields, &["description", "description_raw"]),
            enrichment_confidence: first_float(fields, &["enrichment_confidence", "confidence"]),
        }
    }

    /// Merges over an existing projection: incoming non-null values win.
    #[must_use]
    pub fn merge_over(&self, existing: &Self) -> Self {
        Self {
            canonical_domain: self
                .canonical_domain
                .clone()
                .or_else(|| existing.canonical_domain.clone()),
            canonical_name: self.canonical_name.clone().or_else(|| existing.canonical_name.clone()),
            linkedin_url: self.linkedin_url.clone().or_else(|| existing.linkedin_url.clone()),
            industry: self.industry.clone().or_else(|| existing.industry.clone()),
            employee_count: self.employee_count.or(existing.employee_count),
            employee_range: self.employee_range.clone().or_else(|| existing.employee_range.clone()),
            revenue_band: self.revenue_band.clone().or_else(|| existing.revenue_band.clone()),
            hq_country: self.hq_country.clone().or_else(|| existing.hq_country.clone()),
            description: self.description.clone().or_else(|| existing.description.clone()),
            enrichment_confidence: self.enrichment_confidence.or(existing.enrichment_confidence),
        }
    }

    /// Returns natural-key candidates in lookup priority order.
    #[must_use]
    pub fn natural_keys(&self) -> Vec<NaturalKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(domain) = &self.canonical_domain {
            keys.push(NaturalKey::CompanyDomain(domain.clone()));
        }
        if let Some(url) = &self.linkedin_url {
            keys.push(NaturalKey::CompanyLinkedin(url.clone()));
        }
        keys
    }
}

// ============================================================================
// SECTION: Person Projection
// ============================================================================

/// Typed projected columns for a person entity.
///
/// # Invariants
/// - Identity-bearing fields hold normalized values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonFields {
    /// Full display name (case preserved).
    pub full_name: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Person LinkedIn URL (normalized).
    pub linkedin_url: Option<String>,
    /// Current title.
    pub title: Option<String>,
    /// Seniority label.
    pub seniority: Option<String>,
    /// Department label.
    pub department: Option<String>,
    /// Work email (normalized).
    pub work_email: Option<String>,
    /// Email verification status.
    pub email_status: Option<String>,
    /// Phone number in E.164 form.
    pub phone_e164: Option<String>,
    /// Confidence score attached by contact enrichment.
    pub contact_confidence: Option<f64>,
}

impl PersonFields {
    /// Builds the projection from canonical fields with alias collapse.
    #[must_use]
    pub fn from_context(fields: &ContextMap) -> Self {
        let verification_status = fields
            .get_map("verification")
            .and_then(|verification| first_text(verification, &["status"]));
        Self {
            full_name: first_text(fields, &["full_name"]),
            first_name: first_text(fields, &["first_name"]),
            last_name: first_text(fields, &["last_name"]),
            linkedin_url: first_normalized(fields, &["linkedin_url"], normalize_linkedin_url),
            title: first_text(fields, &["title", "current_title", "headline"]),
            seniority: first_text(fields, &["seniority"]),
            department: first_text(fields, &["department"]),
            work_email: first_normalized(fields, &["work_email", "email"], normalize_email),
            email_status: first_text(fields, &["email_status"]).or(verification_status),
            phone_e164: first_text(fields, &["phone_e164", "mobile_phone"]),
            contact_confidence: first_float(fields, &["contact_confidence", "confidence"]),
        }
    }

    /// Merges over an existing projection: incoming non-null values win.
    #[must_use]
    pub fn merge_over(&self, existing: &Self) -> Self {
        Self {
            full_name: self.full_name.clone().or_else(|| existing.full_name.clone()),
            first_name: self.first_name.clone().or_else(|| existing.first_name.clone()),
            last_name: self.last_name.clone().or_else(|| existing.last_name.clone()),
            linkedin_url: self.linkedin_url.clone().or_else(|| existing.linkedin_url.clone()),
            title: self.title.clone().or_else(|| existing.title.clone()),
            seniority: self.seniority.clone().or_else(|| existing.seniority.clone()),
            department: self.department.clone().or_else(|| existing.department.clone()),
            work_email: self.work_email.clone().or_else(|| existing.work_email.clone()),
            email_status: self.email_status.clone().or_else(|| existing.email_status.clone()),
            phone_e164: self.phone_e164.clone().or_else(|| existing.phone_e164.clone()),
            contact_confidence: self.contact_confidence.or(existing.contact_confidence),
        }
    }

    /// Returns natural-key candidates in lookup priority order.
    #[must_use]
    pub fn natural_keys(&self) -> Vec<NaturalKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(url) = &self.linkedin_url {
            keys.push(NaturalKey::PersonLinkedin(url.clone()));
        }
        if let Some(email) = &self.work_email {
            keys.push(NaturalKey::PersonEmail(email.clone()));
        }
        keys
    }
}

// ============================================================================
// SECTION: Job Posting Projection
// ============================================================================

/// Typed projected columns for a job posting entity.
///
/// # Invariants
/// - Identity-bearing fields hold normalized values.
/// - `posting_status` defaults to `active` on first insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPostingFields {
    /// Upstream TheirStack job identifier.
    pub theirstack_job_id: Option<i64>,
    /// Posting URL.
    pub job_url: Option<String>,
    /// Raw posting title.
    pub job_title: Option<String>,
    /// Normalized posting title.
    pub normalized_title: Option<String>,
    /// Hiring company name.
    pub company_name: Option<String>,
    /// Hiring company domain (normalized).
    pub company_domain: Option<String>,
    /// Full location label.
    pub location: Option<String>,
    /// Short location label.
    pub short_location: Option<String>,
    /// State or region code.
    pub state_code: Option<String>,
    /// Country code.
    pub country_code: Option<String>,
    /// Remote-friendly flag.
    pub remote: Option<bool>,
    /// Hybrid flag.
    pub hybrid: Option<bool>,
    /// Seniority label.
    pub seniority: Option<String>,
    /// Employment status labels.
    pub employment_statuses: Option<Vec<String>>,
    /// Posting date label.
    pub date_posted: Option<String>,
    /// Discovery timestamp label.
    pub discovered_at: Option<String>,
    /// Raw salary string.
    pub salary_string: Option<String>,
    /// Minimum annual salary in USD.
    pub min_annual_salary_usd: Option<f64>,
    /// Maximum annual salary in USD.
    pub max_annual_salary_usd: Option<f64>,
    /// Free-text description.
    pub description: Option<String>,
    /// Detected technology slugs.
    pub technology_slugs: Option<Vec<String>>,
    /// Posting lifecycle status.
    pub posting_status: Option<String>,
    /// Confidence score attached by enrichment.
    pub enrichment_confidence: Option<f64>,
}

impl JobPostingFields {
    /// Builds the projection from canonical fields with alias collapse.
    #[must_use]
    pub fn from_context(fields: &ContextMap) -> Self {
        Self {
            theirstack_job_id: first_int(fields, &["theirstack_job_id", "job_id"]),
            job_url: first_text(fields, &["job_url", "url"]),
            job_title: first_text(fields, &["job_title"]),
            normalized_title: first_text(fields, &["normalized_title"]),
            company_name: first_text(fields, &["company_name"]),
            company_domain: first_normalized(
                fields,
                &["company_domain", "domain"],
                normalize_domain,
            ),
            location: first_text(fields, &["location", "short_location"]),
            short_location: first_text(fields, &["short_location"]),
            state_code: first_text(fields, &["state_code"]),
            country_code: first_text(fields, &["country_code"]),
            remote: bool_field(fields, "remote"),
            hybrid: bool_field(fields, "hybrid"),
            seniority: first_text(fields, &["seniority"]),
            employment_statuses: list_field(fields, "employment_statuses"),
            date_posted: first_text(fields, &["date_posted"]),
            discovered_at: first_text(fields, &["discovered_at"]),
            salary_string: first_text(fields, &["salary_string"]),
            min_annual_salary_usd: first_float(fields, &["min_annual_salary_usd"]),
            max_annual_salary_usd: first_float(fields, &["max_annual_salary_usd"]),
            description: first_text(fields, &["description"]),
            technology_slugs: list_field(fields, "technology_slugs"),
            posting_status: first_text(fields, &["posting_status"]),
            enrichment_confidence: first_float(fields, &["enrichment_confidence", "confidence"]),
        }
    }

    /// Merges over an existing projection: incoming non-null values win.
    #[must_use]
    pub fn merge_over(&self, existing: &Self) -> Self {
        Self {
            theirstack_job_id: self.theirstack_job_id.or(existing.theirstack_job_id),
            job_url: self.job_url.clone().or_else(|| existing.job_url.clone()),
            job_title: self.job_title.clone().or_else(|| existing.job_title.clone()),
            normalized_title: self
                .normalized_title
                .clone()
                .or_else(|| existing.normalized_title.clone()),
            company_name: self.company_name.clone().or_else(|| existing.company_name.clone()),
            company_domain: self.company_domain.clone().or_else(|| existing.company_domain.clone()),
            location: self.location.clone().or_else(|| existing.location.clone()),
            short_location: self.short_location.clone().or_else(|| existing.short_location.clone()),
            state_code: self.state_code.clone().or_else(|| existing.state_code.clone()),
            country_code: self.country_code.clone().or_else(|| existing.country_code.clone()),
            remote: self.remote.or(existing.remote),
            hybrid: self.hybrid.or(existing.hybrid),
            seniority: self.seniority.clone().or_else(|| existing.seniority.clone()),
            employment_statuses: self
                .employment_statuses
                .clone()
                .or_else(|| existing.employment_statuses.clone()),
            date_posted: self.date_posted.clone().or_else(|| existing.date_posted.clone()),
            discovered_at: self.discovered_at.clone().or_else(|| existing.discovered_at.clone()),
            salary_string: self.salary_string.clone().or_else(|| existing.salary_string.clone()),
            min_annual_salary_usd: self.min_annual_salary_usd.or(existing.min_annual_salary_usd),
            max_annual_salary_usd: self.max_annual_salary_usd.or(existing.max_annual_salary_usd),
            description: self.description.clone().or_else(|| existing.description.clone()),
            technology_slugs: self
                .technology_slugs
                .clone()
                .or_else(|| existing.technology_slugs.clone()),
            posting_status: self.posting_status.clone().or_else(|| existing.posting_status.clone()),
            enrichment_confidence: self.enrichment_confidence.or(existing.enrichment_confidence),
        }
    }

    /// Returns natural-key candidates in lookup priority order.
    #[must_use]
    pub fn natural_keys(&self) -> Vec<NaturalKey> {
        let mut keys = Vec::with_capacity(1);
        if let Some(job_id) = self.theirstack_job_id {
            keys.push(NaturalKey::JobTheirstackId(job_id));
        }
        keys
    }
}

// ============================================================================
// SECTION: Entity Projection
// ============================================================================

/// Typed projection for any entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityProjection {
    /// Company projection.
    Company(CompanyFields),
    /// Person projection.
    Person(PersonFields),
    /// Job posting projection.
    Job(JobPostingFields),
}

impl EntityProjection {
    /// Builds the typed projection for an entity type from canonical fields.
    #[must_use]
    pub fn from_context(entity_type: EntityType, fields: &ContextMap) -> Self {
        match entity_type {
            EntityType::Company => Self::Company(CompanyFields::from_context(fields)),
            EntityType::Person => Self::Person(PersonFields::from_context(fields)),
            EntityType::Job => Self::Job(JobPostingFields::from_context(fields)),
        }
    }

    /// Returns the entity type of this projection.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Company(_) => EntityType::Company,
            Self::Person(_) => EntityType::Person,
            Self::Job(_) => EntityType::Job,
        }
    }

    /// Merges over an existing projection of the same type; a type mismatch
    /// keeps the incoming projection unchanged.
    #[must_use]
    pub fn merge_over(&self, existing: &Self) -> Self {
        match (self, existing) {
            (Self::Company(incoming), Self::Company(prior)) => {
                Self::Company(incoming.merge_over(prior))
            }
            (Self::Person(incoming), Self::Person(prior)) => {
                Self::Person(incoming.merge_over(prior))
            }
            (Self::Job(incoming), Self::Job(prior)) => Self::Job(incoming.merge_over(prior)),
            _ => self.clone(),
        }
    }

    /// Returns natural-key candidates in lookup priority order.
    #[must_use]
    pub fn natural_keys(&self) -> Vec<NaturalKey> {
        match self {
            Self::Company(fields) => fields.natural_keys(),
            Self::Person(fields) => fields.natural_keys(),
            Self::Job(fields) => fields.natural_keys(),
        }
    }
}

// ============================================================================
// SECTION: Entity Record
// ============================================================================

/// Canonical enriched entity row scoped to a tenant.
///
/// # Invariants
/// - `record_version` is >= 1 and strictly increases across writes.
/// - `canonical_payload` only grows: merges never null out existing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Owning tenant.
    pub org_id: OrgId,
    /// Workspace company the entity was enriched under, when known.
    pub company_id: Option<CompanyId>,
    /// Deterministic entity identifier.
    pub entity_id: EntityId,
    /// Monotonic record version used for optimistic concurrency.
    pub record_version: u32,
    /// Typed projected columns.
    pub projection: EntityProjection,
    /// Merged canonical payload.
    pub canonical_payload: ContextMap,
    /// Timestamp of the most recent enrichment write.
    pub last_enriched_at: Timestamp,
    /// Operation that produced the most recent write.
    pub last_operation_id: Option<OperationId>,
    /// Pipeline run that produced the most recent write.
    pub last_run_id: Option<PipelineRunId>,
    /// Providers that have contributed to this entity, in order of first appearance.
    pub source_providers: Vec<String>,
}

impl EntityRecord {
    /// Returns the entity type of this record.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.projection.entity_type()
    }
}

/// Immutable pre-image snapshot of an entity row.
///
/// # Invariants
/// - Written before the corresponding entity update is applied.
/// - Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Owning tenant.
    pub org_id: OrgId,
    /// Entity type of the snapshotted row.
    pub entity_type: EntityType,
    /// Entity identifier of the snapshotted row.
    pub entity_id: EntityId,
    /// Record version the snapshot preserves.
    pub record_version: u32,
    /// Canonical payload at that version.
    pub canonical_payload: ContextMap,
    /// Pipeline run that triggered the superseding write, when known.
    pub source_run_id: Option<PipelineRunId>,
    /// Capture timestamp.
    pub captured_at: Timestamp,
}

// ============================================================================
// SECTION: Seed Validation
// ============================================================================

/// Extracts the declared entity type from a seed entity map.
#[must_use]
pub fn seed_entity_type(entity: &ContextMap) -> Option<EntityType> {
    entity.get_text("entity_type").and_then(EntityType::parse)
}

/// Returns true when a seed entity carries at least one identifying field
/// besides its `entity_type` tag.
#[must_use]
pub fn seed_has_identifier(entity: &ContextMap) -> bool {
    entity.iter().any(|(key, value)| {
        key != "entity_type"
            && !value.is_null()
            && value.as_text().is_none_or(|text| !text.trim().is_empty())
    })
}
