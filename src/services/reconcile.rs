//! Registry diff
//!
//! Partitions a fresh registry pull against the local mirror of one
//! (domain, registry_env) slice:
//!
//! - `R \ L` → insert
//! - `R ∩ L` → update (registry fields overwritten, `active` forced true)
//! - `L \ R` → deactivate (only rows that are still active)
//!
//! Identity is `seller_id` within the slice. Pure; the caller applies the plan.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::db::schemas::{Seller, SELLER_TYPE_BPP};
use crate::registry::RegistryParticipant;

/// Mutations for one domain
#[derive(Debug, Clone, Default)]
pub struct DomainPlan {
    pub inserts: Vec<Seller>,
    pub updates: Vec<Seller>,
    /// `seller_id`s to flip to inactive
    pub deactivations: Vec<String>,
    /// Records the registry returned, before de-duplication
    pub total_in_registry: usize,
}

/// Parse a registry validity timestamp.
///
/// An unparsable value is stored as `None` and logged rather than failing
/// the domain.
fn parse_validity(seller_id: &str, field: &str, value: &str) -> Option<DateTime<Utc>> {
    if value.trim().is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(value.trim()) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!(
                seller_id = %seller_id,
                field = field,
                value = %value,
                error = %e,
                "Unparsable validity timestamp from registry"
            );
            None
        }
    }
}

/// Map a registry record onto the local seller row
pub fn seller_from_participant(
    participant: &RegistryParticipant,
    domain: &str,
    registry_env: &str,
    now: DateTime<Utc>,
) -> Seller {
    let id = &participant.subscriber_id;
    Seller {
        seller_id: id.clone(),
        domain: domain.to_string(),
        registry_env: registry_env.to_string(),
        status: participant.status.clone(),
        seller_type: SELLER_TYPE_BPP.to_string(),
        subscriber_url: participant.callback_url().to_string(),
        country: participant.country.clone(),
        city: participant.city.clone(),
        valid_from: parse_validity(id, "valid_from", &participant.valid_from),
        valid_until: parse_validity(id, "valid_until", &participant.valid_until),
        active: true,
        last_seen_in_registry: now,
        registry_raw: participant.raw.clone(),
    }
}

/// Compute the insert/update/deactivate plan for one domain
pub fn plan_domain(
    domain: &str,
    registry_env: &str,
    registry: &[RegistryParticipant],
    local: &[Seller],
    now: DateTime<Utc>,
) -> DomainPlan {
    // Later duplicates win; BTreeMap keeps the batch order deterministic
    let mut fresh: BTreeMap<&str, &RegistryParticipant> = BTreeMap::new();
    for participant in registry {
        if participant.subscriber_id.trim().is_empty() {
            warn!(domain = %domain, "Registry record without subscriber_id skipped");
            continue;
        }
        fresh.insert(participant.subscriber_id.as_str(), participant);
    }

    let known: HashSet<&str> = local.iter().map(|s| s.seller_id.as_str()).collect();

    let mut plan = DomainPlan {
        total_in_registry: registry.len(),
        ..Default::default()
    };

    for (id, participant) in &fresh {
        let seller = seller_from_participant(participant, domain, registry_env, now);
        if known.contains(id) {
            plan.updates.push(seller);
        } else {
            plan.inserts.push(seller);
        }
    }

    let mut gone: Vec<String> = local
        .iter()
        .filter(|s| s.active && !fresh.contains_key(s.seller_id.as_str()))
        .map(|s| s.seller_id.clone())
        .collect();
    gone.sort();
    gone.dedup();
    plan.deactivations = gone;

    plan
}
