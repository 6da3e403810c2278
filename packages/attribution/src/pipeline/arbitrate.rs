//! Deterministic arbitration between candidate records.
//!
//! Per field, the value backed by the most reliable tier wins; ties go to
//! the value more sources agree on, then to the one seen first. The primary
//! source is the matching candidate that backs the most chosen values.

use indexmap::IndexMap;

use crate::types::record::{CandidateRecord, FieldValue};
use crate::types::schema::AttributeSchema;
use crate::types::source::SourceTier;

/// Confidence multiplier when the primary source is general web.
const TIER_TWO_FACTOR: f64 = 0.85;

/// Result of arbitrating a candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct Arbitration {
    pub fields: IndexMap<String, FieldValue>,
    pub primary_url: String,
    pub secondary_urls: Vec<String>,
    pub confidence: f64,
    pub explanation: String,

    /// Whether any candidate matched the product
    pub has_evidence: bool,
}

struct ValueGroup<'a> {
    value: &'a FieldValue,
    best_tier: SourceTier,
    support: usize,
    first_index: usize,
}

/// Pick the winning value for one field among matching candidates.
///
/// Returns the value and how many candidates back it, out of how many had
/// any value at all.
fn resolve_field<'a>(name: &str, matched: &[(usize, &'a CandidateRecord)]) -> Option<(&'a FieldValue, usize, usize)> {
    let mut groups: IndexMap<String, ValueGroup<'a>> = IndexMap::new();
    let mut determined = 0;

    for (index, candidate) in matched {
        let value = candidate.value(name);
        if value.is_no_information() {
            continue;
        }
        determined += 1;
        groups
            .entry(value.agreement_key())
            .and_modify(|g| {
                g.support += 1;
                g.best_tier = g.best_tier.min(candidate.tier);
            })
            .or_insert(ValueGroup {
                value,
                best_tier: candidate.tier,
                support: 1,
                first_index: *index,
            });
    }

    groups
        .into_values()
        .min_by(|a, b| {
            a.best_tier
                .cmp(&b.best_tier)
                .then(b.support.cmp(&a.support))
                .then(a.first_index.cmp(&b.first_index))
        })
        .map(|g| (g.value, g.support, determined))
}

/// Most reliable candidate, earliest first. `None` only for empty input.
pub fn fallback_primary(candidates: &[CandidateRecord]) -> Option<&CandidateRecord> {
    candidates
        .iter()
        .enumerate()
        .min_by(|(ia, a), (ib, b)| {
            b.is_match
                .cmp(&a.is_match)
                .then(a.tier.cmp(&b.tier))
                .then(ia.cmp(ib))
        })
        .map(|(_, c)| c)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Arbitrate candidates for one schema. `None` for empty input.
pub fn arbitrate(
    schema: &AttributeSchema,
    candidates: &[CandidateRecord],
    no_match_confidence: f64,
) -> Option<Arbitration> {
    let fallback = fallback_primary(candidates)?;
    let matched: Vec<(usize, &CandidateRecord)> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_match)
        .collect();

    if matched.is_empty() {
        return Some(Arbitration {
            fields: schema
                .field_names()
                .map(|n| (n.to_string(), FieldValue::Undetermined))
                .collect(),
            primary_url: fallback.url.clone(),
            secondary_urls: Vec::new(),
            confidence: no_match_confidence,
            explanation: format!(
                "None of the {} sources matched the product; no field could be attributed.",
                candidates.len()
            ),
            has_evidence: false,
        });
    }

    let mut fields = IndexMap::new();
    let mut agreement_sum = 0.0;
    let mut resolved = 0usize;
    let mut resolved_gate = 0usize;
    let mut conflicts = 0usize;

    for spec in &schema.fields {
        match resolve_field(&spec.name, &matched) {
            Some((value, support, determined)) => {
                fields.insert(spec.name.clone(), value.clone());
                agreement_sum += support as f64 / determined as f64;
                resolved += 1;
                if !spec.identity {
                    resolved_gate += 1;
                }
                if support < determined {
                    conflicts += 1;
                }
            }
            None => {
                fields.insert(spec.name.clone(), FieldValue::Undetermined);
            }
        }
    }

    // contributions: chosen values each matching candidate backs
    let contributions: Vec<(usize, &CandidateRecord, usize)> = matched
        .iter()
        .map(|(index, candidate)| {
            let backed = fields
                .iter()
                .filter(|(name, chosen)| {
                    chosen.is_determined()
                        && candidate.value(name).agreement_key() == chosen.agreement_key()
                })
                .count();
            (*index, *candidate, backed)
        })
        .collect();

    let (_, primary, primary_backed) = contributions
        .iter()
        .min_by(|(ia, a, ca), (ib, b, cb)| {
            cb.cmp(ca).then(a.tier.cmp(&b.tier)).then(ia.cmp(ib))
        })
        .copied()
        .unwrap_or((0, fallback, 0));

    let mut secondary_urls: Vec<String> = Vec::new();
    for (_, candidate, backed) in &contributions {
        if *backed > 0 && candidate.url != primary.url && !secondary_urls.contains(&candidate.url) {
            secondary_urls.push(candidate.url.clone());
        }
    }

    let gate_total = schema.gate_fields().len();
    let coverage = if gate_total == 0 {
        resolved as f64 / schema.fields.len().max(1) as f64
    } else {
        resolved_gate as f64 / gate_total as f64
    };
    let agreement = if resolved == 0 {
        0.0
    } else {
        agreement_sum / resolved as f64
    };
    let tier_factor = match primary.tier {
        SourceTier::TierOne => 1.0,
        SourceTier::TierTwo => TIER_TWO_FACTOR,
    };
    let confidence = round2(((agreement + coverage) / 2.0 * tier_factor).clamp(0.0, 1.0));

    let explanation = format!(
        "Resolved {resolved} of {} fields from {} matching sources ({conflicts} with conflicting values). \
         Primary source {} ({}) backs {primary_backed} of the chosen values.",
        schema.fields.len(),
        matched.len(),
        primary.url,
        primary.tier,
    );

    Some(Arbitration {
        fields,
        primary_url: primary.url.clone(),
        secondary_urls,
        confidence,
        explanation,
        has_evidence: true,
    })
}
