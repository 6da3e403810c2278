//! Undetermined-rate gate.
//!
//! Pure functions over records: how much of a record's non-identity fields
//! carry no information, and whether a task should stop before (or right
//! after) reconciliation.

use indexmap::IndexMap;
use tracing::debug;

use crate::types::config::GatePolicy;
use crate::types::outcome::{AbortReason, DroppedCandidate};
use crate::types::record::{CandidateRecord, FieldValue, FinalizedRecord};
use crate::types::schema::AttributeSchema;

/// Fraction of the schema's gate fields that carry no information.
///
/// Missing fields count as undetermined. A schema with no gate fields has
/// nothing to resolve and scores 1.0.
pub fn undetermined_rate(schema: &AttributeSchema, fields: &IndexMap<String, FieldValue>) -> f64 {
    let gate_fields = schema.gate_fields();
    if gate_fields.is_empty() {
        return 1.0;
    }
    let undetermined = gate_fields
        .iter()
        .filter(|spec| {
            fields
                .get(&spec.name)
                .map_or(true, FieldValue::is_no_information)
        })
        .count();
    undetermined as f64 / gate_fields.len() as f64
}

/// True iff the record's undetermined rate is at or above `threshold`.
pub fn is_over_threshold(schema: &AttributeSchema, record: &CandidateRecord, threshold: f64) -> bool {
    undetermined_rate(schema, &record.fields) >= threshold
}

/// True when every gate field of the record is undetermined.
pub fn is_fully_undetermined(schema: &AttributeSchema, record: &CandidateRecord) -> bool {
    undetermined_rate(schema, &record.fields) >= 1.0
}

/// The canonical "no information survived reconciliation" outcome.
pub fn is_empty_result(schema: &AttributeSchema, record: &FinalizedRecord) -> bool {
    undetermined_rate(schema, &record.fields) >= 1.0
}

/// Diagnostic text for an aborted task.
pub fn diagnostic(task: &str, reason: AbortReason) -> String {
    reason.diagnostic(task)
}

/// Candidates split by the gate.
#[derive(Debug, Clone, Default)]
pub struct Screened {
    pub kept: Vec<CandidateRecord>,
    pub dropped: Vec<DroppedCandidate>,
}

/// Drop candidates at or over the policy threshold, preserving order.
pub fn screen(schema: &AttributeSchema, candidates: Vec<CandidateRecord>, policy: &GatePolicy) -> Screened {
    let mut screened = Screened::default();
    for candidate in candidates {
        let rate = undetermined_rate(schema, &candidate.fields);
        if rate >= policy.max_undetermined_rate {
            debug!(url = %candidate.url, rate, "Candidate over undetermined threshold, dropping");
            screened.dropped.push(DroppedCandidate {
                url: candidate.url,
                undetermined_rate: rate,
                reason: format!(
                    "undetermined rate {rate:.2} is at or over {:.2}",
                    policy.max_undetermined_rate
                ),
            });
        } else {
            screened.kept.push(candidate);
        }
    }
    screened
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::FieldSpec;
    use crate::types::source::SourceTier;
    use proptest::prelude::*;

    fn schema() -> AttributeSchema {
        AttributeSchema::new("t", "T")
            .field(FieldSpec::text("Product_Name_Scraped").identity())
            .field(FieldSpec::text("a"))
            .field(FieldSpec::text("b"))
            .field(FieldSpec::text("c"))
            .field(FieldSpec::text("d"))
    }

    fn record(values: &[(&str, FieldValue)]) -> CandidateRecord {
        let mut record = CandidateRecord::no_evidence(&schema(), "https://x.example", SourceTier::TierOne);
        record.is_match = true;
        for (name, value) in values {
            record.fields.insert(name.to_string(), value.clone());
        }
        record
    }

    #[test]
    fn test_identity_fields_are_not_counted() {
        let r = record(&[
            ("Product_Name_Scraped", FieldValue::Text("Patty".into())),
            ("a", FieldValue::Text("1".into())),
        ]);
        assert_eq!(undetermined_rate(&schema(), &r.fields), 0.75);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // exactly 3 of 4 gate fields undetermined
        let r = record(&[("a", FieldValue::Text("1".into()))]);
        assert!(is_over_threshold(&schema(), &r, 0.75));
        assert!(!is_over_threshold(&schema(), &r, 0.76));
    }

    #[test]
    fn test_sentinel_shapes_count_as_undetermined() {
        let r = record(&[
            ("a", FieldValue::Text("".into())),
            ("b", FieldValue::List(vec![])),
            ("c", FieldValue::Text("undetermined".into())),
            ("d", FieldValue::Bool(false)),
        ]);
        assert_eq!(undetermined_rate(&schema(), &r.fields), 0.75);
    }

    #[test]
    fn test_no_gate_fields_scores_one() {
        let schema = AttributeSchema::new("t", "T").field(FieldSpec::text("Serving_Size").identity());
        assert_eq!(undetermined_rate(&schema, &IndexMap::new()), 1.0);
    }

    #[test]
    fn test_screen_keeps_order_and_reports_drops() {
        let mut a = record(&[("a", FieldValue::Text("1".into())), ("b", FieldValue::Text("2".into()))]);
        a.url = "https://a.example".into();
        let mut b = record(&[]);
        b.url = "https://b.example".into();
        let mut c = record(&[("c", FieldValue::Text("3".into())), ("d", FieldValue::Text("4".into()))]);
        c.url = "https://c.example".into();

        let screened = screen(&schema(), vec![a, b, c], &GatePolicy::default());
        let kept: Vec<&str> = screened.kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(kept, vec!["https://a.example", "https://c.example"]);
        assert_eq!(screened.dropped.len(), 1);
        assert_eq!(screened.dropped[0].undetermined_rate, 1.0);
    }

    #[test]
    fn test_diagnostic_text() {
        assert_eq!(
            diagnostic("nutrition", AbortReason::EmptyAfterReconciliation),
            "No data made it through past final validation for task: nutrition"
        );
    }

    proptest! {
        #[test]
        fn prop_rate_is_monotonic_in_undetermined_fields(
            base in proptest::collection::vec(any::<bool>(), 4),
            extra in proptest::collection::vec(any::<bool>(), 4),
        ) {
            let names = ["a", "b", "c", "d"];
            // B resolves fields where `base` is true; A additionally blanks
            // the fields where `extra` is true
            let b_values: Vec<(&str, FieldValue)> = names
                .iter()
                .zip(&base)
                .map(|(n, resolved)| {
                    let v = if *resolved { FieldValue::Text("x".into()) } else { FieldValue::Undetermined };
                    (*n, v)
                })
                .collect();
            let a_values: Vec<(&str, FieldValue)> = b_values
                .iter()
                .zip(&extra)
                .map(|((n, v), blank)| (*n, if *blank { FieldValue::Undetermined } else { v.clone() }))
                .collect();

            let a = record(&a_values);
            let b = record(&b_values);
            prop_assert!(undetermined_rate(&schema(), &a.fields) >= undetermined_rate(&schema(), &b.fields));
        }

        #[test]
        fn prop_rate_is_a_fraction(resolved in proptest::collection::vec(any::<bool>(), 4)) {
            let values: Vec<(&str, FieldValue)> = ["a", "b", "c", "d"]
                .iter()
                .zip(&resolved)
                .map(|(n, r)| (*n, if *r { FieldValue::Bool(true) } else { FieldValue::Undetermined }))
                .collect();
            let rate = undetermined_rate(&schema(), &record(&values).fields);
            prop_assert!((0.0..=1.0).contains(&rate));
        }
    }
}
