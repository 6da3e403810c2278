//! Serving size validation.
//!
//! A candidate whose `Serving_Size` names a quantity that disagrees with the
//! product's own size is most likely describing a different pack of the
//! product. Both sides are converted to ounces and compared within a margin.
//! When either side has no readable quantity the check cannot decide and the
//! candidate is kept.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::gate::{undetermined_rate, Screened};
use crate::types::outcome::DroppedCandidate;
use crate::types::record::{CandidateRecord, FieldValue};
use crate::types::schema::AttributeSchema;
use crate::types::source::ProductContext;

/// Candidate field holding the printed serving size.
pub const SERVING_SIZE_FIELD: &str = "Serving_Size";

static RE_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+\s*/\s*\d+|\d*\.?\d+)\s*(fl\.?\s*oz|ounces?|oz|pounds?|lbs?|milligrams?|mg|millilit(?:er|re)s?|ml|grams?|g|gallons?|gal|lit(?:er|re)s?|l)\b",
    )
    .unwrap()
});

/// Units a size can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Ounce,
    Pound,
    Gram,
    Milligram,
    Millilitre,
    Litre,
    Gallon,
}

impl Unit {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.to_ascii_lowercase();
        let unit = match raw.as_str() {
            u if u.ends_with("oz") || u.starts_with("ounce") => Self::Ounce,
            u if u.starts_with("lb") || u.starts_with("pound") => Self::Pound,
            "mg" => Self::Milligram,
            u if u.starts_with("milligram") => Self::Milligram,
            "ml" => Self::Millilitre,
            u if u.starts_with("millilit") => Self::Millilitre,
            u if u.starts_with("gal") => Self::Gallon,
            u if u == "g" || u.starts_with("gram") => Self::Gram,
            u if u == "l" || u.starts_with("lit") => Self::Litre,
            _ => return None,
        };
        Some(unit)
    }

    /// Ounces per unit. Volumes convert to fluid ounces.
    pub fn ounces(self) -> f64 {
        match self {
            Self::Ounce => 1.0,
            Self::Pound => 16.0,
            Self::Gram => 0.035274,
            Self::Milligram => 0.000035274,
            Self::Millilitre => 0.033814,
            Self::Litre => 33.814,
            Self::Gallon => 128.0,
        }
    }
}

/// An amount with its unit, as printed on a label or in a product name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub amount: f64,
    pub unit: Unit,
}

impl Quantity {
    /// First quantity written in `text`, e.g. "4 oz" in "Angus Patty 4 oz".
    pub fn parse(text: &str) -> Option<Self> {
        let caps = RE_QUANTITY.captures(text)?;
        let amount = parse_amount(&caps[1])?;
        let unit = Unit::parse(&caps[2])?;
        Some(Self { amount, unit })
    }

    pub fn to_ounces(self) -> f64 {
        self.amount * self.unit.ounces()
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => raw.parse().ok(),
    }
}

/// Result of comparing a serving size against the product's size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServingSizeCheck {
    Match,
    Mismatch { expected_oz: f64, found_oz: f64 },
    /// One side has no readable quantity
    Unknown,
}

/// Compare two sizes within `margin_oz` ounces.
pub fn check_serving_size(expected: &str, serving: &str, margin_oz: f64) -> ServingSizeCheck {
    let (Some(expected), Some(found)) = (Quantity::parse(expected), Quantity::parse(serving)) else {
        return ServingSizeCheck::Unknown;
    };
    let (expected_oz, found_oz) = (expected.to_ounces(), found.to_ounces());
    if (expected_oz - found_oz).abs() <= margin_oz {
        ServingSizeCheck::Match
    } else {
        ServingSizeCheck::Mismatch { expected_oz, found_oz }
    }
}

/// The product's size: the explicit size when it parses, otherwise a size
/// written in the product name.
fn product_size(product: &ProductContext) -> Option<&str> {
    product
        .size
        .as_deref()
        .filter(|size| Quantity::parse(size).is_some())
        .or_else(|| Quantity::parse(&product.name).map(|_| product.name.as_str()))
}

/// Why a candidate fails serving size validation, if it does.
pub fn serving_size_mismatch(product: &ProductContext, candidate: &CandidateRecord, margin_oz: f64) -> Option<String> {
    let expected = product_size(product)?;
    let FieldValue::Text(serving) = candidate.value(SERVING_SIZE_FIELD) else {
        return None;
    };
    match check_serving_size(expected, serving, margin_oz) {
        ServingSizeCheck::Mismatch { expected_oz, found_oz } => Some(format!(
            "serving size {serving:?} ({found_oz:.2} oz) does not match product size {expected:?} ({expected_oz:.2} oz)"
        )),
        ServingSizeCheck::Match | ServingSizeCheck::Unknown => None,
    }
}

/// Drop candidates whose serving size contradicts the product, preserving
/// order. Schemas without a serving size field pass through untouched.
pub fn screen_serving_size(
    schema: &AttributeSchema,
    product: &ProductContext,
    candidates: Vec<CandidateRecord>,
    margin_oz: f64,
) -> Screened {
    let mut screened = Screened::default();
    if !schema.field_names().any(|name| name == SERVING_SIZE_FIELD) {
        screened.kept = candidates;
        return screened;
    }

    for candidate in candidates {
        match serving_size_mismatch(product, &candidate, margin_oz) {
            Some(reason) => {
                debug!(url = %candidate.url, reason = %reason, "Serving size mismatch, dropping");
                screened.dropped.push(DroppedCandidate {
                    undetermined_rate: undetermined_rate(schema, &candidate.fields),
                    url: candidate.url,
                    reason,
                });
            }
            None => screened.kept.push(candidate),
        }
    }
    screened
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::builtin;
    use crate::types::source::SourceTier;

    fn candidate(url: &str, serving: &str) -> CandidateRecord {
        let mut record = CandidateRecord::no_evidence(&builtin::nutrition(), url, SourceTier::TierTwo);
        record.is_match = true;
        record
            .fields
            .insert(SERVING_SIZE_FIELD.into(), FieldValue::Text(serving.into()));
        record
    }

    #[test]
    fn test_parse_quantities() {
        assert_eq!(
            Quantity::parse("Angus Patty 4 oz"),
            Some(Quantity { amount: 4.0, unit: Unit::Ounce })
        );
        assert_eq!(Quantity::parse("1 patty (113g)").map(|q| q.unit), Some(Unit::Gram));
        assert_eq!(Quantity::parse("12 FL OZ can").map(|q| q.unit), Some(Unit::Ounce));
        assert_eq!(Quantity::parse("1/4 lb").map(|q| q.amount), Some(0.25));
        assert_eq!(Quantity::parse("2 large patties"), None);
        assert_eq!(Quantity::parse("1 patty"), None);
    }

    #[test]
    fn test_matching_sizes_across_units() {
        assert_eq!(check_serving_size("4 oz", "1 patty (113g)", 0.2), ServingSizeCheck::Match);
        assert_eq!(check_serving_size("1/4 lb", "4oz", 0.2), ServingSizeCheck::Match);
        assert_eq!(check_serving_size("12 fl oz", "355 ml", 0.2), ServingSizeCheck::Match);
    }

    #[test]
    fn test_mismatched_sizes() {
        match check_serving_size("4 oz", "8 oz", 0.2) {
            ServingSizeCheck::Mismatch { expected_oz, found_oz } => {
                assert_eq!(expected_oz, 4.0);
                assert_eq!(found_oz, 8.0);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_unit_is_unknown() {
        assert_eq!(check_serving_size("4 oz", "1 patty", 0.2), ServingSizeCheck::Unknown);
        assert_eq!(check_serving_size("Angus Patty", "4 oz", 0.2), ServingSizeCheck::Unknown);
    }

    #[test]
    fn test_product_name_used_when_size_missing() {
        let product = ProductContext::new("1", "Angus Patty 6 oz");
        let reason = serving_size_mismatch(&product, &candidate("https://a.example", "4 oz"), 0.2).unwrap();
        assert!(reason.contains("4 oz"));

        let sized = ProductContext::new("1", "Angus Patty 6 oz").with_size("4 oz");
        assert!(serving_size_mismatch(&sized, &candidate("https://a.example", "4 oz"), 0.2).is_none());
    }

    #[test]
    fn test_screen_drops_only_mismatches() {
        let schema = builtin::nutrition();
        let product = ProductContext::new("1", "Angus Patty").with_size("4 oz");
        let mut undetermined = candidate("https://c.example", "");
        undetermined.fields.insert(SERVING_SIZE_FIELD.into(), FieldValue::Undetermined);

        let screened = screen_serving_size(
            &schema,
            &product,
            vec![
                candidate("https://a.example", "4 oz (113g)"),
                candidate("https://b.example", "2 lb"),
                undetermined,
            ],
            0.2,
        );

        let kept: Vec<&str> = screened.kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(kept, vec!["https://a.example", "https://c.example"]);
        assert_eq!(screened.dropped.len(), 1);
        assert_eq!(screened.dropped[0].url, "https://b.example");
        assert!(screened.dropped[0].reason.contains("does not match"));
    }

    #[test]
    fn test_schema_without_serving_size_passes_through() {
        let schema = AttributeSchema::new("t", "T");
        let product = ProductContext::new("1", "Patty").with_size("4 oz");
        let screened = screen_serving_size(&schema, &product, vec![candidate("https://a.example", "9 lb")], 0.2);
        assert_eq!(screened.kept.len(), 1);
        assert!(screened.dropped.is_empty());
    }
}
