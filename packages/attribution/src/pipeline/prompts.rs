//! LLM prompts for the attribution pipeline.
//!
//! The parser prompt reads one document against one schema; the finalizer
//! prompt arbitrates across every candidate for a product.

use sha2::{Digest, Sha256};

use crate::types::record::CandidateRecord;
use crate::types::schema::{AttributeSchema, FieldType, FinalizedSchema};
use crate::types::source::{ProductContext, SourceTier};

/// System prompt for per-source extraction.
pub const PARSER_PROMPT: &str = r#"You are a product data analyst reading one scraped document about a food product.

Task: {task} ({description})

First decide whether the document describes the product given in <PRODUCT>. Set "is_match" to true only if the
product name, manufacturer and size (when given) are consistent with the document. A document about a different
flavor, size or brand is not a match.

Then fill every field below from the document only:
{fields}

Rules:
- Use "undetermined" for any field the document does not state. Never guess.
- Copy values as printed, including units ("200", "10g", "2 1/2 cups").
- For fields with allowed values, answer with one of the listed values or "undetermined".
- Put a one-sentence note about what you found in "log"."#;

/// System prompt for reconciling candidates into one record.
pub const FINALIZER_PROMPT: &str = r#"You are reconciling product data for task: {task} ({description}).

You receive candidate records, one per source URL. Each candidate has a tier (tier_1 = manufacturer or API feed,
tier_2 = general web) and "is_match", which says whether the source actually describes the product.

Produce one final record:
- For each field, choose the best supported value. Prefer tier_1 over tier_2, then the value most sources agree on.
- Ignore candidates with "is_match": false unless nothing else is available.
- Use "undetermined" when no matching candidate supports a value.
- "{primary}": the single URL that supports most of your chosen values. It must be one of the candidate URLs.
- "{secondary}": the other candidate URLs that support your chosen values. Do not repeat the primary URL.
- "{score}": a number between 0 and 1.
- "{explanation}": one or two sentences on agreement between sources and why the primary was chosen.

Fields:
{fields}"#;

/// Prompt for the image-to-text pass.
pub const TRANSCRIBE_PROMPT: &str = "Extract all visible text from the image and output a string";

/// Hash of both system prompts. Stored on every finalized record so outputs
/// from a changed prompt can be told apart.
pub fn prompt_version_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(PARSER_PROMPT.as_bytes());
    hasher.update(FINALIZER_PROMPT.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sha256 hex digest of arbitrary evidence text.
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn describe_fields(schema: &AttributeSchema) -> String {
    schema
        .fields
        .iter()
        .map(|f| {
            let mut line = format!("- {} ({})", f.name, f.field_type.label());
            if let FieldType::Enumeration(values) = &f.field_type {
                line.push_str(&format!(" one of: {}", values.join(" | ")));
            }
            if !f.description.is_empty() {
                line.push_str(&format!(": {}", f.description));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format the parser system prompt for a schema.
pub fn format_parser_prompt(schema: &AttributeSchema) -> String {
    PARSER_PROMPT
        .replace("{task}", &schema.name)
        .replace("{description}", &schema.description)
        .replace("{fields}", &describe_fields(schema))
}

/// Format the user message for one document.
pub fn format_document_prompt(
    product: &ProductContext,
    url: &str,
    tier: SourceTier,
    content: &str,
) -> String {
    let mut product_block = format!("Product: {}", product.name);
    if let Some(manufacturer) = &product.manufacturer {
        product_block.push_str(&format!("\nManufacturer: {manufacturer}"));
    }
    if let Some(size) = &product.size {
        product_block.push_str(&format!("\nSize: {size}"));
    }

    format!(
        "<PRODUCT>\n{product_block}\n</PRODUCT>\n\n<DOCUMENT url=\"{url}\" tier=\"{tier}\">\n{content}\n</DOCUMENT>"
    )
}

/// Format the finalizer system prompt.
pub fn format_finalizer_prompt(schema: &FinalizedSchema) -> String {
    let p = &schema.provenance;
    FINALIZER_PROMPT
        .replace("{task}", &schema.base.name)
        .replace("{description}", &schema.base.description)
        .replace("{primary}", &p.primary_url)
        .replace("{secondary}", &p.secondary_urls)
        .replace("{score}", &p.confidence_score)
        .replace("{explanation}", &p.confidence_explanation)
        .replace("{fields}", &describe_fields(&schema.base))
}

/// Serialize candidates as the finalizer's evidence, in input order.
///
/// Output is stable for identical input, so it doubles as the digest
/// preimage.
pub fn format_evidence(candidates: &[CandidateRecord]) -> String {
    let evidence: Vec<serde_json::Value> = candidates
        .iter()
        .map(|c| {
            serde_json::json!({
                "url": c.url,
                "tier": c.tier,
                "is_match": c.is_match,
                "fields": c.fields,
            })
        })
        .collect();

    // Vec<Value> always serializes
    serde_json::to_string_pretty(&evidence).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::builtin;
    use crate::types::record::FieldValue;

    #[test]
    fn test_prompt_hash_is_consistent() {
        let hash1 = prompt_version_hash();
        let hash2 = prompt_version_hash();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 hex
    }

    #[test]
    fn test_parser_prompt_lists_domains() {
        let prompt = format_parser_prompt(&builtin::beef());
        assert!(prompt.contains("Task: beef"));
        assert!(prompt.contains("- breed (enumeration) one of: Wagyu | Kobe"));
        assert!(!prompt.contains("{fields}"));
    }

    #[test]
    fn test_document_prompt_wraps_product_context() {
        let product = ProductContext::new("7", "Angus Patty").with_manufacturer("Acme");
        let prompt = format_document_prompt(
            &product,
            "https://acme.example/patty",
            SourceTier::TierOne,
            "Calories 200",
        );

        assert!(prompt.contains("Product: Angus Patty\nManufacturer: Acme"));
        assert!(!prompt.contains("Size:"));
        assert!(prompt.contains("<DOCUMENT url=\"https://acme.example/patty\" tier=\"tier_1\">"));
        assert!(prompt.contains("Calories 200"));
    }

    #[test]
    fn test_finalizer_prompt_names_provenance_fields() {
        let prompt = format_finalizer_prompt(&builtin::nutrition().finalized());
        assert!(prompt.contains("\"Primary_Nutrition_URL\""));
        assert!(prompt.contains("\"Confidence_Score_Nutrition\""));
    }

    #[test]
    fn test_evidence_is_stable() {
        let candidate = CandidateRecord {
            url: "https://a.example".into(),
            tier: SourceTier::TierOne,
            is_match: true,
            fields: [("Calories".to_string(), FieldValue::Text("200".into()))]
                .into_iter()
                .collect(),
            log: None,
        };
        let a = format_evidence(std::slice::from_ref(&candidate));
        let b = format_evidence(&[candidate]);
        assert_eq!(a, b);
        assert_eq!(digest(&a), digest(&b));
        assert!(a.contains("\"tier\": \"tier_1\""));
    }
}
