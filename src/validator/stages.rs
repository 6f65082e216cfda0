//! Prompts and pure helpers for the four validation stages

use crate::knowledge::{RegulationEntry, RuleCategory};
use crate::models::{JewelryAnalysis, ObjectType, PriceQuote};

pub(crate) const GROUNDED_SYSTEM_PROMPT: &str = "You are a compliance analyst for a gold pawn service. \
Base every statement strictly on the regulations provided. Never invent, assume or cite rules \
that are not listed.";

/// Categories a complete retrieval must cover.
pub(crate) const REQUIRED_CATEGORIES: [RuleCategory; 3] = [
    RuleCategory::MinimumWeight,
    RuleCategory::LoanToValue,
    RuleCategory::ConditionEligibility,
];

fn karat_keyword(karat: u32) -> String {
    format!("{}k", karat)
}

/// Drop LTV entries for other purities; everything else stays.
pub(crate) fn relevant_rules(entries: Vec<RegulationEntry>, karat: u32) -> Vec<RegulationEntry> {
    let keyword = karat_keyword(karat);
    entries
        .into_iter()
        .filter(|entry| {
            entry.category != RuleCategory::LoanToValue
                || entry.keywords.iter().any(|k| k.eq_ignore_ascii_case(&keyword))
        })
        .collect()
}

/// Fraction of required categories present in the rule set.
pub(crate) fn coverage(rules: &[RegulationEntry]) -> f64 {
    let covered = REQUIRED_CATEGORIES
        .iter()
        .filter(|category| rules.iter().any(|r| r.category == **category))
        .count();
    covered as f64 / REQUIRED_CATEGORIES.len() as f64
}

/// First `NN%` figure in the karat's LTV rule.
pub(crate) fn ltv_ceiling(rules: &[RegulationEntry], karat: u32) -> Option<u32> {
    let keyword = karat_keyword(karat);
    let rule = rules.iter().find(|r| {
        r.category == RuleCategory::LoanToValue
            && r.keywords.iter().any(|k| k.eq_ignore_ascii_case(&keyword))
    })?;

    let percent_at = rule.content.find('%')?;
    let digits: String = rule.content[..percent_at]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.chars().rev().collect::<String>().parse().ok()
}

fn format_rules(rules: &[RegulationEntry]) -> String {
    if rules.is_empty() {
        return "(no regulations were retrieved)".to_string();
    }
    rules
        .iter()
        .map(|r| format!("- [{}] {}: {}", r.id, r.title, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_item(analysis: &JewelryAnalysis, quote: &PriceQuote) -> String {
    let c = &analysis.confidence;
    format!(
        "Object type: {} ({})\n\
         Estimated weight: {:.2} g\n\
         Karat: {}K\n\
         Condition: {} ({})\n\
         Analysis confidence: object {:.0}%, weight {:.0}%, karat {:.0}%, condition {:.0}%\n\
         Gold price per gram: Rp {}\n\
         Estimated gold value: Rp {}\n\
         Max LTV: {}%\n\
         Max loan: Rp {}\n\
         Admin fee: Rp {}\n\
         Net loan: Rp {}",
        analysis.object_type.label(),
        analysis.object_type.english_name(),
        analysis.estimated_weight_grams,
        analysis.karat,
        analysis.condition.label(),
        analysis.condition.english_name(),
        c.object_detection,
        c.weight_estimation,
        c.karat_analysis,
        c.condition_analysis,
        quote.gold_price_per_gram,
        quote.estimated_gold_value,
        quote.max_ltv_percent,
        quote.max_loan_amount,
        quote.admin_fee,
        quote.net_loan_amount,
    )
}

pub(crate) fn generation_prompt(
    analysis: &JewelryAnalysis,
    quote: &PriceQuote,
    rules: &[RegulationEntry],
) -> String {
    format!(
        r#"Assess loan eligibility and risk for this pawn estimate.

REGULATIONS:
{}

ITEM AND QUOTE:
{}

Rules:
- Use ONLY the regulations listed above
- If a regulation needed for the assessment is missing, say so instead of assuming one
- Cover weight eligibility, the LTV ceiling for the karat, and condition eligibility
- At most 150 words, plain prose"#,
        format_rules(rules),
        format_item(analysis, quote),
    )
}

/// Observations computed locally and handed to the reflection prompt.
pub(crate) fn pre_check_notes(analysis: &JewelryAnalysis) -> Vec<String> {
    let mut notes = Vec::new();

    if analysis.object_type == ObjectType::Unknown {
        notes.push("Object type was not identified from the image.".to_string());
    } else if !analysis.weight_in_typical_range() {
        let (low, high) = analysis.object_type.typical_weight_range();
        notes.push(format!(
            "Weight {:.2} g is outside the typical {:.1}-{:.1} g range for a {}.",
            analysis.estimated_weight_grams,
            low,
            high,
            analysis.object_type.english_name()
        ));
    }

    if analysis.karat == 24 && analysis.condition.is_lowest_tier() {
        notes.push("24K gold reported in fair condition; high-purity items rarely show heavy wear without being soft-repaired.".to_string());
    }

    notes
}

/// Hard contradictions between the quote and the retrieved regulations.
pub(crate) fn quote_contradictions(
    analysis: &JewelryAnalysis,
    quote: &PriceQuote,
    rules: &[RegulationEntry],
) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(ceiling) = ltv_ceiling(rules, analysis.karat) {
        if quote.max_ltv_percent > ceiling {
            issues.push(format!(
                "Quoted LTV {}% exceeds the {}% ceiling for {}K gold.",
                quote.max_ltv_percent, ceiling, analysis.karat
            ));
        }
    }

    if quote.max_loan_amount > quote.estimated_gold_value {
        issues.push("Maximum loan exceeds the estimated gold value.".to_string());
    }

    issues
}

pub(crate) fn reflection_prompt(
    analysis: &JewelryAnalysis,
    quote: &PriceQuote,
    narrative: &str,
    notes: &[String],
) -> String {
    let narrative = if narrative.trim().is_empty() {
        "(no assessment was generated)"
    } else {
        narrative.trim()
    };
    let notes = if notes.is_empty() {
        "(none)".to_string()
    } else {
        notes.iter().map(|n| format!("- {}", n)).collect::<Vec<_>>().join("\n")
    };

    format!(
        r#"Critically re-examine this pawn assessment and look for inconsistencies.

ITEM AND QUOTE:
{}

ASSESSMENT:
{}

AUTOMATED PRE-CHECKS:
{}

Check for: weight implausible for the object type, karat inconsistent with condition or
appearance, claims not supported by the data, arithmetic that does not match the quote.

Reply with each real inconsistency on its own line starting with "- ".
If there are none, reply with exactly: NONE"#,
        format_item(analysis, quote),
        narrative,
        notes,
    )
}

/// `1. ` or `2) ` at the start of a line; anything else is issue text.
fn strip_numbered_marker(line: &str) -> &str {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return line;
    }

    let rest = &line[digits..];
    match rest.strip_prefix(['.', ')']) {
        Some(after) if after.starts_with(char::is_whitespace) => after,
        _ => line,
    }
}

/// One issue per bulleted or numbered line; `NONE` means no issues.
pub(crate) fn parse_issue_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line
                .trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim();
            strip_numbered_marker(line).trim()
        })
        .filter(|line| !line.is_empty())
        .filter(|line| !line.trim_end_matches('.').eq_ignore_ascii_case("none"))
        .map(|line| line.to_string())
        .collect()
}

pub(crate) fn validation_prompt(
    analysis: &JewelryAnalysis,
    quote: &PriceQuote,
    issues: &[String],
    degraded: &[&str],
) -> String {
    let issues = if issues.is_empty() {
        "(none)".to_string()
    } else {
        issues.iter().map(|i| format!("- {}", i)).collect::<Vec<_>>().join("\n")
    };
    let degraded = if degraded.is_empty() {
        "(none)".to_string()
    } else {
        degraded.join(", ")
    };

    format!(
        r#"Decide on this pawn estimate.

ITEM AND QUOTE:
{}

ISSUES FOUND DURING REVIEW:
{}

STAGES THAT COULD NOT COMPLETE:
{}

Answer with exactly one token and nothing else:
APPROVED
REQUIRES_REVIEW
REJECTED"#,
        format_item(analysis, quote),
        issues,
        degraded,
    )
}
