//! Regulatory knowledge base
//!
//! A small in-memory set of pawn regulations with keyword search.
//! Read-only after construction; shared across requests.

use crate::capability::RetrievalCapability;
use crate::models::{Condition, ObjectType};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Minimum item weight eligible for pawn, in grams.
pub const MIN_PAWN_WEIGHT_GRAMS: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    MinimumWeight,
    LoanToValue,
    ConditionEligibility,
    AdminFee,
    Validity,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegulationEntry {
    pub id: String,
    pub category: RuleCategory,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
}

impl RegulationEntry {
    fn new(id: &str, category: RuleCategory, title: &str, content: &str, keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            category,
            title: title.to_string(),
            content: content.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub terms: Vec<String>,
    pub limit: usize,
}

impl RetrievalQuery {
    /// Terms covering the object type, purity, and condition of an item.
    pub fn for_item(object_type: ObjectType, karat: u32, condition: Condition) -> Self {
        let mut terms = vec![
            "weight".to_string(),
            "ltv".to_string(),
            "condition".to_string(),
            format!("{}k", karat),
            condition.english_name().to_string(),
            condition.label().to_lowercase(),
        ];

        if object_type != ObjectType::Unknown {
            terms.push(object_type.english_name().to_string());
            terms.push(object_type.label().to_lowercase());
        }

        Self { terms, limit: 8 }
    }
}

pub struct InMemoryKnowledgeBase {
    entries: Vec<RegulationEntry>,
}

impl InMemoryKnowledgeBase {
    pub fn new(entries: Vec<RegulationEntry>) -> Self {
        Self { entries }
    }

    /// Keyword overlap score. Keyword hits weigh more than content mentions.
    fn score(entry: &RegulationEntry, terms: &[String]) -> usize {
        let content = entry.content.to_lowercase();
        let title = entry.title.to_lowercase();

        terms
            .iter()
            .map(|term| {
                let term = term.to_lowercase();
                if entry.keywords.iter().any(|k| k.eq_ignore_ascii_case(&term)) {
                    3
                } else if title.contains(&term) || content.contains(&term) {
                    1
                } else {
                    0
                }
            })
            .sum()
    }

    pub fn lookup(&self, query: &RetrievalQuery) -> Vec<RegulationEntry> {
        let mut scored: Vec<(usize, &RegulationEntry)> = self
            .entries
            .iter()
            .map(|entry| (Self::score(entry, &query.terms), entry))
            .filter(|(score, _)| *score > 0)
            .collect();

        // stable: ties keep declaration order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored
            .into_iter()
            .take(query.limit)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

impl Default for InMemoryKnowledgeBase {
    fn default() -> Self {
        Self::new(default_regulations())
    }
}

#[async_trait]
impl RetrievalCapability for InMemoryKnowledgeBase {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RegulationEntry>> {
        Ok(self.lookup(query))
    }
}

/// Built-in regulation set for gold pawning.
pub fn default_regulations() -> Vec<RegulationEntry> {
    vec![
        RegulationEntry::new(
            "REG-WEIGHT-001",
            RuleCategory::MinimumWeight,
            "Minimum collateral weight",
            "Gold jewelry pledged as collateral must weigh more than 0.1 gram. \
             Items at or below 0.1 gram are not eligible for a loan.",
            &["weight", "minimum", "berat"],
        ),
        RegulationEntry::new(
            "REG-LTV-24K",
            RuleCategory::LoanToValue,
            "LTV ceiling for 24K gold",
            "Loans against 24K gold may not exceed 85% of the appraised gold value.",
            &["ltv", "24k", "loan"],
        ),
        RegulationEntry::new(
            "REG-LTV-22K",
            RuleCategory::LoanToValue,
            "LTV ceiling for 22K gold",
            "Loans against 22K gold may not exceed 80% of the appraised gold value.",
            &["ltv", "22k", "loan"],
        ),
        RegulationEntry::new(
            "REG-LTV-18K",
            RuleCategory::LoanToValue,
            "LTV ceiling for 18K gold",
            "Loans against 18K gold may not exceed 75% of the appraised gold value.",
            &["ltv", "18k", "loan"],
        ),
        RegulationEntry::new(
            "REG-LTV-16K",
            RuleCategory::LoanToValue,
            "LTV ceiling for 16K gold",
            "Loans against 16K gold may not exceed 70% of the appraised gold value.",
            &["ltv", "16k", "loan"],
        ),
        RegulationEntry::new(
            "REG-LTV-14K",
            RuleCategory::LoanToValue,
            "LTV ceiling for 14K gold and below",
            "Loans against 14K gold or lower purity may not exceed 65% of the appraised gold value.",
            &["ltv", "14k", "loan"],
        ),
        RegulationEntry::new(
            "REG-COND-001",
            RuleCategory::ConditionEligibility,
            "Condition eligibility",
            "Items in excellent (sangat baik), good (baik) or fair (cukup) condition are eligible. \
             Fair condition items are appraised with a 5-10% value reduction. \
             Broken items must be inspected in person before a loan is offered.",
            &["condition", "excellent", "good", "fair", "sangat baik", "baik", "cukup", "kondisi"],
        ),
        RegulationEntry::new(
            "REG-ITEM-001",
            RuleCategory::General,
            "Accepted jewelry types",
            "Accepted items are necklaces (kalung), rings (cincin), bracelets (gelang), \
             earrings (anting) and pendants (liontin). Gemstones are not valued.",
            &["necklace", "ring", "bracelet", "earring", "pendant", "kalung", "cincin", "gelang", "anting", "liontin"],
        ),
        RegulationEntry::new(
            "REG-FEE-001",
            RuleCategory::AdminFee,
            "Administrative fee schedule",
            "Admin fee is Rp 5,500 up to Rp 1,000,000; Rp 11,000 up to Rp 5,000,000; \
             Rp 16,500 up to Rp 10,000,000; Rp 22,000 up to Rp 50,000,000; Rp 33,000 above.",
            &["fee", "admin", "loan"],
        ),
        RegulationEntry::new(
            "REG-VALID-001",
            RuleCategory::Validity,
            "Estimate validity",
            "An online estimate is valid for 24 hours and is subject to physical verification \
             at the branch.",
            &["validity", "estimate", "expiry"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_query_covers_required_categories() {
        let kb = InMemoryKnowledgeBase::default();
        let query = RetrievalQuery::for_item(ObjectType::Necklace, 22, Condition::Good);
        let results = kb.lookup(&query);

        let has = |category| results.iter().any(|e| e.category == category);
        assert!(has(RuleCategory::MinimumWeight));
        assert!(has(RuleCategory::LoanToValue));
        assert!(has(RuleCategory::ConditionEligibility));
        assert!(results.iter().any(|e| e.id == "REG-LTV-22K"));
        assert!(results.len() <= query.limit);
    }

    #[test]
    fn test_minimum_weight_rule_matches_threshold() {
        let rule = default_regulations()
            .into_iter()
            .find(|e| e.category == RuleCategory::MinimumWeight)
            .unwrap();
        let threshold = format!("{} gram", MIN_PAWN_WEIGHT_GRAMS);

        assert!(rule.content.contains(&format!("more than {}", threshold)));
        assert!(rule.content.contains(&format!("at or below {}", threshold)));
        assert!(!rule.content.contains("at least"));
    }

    #[test]
    fn test_karat_specific_ltv_ranks_first() {
        let kb = InMemoryKnowledgeBase::default();
        let query = RetrievalQuery::for_item(ObjectType::Ring, 18, Condition::Fair);
        let results = kb.lookup(&query);

        let first_ltv = results
            .iter()
            .find(|e| e.category == RuleCategory::LoanToValue)
            .unwrap();
        assert_eq!(first_ltv.id, "REG-LTV-18K");
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_returns_nothing() {
        let kb = InMemoryKnowledgeBase::new(vec![]);
        let query = RetrievalQuery::for_item(ObjectType::Ring, 18, Condition::Fair);
        assert!(kb.search(&query).await.unwrap().is_empty());
    }
}
