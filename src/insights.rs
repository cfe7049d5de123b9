use serde::{Deserialize, Serialize};

use crate::data::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Trend,
    Anomaly,
    Recommendation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// An insight before it is attached to an analysis and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightDraft {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    /// Percentage in `0..=100`.
    pub confidence: u8,
    pub action: String,
}

pub trait InsightGenerator {
    fn generate(&self, records: &[Record], columns: &[String]) -> Vec<InsightDraft>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CannedInsights;

impl InsightGenerator for CannedInsights {
    fn generate(&self, _records: &[Record], _columns: &[String]) -> Vec<InsightDraft> {
        vec![
            draft(
                InsightKind::Trend,
                Priority::High,
                "Revenue Growth Detected",
                "Your data shows positive growth trends in revenue metrics.",
                85,
                "Review growth factors and maintain momentum",
            ),
            draft(
                InsightKind::Anomaly,
                Priority::Medium,
                "Data Quality Alert",
                "Some data points may require attention for accuracy.",
                72,
                "Review data quality and clean outliers",
            ),
            draft(
                InsightKind::Recommendation,
                Priority::Low,
                "Optimization Opportunity",
                "Consider segmenting your data for deeper insights.",
                68,
                "Create data segments for targeted analysis",
            ),
        ]
    }
}

fn draft(
    kind: InsightKind,
    priority: Priority,
    title: &str,
    description: &str,
    confidence: u8,
    action: &str,
) -> InsightDraft {
    InsightDraft {
        kind,
        priority,
        title: title.to_string(),
        description: description.to_string(),
        confidence,
        action: action.to_string(),
    }
}

/// Headline figures shown above an insight list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSummary {
    pub total: usize,
    pub high_priority: usize,
    /// Mean confidence rounded to the nearest whole percent; 0 when empty.
    pub average_confidence: u8,
}

impl InsightSummary {
    pub fn from_drafts<'a, I>(drafts: I) -> Self
    where
        I: IntoIterator<Item = &'a InsightDraft>,
    {
        let mut total = 0usize;
        let mut high_priority = 0usize;
        let mut confidence_sum = 0u64;
        for draft in drafts {
            total += 1;
            if draft.priority == Priority::High {
                high_priority += 1;
            }
            confidence_sum += u64::from(draft.confidence);
        }
        let average_confidence = if total == 0 {
            0
        } else {
            (confidence_sum as f64 / total as f64).round() as u8
        };
        Self {
            total,
            high_priority,
            average_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_generator_ignores_input() {
        let generator = CannedInsights;
        let empty = generator.generate(&[], &[]);
        let with_columns = generator.generate(&[Record::new()], &["a".to_string()]);
        assert_eq!(empty, with_columns);
        assert_eq!(empty.len(), 3);
        assert_eq!(empty[0].kind, InsightKind::Trend);
        assert_eq!(empty[2].confidence, 68);
    }

    #[test]
    fn summary_rounds_average_confidence() {
        let drafts = CannedInsights.generate(&[], &[]);
        let summary = InsightSummary::from_drafts(&drafts);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.high_priority, 1);
        // (85 + 72 + 68) / 3 = 75
        assert_eq!(summary.average_confidence, 75);
        assert_eq!(
            InsightSummary::from_drafts(&[]),
            InsightSummary {
                total: 0,
                high_priority: 0,
                average_confidence: 0
            }
        );
    }

    #[test]
    fn drafts_serialize_with_type_key() {
        let drafts = CannedInsights.generate(&[], &[]);
        let json = serde_json::to_value(&drafts[1]).unwrap();
        assert_eq!(json["type"], "anomaly");
        assert_eq!(json["priority"], "medium");
    }
}
