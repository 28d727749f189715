//! User-authored rule legs and saved rules.
//!
//! Field names mirror the persisted JSON shape produced by the rule-authoring
//! surface; these values are consumed read-only by the compiler.

use crate::domain::timeframe::{CUSTOM_VALUE, OTHER, Timeframe};
use serde::{Deserialize, Serialize};

/// One comparison: `left_offset left_indicator operator right_offset right_indicator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub left_offset: String,
    pub left_indicator: String,
    pub operator: String,
    pub right_offset: String,
    /// Indicator name, or the raw literal text when `right_offset` is `custom value`.
    pub right_indicator: String,
}

impl Prompt {
    pub fn new(
        left_offset: &str,
        left_indicator: &str,
        operator: &str,
        right_offset: &str,
        right_indicator: &str,
    ) -> Self {
        Self {
            left_offset: left_offset.to_string(),
            left_indicator: left_indicator.to_string(),
            operator: operator.to_string(),
            right_offset: right_offset.to_string(),
            right_indicator: right_indicator.to_string(),
        }
    }

    pub fn is_literal(&self) -> bool {
        self.right_offset.trim().eq_ignore_ascii_case(CUSTOM_VALUE)
    }
}

/// How an offset label resolves for a given timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetLabel {
    Periods(usize),
    Other,
    CustomValue,
}

impl OffsetLabel {
    pub fn resolve(timeframe: Timeframe, label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case(OTHER) {
            Some(OffsetLabel::Other)
        } else if label.eq_ignore_ascii_case(CUSTOM_VALUE) {
            Some(OffsetLabel::CustomValue)
        } else {
            timeframe.offset_for_label(label).map(OffsetLabel::Periods)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default)]
    pub hourly: Vec<Prompt>,
    #[serde(default)]
    pub daily: Vec<Prompt>,
    #[serde(default)]
    pub weekly: Vec<Prompt>,
}

impl RuleConditions {
    pub fn for_timeframe(&self, timeframe: Timeframe) -> &[Prompt] {
        match timeframe {
            Timeframe::Hourly => &self.hourly,
            Timeframe::Daily => &self.daily,
            Timeframe::Weekly => &self.weekly,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hourly.is_empty() && self.daily.is_empty() && self.weekly.is_empty()
    }

    /// Timeframes with at least one condition, in hourly/daily/weekly order.
    pub fn active_timeframes(&self) -> Vec<Timeframe> {
        Timeframe::ALL
            .into_iter()
            .filter(|tf| !self.for_timeframe(*tf).is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRule {
    pub name: String,
    #[serde(default)]
    pub conditions: RuleConditions,
}

/// Fundamentals condition: `indicator operator value`, where `value` is a
/// number or another fundamentals indicator from the same table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundamentalPrompt {
    pub indicator: String,
    pub operator: String,
    pub value: String,
}

impl FundamentalPrompt {
    pub fn new(indicator: &str, operator: &str, value: &str) -> Self {
        Self {
            indicator: indicator.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_offset_labels() {
        assert_eq!(
            OffsetLabel::resolve(Timeframe::Daily, "2 days ago"),
            Some(OffsetLabel::Periods(2))
        );
        assert_eq!(
            OffsetLabel::resolve(Timeframe::Hourly, "other"),
            Some(OffsetLabel::Other)
        );
        assert_eq!(
            OffsetLabel::resolve(Timeframe::Weekly, "custom value"),
            Some(OffsetLabel::CustomValue)
        );
        assert_eq!(OffsetLabel::resolve(Timeframe::Daily, "6 days ago"), None);
    }

    #[test]
    fn sentinels_ignore_case_like_period_labels() {
        assert_eq!(
            OffsetLabel::resolve(Timeframe::Daily, " Custom Value "),
            Some(OffsetLabel::CustomValue)
        );
        assert_eq!(
            OffsetLabel::resolve(Timeframe::Weekly, "OTHER"),
            Some(OffsetLabel::Other)
        );
        assert!(Prompt::new("today", "k", "<", "Custom Value", "20").is_literal());
    }

    #[test]
    fn active_timeframes_skip_empty() {
        let conditions = RuleConditions {
            hourly: vec![],
            daily: vec![Prompt::new("today", "closing price", ">", "custom value", "10")],
            weekly: vec![Prompt::new("this week", "k", ">", "this week", "d")],
        };
        assert_eq!(
            conditions.active_timeframes(),
            vec![Timeframe::Daily, Timeframe::Weekly]
        );
        assert!(!conditions.is_empty());
    }

    #[test]
    fn saved_rule_deserializes_with_missing_timeframes() {
        let json = r#"{
            "name": "breakout",
            "conditions": {
                "daily": [{
                    "left_offset": "today",
                    "left_indicator": "closing price",
                    "operator": ">",
                    "right_offset": "yesterday",
                    "right_indicator": "highest price"
                }]
            }
        }"#;
        let rule: SavedRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.name, "breakout");
        assert_eq!(rule.conditions.daily.len(), 1);
        assert!(rule.conditions.hourly.is_empty());
    }

    #[test]
    fn literal_detection() {
        assert!(Prompt::new("today", "k", "<", "custom value", "20").is_literal());
        assert!(!Prompt::new("today", "k", "<", "today", "d").is_literal());
    }
}
