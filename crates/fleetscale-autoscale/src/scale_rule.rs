//! Interval rule table for rule-based scaling.
//!
//! Each rule covers a range of resource counts and a range of metric values
//! and carries a signed step. Bounds are inclusive on both ends.

use crate::error::PolicyError;

/// Inclusive integer interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntBounds {
    pub lower: i64,
    pub upper: i64,
}

impl IntBounds {
    pub fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    /// Lower not above upper, both non-negative.
    pub fn is_valid(&self) -> bool {
        self.lower <= self.upper && self.lower >= 0 && self.upper >= 0
    }

    pub fn includes(&self, item: i64) -> bool {
        item >= self.lower && item <= self.upper
    }

    pub fn intersects(&self, other: &IntBounds) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }
}

/// Inclusive floating-point interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatBounds {
    pub lower: f64,
    pub upper: f64,
}

impl FloatBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Lower not above upper, both non-negative. NaN bounds are invalid.
    pub fn is_valid(&self) -> bool {
        self.lower <= self.upper && self.lower >= 0.0 && self.upper >= 0.0
    }

    pub fn includes(&self, item: f64) -> bool {
        item >= self.lower && item <= self.upper
    }

    pub fn intersects(&self, other: &FloatBounds) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRule {
    pub count: IntBounds,
    pub metric: FloatBounds,
    pub step: i64,
}

impl ScaleRule {
    pub fn is_match(&self, count: i64, value: f64) -> bool {
        self.count.includes(count) && self.metric.includes(value)
    }

    fn overlaps(&self, count: &IntBounds, metric: &FloatBounds) -> bool {
        self.count.intersects(count) && self.metric.intersects(metric)
    }
}

/// Ordered, non-overlapping scale rules. The first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleRuleSet {
    rules: Vec<ScaleRule>,
}

impl ScaleRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule.
    ///
    /// Fails if either interval is invalid, or if the rule intersects an
    /// existing rule in both the count and the metric dimension.
    pub fn add_rule(
        &mut self,
        count_lower: i64,
        count_upper: i64,
        step: i64,
        metric_lower: f64,
        metric_upper: f64,
    ) -> Result<(), PolicyError> {
        let count = IntBounds::new(count_lower, count_upper);
        if !count.is_valid() {
            return Err(PolicyError::InvalidBounds(format!(
                "count [{count_lower}, {count_upper}]"
            )));
        }
        let metric = FloatBounds::new(metric_lower, metric_upper);
        if !metric.is_valid() {
            return Err(PolicyError::InvalidBounds(format!(
                "metric [{metric_lower}, {metric_upper}]"
            )));
        }

        if let Some(existing) = self.rules.iter().find(|r| r.overlaps(&count, &metric)) {
            return Err(PolicyError::Overlap(format!(
                "count [{}, {}] metric [{}, {}]",
                existing.count.lower, existing.count.upper, existing.metric.lower, existing.metric.upper
            )));
        }

        self.rules.push(ScaleRule {
            count,
            metric,
            step,
        });
        Ok(())
    }

    /// Step of the first rule matching `count` and `value`, or 0.
    pub fn find_action(&self, count: i64, value: f64) -> i64 {
        self.rules
            .iter()
            .find(|r| r.is_match(count, value))
            .map(|r| r.step)
            .unwrap_or(0)
    }

    pub fn rules(&self) -> &[ScaleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
