use serde::{Deserialize, Serialize};

use super::models::{AchievementResult, AchievementStatus, MetricDefinition, MetricObservation};

/// Rate at or above which a metric counts as on track.
pub const ON_TRACK_RATE: f64 = 1.0;

/// Measures an observation against its definition.
///
/// Status is decided on the achievement rate in a fixed order (on track, then
/// at risk, then off track), so inconsistent warning/critical bounds still
/// produce a deterministic status.
pub fn evaluate(
    observation: &MetricObservation,
    definition: &MetricDefinition,
) -> AchievementResult {
    let mut result = AchievementResult::undefined(observation);
    result.target_value = definition.target_value;

    let Some(target) = definition.effective_target() else {
        return result;
    };

    let rate = observation.value / target;
    result.achievement_rate = Some(rate);
    result.status = classify_rate(rate, definition.warning_threshold.map(|w| w / target));
    result
}

fn classify_rate(rate: f64, warning_rate: Option<f64>) -> AchievementStatus {
    if rate >= ON_TRACK_RATE {
        return AchievementStatus::OnTrack;
    }
    match warning_rate {
        Some(warning_rate) if rate >= warning_rate => AchievementStatus::AtRisk,
        _ => AchievementStatus::OffTrack,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The warning bound sits further from the target than the critical bound.
    WarningStricterThanCritical,
    /// Thresholds are configured but the target is absent or zero.
    ThresholdsWithoutTarget,
}

/// Data-quality finding on a metric definition. Never blocks evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigurationIssue {
    pub metric_id: String,
    pub kind: IssueKind,
    pub detail: String,
}

pub fn validate_definition(definition: &MetricDefinition) -> Vec<ConfigurationIssue> {
    let mut issues = Vec::new();
    let has_thresholds =
        definition.warning_threshold.is_some() || definition.critical_threshold.is_some();

    match definition.effective_target() {
        None if has_thresholds => issues.push(ConfigurationIssue {
            metric_id: definition.id.clone(),
            kind: IssueKind::ThresholdsWithoutTarget,
            detail: match definition.target_value {
                Some(_) => "target is zero; thresholds cannot be normalized".to_string(),
                None => "thresholds set without a target".to_string(),
            },
        }),
        None => {}
        Some(target) => {
            if let (Some(warning), Some(critical)) =
                (definition.warning_threshold, definition.critical_threshold)
            {
                if (target - warning).abs() > (target - critical).abs() {
                    issues.push(ConfigurationIssue {
                        metric_id: definition.id.clone(),
                        kind: IssueKind::WarningStricterThanCritical,
                        detail: format!(
                            "warning {warning} is further from target {target} \
                             than critical {critical}"
                        ),
                    });
                }
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::models::MetricCategory;
    use chrono::NaiveDate;

    fn obs(value: f64) -> MetricObservation {
        MetricObservation::new(
            "rev",
            "store-1",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            value,
        )
    }

    fn revenue() -> MetricDefinition {
        MetricDefinition::new("rev", "Revenue", MetricCategory::Revenue, "EUR")
    }

    #[test]
    fn rate_at_or_above_one_is_on_track() {
        let def = revenue().with_target(110.0);
        let result = evaluate(&obs(120.0), &def);
        assert_eq!(result.status, AchievementStatus::OnTrack);
        let rate = result.achievement_rate.unwrap();
        assert!((rate - 1.0909).abs() < 1e-3);

        let exact = evaluate(&obs(110.0), &def);
        assert_eq!(exact.status, AchievementStatus::OnTrack);
    }

    #[test]
    fn warning_rate_splits_at_risk_from_off_track() {
        let def = revenue().with_target(110.0).with_warning(95.0);
        assert_eq!(evaluate(&obs(100.0), &def).status, AchievementStatus::AtRisk);
        assert_eq!(evaluate(&obs(95.0), &def).status, AchievementStatus::AtRisk);
        assert_eq!(evaluate(&obs(90.0), &def).status, AchievementStatus::OffTrack);

        let no_warning = revenue().with_target(110.0);
        assert_eq!(
            evaluate(&obs(100.0), &no_warning).status,
            AchievementStatus::OffTrack
        );
    }

    #[test]
    fn absent_or_zero_target_leaves_rate_undefined() {
        let zero = revenue().with_target(0.0).with_warning(10.0);
        let result = evaluate(&obs(50.0), &zero);
        assert_eq!(result.achievement_rate, None);
        assert_eq!(result.status, AchievementStatus::Unknown);
        assert_eq!(result.target_value, Some(0.0));
        assert_eq!(result.value, Some(50.0));

        let none = evaluate(&obs(50.0), &revenue());
        assert_eq!(none.achievement_rate, None);
        assert_eq!(none.status, AchievementStatus::Unknown);
    }

    #[test]
    fn misconfigured_thresholds_do_not_override_on_track() {
        let def = revenue()
            .with_target(100.0)
            .with_warning(500.0)
            .with_critical(200.0);
        assert_eq!(evaluate(&obs(100.0), &def).status, AchievementStatus::OnTrack);
        assert_eq!(evaluate(&obs(99.0), &def).status, AchievementStatus::OffTrack);
    }

    #[test]
    fn validation_reports_inverted_bounds() {
        let def = revenue().with_target(100.0).with_warning(60.0).with_critical(80.0);
        let issues = validate_definition(&def);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::WarningStricterThanCritical);

        let sane = revenue().with_target(100.0).with_warning(80.0).with_critical(60.0);
        assert!(validate_definition(&sane).is_empty());
    }

    #[test]
    fn validation_handles_lower_is_better_metrics() {
        let cost = MetricDefinition::new("waste", "Waste", MetricCategory::Cost, "%")
            .with_target(5.0)
            .with_warning(7.0)
            .with_critical(10.0);
        assert!(validate_definition(&cost).is_empty());
    }

    #[test]
    fn validation_reports_thresholds_without_usable_target() {
        let zero = revenue().with_target(0.0).with_critical(10.0);
        let issues = validate_definition(&zero);
        assert_eq!(issues[0].kind, IssueKind::ThresholdsWithoutTarget);

        let missing = revenue().with_warning(10.0);
        assert_eq!(
            validate_definition(&missing)[0].kind,
            IssueKind::ThresholdsWithoutTarget
        );
        assert!(validate_definition(&revenue()).is_empty());
    }
}
