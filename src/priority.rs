// 🎯 Priority Scorer - risk assessment + age → queue ranking number

use crate::risk::{RiskAssessment, RiskLevel};

pub const MAX_PRIORITY: f64 = 100.0;
pub const MIN_PRIORITY: f64 = 0.0;

/// Confidence attached to locally derived scores
pub const LOCAL_CONFIDENCE: f64 = 0.85;

/// Base offset per risk tier
pub fn base_offset(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::High => 80.0,
        RiskLevel::Medium => 40.0,
        RiskLevel::Low => 10.0,
    }
}

pub fn age_bonus(age: f64) -> f64 {
    if age > 75.0 {
        10.0
    } else if age > 65.0 {
        5.0
    } else {
        0.0
    }
}

/// Clamp any score into [0, 100]; NaN counts as 0
pub fn clamp_priority(score: f64) -> f64 {
    if score.is_nan() {
        MIN_PRIORITY
    } else {
        // -0.0 + 0.0 is +0.0, so -0.0 never sorts apart from 0.0
        score.clamp(MIN_PRIORITY, MAX_PRIORITY) + 0.0
    }
}

/// priority = min(100, base + risk_score + age_bonus)
pub fn priority_score(assessment: &RiskAssessment, age: f64) -> f64 {
    clamp_priority(
        base_offset(assessment.risk_level) + assessment.risk_score as f64 + age_bonus(age),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(level: RiskLevel, score: u32) -> RiskAssessment {
        RiskAssessment {
            risk_level: level,
            risk_score: score,
            factors: vec![],
        }
    }

    #[test]
    fn test_low_risk_young_patient() {
        assert_eq!(priority_score(&assessment(RiskLevel::Low, 0), 30.0), 10.0);
    }

    #[test]
    fn test_medium_risk_with_age_bonus() {
        // 40 + 30 + 5
        assert_eq!(priority_score(&assessment(RiskLevel::Medium, 30), 70.0), 75.0);
    }

    #[test]
    fn test_high_risk_is_capped_at_100() {
        assert_eq!(priority_score(&assessment(RiskLevel::High, 150), 45.0), 100.0);
        assert_eq!(priority_score(&assessment(RiskLevel::High, 60), 90.0), 100.0);
    }

    #[test]
    fn test_age_bonus_boundaries() {
        assert_eq!(age_bonus(65.0), 0.0);
        assert_eq!(age_bonus(65.5), 5.0);
        assert_eq!(age_bonus(75.0), 5.0);
        assert_eq!(age_bonus(76.0), 10.0);
    }

    #[test]
    fn test_clamp_priority() {
        assert_eq!(clamp_priority(-3.0), 0.0);
        assert_eq!(clamp_priority(250.0), 100.0);
        assert_eq!(clamp_priority(f64::NAN), 0.0);
        assert_eq!(clamp_priority(42.5), 42.5);
    }

    #[test]
    fn test_negative_zero_normalized() {
        let zero = clamp_priority(-0.0);
        assert!(zero.is_sign_positive());
        assert_eq!(zero.total_cmp(&0.0), std::cmp::Ordering::Equal);
    }
}
