// ⚠️ Vital Sign Risk Assessor - one canonical points table
//
// Additive model over six independent clinical factors. Each factor scores
// at most one tier (severe or moderate). The thresholds are an illustrative
// business rule pending clinical review, not a certified triage algorithm.

use crate::vitals::{Demographics, VitalSigns};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HIGH_RISK_THRESHOLD: u32 = 60;
pub const MEDIUM_RISK_THRESHOLD: u32 = 30;

// ============================================================================
// RISK LEVEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    /// Classify an accumulated risk score
    pub fn from_score(risk_score: u32) -> Self {
        if risk_score >= HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if risk_score >= MEDIUM_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Minutes of staff time one patient of this level occupies
    pub fn service_minutes(&self) -> u32 {
        match self {
            RiskLevel::High => 15,
            RiskLevel::Medium => 20,
            RiskLevel::Low => 25,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FACTOR BREAKDOWN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskFactor {
    HeartRate,
    SystolicBp,
    OxygenSaturation,
    BodyTemperature,
    RespiratoryRate,
    Age,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Severe,
    Moderate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: RiskFactor,
    pub tier: Tier,
    pub points: u32,
    /// The reading that triggered this tier
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    /// Only factors that scored points, in table order
    pub factors: Vec<FactorScore>,
}

impl RiskAssessment {
    pub fn summary(&self) -> String {
        let reasons: Vec<String> = self
            .factors
            .iter()
            .map(|f| format!("{:?} {:?} +{}", f.factor, f.tier, f.points))
            .collect();
        format!(
            "{} risk (score {}): {}",
            self.risk_level,
            self.risk_score,
            if reasons.is_empty() { "no abnormal findings".to_string() } else { reasons.join(", ") }
        )
    }
}

// ============================================================================
// CANONICAL TABLE
// ============================================================================

/// Tier for one factor, or None when the reading is unremarkable
fn tier_for(factor: RiskFactor, v: f64) -> Option<(Tier, u32)> {
    use RiskFactor::*;
    use Tier::*;

    match factor {
        HeartRate => {
            if v < 50.0 || v > 120.0 {
                Some((Severe, 30))
            } else if v < 60.0 || v >= 100.0 {
                Some((Moderate, 15))
            } else {
                None
            }
        }
        SystolicBp => {
            if v < 90.0 || v > 180.0 {
                Some((Severe, 35))
            } else if v < 100.0 || v >= 140.0 {
                Some((Moderate, 20))
            } else {
                None
            }
        }
        OxygenSaturation => {
            if v < 90.0 {
                Some((Severe, 40))
            } else if v < 95.0 {
                Some((Moderate, 20))
            } else {
                None
            }
        }
        BodyTemperature => {
            if v < 35.0 || v > 39.0 {
                Some((Severe, 25))
            } else if v < 36.0 || v >= 38.0 {
                Some((Moderate, 10))
            } else {
                None
            }
        }
        RespiratoryRate => {
            if v < 12.0 || v > 25.0 {
                Some((Severe, 20))
            } else if v < 14.0 || v >= 20.0 {
                Some((Moderate, 10))
            } else {
                None
            }
        }
        Age => {
            if v > 75.0 {
                Some((Severe, 15))
            } else if v >= 65.0 {
                Some((Moderate, 10))
            } else {
                None
            }
        }
    }
}

/// Score vitals + demographics. Pure and deterministic; inputs must already
/// have passed `IntakeForm::validate`.
pub fn assess(vitals: &VitalSigns, demographics: &Demographics) -> RiskAssessment {
    let readings = [
        (RiskFactor::HeartRate, vitals.heart_rate),
        (RiskFactor::SystolicBp, vitals.systolic_bp),
        (RiskFactor::OxygenSaturation, vitals.oxygen_saturation),
        (RiskFactor::BodyTemperature, vitals.body_temperature),
        (RiskFactor::RespiratoryRate, vitals.respiratory_rate),
        (RiskFactor::Age, demographics.age),
    ];

    let factors: Vec<FactorScore> = readings
        .iter()
        .filter_map(|&(factor, value)| {
            tier_for(factor, value).map(|(tier, points)| FactorScore {
                factor,
                tier,
                points,
                value,
            })
        })
        .collect();

    let risk_score = factors.iter().map(|f| f.points).sum();

    RiskAssessment {
        risk_level: RiskLevel::from_score(risk_score),
        risk_score,
        factors,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(hr: f64, sys: f64, spo2: f64, temp: f64, rr: f64) -> VitalSigns {
        VitalSigns {
            heart_rate: hr,
            respiratory_rate: rr,
            body_temperature: temp,
            oxygen_saturation: spo2,
            systolic_bp: sys,
            diastolic_bp: 60.0,
        }
    }

    fn aged(age: f64) -> Demographics {
        Demographics {
            age,
            gender: 0,
            weight_kg: 70.0,
            height_m: 1.7,
        }
    }

    #[test]
    fn test_normal_vitals_are_low_risk() {
        let a = assess(&vitals(75.0, 120.0, 98.0, 36.6, 16.0), &aged(30.0));
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.risk_score, 0);
        assert!(a.factors.is_empty());
    }

    #[test]
    fn test_critical_vitals_accumulate() {
        let a = assess(&vitals(130.0, 190.0, 85.0, 39.5, 28.0), &aged(45.0));
        assert_eq!(a.risk_score, 30 + 35 + 40 + 25 + 20);
        assert_eq!(a.risk_level, RiskLevel::High);
        assert_eq!(a.factors.len(), 5);
        assert!(a.factors.iter().all(|f| f.tier == Tier::Severe));
    }

    #[test]
    fn test_heart_rate_tiers() {
        let hr = |v| tier_for(RiskFactor::HeartRate, v);
        assert_eq!(hr(49.0), Some((Tier::Severe, 30)));
        assert_eq!(hr(50.0), Some((Tier::Moderate, 15)));
        assert_eq!(hr(59.0), Some((Tier::Moderate, 15)));
        assert_eq!(hr(60.0), None);
        assert_eq!(hr(99.0), None);
        assert_eq!(hr(100.0), Some((Tier::Moderate, 15)));
        assert_eq!(hr(120.0), Some((Tier::Moderate, 15)));
        assert_eq!(hr(121.0), Some((Tier::Severe, 30)));
    }

    #[test]
    fn test_systolic_tiers() {
        let bp = |v| tier_for(RiskFactor::SystolicBp, v);
        assert_eq!(bp(89.0), Some((Tier::Severe, 35)));
        assert_eq!(bp(90.0), Some((Tier::Moderate, 20)));
        assert_eq!(bp(100.0), None);
        assert_eq!(bp(139.0), None);
        assert_eq!(bp(140.0), Some((Tier::Moderate, 20)));
        assert_eq!(bp(180.0), Some((Tier::Moderate, 20)));
        assert_eq!(bp(181.0), Some((Tier::Severe, 35)));
    }

    #[test]
    fn test_oxygen_tiers() {
        let o2 = |v| tier_for(RiskFactor::OxygenSaturation, v);
        assert_eq!(o2(89.0), Some((Tier::Severe, 40)));
        assert_eq!(o2(90.0), Some((Tier::Moderate, 20)));
        assert_eq!(o2(94.0), Some((Tier::Moderate, 20)));
        assert_eq!(o2(95.0), None);
    }

    #[test]
    fn test_temperature_tiers() {
        let t = |v| tier_for(RiskFactor::BodyTemperature, v);
        assert_eq!(t(34.9), Some((Tier::Severe, 25)));
        assert_eq!(t(35.0), Some((Tier::Moderate, 10)));
        assert_eq!(t(35.9), Some((Tier::Moderate, 10)));
        assert_eq!(t(36.0), None);
        assert_eq!(t(37.9), None);
        assert_eq!(t(38.0), Some((Tier::Moderate, 10)));
        assert_eq!(t(39.0), Some((Tier::Moderate, 10)));
        assert_eq!(t(39.1), Some((Tier::Severe, 25)));
    }

    #[test]
    fn test_respiratory_tiers() {
        let rr = |v| tier_for(RiskFactor::RespiratoryRate, v);
        assert_eq!(rr(11.0), Some((Tier::Severe, 20)));
        assert_eq!(rr(12.0), Some((Tier::Moderate, 10)));
        assert_eq!(rr(13.0), Some((Tier::Moderate, 10)));
        assert_eq!(rr(14.0), None);
        assert_eq!(rr(19.0), None);
        assert_eq!(rr(20.0), Some((Tier::Moderate, 10)));
        assert_eq!(rr(25.0), Some((Tier::Moderate, 10)));
        assert_eq!(rr(26.0), Some((Tier::Severe, 20)));
    }

    #[test]
    fn test_age_tiers() {
        let age = |v| tier_for(RiskFactor::Age, v);
        assert_eq!(age(64.0), None);
        assert_eq!(age(65.0), Some((Tier::Moderate, 10)));
        assert_eq!(age(75.0), Some((Tier::Moderate, 10)));
        assert_eq!(age(76.0), Some((Tier::Severe, 15)));
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
    }

    #[test]
    fn test_medium_from_two_moderate_findings() {
        // Moderate SpO2 (20) + elderly (10) = 30
        let a = assess(&vitals(75.0, 120.0, 93.0, 36.6, 16.0), &aged(70.0));
        assert_eq!(a.risk_score, 30);
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert!(a.summary().contains("OxygenSaturation Moderate +20"));
    }

    #[test]
    fn test_assessment_is_deterministic() {
        let v = vitals(110.0, 150.0, 92.0, 38.4, 22.0);
        assert_eq!(assess(&v, &aged(80.0)), assess(&v, &aged(80.0)));
    }
}
