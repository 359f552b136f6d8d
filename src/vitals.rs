// 🩺 Vital Signs Intake - strict validation before any scoring
//
// Kiosk forms post a flat object whose numeric fields may arrive as JSON
// numbers or as numeric strings. Nothing is scored or enqueued until every
// field parses and sits inside its physiologically plausible range.

use crate::error::{Result, TriageError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// CANONICAL RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    /// Beats per minute
    pub heart_rate: f64,
    /// Breaths per minute
    pub respiratory_rate: f64,
    /// Degrees Celsius
    pub body_temperature: f64,
    /// SpO2 percent
    pub oxygen_saturation: f64,
    /// mmHg
    pub systolic_bp: f64,
    /// mmHg
    pub diastolic_bp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    /// Years
    pub age: f64,
    /// Integer code 0..=2 as sent by the kiosk form
    pub gender: u8,
    pub weight_kg: f64,
    pub height_m: f64,
}

/// A validated submission, safe to score
#[derive(Debug, Clone, PartialEq)]
pub struct Intake {
    pub name: String,
    pub vitals: VitalSigns,
    pub demographics: Demographics,
}

// ============================================================================
// PLAUSIBILITY RANGES
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Range {
    min: f64,
    max: f64,
    /// Whether `min` itself is allowed
    min_inclusive: bool,
}

impl Range {
    const fn open_min(min: f64, max: f64) -> Self {
        Range { min, max, min_inclusive: false }
    }

    const fn closed(min: f64, max: f64) -> Self {
        Range { min, max, min_inclusive: true }
    }

    fn contains(&self, value: f64) -> bool {
        let above_min = if self.min_inclusive { value >= self.min } else { value > self.min };
        above_min && value <= self.max
    }

    fn describe(&self) -> String {
        let open = if self.min_inclusive { '[' } else { '(' };
        format!("{}{}, {}]", open, self.min, self.max)
    }
}

const HEART_RATE: Range = Range::open_min(0.0, 300.0);
const RESPIRATORY_RATE: Range = Range::open_min(0.0, 80.0);
const BODY_TEMPERATURE: Range = Range::closed(25.0, 45.0);
const OXYGEN_SATURATION: Range = Range::open_min(0.0, 100.0);
const SYSTOLIC_BP: Range = Range::open_min(0.0, 300.0);
const DIASTOLIC_BP: Range = Range::open_min(0.0, 200.0);
const AGE: Range = Range::closed(0.0, 130.0);
const GENDER: Range = Range::closed(0.0, 2.0);
const WEIGHT_KG: Range = Range::open_min(0.0, 500.0);
const HEIGHT_M: Range = Range::open_min(0.0, 3.0);

// ============================================================================
// INTAKE FORM (raw, unvalidated)
// ============================================================================

/// Raw submission as posted by the check-in kiosk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeForm {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub age: Option<Value>,
    #[serde(default)]
    pub gender: Option<Value>,
    #[serde(default, alias = "weight_kg")]
    pub weight: Option<Value>,
    #[serde(default, alias = "height_m")]
    pub height: Option<Value>,

    #[serde(default, rename = "heartRate", alias = "heart_rate")]
    pub heart_rate: Option<Value>,
    #[serde(default, rename = "respiratoryRate", alias = "respiratory_rate")]
    pub respiratory_rate: Option<Value>,
    #[serde(default, rename = "bodyTemperature", alias = "body_temperature")]
    pub body_temperature: Option<Value>,
    #[serde(default, rename = "oxygenSaturation", alias = "oxygen_saturation")]
    pub oxygen_saturation: Option<Value>,
    #[serde(default, rename = "systolicBP", alias = "systolic_bp")]
    pub systolic_bp: Option<Value>,
    #[serde(default, rename = "diastolicBP", alias = "diastolic_bp")]
    pub diastolic_bp: Option<Value>,
}

impl IntakeForm {
    /// Validate every field, collecting all failures
    pub fn validate(&self) -> Result<Intake> {
        let mut errors = Vec::new();

        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => {
                errors.push(ValidationError::new("name", "is required"));
                None
            }
        };

        let heart_rate = read_number(&mut errors, "heart_rate", &self.heart_rate, HEART_RATE);
        let respiratory_rate =
            read_number(&mut errors, "respiratory_rate", &self.respiratory_rate, RESPIRATORY_RATE);
        let body_temperature =
            read_number(&mut errors, "body_temperature", &self.body_temperature, BODY_TEMPERATURE);
        let oxygen_saturation = read_number(
            &mut errors,
            "oxygen_saturation",
            &self.oxygen_saturation,
            OXYGEN_SATURATION,
        );
        let systolic_bp = read_number(&mut errors, "systolic_bp", &self.systolic_bp, SYSTOLIC_BP);
        let diastolic_bp = read_number(&mut errors, "diastolic_bp", &self.diastolic_bp, DIASTOLIC_BP);

        let age = read_number(&mut errors, "age", &self.age, AGE);
        let gender = read_number(&mut errors, "gender", &self.gender, GENDER).and_then(|g| {
            if g.fract() == 0.0 {
                Some(g as u8)
            } else {
                errors.push(ValidationError::new("gender", "must be an integer code"));
                None
            }
        });
        let weight_kg = read_number(&mut errors, "weight_kg", &self.weight, WEIGHT_KG);
        let height_m = read_number(&mut errors, "height_m", &self.height, HEIGHT_M);

        if let (Some(sys), Some(dia)) = (systolic_bp, diastolic_bp) {
            if dia >= sys {
                errors.push(ValidationError::new(
                    "diastolic_bp",
                    format!("must be below systolic_bp ({} >= {})", dia, sys),
                ));
            }
        }

        if !errors.is_empty() {
            return Err(TriageError::Validation(errors));
        }

        // Every Option is Some once errors is empty
        match (
            name,
            heart_rate,
            respiratory_rate,
            body_temperature,
            oxygen_saturation,
            systolic_bp,
            diastolic_bp,
            age,
            gender,
            weight_kg,
            height_m,
        ) {
            (
                Some(name),
                Some(heart_rate),
                Some(respiratory_rate),
                Some(body_temperature),
                Some(oxygen_saturation),
                Some(systolic_bp),
                Some(diastolic_bp),
                Some(age),
                Some(gender),
                Some(weight_kg),
                Some(height_m),
            ) => Ok(Intake {
                name,
                vitals: VitalSigns {
                    heart_rate,
                    respiratory_rate,
                    body_temperature,
                    oxygen_saturation,
                    systolic_bp,
                    diastolic_bp,
                },
                demographics: Demographics {
                    age,
                    gender,
                    weight_kg,
                    height_m,
                },
            }),
            _ => Err(TriageError::Validation(vec![ValidationError::new(
                "form",
                "incomplete submission",
            )])),
        }
    }
}

/// Parse one numeric field, pushing an error and returning None on failure
fn read_number(
    errors: &mut Vec<ValidationError>,
    field: &str,
    raw: &Option<Value>,
    range: Range,
) -> Option<f64> {
    let value = match raw {
        None | Some(Value::Null) => {
            errors.push(ValidationError::new(field, "is required"));
            return None;
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(ValidationError::new(field, "is required"));
            return None;
        }
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match value {
        Some(v) if v.is_finite() => {
            if range.contains(v) {
                Some(v)
            } else {
                errors.push(ValidationError::new(
                    field,
                    format!("{} is outside plausible range {}", v, range.describe()),
                ));
                None
            }
        }
        _ => {
            errors.push(ValidationError::new(field, "must be numeric"));
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
