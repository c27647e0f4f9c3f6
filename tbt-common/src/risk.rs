//! Pure risk scoring for screening records
//!
//! Total function over possibly-partial records: missing sections and fields
//! contribute zero, and the composite score is bounded to [0, 10] with one
//! decimal place.

use crate::models::{
    factor, normalized_risk_factors, CoughNature, FactorAnswer, FeverHistory, PatientRecord,
    RiskLevel, TemperatureUnit, Vitals,
};

/// Individual physical signs each add 0.5, capped at this total.
const PHYSICAL_SIGNS_CAP: f64 = 2.0;

/// Composite risk score in [0, 10], rounded to one decimal place.
pub fn risk_score(record: &PatientRecord) -> f64 {
    let mut sum = 0.0;

    if let Some(clinical) = &record.clinical {
        sum += match clinical.cough_duration_weeks {
            Some(w) if w >= 8 => 3.0,
            Some(w) if w >= 4 => 2.0,
            Some(w) if w >= 2 => 1.0,
            _ => 0.0,
        };

        sum += match clinical.cough_nature {
            Some(CoughNature::BloodStained) => 3.0,
            Some(CoughNature::Wet) => 1.5,
            _ => 0.0,
        };

        sum += match clinical.fever_history {
            Some(FeverHistory::HighGrade) => 2.0,
            Some(FeverHistory::LowGrade) => 1.0,
            _ => 0.0,
        };

        if clinical.night_sweats == Some(FactorAnswer::Yes) {
            sum += 1.5;
        }
        if clinical.weight_loss == Some(FactorAnswer::Yes) {
            sum += 1.2;
        }

        sum += (clinical.physical_signs.len() as f64 * 0.5).min(PHYSICAL_SIGNS_CAP);

        let factors = normalized_risk_factors(clinical);
        let positive = |code: &str| factors.get(code) == Some(&FactorAnswer::Yes);
        if positive(factor::PRIOR_TB) {
            sum += 1.0;
        }
        if positive(factor::FAMILY_TB) {
            sum += 0.5;
        }
        if positive(factor::DIABETES) {
            sum += 0.3;
        }
        if positive(factor::SMOKER) {
            sum += 0.2;
        }
        if positive(factor::HIV) {
            sum += 1.5;
        }
        if positive(factor::COVID) {
            sum += 0.3;
        }
    }

    if let Some(vitals) = &record.vitals {
        if vitals.heart_rate_bpm.is_some_and(|bpm| bpm > 110.0) {
            sum += 0.4;
        }
        if temperature_celsius(vitals).is_some_and(|c| c >= 38.0) {
            sum += 0.6;
        }
    }

    ((sum * 10.0).round() / 10.0).min(10.0)
}

/// Map a score to the triage risk level.
pub fn risk_level(score: f64) -> RiskLevel {
    if score >= 7.0 {
        RiskLevel::High
    } else if score >= 4.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Body temperature in Celsius, converting when the device recorded
/// Fahrenheit. An unset unit is treated as Celsius.
fn temperature_celsius(vitals: &Vitals) -> Option<f64> {
    let raw = vitals.body_temperature?;
    match vitals.body_temperature_unit {
        Some(TemperatureUnit::Fahrenheit) => Some((raw - 32.0) * 5.0 / 9.0),
        _ => Some(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clinical, Demographics};
    use chrono::Utc;

    fn record(clinical: Option<Clinical>, vitals: Option<Vitals>) -> PatientRecord {
        PatientRecord {
            patient_id: "P1".into(),
            demographics: Demographics {
                name: "Test".into(),
                age: 35,
                gender: "M".into(),
                phone: "0".into(),
                village: "V".into(),
                national_id_last4: None,
            },
            vitals,
            clinical,
            audio: vec![],
            ai: None,
            status: None,
            created_at: Utc::now(),
            collection_date: Utc::now(),
            synced_at: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn empty_record_scores_zero() {
        assert_eq!(risk_score(&record(None, None)), 0.0);
        assert_eq!(risk_score(&record(Some(Clinical::default()), None)), 0.0);
    }

    #[test]
    fn severe_screening_scores_nine_point_five() {
        let clinical = Clinical {
            cough_duration_weeks: Some(9),
            cough_nature: Some(CoughNature::BloodStained),
            fever_history: Some(FeverHistory::HighGrade),
            night_sweats: Some(FactorAnswer::Yes),
            ..Clinical::default()
        };
        assert_eq!(risk_score(&record(Some(clinical), None)), 9.5);
    }

    #[test]
    fn score_never_decreases_with_longer_cough() {
        let mut previous = 0.0;
        for weeks in 1..=9 {
            let clinical = Clinical {
                cough_duration_weeks: Some(weeks),
                ..Clinical::default()
            };
            let score = risk_score(&record(Some(clinical), None));
            assert!(
                score >= previous,
                "score dropped from {previous} to {score} at {weeks} weeks"
            );
            previous = score;
        }
    }

    #[test]
    fn score_is_bounded_at_ten() {
        let clinical = Clinical {
            cough_duration_weeks: Some(12),
            cough_nature: Some(CoughNature::BloodStained),
            fever_history: Some(FeverHistory::HighGrade),
            night_sweats: Some(FactorAnswer::Yes),
            weight_loss: Some(FactorAnswer::Yes),
            physical_signs: (0..8).map(|i| format!("sign{i}")).collect(),
            risk_factors: vec![
                factor::PRIOR_TB.into(),
                factor::FAMILY_TB.into(),
                factor::DIABETES.into(),
                factor::SMOKER.into(),
                factor::HIV.into(),
                factor::COVID.into(),
            ],
            ..Clinical::default()
        };
        let vitals = Vitals {
            heart_rate_bpm: Some(130.0),
            body_temperature: Some(39.2),
            ..Vitals::default()
        };
        let score = risk_score(&record(Some(clinical), Some(vitals)));
        assert_eq!(score, 10.0);
    }

    #[test]
    fn physical_signs_contribution_is_capped() {
        let few = Clinical {
            physical_signs: vec!["a".into(), "b".into(), "c".into()],
            ..Clinical::default()
        };
        let many = Clinical {
            physical_signs: (0..10).map(|i| i.to_string()).collect(),
            ..Clinical::default()
        };
        assert_eq!(risk_score(&record(Some(few), None)), 1.5);
        assert_eq!(risk_score(&record(Some(many), None)), 2.0);
    }

    #[test]
    fn fahrenheit_temperatures_are_normalized() {
        let below = Vitals {
            body_temperature: Some(100.0), // 37.8 C
            body_temperature_unit: Some(TemperatureUnit::Fahrenheit),
            ..Vitals::default()
        };
        let above = Vitals {
            body_temperature: Some(101.0), // 38.3 C
            body_temperature_unit: Some(TemperatureUnit::Fahrenheit),
            ..Vitals::default()
        };
        assert_eq!(risk_score(&record(None, Some(below))), 0.0);
        assert_eq!(risk_score(&record(None, Some(above))), 0.6);
    }

    #[test]
    fn legacy_flat_factor_list_counts_as_positive() {
        let legacy = Clinical {
            risk_factors: vec![factor::HIV.into()],
            ..Clinical::default()
        };
        let keyed = Clinical {
            risk_factor_answers: std::collections::BTreeMap::from([(
                factor::HIV.to_string(),
                FactorAnswer::Yes,
            )]),
            ..Clinical::default()
        };
        assert_eq!(risk_score(&record(Some(legacy), None)), 1.5);
        assert_eq!(risk_score(&record(Some(keyed), None)), 1.5);
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(risk_level(0.0), RiskLevel::Low);
        assert_eq!(risk_level(3.9), RiskLevel::Low);
        assert_eq!(risk_level(4.0), RiskLevel::Medium);
        assert_eq!(risk_level(6.9), RiskLevel::Medium);
        assert_eq!(risk_level(7.0), RiskLevel::High);
        assert_eq!(risk_level(10.0), RiskLevel::High);
    }
}
