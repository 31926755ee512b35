//! Feature vector construction
//!
//! Turns a patient's record (with the newest result already appended by the
//! store) into the fixed-width vector the model expects:
//!
//! ```text
//! [age, sex, r5, r4, r3, r2, r1]
//! ```
//!
//! where `r1` is the newest of the five most recent results, oldest first.
//! Patients with fewer than five results are left-padded with the running
//! mean of what history exists.

use crate::error::{Error, Result};
use crate::hl7::Sex;
use crate::store::PatientRecord;

/// Model input width: age + sex + five results
pub const FEATURE_LEN: usize = 7;

/// Results window fed to the model
const WINDOW: usize = 5;

/// Build the feature vector for a patient record.
///
/// Fails with `Error::MissingDemographics` when the patient has never been
/// admitted (no sex/age on record): the caller drops the frame rather than
/// inventing defaults. The record's history must be non-empty.
pub fn build(mrn: &str, record: &PatientRecord) -> Result<[f64; FEATURE_LEN]> {
    let age = record
        .age
        .ok_or_else(|| Error::MissingDemographics(mrn.to_string()))?;
    let sex = record
        .sex
        .ok_or_else(|| Error::MissingDemographics(mrn.to_string()))?;

    let results = &record.results;
    if results.is_empty() {
        return Err(Error::Other(format!(
            "no results on record for patient {}",
            mrn
        )));
    }

    let mut vector = [0.0; FEATURE_LEN];
    vector[0] = age as f64;
    vector[1] = if sex == Sex::Male { 1.0 } else { 0.0 };

    if results.len() >= WINDOW {
        vector[2..].copy_from_slice(&results[results.len() - WINDOW..]);
    } else {
        let mean = results.iter().sum::<f64>() / results.len() as f64;
        let pad = WINDOW - results.len();
        for slot in &mut vector[2..2 + pad] {
            *slot = mean;
        }
        vector[2 + pad..].copy_from_slice(results);
    }

    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sex: Sex, age: u32, results: &[f64]) -> PatientRecord {
        PatientRecord {
            results: results.to_vec(),
            sex: Some(sex),
            age: Some(age),
        }
    }

    #[test]
    fn test_single_result_padded_with_itself() {
        let r = record(Sex::Female, 36, &[70.69681868961705]);
        let v = build("497030", &r).unwrap();
        assert_eq!(
            v,
            [
                36.0,
                0.0,
                70.69681868961705,
                70.69681868961705,
                70.69681868961705,
                70.69681868961705,
                70.69681868961705,
            ]
        );
    }

    #[test]
    fn test_full_window() {
        let r = record(Sex::Male, 22, &[10.0, 20.0, 30.0, 40.0, 50.0]);
        let v = build("160116", &r).unwrap();
        assert_eq!(v, [22.0, 1.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn test_window_slides_past_five_results() {
        let r = record(Sex::Male, 22, &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        let v = build("160116", &r).unwrap();
        assert_eq!(v, [22.0, 1.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
    }

    #[test]
    fn test_partial_history_padded_with_mean() {
        let r = record(Sex::Female, 45, &[10.0, 30.0]);
        let v = build("1", &r).unwrap();
        // mean of [10, 30] = 20, padding the three oldest slots
        assert_eq!(v, [45.0, 0.0, 20.0, 20.0, 20.0, 10.0, 30.0]);
    }

    #[test]
    fn test_unknown_sex_maps_to_zero() {
        let r = record(Sex::Unknown, 60, &[100.0]);
        let v = build("1", &r).unwrap();
        assert_eq!(v[1], 0.0);
    }

    #[test]
    fn test_missing_demographics_is_explicit_error() {
        let r = PatientRecord {
            results: vec![88.0],
            sex: None,
            age: None,
        };
        assert!(matches!(
            build("999999", &r),
            Err(Error::MissingDemographics(_))
        ));
    }

    #[test]
    fn test_vector_is_always_seven_wide() {
        for n in 1..8 {
            let results: Vec<f64> = (0..n).map(|i| i as f64 * 10.0).collect();
            let r = record(Sex::Male, 30, &results);
            assert_eq!(build("1", &r).unwrap().len(), FEATURE_LEN);
        }
    }
}
