//! HL7 message parsing
//!
//! Extracts the handful of fields this client cares about from decoded
//! segments. Field positions are fixed (0-indexed pipe-delimited fields):
//!
//! | Segment | Field | Meaning |
//! |---------|-------|---------|
//! | MSH (0) | 8 | event code, e.g. `ADT^A01`, `ORU^R01` |
//! | MSH (0) | 6 | event timestamp `YYYYMMDDhhmmss` |
//! | PID (1) | 3 | medical record number |
//! | PID (1) | 7 | date of birth `YYYYMMDD` |
//! | PID (1) | 8 | sex code `M`/`F` |
//! | OBX (3) | 5 | numeric test result |
//!
//! Classification is by substring match on the event code: `ADT` marks a
//! PAS admission/discharge event, `A03` within it marks the discharge
//! sub-type, anything else is a LIMS lab result.

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Patient sex as recorded on the PID segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl From<&str> for Sex {
    fn from(code: &str) -> Self {
        match code {
            "M" => Sex::Male,
            "F" => Sex::Female,
            _ => Sex::Unknown,
        }
    }
}

/// A decoded inbound message, classified and reduced to typed values
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    /// PAS admission (ADT, not A03): demographics update
    Admission { mrn: String, sex: Sex, age: u32 },
    /// PAS discharge (ADT^A03): deliberately a no-op downstream
    Discharge { mrn: String },
    /// LIMS lab result
    LabResult { mrn: String, value: f64 },
}

/// Extract a pipe-delimited field from a segment. The field must exist but
/// may be empty (an empty sex code is a legal value mapping to `Unknown`).
fn field<'a>(segment: &'a str, index: usize, what: &str) -> Result<&'a str> {
    segment
        .split('|')
        .nth(index)
        .ok_or_else(|| Error::Parse(format!("missing {} (field {})", what, index)))
}

/// Extract a field that must carry a value; emptiness is a parse failure.
fn required_field<'a>(segment: &'a str, index: usize, what: &str) -> Result<&'a str> {
    let value = field(segment, index, what)?;
    if value.is_empty() {
        return Err(Error::Parse(format!("empty {} (field {})", what, index)));
    }
    Ok(value)
}

/// Whole years between date of birth and the event timestamp, truncated
/// calendar-aware: one year is subtracted when the event's month/day
/// precedes the birth month/day.
fn age_at(event: NaiveDateTime, dob: NaiveDate) -> u32 {
    let mut years = event.year() - dob.year();
    if (event.month(), event.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Parse a decoded frame into a typed message.
///
/// Any missing field, malformed date, or non-numeric result surfaces as
/// `Error::Parse`; the caller drops the enclosing frame and moves on.
pub fn parse(segments: &[String]) -> Result<ParsedMessage> {
    let msh = segments
        .first()
        .ok_or_else(|| Error::Parse("empty message".to_string()))?;
    let pid = segments
        .get(1)
        .ok_or_else(|| Error::Parse("missing PID segment".to_string()))?;

    let event_code = field(msh, 8, "event code")?;
    let mrn = required_field(pid, 3, "patient identifier")?.to_string();

    if event_code.contains("ADT") {
        if event_code.contains("A03") {
            return Ok(ParsedMessage::Discharge { mrn });
        }

        let event_ts = required_field(msh, 6, "event timestamp")?;
        let event = NaiveDateTime::parse_from_str(event_ts, "%Y%m%d%H%M%S")
            .map_err(|e| Error::Parse(format!("bad event timestamp {:?}: {}", event_ts, e)))?;

        let dob_text = required_field(pid, 7, "date of birth")?;
        let dob = NaiveDate::parse_from_str(dob_text, "%Y%m%d")
            .map_err(|e| Error::Parse(format!("bad date of birth {:?}: {}", dob_text, e)))?;

        let sex = Sex::from(field(pid, 8, "sex code")?);

        Ok(ParsedMessage::Admission {
            mrn,
            sex,
            age: age_at(event, dob),
        })
    } else {
        let obx = segments
            .get(3)
            .ok_or_else(|| Error::Parse("missing OBX segment".to_string()))?;
        let value_text = required_field(obx, 5, "result value")?;
        let value: f64 = value_text
            .parse()
            .map_err(|e| Error::Parse(format!("non-numeric result {:?}: {}", value_text, e)))?;

        Ok(ParsedMessage::LabResult { mrn, value })
    }
}
