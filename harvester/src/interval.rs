use chrono::{NaiveDate, NaiveDateTime, Timelike};
use harvester_core::{Error, Granularity, Result};
use serde::Serialize;

const DAY_LEN: usize = 10;
const SECONDS_LEN: usize = 20;

/// The two date forms OAI-PMH accepts for `from`/`until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateForm {
    /// `yyyy-MM-dd`
    Day,
    /// `yyyy-MM-ddThh:mm:ssZ`
    Seconds,
}

/// A validated `from`/`until` pair. Both bounds share one [`DateForm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    from: String,
    until: Option<String>,
    form: DateForm,
}

impl Interval {
    pub fn validate(from: Option<&str>, until: Option<&str>) -> Result<Self> {
        let from = from.ok_or_else(|| Error::InvalidInterval("'from' is required".into()))?;
        let form = parse_bound(from, "from")?;

        if let Some(until) = until {
            if until.len() != from.len() {
                return Err(Error::InvalidInterval(format!(
                    "'from' ({from}) and 'until' ({until}) must use the same date form"
                )));
            }
            parse_bound(until, "until")?;
        }

        Ok(Self {
            from: from.to_string(),
            until: until.map(str::to_string),
            form,
        })
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn until(&self) -> Option<&str> {
        self.until.as_deref()
    }

    pub fn form(&self) -> DateForm {
        self.form
    }

    /// Aligns the bounds to what the source understands. Day-granularity
    /// sources only get the date part of a seconds-form interval.
    pub fn for_granularity(self, granularity: Granularity) -> Self {
        match (granularity, self.form) {
            (Granularity::Day, DateForm::Seconds) => Self {
                from: self.from[..DAY_LEN].to_string(),
                until: self.until.map(|u| u[..DAY_LEN].to_string()),
                form: DateForm::Day,
            },
            _ => self,
        }
    }
}

fn parse_bound(value: &str, name: &str) -> Result<DateForm> {
    let form = match value.len() {
        DAY_LEN => DateForm::Day,
        SECONDS_LEN => DateForm::Seconds,
        _ => {
            return Err(Error::InvalidInterval(format!(
                "'{name}' must be yyyy-MM-dd or yyyy-MM-ddThh:mm:ssZ, got '{value}'"
            )))
        }
    };

    if !has_shape(value, form) {
        return Err(Error::InvalidInterval(format!(
            "'{name}' is not a well-formed date: '{value}'"
        )));
    }

    let invalid = |e: chrono::ParseError| Error::InvalidInterval(format!("'{name}' ({value}): {e}"));
    match form {
        DateForm::Day => {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(invalid)?;
        }
        DateForm::Seconds => {
            let parsed = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ").map_err(invalid)?;
            // chrono reads second 60 as a leap second
            if parsed.nanosecond() >= 1_000_000_000 {
                return Err(Error::InvalidInterval(format!(
                    "'{name}' ({value}): second out of range"
                )));
            }
        }
    }

    Ok(form)
}

/// Digits and separators in fixed positions, so the calendar parse cannot
/// accept short or signed fields.
fn has_shape(value: &str, form: DateForm) -> bool {
    let pattern: &[u8] = match form {
        DateForm::Day => b"dddd-dd-dd",
        DateForm::Seconds => b"dddd-dd-ddTdd:dd:ddZ",
    };
    value
        .bytes()
        .zip(pattern.iter())
        .all(|(c, &p)| if p == b'd' { c.is_ascii_digit() } else { c == p })
}
