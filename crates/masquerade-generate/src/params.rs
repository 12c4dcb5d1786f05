use chrono::{Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::Value;

use masquerade_core::{Error, Result};

/// Positional generator parameters. JSON `null` counts as absent.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    generator: &'a str,
    values: &'a [Value],
}

impl<'a> Params<'a> {
    pub fn new(generator: &'a str, values: &'a [Value]) -> Self {
        Self { generator, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|value| !value.is_null())
    }

    pub fn int(&self, index: usize, default: i64) -> Result<i64> {
        match self.get(index) {
            None => Ok(default),
            Some(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|float| float as i64))
                .ok_or_else(|| self.invalid(index, "an integer")),
            Some(Value::String(text)) => text
                .trim()
                .parse()
                .map_err(|_| self.invalid(index, "an integer")),
            Some(_) => Err(self.invalid(index, "an integer")),
        }
    }

    pub fn float(&self, index: usize, default: f64) -> Result<f64> {
        match self.get(index) {
            None => Ok(default),
            Some(Value::Number(number)) => number
                .as_f64()
                .ok_or_else(|| self.invalid(index, "a number")),
            Some(Value::String(text)) => text
                .trim()
                .parse()
                .map_err(|_| self.invalid(index, "a number")),
            Some(_) => Err(self.invalid(index, "a number")),
        }
    }

    pub fn count(&self, index: usize, default: usize) -> Result<usize> {
        let value = self.int(index, default as i64)?;
        usize::try_from(value).map_err(|_| self.invalid(index, "a non-negative integer"))
    }

    pub fn bool(&self, index: usize, default: bool) -> Result<bool> {
        match self.get(index) {
            None => Ok(default),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(Value::Number(number)) => Ok(number.as_i64().unwrap_or_default() != 0),
            Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(self.invalid(index, "a boolean")),
            },
            Some(_) => Err(self.invalid(index, "a boolean")),
        }
    }

    pub fn string(&self, index: usize) -> Result<Option<String>> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
            Some(_) => Err(self.invalid(index, "a string")),
        }
    }

    pub fn required_string(&self, index: usize, name: &str) -> Result<String> {
        self.string(index)?.ok_or_else(|| {
            Error::config(format!(
                "generator '{}' requires parameter #{} ({name})",
                self.generator,
                index + 1
            ))
        })
    }

    /// A JSON array at `index`, or every parameter from `index` on.
    pub fn list(&self, index: usize) -> Vec<Value> {
        match self.get(index) {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => self.values[index..].to_vec(),
            None => Vec::new(),
        }
    }

    /// A date bound such as `now`, `-30 years` or `2020-01-01`.
    pub fn datetime(&self, index: usize, default: &str, now: NaiveDateTime) -> Result<NaiveDateTime> {
        let text = match self.get(index) {
            None => default.to_string(),
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => {
                let seconds = number
                    .as_i64()
                    .ok_or_else(|| self.invalid(index, "a unix timestamp"))?;
                return chrono::DateTime::from_timestamp(seconds, 0)
                    .map(|ts| ts.naive_utc())
                    .ok_or_else(|| self.invalid(index, "a unix timestamp"));
            }
            Some(_) => return Err(self.invalid(index, "a date")),
        };
        parse_datetime(&text, now).ok_or_else(|| {
            Error::config(format!(
                "generator '{}' parameter #{}: cannot read '{text}' as a date \
                 (use now, today, +N days, -N years or YYYY-MM-DD)",
                self.generator,
                index + 1
            ))
        })
    }

    fn invalid(&self, index: usize, expected: &str) -> Error {
        let found = self
            .values
            .get(index)
            .map(Value::to_string)
            .unwrap_or_default();
        Error::config(format!(
            "generator '{}' parameter #{} must be {expected}, got {found}",
            self.generator,
            index + 1
        ))
    }
}

/// Parse an absolute or relative date expression against `now`.
pub fn parse_datetime(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let original = text.trim();
    let text = original.to_ascii_lowercase();
    let midnight = now.date().and_time(NaiveTime::MIN);
    match text.as_str() {
        "now" => return Some(now),
        "today" => return Some(midnight),
        "yesterday" => return Some(midnight - Duration::days(1)),
        "tomorrow" => return Some(midnight + Duration::days(1)),
        _ => {}
    }

    let relative =
        Regex::new(r"^([+-])\s*(\d+)\s*(second|minute|hour|day|week|month|year)s?$").ok()?;
    if let Some(caps) = relative.captures(&text) {
        let amount: i64 = caps[2].parse().ok()?;
        let negative = &caps[1] == "-";
        return match &caps[3] {
            "month" | "year" => {
                let months = if &caps[3] == "year" {
                    amount.checked_mul(12)?
                } else {
                    amount
                };
                let months = Months::new(u32::try_from(months).ok()?);
                if negative {
                    now.checked_sub_months(months)
                } else {
                    now.checked_add_months(months)
                }
            }
            unit => {
                let delta = match unit {
                    "second" => Duration::try_seconds(amount)?,
                    "minute" => Duration::try_minutes(amount)?,
                    "hour" => Duration::try_hours(amount)?,
                    "day" => Duration::try_days(amount)?,
                    _ => Duration::try_weeks(amount)?,
                };
                if negative {
                    now.checked_sub_signed(delta)
                } else {
                    now.checked_add_signed(delta)
                }
            }
        };
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(original, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(original, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn parses_relative_dates() {
        let now = now();
        assert_eq!(parse_datetime("now", now), Some(now));
        assert_eq!(
            parse_datetime("-30 years", now).unwrap().date(),
            NaiveDate::from_ymd_opt(1994, 3, 15).unwrap()
        );
        assert_eq!(
            parse_datetime("+2 weeks", now).unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 3, 29).unwrap()
        );
        assert_eq!(
            parse_datetime("today", now).unwrap().time(),
            NaiveTime::MIN
        );
        assert_eq!(
            parse_datetime("2001-02-03", now).unwrap().date(),
            NaiveDate::from_ymd_opt(2001, 2, 3).unwrap()
        );
        assert_eq!(parse_datetime("next tuesday", now), None);
    }

    #[test]
    fn reads_positional_params_with_defaults() {
        let values = vec![json!(5), json!("12"), Value::Null, json!("yes")];
        let params = Params::new("numberBetween", &values);
        assert_eq!(params.int(0, 0).unwrap(), 5);
        assert_eq!(params.int(1, 0).unwrap(), 12);
        assert_eq!(params.int(2, 99).unwrap(), 99);
        assert!(params.bool(3, false).unwrap());
        assert_eq!(params.int(7, 3).unwrap(), 3);
    }

    #[test]
    fn reports_parameter_position_on_type_errors() {
        let values = vec![json!({"a": 1})];
        let err = Params::new("numberBetween", &values).int(0, 0).unwrap_err();
        assert!(err.to_string().contains("numberBetween"));
        assert!(err.to_string().contains("#1"));
    }

    #[test]
    fn list_accepts_array_or_trailing_params() {
        let array = vec![json!(["a", "b"])];
        assert_eq!(Params::new("randomElement", &array).list(0).len(), 2);
        let spread = vec![json!("a"), json!("b"), json!("c")];
        assert_eq!(Params::new("randomElement", &spread).list(0).len(), 3);
    }
}
