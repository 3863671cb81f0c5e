//! Raw responses to a typed, cleaned and sorted [`WeatherTable`].
//!
//! Each [`WeatherRecord`] field is described by a [`FieldRule`]: where it lives
//! in the response, how to coerce it, and what to use when it is absent.
//! Rules are evaluated independently. An absent value (at any depth) takes
//! the default; a present value of the wrong shape fails the whole record.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::model::{RawResponse, WeatherRecord, WeatherRow, WeatherTable};

pub const UNKNOWN_CITY: &str = "Unknown";
pub const UNKNOWN_COUNTRY: &str = "??";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("raw response is not a JSON object (found {found})")]
    NotAnObject { found: &'static str },

    #[error("field '{field}': {reason}")]
    Structure { field: &'static str, reason: String },

    #[error("field '{field}': cannot coerce {found} to {expected}")]
    Type {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// One hop into the nested response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Key(&'static str),
    Index(usize),
}

/// Location, coercion and default of one record field.
#[derive(Debug, Clone)]
pub struct FieldRule<T: 'static> {
    pub field: &'static str,
    pub path: &'static [Step],
    pub default: T,
    expected: &'static str,
    coerce: fn(&Value) -> Option<T>,
}

impl<T: Clone> FieldRule<T> {
    pub fn extract(&self, raw: &Value) -> Result<T, ParseError> {
        match lookup(raw, self.field, self.path)? {
            None => Ok(self.default.clone()),
            Some(value) => (self.coerce)(value).ok_or_else(|| ParseError::Type {
                field: self.field,
                expected: self.expected,
                found: describe(value),
            }),
        }
    }
}

type Text = Cow<'static, str>;

const fn text(field: &'static str, path: &'static [Step], default: &'static str) -> FieldRule<Text> {
    FieldRule {
        field,
        path,
        default: Cow::Borrowed(default),
        expected: "text",
        coerce: as_text,
    }
}

const fn float(field: &'static str, path: &'static [Step]) -> FieldRule<f64> {
    FieldRule {
        field,
        path,
        default: 0.0,
        expected: "a number",
        coerce: as_float,
    }
}

const fn int(field: &'static str, path: &'static [Step]) -> FieldRule<i64> {
    FieldRule {
        field,
        path,
        default: 0,
        expected: "an integer",
        coerce: as_int,
    }
}

pub const CITY: FieldRule<Text> = text("city", &[Step::Key("name")], UNKNOWN_CITY);
pub const COUNTRY: FieldRule<Text> =
    text("country", &[Step::Key("sys"), Step::Key("country")], UNKNOWN_COUNTRY);
pub const TEMPERATURE: FieldRule<f64> = float("temperature", &[Step::Key("main"), Step::Key("temp")]);
pub const FEELS_LIKE: FieldRule<f64> =
    float("feels_like", &[Step::Key("main"), Step::Key("feels_like")]);
pub const HUMIDITY: FieldRule<i64> = int("humidity", &[Step::Key("main"), Step::Key("humidity")]);
pub const PRESSURE: FieldRule<i64> = int("pressure", &[Step::Key("main"), Step::Key("pressure")]);
pub const WIND_SPEED: FieldRule<f64> = float("wind_speed", &[Step::Key("wind"), Step::Key("speed")]);
pub const DESCRIPTION: FieldRule<Text> = text(
    "description",
    &[Step::Key("weather"), Step::Index(0), Step::Key("description")],
    "",
);
pub const OBSERVED_AT: FieldRule<DateTime<Utc>> = FieldRule {
    field: "observed_at",
    path: &[Step::Key("dt")],
    default: DateTime::<Utc>::UNIX_EPOCH,
    expected: "a Unix timestamp",
    coerce: as_timestamp,
};

/// Walk `path`. `Ok(None)` when a key is absent; an error when an existing
/// node has the wrong shape or a list is too short.
fn lookup<'a>(
    raw: &'a Value,
    field: &'static str,
    path: &[Step],
) -> Result<Option<&'a Value>, ParseError> {
    let mut current = raw;

    for step in path {
        current = match (*step, current) {
            (Step::Key(key), Value::Object(map)) => match map.get(key) {
                Some(next) => next,
                None => return Ok(None),
            },
            (Step::Index(idx), Value::Array(items)) => {
                items.get(idx).ok_or_else(|| ParseError::Structure {
                    field,
                    reason: format!("list has no element at index {idx}"),
                })?
            }
            (Step::Key(key), other) => {
                return Err(ParseError::Structure {
                    field,
                    reason: format!("expected an object holding '{key}', found {}", describe(other)),
                });
            }
            (Step::Index(_), other) => {
                return Err(ParseError::Structure {
                    field,
                    reason: format!("expected a list, found {}", describe(other)),
                });
            }
        };
    }

    Ok(Some(current))
}

fn as_text(value: &Value) -> Option<Text> {
    match value {
        Value::String(s) => Some(Cow::Owned(s.clone())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let secs = as_float(value).filter(|f| f.is_finite())?;
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "a list".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Round to one decimal place, ties to even.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Round, stamp and sort parsed records into a table.
pub fn clean(records: Vec<WeatherRecord>, extracted_at: DateTime<Utc>) -> WeatherTable {
    let mut rows: Vec<WeatherRow> = records
        .into_iter()
        .map(|mut record| {
            record.temperature = round1(record.temperature);
            record.feels_like = round1(record.feels_like);
            record.wind_speed = round1(record.wind_speed);
            WeatherRow::from_record(record, extracted_at)
        })
        .collect();

    // Stable: equal city names keep their input order.
    rows.sort_by(|a, b| a.city.cmp(&b.city));

    debug!(rows = rows.len(), "table cleaned");
    WeatherTable::new(rows)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer;

impl Transformer {
    pub fn new() -> Self {
        Self
    }

    pub fn try_parse(&self, raw: &RawResponse) -> Result<WeatherRecord, ParseError> {
        if !raw.is_object() {
            return Err(ParseError::NotAnObject { found: kind(raw) });
        }

        Ok(WeatherRecord {
            city: CITY.extract(raw)?.into_owned(),
            country: COUNTRY.extract(raw)?.into_owned(),
            temperature: TEMPERATURE.extract(raw)?,
            feels_like: FEELS_LIKE.extract(raw)?,
            humidity: HUMIDITY.extract(raw)?,
            pressure: PRESSURE.extract(raw)?,
            wind_speed: WIND_SPEED.extract(raw)?,
            description: DESCRIPTION.extract(raw)?.into_owned(),
            observed_at: OBSERVED_AT.extract(raw)?,
        })
    }

    /// Parse one response; failures are logged and yield `None`.
    pub fn parse_one(&self, raw: &RawResponse) -> Option<WeatherRecord> {
        match self.try_parse(raw) {
            Ok(record) => {
                debug!(city = %record.city, "parsed record");
                Some(record)
            }
            Err(e) => {
                error!(error = %e, "failed to parse response");
                debug!(raw = %raw, "offending response");
                None
            }
        }
    }

    /// Parse every response and clean the survivors. Never fails; an empty
    /// table means nothing usable was found.
    pub fn transform_all(&self, raws: &[RawResponse]) -> WeatherTable {
        if raws.is_empty() {
            warn!("no data to transform");
            return WeatherTable::default();
        }

        info!(responses = raws.len(), "transforming");

        let records: Vec<WeatherRecord> = raws.iter().filter_map(|raw| self.parse_one(raw)).collect();

        if records.is_empty() {
            warn!("no valid record after parsing");
            return WeatherTable::default();
        }

        let table = clean(records, Utc::now());
        info!(rows = table.len(), "transformation finished");
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(city: &str, temp: f64) -> Value {
        json!({
            "name": city,
            "sys": {"country": "FR"},
            "main": {"temp": temp, "feels_like": 19.8, "humidity": 65, "pressure": 1013},
            "wind": {"speed": 3.5},
            "weather": [{"description": "clear sky"}],
            "dt": 1_700_000_000
        })
    }

    #[test]
    fn parses_complete_response() {
        let record = Transformer::new().try_parse(&response("Paris", 20.5)).unwrap();

        assert_eq!(record.city, "Paris");
        assert_eq!(record.country, "FR");
        assert_eq!(record.temperature, 20.5);
        assert_eq!(record.feels_like, 19.8);
        assert_eq!(record.humidity, 65);
        assert_eq!(record.pressure, 1013);
        assert_eq!(record.wind_speed, 3.5);
        assert_eq!(record.description, "clear sky");
        assert_eq!(record.observed_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn empty_object_gets_every_default() {
        let record = Transformer::new().parse_one(&json!({})).unwrap();

        assert_eq!(record.city, UNKNOWN_CITY);
        assert_eq!(record.country, UNKNOWN_COUNTRY);
        assert_eq!(record.temperature, 0.0);
        assert_eq!(record.feels_like, 0.0);
        assert_eq!(record.humidity, 0);
        assert_eq!(record.pressure, 0);
        assert_eq!(record.wind_speed, 0.0);
        assert_eq!(record.description, "");
        assert_eq!(record.observed_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn defaults_apply_per_field() {
        let raw = json!({"name": "Oslo", "main": {"humidity": 80}});
        let record = Transformer::new().parse_one(&raw).unwrap();

        assert_eq!(record.city, "Oslo");
        assert_eq!(record.humidity, 80);
        assert_eq!(record.pressure, 0);
        assert_eq!(record.country, UNKNOWN_COUNTRY);
    }

    #[test]
    fn non_numeric_temperature_fails() {
        let raw = json!({"name": "Paris", "main": {"temp": "warm"}});

        let err = Transformer::new().try_parse(&raw).unwrap_err();
        assert!(matches!(err, ParseError::Type { field: "temperature", .. }));
        assert!(Transformer::new().parse_one(&raw).is_none());
    }

    #[test]
    fn numeric_strings_and_float_integers_coerce() {
        let raw = json!({"main": {"temp": "21.5", "humidity": 64.9, "pressure": "1009"}});
        let record = Transformer::new().parse_one(&raw).unwrap();

        assert_eq!(record.temperature, 21.5);
        assert_eq!(record.humidity, 64);
        assert_eq!(record.pressure, 1009);
    }

    #[test]
    fn explicit_null_is_not_coercible() {
        assert!(Transformer::new().parse_one(&json!({"main": {"temp": null}})).is_none());
        assert!(Transformer::new().parse_one(&json!({"name": null})).is_none());
    }

    #[test]
    fn empty_weather_list_is_structural_failure() {
        let err = Transformer::new().try_parse(&json!({"weather": []})).unwrap_err();
        assert!(matches!(err, ParseError::Structure { field: "description", .. }));
    }

    #[test]
    fn weather_entry_without_description_defaults() {
        let record = Transformer::new().parse_one(&json!({"weather": [{}]})).unwrap();
        assert_eq!(record.description, "");
    }

    #[test]
    fn non_object_section_is_structural_failure() {
        assert!(Transformer::new().parse_one(&json!({"main": "hot"})).is_none());
        assert!(Transformer::new().parse_one(&json!({"weather": {"description": "x"}})).is_none());
    }

    #[test]
    fn null_and_non_object_responses_fail() {
        let t = Transformer::new();

        assert_eq!(
            t.try_parse(&Value::Null).unwrap_err(),
            ParseError::NotAnObject { found: "null" }
        );
        assert!(t.parse_one(&json!([1, 2])).is_none());
    }

    #[test]
    fn invalid_timestamp_fails() {
        assert!(Transformer::new().parse_one(&json!({"dt": "yesterday"})).is_none());
        assert!(Transformer::new().parse_one(&json!({"dt": 1e20})).is_none());
    }

    #[test]
    fn rounding_to_one_decimal() {
        assert_eq!(round1(20.567), 20.6);
        assert_eq!(round1(19.123), 19.1);
        assert_eq!(round1(3.789), 3.8);
        assert_eq!(round1(-4.25), -4.2);
    }

    #[test]
    fn transform_empty_input_is_empty_table() {
        assert!(Transformer::new().transform_all(&[]).is_empty());
    }

    #[test]
    fn transform_all_invalid_is_empty_table() {
        let raws = vec![Value::Null, json!({"main": {"temp": "x"}})];
        assert!(Transformer::new().transform_all(&raws).is_empty());
    }

    #[test]
    fn transform_rounds_and_sorts() {
        let mut paris = response("Paris", 20.567);
        paris["wind"]["speed"] = json!(3.789);
        let london = response("London", 19.123);

        let table = Transformer::new().transform_all(&[paris, london]);

        assert_eq!(table.cities(), vec!["London", "Paris"]);
        let rows = table.rows();
        assert_eq!(rows[0].temperature, 19.1);
        assert_eq!(rows[1].temperature, 20.6);
        assert_eq!(rows[1].wind_speed, 3.8);
        assert_eq!(rows[0].extracted_at, rows[1].extracted_at);
    }

    #[test]
    fn transform_drops_only_invalid_rows() {
        let raws = vec![
            response("Tokyo", 25.0),
            json!({"name": "Broken", "main": {"temp": [1]}}),
            response("Berlin", 12.0),
        ];

        let table = Transformer::new().transform_all(&raws);
        assert_eq!(table.cities(), vec!["Berlin", "Tokyo"]);
    }

    #[test]
    fn sort_is_case_sensitive_and_stable() {
        let stamp = Utc::now();
        let mut first = Transformer::new().parse_one(&response("Paris", 1.0)).unwrap();
        first.country = "FR".into();
        let mut second = first.clone();
        second.country = "US".into();
        let lower = Transformer::new().parse_one(&response("amsterdam", 1.0)).unwrap();

        let table = clean(vec![first, lower, second], stamp);

        assert_eq!(table.cities(), vec!["Paris", "Paris", "amsterdam"]);
        assert_eq!(table.rows()[0].country, "FR");
        assert_eq!(table.rows()[1].country, "US");
        assert!(table.rows().iter().all(|r| r.extracted_at == stamp));
    }
}
