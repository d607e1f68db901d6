use crate::feed::transform::{
    format_date, format_magnitude, format_time, split_location, TimeZonePolicy,
};
use crate::feed::types::{FeedRecord, LoadError};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Field names of the remote feed contract.
///
/// Defaults match the USGS GeoJSON summary format:
/// `{"features": [{"properties": {"mag", "place", "time", "url"}}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedSchema {
    /// Top-level key holding the array of feature entries
    pub features: String,
    /// Key of the object inside each feature that holds the fields.
    /// Empty means the fields sit directly on the feature.
    pub properties: String,
    pub magnitude: String,
    pub location: String,
    pub time: String,
    pub url: String,
}

impl Default for FeedSchema {
    fn default() -> Self {
        Self {
            features: "features".to_string(),
            properties: "properties".to_string(),
            magnitude: "mag".to_string(),
            location: "place".to_string(),
            time: "time".to_string(),
            url: "url".to_string(),
        }
    }
}

/// What to do with a feature entry that lacks a required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsePolicy {
    /// Fail the whole payload with [`LoadError::MissingField`]
    #[default]
    FailFast,
    /// Drop the entry and keep going; the count is reported in [`ParsedFeed::skipped`]
    SkipMalformed,
}

/// Everything the parser needs besides the payload itself.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub schema: FeedSchema,
    pub policy: ParsePolicy,
    pub timezone: TimeZonePolicy,
}

/// Result of parsing a payload.
#[derive(Debug)]
pub struct ParsedFeed {
    /// Finished records, in the order the payload lists them
    pub records: Vec<FeedRecord>,
    /// Entries dropped under [`ParsePolicy::SkipMalformed`]
    pub skipped: usize,
}

/// Field values pulled out of one feature entry before transformation.
struct RawFeature<'a> {
    magnitude: f64,
    location: &'a str,
    timestamp_millis: i64,
    detail_url: &'a str,
}

/// Parses a feed payload into display-ready records.
///
/// # Errors
///
/// - [`LoadError::EmptyPayload`] - payload is empty or whitespace only
/// - [`LoadError::MalformedPayload`] - not JSON, not an object, or the feature
///   collection is absent or not an array
/// - [`LoadError::MissingField`] - under [`ParsePolicy::FailFast`], the first
///   entry lacking a field (or holding it with the wrong type)
pub fn parse_feed(payload: &str, options: &ParseOptions) -> Result<ParsedFeed, LoadError> {
    if payload.trim().is_empty() {
        return Err(LoadError::EmptyPayload);
    }

    let document: Value =
        serde_json::from_str(payload).map_err(|e| LoadError::MalformedPayload(e.to_string()))?;

    let schema = &options.schema;
    let features = document
        .as_object()
        .ok_or_else(|| LoadError::MalformedPayload("top-level value is not an object".into()))?
        .get(&schema.features)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            LoadError::MalformedPayload(format!("missing `{}` array", schema.features))
        })?;

    let mut records = Vec::with_capacity(features.len());
    let mut skipped = 0;

    for (index, feature) in features.iter().enumerate() {
        match extract_feature(index, feature, schema).and_then(|raw| finish(index, raw, options)) {
            Ok(record) => records.push(record),
            Err(e) if options.policy == ParsePolicy::SkipMalformed => {
                tracing::debug!(index, error = %e, "Skipping malformed feature");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(ParsedFeed { records, skipped })
}

fn extract_feature<'a>(
    index: usize,
    feature: &'a Value,
    schema: &FeedSchema,
) -> Result<RawFeature<'a>, LoadError> {
    let container = if schema.properties.is_empty() {
        feature.as_object()
    } else {
        feature.get(&schema.properties).and_then(Value::as_object)
    };
    let fields: &Map<String, Value> =
        container.ok_or_else(|| LoadError::missing_field(index, &schema.properties))?;

    let field = move |name: &str| fields.get(name).filter(|v| !v.is_null());

    let magnitude = field(&schema.magnitude)
        .and_then(Value::as_f64)
        .ok_or_else(|| LoadError::missing_field(index, &schema.magnitude))?;
    let location = field(&schema.location)
        .and_then(Value::as_str)
        .ok_or_else(|| LoadError::missing_field(index, &schema.location))?;
    let timestamp_millis = field(&schema.time)
        .and_then(Value::as_i64)
        .ok_or_else(|| LoadError::missing_field(index, &schema.time))?;
    let detail_url = field(&schema.url)
        .and_then(Value::as_str)
        .ok_or_else(|| LoadError::missing_field(index, &schema.url))?;

    Ok(RawFeature {
        magnitude,
        location,
        timestamp_millis,
        detail_url,
    })
}

fn finish(index: usize, raw: RawFeature<'_>, options: &ParseOptions) -> Result<FeedRecord, LoadError> {
    let time_field = || LoadError::missing_field(index, &options.schema.time);
    let date_display = format_date(raw.timestamp_millis, options.timezone).ok_or_else(time_field)?;
    let time_display = format_time(raw.timestamp_millis, options.timezone).ok_or_else(time_field)?;
    let parts = split_location(raw.location);

    Ok(FeedRecord {
        magnitude_display: format_magnitude(raw.magnitude),
        primary_location: parts.primary.to_string(),
        offset_display: parts.offset.to_string(),
        date_display,
        time_display,
        detail_url: raw.detail_url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::ErrorKind;
    use pretty_assertions::assert_eq;

    const TWO_QUAKES: &str = r#"{
        "type": "FeatureCollection",
        "metadata": {"count": 2},
        "features": [
            {"type": "Feature", "properties": {
                "mag": 6.07, "place": "5km N of Example Town",
                "time": 1704467229000, "url": "https://example.com/event/a"}},
            {"type": "Feature", "properties": {
                "mag": 2, "place": "Example Ridge",
                "time": 1704380829000, "url": "https://example.com/event/b"}}
        ]
    }"#;

    fn options() -> ParseOptions {
        ParseOptions::default()
    }

    fn kind_of(payload: &str, options: &ParseOptions) -> ErrorKind {
        parse_feed(payload, options).unwrap_err().kind()
    }

    #[test]
    fn test_parse_valid_collection() {
        let parsed = parse_feed(TWO_QUAKES, &options()).unwrap();
        assert_eq!(parsed.skipped, 0);
        assert_eq!(
            parsed.records,
            vec![
                FeedRecord {
                    magnitude_display: "6.1".into(),
                    primary_location: "Example Town".into(),
                    offset_display: "5km N of".into(),
                    date_display: "Jan 05, 2024".into(),
                    time_display: "3:07 PM".into(),
                    detail_url: "https://example.com/event/a".into(),
                },
                FeedRecord {
                    magnitude_display: "2.0".into(),
                    primary_location: "Example Ridge".into(),
                    offset_display: "Near by".into(),
                    date_display: "Jan 04, 2024".into(),
                    time_display: "3:07 PM".into(),
                    detail_url: "https://example.com/event/b".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_preserves_order_and_count() {
        let features: Vec<String> = (0..25)
            .map(|i| {
                format!(
                    r#"{{"properties": {{"mag": {}.5, "place": "{}km E of Town {}", "time": {}, "url": "https://example.com/{}"}}}}"#,
                    i % 9,
                    i,
                    i,
                    1_700_000_000_000i64 - i * 60_000,
                    i
                )
            })
            .collect();
        let payload = format!(r#"{{"features": [{}]}}"#, features.join(","));

        let parsed = parse_feed(&payload, &options()).unwrap();
        assert_eq!(parsed.records.len(), 25);
        for (i, record) in parsed.records.iter().enumerate() {
            assert_eq!(record.detail_url, format!("https://example.com/{}", i));
            assert_eq!(record.primary_location, format!("Town {}", i));
            assert!(!record.magnitude_display.is_empty());
            assert!(!record.offset_display.is_empty());
            assert!(!record.date_display.is_empty());
            assert!(!record.time_display.is_empty());
        }
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(kind_of("", &options()), ErrorKind::EmptyPayload);
        assert_eq!(kind_of("  \n\t ", &options()), ErrorKind::EmptyPayload);
    }

    #[test]
    fn test_malformed_payload() {
        assert_eq!(kind_of("{not json", &options()), ErrorKind::MalformedPayload);
        assert_eq!(kind_of("[1, 2, 3]", &options()), ErrorKind::MalformedPayload);
        assert_eq!(kind_of(r#"{"type": "FeatureCollection"}"#, &options()), ErrorKind::MalformedPayload);
        assert_eq!(kind_of(r#"{"features": {}}"#, &options()), ErrorKind::MalformedPayload);
    }

    #[test]
    fn test_empty_feature_array_is_success() {
        let parsed = parse_feed(r#"{"features": []}"#, &options()).unwrap();
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn test_missing_mag_fails_whole_parse() {
        let payload = r#"{"features": [
            {"properties": {"mag": 1.0, "place": "A", "time": 0, "url": "u"}},
            {"properties": {"place": "B", "time": 0, "url": "u"}}
        ]}"#;
        let err = parse_feed(payload, &options()).unwrap_err();
        assert_eq!(
            err,
            LoadError::MissingField {
                index: 1,
                field: "mag".into()
            }
        );
    }

    #[test]
    fn test_wrong_types_are_missing_fields() {
        let cases = [
            (r#"{"mag": "6.1", "place": "A", "time": 0, "url": "u"}"#, "mag"),
            (r#"{"mag": null, "place": "A", "time": 0, "url": "u"}"#, "mag"),
            (r#"{"mag": 1.0, "place": 7, "time": 0, "url": "u"}"#, "place"),
            (r#"{"mag": 1.0, "place": "A", "time": 1.5, "url": "u"}"#, "time"),
            (r#"{"mag": 1.0, "place": "A", "time": 0, "url": false}"#, "url"),
        ];
        for (properties, field) in cases {
            let payload = format!(r#"{{"features": [{{"properties": {}}}]}}"#, properties);
            match parse_feed(&payload, &options()).unwrap_err() {
                LoadError::MissingField { index: 0, field: f } => assert_eq!(f, field),
                e => panic!("Expected MissingField({}), got {:?}", field, e),
            }
        }
    }

    #[test]
    fn test_feature_without_properties() {
        let payload = r#"{"features": [{"type": "Feature"}]}"#;
        assert_eq!(kind_of(payload, &options()), ErrorKind::MissingField);
    }

    #[test]
    fn test_out_of_range_time_is_invalid() {
        let payload = format!(
            r#"{{"features": [{{"properties": {{"mag": 1.0, "place": "A", "time": {}, "url": "u"}}}}]}}"#,
            i64::MAX
        );
        match parse_feed(&payload, &options()).unwrap_err() {
            LoadError::MissingField { field, .. } => assert_eq!(field, "time"),
            e => panic!("Expected MissingField(time), got {:?}", e),
        }
    }

    #[test]
    fn test_skip_malformed_policy() {
        let payload = r#"{"features": [
            {"properties": {"mag": 1.0, "place": "A", "time": 0, "url": "a"}},
            {"properties": {"mag": null, "place": "B", "time": 0, "url": "b"}},
            {"type": "Feature"},
            {"properties": {"mag": 3.0, "place": "C", "time": 0, "url": "c"}}
        ]}"#;
        let opts = ParseOptions {
            policy: ParsePolicy::SkipMalformed,
            ..ParseOptions::default()
        };
        let parsed = parse_feed(payload, &opts).unwrap();
        assert_eq!(parsed.skipped, 2);
        let urls: Vec<_> = parsed.records.iter().map(|r| r.detail_url.as_str()).collect();
        assert_eq!(urls, vec!["a", "c"]);
    }

    #[test]
    fn test_skip_malformed_still_rejects_bad_documents() {
        let opts = ParseOptions {
            policy: ParsePolicy::SkipMalformed,
            ..ParseOptions::default()
        };
        assert_eq!(kind_of("", &opts), ErrorKind::EmptyPayload);
        assert_eq!(kind_of("{not json", &opts), ErrorKind::MalformedPayload);
    }

    #[test]
    fn test_custom_schema_with_flat_features() {
        let payload = r#"{"events": [
            {"magnitude": 4.44, "where": "8km SW of Somewhere", "at": 0, "link": "https://example.com/x"}
        ]}"#;
        let opts = ParseOptions {
            schema: FeedSchema {
                features: "events".into(),
                properties: String::new(),
                magnitude: "magnitude".into(),
                location: "where".into(),
                time: "at".into(),
                url: "link".into(),
            },
            ..ParseOptions::default()
        };
        let parsed = parse_feed(payload, &opts).unwrap();
        let record = &parsed.records[0];
        assert_eq!(record.magnitude_display, "4.4");
        assert_eq!(record.offset_display, "8km SW of");
        assert_eq!(record.primary_location, "Somewhere");
        assert_eq!(record.date_display, "Jan 01, 1970");
        assert_eq!(record.time_display, "12:00 AM");
    }

    #[test]
    fn test_timezone_applies_to_records() {
        let opts = ParseOptions {
            timezone: "+10:00".parse().unwrap(),
            ..ParseOptions::default()
        };
        let parsed = parse_feed(TWO_QUAKES, &opts).unwrap();
        assert_eq!(parsed.records[0].date_display, "Jan 06, 2024");
        assert_eq!(parsed.records[0].time_display, "1:07 AM");
    }
}
