//! Line protocol produced from real source output parses back losslessly

use chrono::Duration;
use contracts::{Sample, TimeRange};
use dispatcher::line_protocol::{encode_batch, encode_sample, parse_line};

use crate::support::*;

fn assert_round_trip(sample: &Sample) {
    let line = encode_sample(sample).unwrap();
    assert_eq!(line.lines().count(), 1, "line break leaked into: {line}");

    let parsed = parse_line(&line).unwrap();
    assert_eq!(parsed.measurement, sample.measurement);
    assert_eq!(parsed.tags, sample.tags);
    assert_eq!(parsed.fields, sample.fields);
    assert_eq!(Some(parsed.timestamp_ns), sample.timestamp_ns());
}

#[test]
fn test_special_characters_survive_encoding() {
    let sample = Sample::new(SENSOR.into(), SENSOR_NAME, "Sensor Push,v2", now0())
        .with_tag("room", r"cave\cellier = ünten")
        .with_field("temperature", -12.75)
        .with_field("dew point,°C", 3.0)
        .with_field("vpd", 1e-3);

    assert_round_trip(&sample);

    let line = encode_sample(&sample).unwrap();
    assert!(line.starts_with(r"Sensor\ Push\,v2,"), "got: {line}");
    assert!(line.contains(r"sensor_name=Serre\,\ nord\ \=\ ☀"), "got: {line}");
}

#[tokio::test]
async fn test_enriched_samples_round_trip() {
    let api = api();
    for (minutes, fahrenheit) in [(45, 41.9), (25, 77.0), (5, -4.0)] {
        api.push_temperature(SENSOR, now0() - Duration::minutes(minutes), fahrenheit);
    }
    let source = source(&api);

    let fetched = source
        .fetch(TimeRange::trailing(now0(), Duration::minutes(60)), None)
        .collect()
        .await
        .unwrap();
    assert_eq!(fetched.batch.len(), 3);

    for sample in fetched.batch.samples() {
        // humidity present, so the derived metrics are filled in
        assert!(sample.fields.contains_key("dewpoint"), "fields: {:?}", sample.fields);
        assert_round_trip(sample);
    }

    let encoded = encode_batch(&fetched.batch);
    assert!(encoded.dropped.is_empty());
    let stamps: Vec<i64> = encoded
        .lines
        .iter()
        .map(|l| parse_line(l).unwrap().timestamp_ns)
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}
