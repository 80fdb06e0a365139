//! InfluxDB line protocol codec
//!
//! `measurement,tag=value field=1.5 1700000000000000000`
//!
//! Every backend kind speaks this format. Tags and fields are emitted in key
//! order, so the same sample always encodes to the same line.

use std::collections::BTreeMap;

use contracts::{Batch, ContractError, Sample};

const MEASUREMENT_SPECIALS: &[char] = &[',', ' '];
const KEY_SPECIALS: &[char] = &[',', '=', ' '];

fn escape(s: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\n', '\r'])
}

/// Encode one sample as a single line
///
/// Tags with an empty value are omitted. Fails with `MalformedSample` on an
/// empty measurement, empty keys, line breaks, non-finite field values, no
/// fields at all, or a timestamp outside the nanosecond range.
pub fn encode_sample(sample: &Sample) -> Result<String, ContractError> {
    let malformed =
        |message: String| ContractError::malformed_sample(sample.sensor_id.as_str(), message);

    if sample.measurement.is_empty() || has_line_break(&sample.measurement) {
        return Err(malformed(format!("invalid measurement '{}'", sample.measurement)));
    }
    if sample.fields.is_empty() {
        return Err(malformed("sample has no fields".into()));
    }
    let timestamp = sample
        .timestamp_ns()
        .ok_or_else(|| malformed(format!("timestamp {} out of range", sample.timestamp)))?;

    let mut line = escape(&sample.measurement, MEASUREMENT_SPECIALS);

    for (key, value) in &sample.tags {
        if key.is_empty() || has_line_break(key) || has_line_break(value) {
            return Err(malformed(format!("invalid tag '{key}'")));
        }
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape(key, KEY_SPECIALS));
        line.push('=');
        line.push_str(&escape(value, KEY_SPECIALS));
    }

    line.push(' ');
    for (i, (key, value)) in sample.fields.iter().enumerate() {
        if key.is_empty() || has_line_break(key) {
            return Err(malformed(format!("invalid field key '{key}'")));
        }
        if !value.is_finite() {
            return Err(malformed(format!("field '{key}' is not finite")));
        }
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape(key, KEY_SPECIALS));
        line.push('=');
        line.push_str(&value.to_string());
    }

    line.push(' ');
    line.push_str(&timestamp.to_string());
    Ok(line)
}

/// Lines of a batch plus what had to be left out
#[derive(Debug, Default)]
pub struct EncodedBatch {
    pub lines: Vec<String>,
    /// One error per dropped sample
    pub dropped: Vec<ContractError>,
}

impl EncodedBatch {
    /// Newline-joined request body
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }

    /// Request bodies of at most `max_lines` lines each
    pub fn chunks(&self, max_lines: usize) -> impl Iterator<Item = String> + '_ {
        self.lines.chunks(max_lines.max(1)).map(|chunk| chunk.join("\n"))
    }
}

/// Encode a whole batch, skipping malformed samples
pub fn encode_batch(batch: &Batch) -> EncodedBatch {
    let mut encoded = EncodedBatch {
        lines: Vec::with_capacity(batch.len()),
        dropped: Vec::new(),
    };
    for sample in batch.samples() {
        match encode_sample(sample) {
            Ok(line) => encoded.lines.push(line),
            Err(err) => encoded.dropped.push(err),
        }
    }
    encoded
}

/// A decoded line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    pub timestamp_ns: i64,
}

/// Split on `sep` where it is not escaped; escapes are kept
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_pair(pair: &str) -> Result<(String, String), String> {
    let parts = split_unescaped(pair, '=');
    match parts.as_slice() {
        [key, value] if !key.is_empty() && !value.is_empty() => {
            Ok((unescape(key), unescape(value)))
        }
        _ => Err(format!("bad key=value pair '{pair}'")),
    }
}

/// Decode a line produced by [`encode_sample`]
///
/// Only float fields are understood. Errors carry a human-readable reason.
pub fn parse_line(line: &str) -> Result<ParsedLine, String> {
    let sections = split_unescaped(line, ' ');
    let [head, fields, timestamp] = sections.as_slice() else {
        return Err(format!("expected 3 space-separated sections, got {}", sections.len()));
    };

    let mut head = split_unescaped(head, ',').into_iter();
    let measurement = head
        .next()
        .filter(|m| !m.is_empty())
        .map(|m| unescape(&m))
        .ok_or("missing measurement")?;

    let mut tags = BTreeMap::new();
    for pair in head {
        let (key, value) = parse_pair(&pair)?;
        tags.insert(key, value);
    }

    let mut parsed_fields = BTreeMap::new();
    for pair in split_unescaped(fields, ',') {
        let (key, raw) = parse_pair(&pair)?;
        let value: f64 = raw
            .parse()
            .map_err(|_| format!("field '{key}' is not a float: '{raw}'"))?;
        parsed_fields.insert(key, value);
    }
    if parsed_fields.is_empty() {
        return Err("no fields".into());
    }

    let timestamp_ns = timestamp
        .parse()
        .map_err(|_| format!("bad timestamp '{timestamp}'"))?;

    Ok(ParsedLine {
        measurement,
        tags,
        fields: parsed_fields,
        timestamp_ns,
    })
}
