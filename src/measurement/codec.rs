//! Text encoding of measurements for files and datagrams.
//!
//! A measurement is one JSON object, `{"time":<ns>,"value":<payload>}`.
//! Recordings hold one such object per line, so the newline is the record
//! separator. Datagrams prefix the object with the sender's component id and
//! a single space.

use super::payload::Payload;
use super::timed::Measurement;
use super::timestamp::Timestamp;
use crate::dataflow::error::{DataflowError, DataflowResult};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// Separates records in a recording.
pub const RECORD_SEPARATOR: char = '\n';

#[derive(Serialize)]
struct RecordRef<'a, T> {
    time: Timestamp,
    value: &'a T,
}

#[derive(Deserialize)]
struct Record<T> {
    time: Timestamp,
    value: T,
}

pub fn encode<T: Payload>(measurement: &Measurement<T>) -> DataflowResult<String> {
    let record = RecordRef {
        time: measurement.time(),
        value: measurement.value()?,
    };
    Ok(serde_json::to_string(&record)?)
}

pub fn decode<T: Payload>(text: &str) -> DataflowResult<Measurement<T>> {
    let record: Record<T> = serde_json::from_str(text.trim())?;
    Ok(Measurement::new(record.time, record.value))
}

/// Append one record followed by the separator.
pub fn write_record<T: Payload, W: Write>(
    writer: &mut W,
    measurement: &Measurement<T>,
) -> DataflowResult<()> {
    let text = encode(measurement)?;
    writer.write_all(text.as_bytes())?;
    write!(writer, "{RECORD_SEPARATOR}")?;
    Ok(())
}

/// Read every record; blank lines are skipped.
pub fn read_records<T: Payload, R: BufRead>(reader: R) -> DataflowResult<Vec<Measurement<T>>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = decode(&line).map_err(|e| {
            DataflowError::Serialization(format!("record {}: {}", index + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

pub fn encode_datagram<T: Payload>(id: &str, measurement: &Measurement<T>) -> DataflowResult<String> {
    Ok(format!("{} {}", id, encode(measurement)?))
}

/// Split a datagram into its component id and encoded measurement.
pub fn split_datagram(text: &str) -> DataflowResult<(&str, &str)> {
    let text = text.trim_start();
    text.split_once(char::is_whitespace)
        .filter(|(id, _)| !id.is_empty())
        .ok_or_else(|| DataflowError::Serialization("datagram without component id".into()))
}
