//! Time-series sink: InfluxDB v2 line protocol over HTTP.
//!
//! Delivery is best effort: a failed write is logged by the caller and the
//! point is gone. No buffering, no redelivery.

use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

use crate::inspect::feed::EnvironmentSample;

const LOCATION_TAG: &str = "workshop";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("time-series write failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("time-series sink rejected the write: HTTP {status}")]
    Rejected { status: u16 },
    #[error("failed to build sink client: {0}")]
    Client(String),
}

/// Destination for the reporter's points. Seam kept narrow so tests can
/// observe writes without a live InfluxDB.
pub trait StatusSink: Send {
    fn write_environment(&self, sample: &EnvironmentSample) -> Result<(), SinkError>;
    fn write_machine_status(&self, defect_detected: bool) -> Result<(), SinkError>;
}

/// InfluxDB v2 `/api/v2/write` client.
pub struct InfluxSink {
    client: Client,
    write_url: String,
    token: String,
}

impl InfluxSink {
    pub fn new(
        url: &str,
        org: &str,
        bucket: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SinkError::Client(err.to_string()))?;
        let write_url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            url.trim_end_matches('/'),
            org,
            bucket
        );
        Ok(Self {
            client,
            write_url,
            token: token.to_string(),
        })
    }

    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        let mut request = self.client.post(&self.write_url).body(line.to_string());
        if !self.token.is_empty() {
            request = request.header("Authorization", format!("Token {}", self.token));
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(SinkError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

impl StatusSink for InfluxSink {
    fn write_environment(&self, sample: &EnvironmentSample) -> Result<(), SinkError> {
        self.write_line(&environment_line(sample))
    }

    fn write_machine_status(&self, defect_detected: bool) -> Result<(), SinkError> {
        self.write_line(&machine_status_line(defect_detected))
    }
}

pub(crate) fn environment_line(sample: &EnvironmentSample) -> String {
    format!(
        "environment,location={} temperature={},humidity={}",
        escape_tag(LOCATION_TAG),
        sample.temperature,
        sample.humidity
    )
}

pub(crate) fn machine_status_line(defect_detected: bool) -> String {
    format!(
        "machine_status defect_detected={}i",
        if defect_detected { 1 } else { 0 }
    )
}

// Line-protocol tag values must escape commas, spaces, and equals signs.
fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, ',' | ' ' | '=') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::feed::parse_sample;

    #[test]
    fn environment_round_trip_preserves_fields() {
        let sample = parse_sample(r#"{"temperature":23.5,"humidity":48.2}"#).unwrap();
        assert_eq!(
            environment_line(&sample),
            "environment,location=workshop temperature=23.5,humidity=48.2"
        );
    }

    #[test]
    fn machine_status_is_a_zero_or_one_integer_field() {
        assert_eq!(
            machine_status_line(true),
            "machine_status defect_detected=1i"
        );
        assert_eq!(
            machine_status_line(false),
            "machine_status defect_detected=0i"
        );
    }

    #[test]
    fn tag_escaping() {
        assert_eq!(escape_tag("workshop"), "workshop");
        assert_eq!(escape_tag("hall 3,west=a"), "hall\\ 3\\,west\\=a");
    }
}
