//! HTTP transport for the control endpoint.
//!
//! The endpoint exposes addressable values as JSON documents at
//! `{base}/api/values/{id}`: `GET` returns `{"value": ...}`, `PUT` replaces
//! it. Connecting performs an initial status read as the handshake, so a
//! server that is up but not serving the expected values fails the attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::endpoint::{Connector, ControlError, ControlSession};

#[derive(Debug, Serialize, Deserialize)]
struct ValueDocument {
    value: Value,
}

/// Identifiers of the three values the link drives.
#[derive(Clone, Debug)]
pub struct ValueIds {
    pub defect_code: String,
    pub status: String,
    pub stop: String,
}

pub struct HttpConnector {
    client: Client,
    base_url: String,
    ids: ValueIds,
}

impl HttpConnector {
    /// `timeout` bounds both the connection attempt and every in-session call.
    pub fn new(base_url: &str, ids: ValueIds, timeout: Duration) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|err| ControlError::Connect(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ids,
        })
    }

    fn value_url(&self, id: &str) -> String {
        format!("{}/api/values/{}", self.base_url, id)
    }
}

#[async_trait]
impl Connector for HttpConnector {
    type Session = HttpSession;

    async fn connect(&self) -> Result<HttpSession, ControlError> {
        let mut session = HttpSession {
            client: self.client.clone(),
            defect_url: self.value_url(&self.ids.defect_code),
            status_url: self.value_url(&self.ids.status),
            stop_url: self.value_url(&self.ids.stop),
        };
        // Handshake: the status value must be readable before the link
        // considers itself connected.
        session.read_status().await?;
        Ok(session)
    }
}

pub struct HttpSession {
    client: Client,
    defect_url: String,
    status_url: String,
    stop_url: String,
}

impl HttpSession {
    async fn write_value(&self, url: &str, id: &str, value: Value) -> Result<(), ControlError> {
        let response = self
            .client
            .put(url)
            .json(&ValueDocument { value })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ControlError::Rejected {
                value_id: id.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlSession for HttpSession {
    async fn write_defect_code(&mut self, code: i64) -> Result<(), ControlError> {
        self.write_value(&self.defect_url, "defect-code", Value::from(code))
            .await
    }

    async fn read_status(&mut self) -> Result<String, ControlError> {
        let response = self.client.get(&self.status_url).send().await?;
        if !response.status().is_success() {
            return Err(ControlError::Rejected {
                value_id: "status".to_string(),
                status: response.status().as_u16(),
            });
        }
        let document: ValueDocument = response.json().await?;
        match document.value {
            Value::String(status) => Ok(status),
            other => Err(ControlError::UnexpectedValue {
                value_id: "status".to_string(),
                detail: format!("expected a string, got {other}"),
            }),
        }
    }

    async fn write_status(&mut self, status: &str) -> Result<(), ControlError> {
        self.write_value(&self.status_url, "status", Value::from(status))
            .await
    }

    async fn write_stop(&mut self, engaged: bool) -> Result<(), ControlError> {
        self.write_value(&self.stop_url, "stop", Value::from(engaged))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_urls_are_rooted_at_the_base() {
        let connector = HttpConnector::new(
            "http://plc.local:4840/",
            ValueIds {
                defect_code: "defect-code".into(),
                status: "machine-status".into(),
                stop: "line-stop".into(),
            },
            Duration::from_secs(4),
        )
        .unwrap();
        assert_eq!(
            connector.value_url("machine-status"),
            "http://plc.local:4840/api/values/machine-status"
        );
    }

    #[test]
    fn value_document_shape() {
        let doc: ValueDocument = serde_json::from_str(r#"{"value":"Running"}"#).unwrap();
        assert_eq!(doc.value, Value::from("Running"));
    }
}
