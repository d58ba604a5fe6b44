//! InfluxDB 2.x telemetry sink: an HTTP line-protocol writer.
//!
//! Grounded in the distilled system's `INFLUXDB_URL`/`TOKEN`/`ORG`/`BUCKET`
//! environment contract, reworked behind the core's `TelemetrySink` trait so
//! the engine depends on neither `reqwest` nor InfluxDB's wire format
//! directly.

use sensorlink_core::{Result, Sid, TelemetrySink};
use std::env;
use std::time::Duration;
use tracing::{debug, error};

/// Connection details for the InfluxDB write endpoint.
///
/// `None` fields (or `test_env`) put the sink in no-op mode: every write
/// logs at DEBUG and returns success without touching the network.
#[derive(Debug, Clone, Default)]
pub struct InfluxConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub org: Option<String>,
    pub bucket: Option<String>,
    pub test_env: bool,
}

impl InfluxConfig {
    /// Read `INFLUXDB_URL`, `INFLUXDB_TOKEN`, `INFLUXDB_ORG`, `INFLUXDB_BUCKET`,
    /// and `IS_TEST_ENV` from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: env::var("INFLUXDB_URL").ok(),
            token: env::var("INFLUXDB_TOKEN").ok(),
            org: env::var("INFLUXDB_ORG").ok(),
            bucket: env::var("INFLUXDB_BUCKET").ok(),
            test_env: env::var("IS_TEST_ENV").is_ok_and(|v| is_truthy(&v)),
        }
    }

    fn write_endpoint(&self) -> Option<String> {
        if self.test_env {
            return None;
        }
        let url = self.url.as_ref()?;
        let org = self.org.as_ref()?;
        let bucket = self.bucket.as_ref()?;
        Some(format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            url.trim_end_matches('/'),
            urlencode(org),
            urlencode(bucket),
        ))
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no")
}

fn urlencode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Writes one InfluxDB line-protocol point per call to measurement
/// `sensor_telemetry`, tagged by `source_id`.
pub struct InfluxTelemetrySink {
    client: Option<reqwest::Client>,
    config: InfluxConfig,
}

impl InfluxTelemetrySink {
    #[must_use]
    pub fn new(config: InfluxConfig) -> Self {
        let client = config.write_endpoint().is_some().then(|| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(sensorlink_core::constants::SINK_WRITE_TIMEOUT_SECS))
                .build()
                .expect("reqwest client with static config builds")
        });
        Self { client, config }
    }

    /// Build from the process environment (see [`InfluxConfig::from_env`]).
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(InfluxConfig::from_env())
    }

    /// A sink that never writes, regardless of environment — used by tests
    /// that exercise the engine without a telemetry backend at all.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(InfluxConfig { test_env: true, ..InfluxConfig::default() })
    }
}

impl Clone for InfluxTelemetrySink {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), config: self.config.clone() }
    }
}

impl TelemetrySink for InfluxTelemetrySink {
    async fn write(
        &self,
        source_id: Sid,
        voltage: Option<f64>,
        temperature: Option<f64>,
        timestamp_nanos: i64,
    ) -> Result<()> {
        if voltage.is_none() && temperature.is_none() {
            debug!(%source_id, "HASH decoded neither voltage nor temperature, skipping telemetry write");
            return Ok(());
        }

        let (Some(client), Some(endpoint)) = (&self.client, self.config.write_endpoint()) else {
            debug!(%source_id, ?voltage, ?temperature, "telemetry sink disabled, logging reading only");
            return Ok(());
        };

        let line = encode_line(source_id, voltage, temperature, timestamp_nanos);
        let mut request = client.post(&endpoint).body(line);
        if let Some(token) = &self.config.token {
            request = request.header("Authorization", format!("Token {token}"));
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status();
                error!(%source_id, %status, "InfluxDB write rejected");
                Err(sensorlink_core::Error::TelemetrySink(format!("non-2xx response: {status}")))
            }
            Err(err) => {
                error!(%source_id, %err, "InfluxDB write failed");
                Err(sensorlink_core::Error::TelemetrySink(err.to_string()))
            }
        }
    }
}

fn encode_line(source_id: Sid, voltage: Option<f64>, temperature: Option<f64>, timestamp_nanos: i64) -> String {
    let mut fields = Vec::with_capacity(2);
    if let Some(v) = voltage {
        fields.push(format!("voltage={v}"));
    }
    if let Some(t) = temperature {
        fields.push(format!("temperature={t}"));
    }
    format!("sensor_telemetry,source_id={} {} {timestamp_nanos}", source_id.to_hex_colon(), fields.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sid() -> Sid {
        Sid::new([1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn line_protocol_includes_only_present_fields() {
        let line = encode_line(sid(), Some(85.0), None, 1_700_000_000_000_000_000);
        assert_eq!(line, "sensor_telemetry,source_id=01:02:03:04:05:06 voltage=85 1700000000000000000");
    }

    #[test]
    fn line_protocol_includes_both_fields() {
        let line = encode_line(sid(), Some(85.0), Some(25.5), 42);
        assert_eq!(line, "sensor_telemetry,source_id=01:02:03:04:05:06 voltage=85,temperature=25.5 42");
    }

    #[tokio::test]
    async fn disabled_sink_never_sends_a_request() {
        let sink = InfluxTelemetrySink::disabled();
        sink.write(sid(), Some(50.0), Some(20.0), 1).await.unwrap();
    }

    #[tokio::test]
    async fn unconfigured_sink_is_a_noop() {
        let sink = InfluxTelemetrySink::new(InfluxConfig::default());
        sink.write(sid(), Some(50.0), Some(20.0), 1).await.unwrap();
    }

    #[tokio::test]
    async fn neither_field_present_skips_the_write_even_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let sink = InfluxTelemetrySink::new(InfluxConfig {
            url: Some(server.uri()),
            token: Some("secret".into()),
            org: Some("org".into()),
            bucket: Some("bucket".into()),
            test_env: false,
        });
        sink.write(sid(), None, None, 1).await.unwrap();
    }

    #[tokio::test]
    async fn configured_sink_posts_line_protocol_with_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/write"))
            .and(header("Authorization", "Token secret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = InfluxTelemetrySink::new(InfluxConfig {
            url: Some(server.uri()),
            token: Some("secret".into()),
            org: Some("myorg".into()),
            bucket: Some("mybucket".into()),
            test_env: false,
        });
        sink.write(sid(), Some(85.0), Some(25.5), 1).await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_response_is_reported_as_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let sink = InfluxTelemetrySink::new(InfluxConfig {
            url: Some(server.uri()),
            token: None,
            org: Some("org".into()),
            bucket: Some("bucket".into()),
            test_env: false,
        });
        assert!(sink.write(sid(), Some(1.0), None, 1).await.is_err());
    }
}
