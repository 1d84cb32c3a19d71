//! Flattens probe results into table rows for a query layer.

use crate::result::ProbeResult;

pub const COLUMN_HOST: &str = "host";
pub const COLUMN_RESULT: &str = "result";
pub const COLUMN_IP_ADDRESS: &str = "ip_address";
pub const COLUMN_SEQUENCE_NUMBER: &str = "sequence_number";
pub const COLUMN_TIME_TO_LIVE: &str = "time_to_live";
pub const COLUMN_LATENCY: &str = "latency";

pub const RESULT_SUCCESS: &str = "Success";
pub const RESULT_TIMEOUT: &str = "There was a timeout waiting for response from target host";
pub const RESULT_HOST_NOT_FOUND: &str = "Target host was not found";

/// One row per result. Columns a result has no value for stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRow {
    pub host: String,
    pub result: &'static str,
    pub ip_address: Option<String>,
    pub sequence_number: Option<u16>,
    pub time_to_live: Option<u8>,
    /// Whole milliseconds.
    pub latency: Option<u64>,
}

impl PingRow {
    pub fn columns() -> [&'static str; 6] {
        [
            COLUMN_HOST,
            COLUMN_RESULT,
            COLUMN_IP_ADDRESS,
            COLUMN_SEQUENCE_NUMBER,
            COLUMN_TIME_TO_LIVE,
            COLUMN_LATENCY,
        ]
    }

    /// Cell values in `columns()` order, empty where absent.
    pub fn values(&self) -> [String; 6] {
        [
            self.host.clone(),
            self.result.to_string(),
            self.ip_address.clone().unwrap_or_default(),
            self.sequence_number.map(|v| v.to_string()).unwrap_or_default(),
            self.time_to_live.map(|v| v.to_string()).unwrap_or_default(),
            self.latency.map(|v| v.to_string()).unwrap_or_default(),
        ]
    }
}

impl From<&ProbeResult> for PingRow {
    fn from(result: &ProbeResult) -> Self {
        match result {
            ProbeResult::Reply(reply) => PingRow {
                host: reply.target.clone(),
                result: RESULT_SUCCESS,
                ip_address: Some(reply.source.to_string()),
                sequence_number: Some(reply.sequence),
                time_to_live: Some(reply.ttl),
                latency: Some(reply.rtt.as_millis() as u64),
            },
            ProbeResult::Timeout { target } => PingRow {
                host: target.clone(),
                result: RESULT_TIMEOUT,
                ip_address: None,
                sequence_number: None,
                time_to_live: None,
                latency: None,
            },
            ProbeResult::HostNotFound { target } => PingRow {
                host: target.clone(),
                result: RESULT_HOST_NOT_FOUND,
                ip_address: None,
                sequence_number: None,
                time_to_live: None,
                latency: None,
            },
        }
    }
}

pub fn to_rows(results: &[ProbeResult]) -> Vec<PingRow> {
    results.iter().map(PingRow::from).collect()
}
