use std::net::Ipv4Addr;
use std::time::Duration;

/// An accepted echo reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub target: String,
    pub source: Ipv4Addr,
    pub ttl: u8,
    pub identifier: u16,
    pub sequence: u16,
    pub rtt: Duration,
}

impl EchoReply {
    pub fn rtt_ms(&self) -> f64 {
        self.rtt.as_secs_f64() * 1000.0
    }
}

/// Finalized outcome of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Reply(EchoReply),
    Timeout { target: String },
    HostNotFound { target: String },
}

impl ProbeResult {
    pub fn target(&self) -> &str {
        match self {
            ProbeResult::Reply(reply) => &reply.target,
            ProbeResult::Timeout { target } | ProbeResult::HostNotFound { target } => target,
        }
    }

    pub fn reply(&self) -> Option<&EchoReply> {
        match self {
            ProbeResult::Reply(reply) => Some(reply),
            _ => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, ProbeResult::Reply(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeResult::Timeout { .. })
    }

    pub fn is_host_not_found(&self) -> bool {
        matches!(self, ProbeResult::HostNotFound { .. })
    }
}

/// What `execute` hands back: results in attempt order, attempts that
/// produced nothing omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingOutcome {
    pub success: bool,
    pub results: Vec<ProbeResult>,
}

impl PingOutcome {
    pub fn from_results(results: Vec<ProbeResult>) -> Self {
        Self {
            success: !results.is_empty(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_follows_results() {
        assert!(!PingOutcome::from_results(Vec::new()).success);

        let outcome = PingOutcome::from_results(vec![ProbeResult::Timeout {
            target: "2.2.2.2".to_string(),
        }]);
        assert!(outcome.success);
        assert_eq!(outcome.results[0].target(), "2.2.2.2");
        assert!(outcome.results[0].reply().is_none());
    }

    #[test]
    fn test_rtt_ms() {
        let reply = EchoReply {
            target: "localhost".to_string(),
            source: Ipv4Addr::LOCALHOST,
            ttl: 64,
            identifier: 7,
            sequence: 1,
            rtt: Duration::from_micros(20_500),
        };
        assert!((reply.rtt_ms() - 20.5).abs() < 1e-9);
    }
}
