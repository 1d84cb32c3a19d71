use crate::result::{EchoReply, ProbeResult};
use crate::utils::format_time;

#[derive(Debug, Clone)]
pub struct PingStatistics {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub packets_lost: u32,
    pub unresolved: u32,
    pub min_time: f64,
    pub max_time: f64,
    pub total_time: f64,
}

impl PingStatistics {
    pub fn new() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            packets_lost: 0,
            unresolved: 0,
            min_time: f64::INFINITY,
            max_time: 0.0,
            total_time: 0.0,
        }
    }

    pub fn from_results(results: &[ProbeResult]) -> Self {
        let mut stats = Self::new();
        for result in results {
            stats.record(result);
        }
        stats
    }

    /// Host-not-found attempts never put a packet on the wire, so they are
    /// counted apart from sent/lost.
    pub fn record(&mut self, result: &ProbeResult) {
        match result {
            ProbeResult::Reply(reply) => {
                self.packets_sent += 1;
                self.record_received(reply.rtt_ms());
            }
            ProbeResult::Timeout { .. } => {
                self.packets_sent += 1;
                self.packets_lost += 1;
            }
            ProbeResult::HostNotFound { .. } => self.unresolved += 1,
        }
    }

    fn record_received(&mut self, time_ms: f64) {
        self.packets_received += 1;
        self.total_time += time_ms;

        if time_ms < self.min_time {
            self.min_time = time_ms;
        }

        if time_ms > self.max_time {
            self.max_time = time_ms;
        }
    }

    pub fn loss_percentage(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        (self.packets_lost as f64 / self.packets_sent as f64) * 100.0
    }

    pub fn average_time(&self) -> f64 {
        if self.packets_received == 0 {
            return 0.0;
        }
        self.total_time / self.packets_received as f64
    }

    pub fn format_summary(&self, target: &str) -> String {
        let mut summary = format!(
            "\nPing statistics for {}:\n    \
             Packets: Sent = {}, Received = {}, Lost = {} ({:.0}% loss),\n",
            target,
            self.packets_sent,
            self.packets_received,
            self.packets_lost,
            self.loss_percentage()
        );

        if self.packets_received > 0 {
            summary.push_str(&format!(
                "Approximate round trip times in milli-seconds:\n    \
                 Minimum = {:.0}ms, Maximum = {:.0}ms, Average = {:.0}ms\n",
                self.min_time,
                self.max_time,
                self.average_time()
            ));
        }

        summary
    }

    pub fn format_response(&self, reply: &EchoReply) -> String {
        format!(
            "Reply from {}: icmp_seq={} time={} TTL={}",
            reply.source,
            reply.sequence,
            format_time(reply.rtt_ms()),
            reply.ttl
        )
    }
}

impl Default for PingStatistics {
    fn default() -> Self {
        Self::new()
    }
}
