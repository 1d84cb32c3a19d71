//! ICMPv4 echo probing.
//!
//! [`PingExecutor::execute`] is the entry point: it resolves a target, sends
//! echo requests one at a time and reports each attempt as a reply, a timeout
//! or an unresolvable host.

pub mod cli;
pub mod dns;
pub mod executor;
pub mod icmp;
pub mod report;
pub mod result;
pub mod stats;
pub mod utils;

pub use executor::{ExecutorConfig, PendingRequest, PingExecutor, send_icmp_ping_to_target};
pub use result::{EchoReply, PingOutcome, ProbeResult};
