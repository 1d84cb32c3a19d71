//! Single-target ICMP echo executor.
//!
//! Every attempt builds its own engine (a current-thread tokio runtime plus a
//! fresh socket), races the reply against a timer on the calling thread, and
//! drops the engine before returning. Only the identifier and the sequence
//! counter outlive an attempt.

use anyhow::Context;
use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};

use crate::dns::{Resolve, ResolveError, SystemResolver};
use crate::icmp::{
    IcmpTransport, MAX_PACKET_SIZE, RawSocketFactory, TransportFactory, decode_icmp_header,
    decode_ipv4_header, encode_echo_request,
};
use crate::result::{EchoReply, PingOutcome, ProbeResult};
use crate::utils::{SharedRng, generate_identifier, next_sequence, process_rng};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PAYLOAD: &[u8] = b"Hello from icmp-pinger";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long to wait for a reply, measured from the moment of sending.
    pub timeout: Duration,
    pub payload: Vec<u8>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            payload: DEFAULT_PAYLOAD.to_vec(),
        }
    }
}

/// The request a reply has to answer.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub target: String,
    pub address: Ipv4Addr,
    pub identifier: u16,
    pub sequence: u16,
    pub sent_at: Instant,
}

impl PendingRequest {
    /// Decodes a raw datagram (IPv4 header first) and returns the reply if it
    /// answers this request. Checksums are not verified.
    pub fn accept(&self, datagram: &[u8], received_at: Instant) -> Option<EchoReply> {
        let ip = match decode_ipv4_header(datagram) {
            Ok(ip) => ip,
            Err(e) => {
                log::debug!("Ignoring datagram: {}", e);
                return None;
            }
        };

        let icmp = match decode_icmp_header(ip.payload()) {
            Ok(icmp) => icmp,
            Err(e) => {
                log::debug!("Ignoring ICMP message from {}: {}", ip.source_address(), e);
                return None;
            }
        };

        if !icmp.is_echo() {
            log::debug!("Ignoring ICMP message from {}: {}", ip.source_address(), icmp.kind());
            return None;
        }

        let answers_request =
            icmp.identifier == self.identifier && icmp.sequence == self.sequence;
        if !icmp.is_echo_reply() || !answers_request {
            log::debug!(
                "Ignoring {} from {}: id={} seq={}, waiting for id={} seq={}",
                icmp.kind(),
                ip.source_address(),
                icmp.identifier,
                icmp.sequence,
                self.identifier,
                self.sequence
            );
            return None;
        }

        let rtt = received_at.saturating_duration_since(self.sent_at);
        if rtt.is_zero() {
            return None;
        }

        Some(EchoReply {
            target: self.target.clone(),
            source: ip.source_address(),
            ttl: ip.time_to_live(),
            identifier: icmp.identifier,
            sequence: icmp.sequence,
            rtt,
        })
    }
}

// Field order matters: the socket must deregister before its reactor goes.
struct Engine<T> {
    socket: T,
    runtime: Runtime,
}

#[derive(Debug, Default)]
struct ExecutorState {
    identifier: u16,
    sequence: u16,
}

/// Sends echo requests to one target at a time. Concurrent `execute` calls on
/// the same instance run one after another.
pub struct PingExecutor<R = SystemResolver, F = RawSocketFactory> {
    config: ExecutorConfig,
    resolver: R,
    transports: F,
    rng: SharedRng,
    state: Mutex<ExecutorState>,
}

impl PingExecutor {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self::with_parts(config, SystemResolver, RawSocketFactory, process_rng())
    }
}

impl Default for PingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, F> PingExecutor<R, F>
where
    R: Resolve,
    F: TransportFactory,
{
    pub fn with_parts(config: ExecutorConfig, resolver: R, transports: F, rng: SharedRng) -> Self {
        Self {
            config,
            resolver,
            transports,
            rng,
            state: Mutex::new(ExecutorState::default()),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs `count` attempts against `target`, one after another.
    ///
    /// Attempts that fail at the transport level leave no entry, so the
    /// returned sequence holds between 0 and `count` results.
    pub fn execute(&self, target: &str, count: usize) -> PingOutcome {
        if target.is_empty() || count == 0 {
            return PingOutcome::default();
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut results = Vec::new();
        for attempt in 1..=count {
            match self.single_attempt(&mut state, target) {
                Ok(result) => results.push(result),
                Err(e) => log::warn!(
                    "Ping attempt {} to {} produced no result: {:#}",
                    attempt,
                    target,
                    e
                ),
            }
        }

        PingOutcome::from_results(results)
    }

    /// Starts an attempt from a known state: a new identifier and a new event
    /// runtime. The previous engine was dropped when its attempt ended, taking
    /// any timer and buffered data with it.
    fn reset(&self, state: &mut ExecutorState) -> anyhow::Result<Runtime> {
        {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            state.identifier = generate_identifier(&mut *rng);
        }

        Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .context("Failed to build event runtime")
    }

    /// Completes the engine with a socket registered on `runtime`.
    fn open_engine(&self, runtime: Runtime) -> anyhow::Result<Engine<F::Transport>> {
        let socket = {
            let _guard = runtime.enter();
            self.transports.open()?
        };

        Ok(Engine { socket, runtime })
    }

    fn single_attempt(
        &self,
        state: &mut ExecutorState,
        target: &str,
    ) -> anyhow::Result<ProbeResult> {
        let runtime = self.reset(state)?;

        let address = match self.resolver.resolve_v4(target) {
            Ok(address) => address,
            Err(ResolveError::NotFound(_)) => {
                log::debug!("Target host {} was not found", target);
                return Ok(ProbeResult::HostNotFound {
                    target: target.to_string(),
                });
            }
            Err(ResolveError::Other(e)) => {
                return Err(e.context(format!("Could not resolve {}", target)));
            }
        };

        let engine = self.open_engine(runtime)?;

        state.sequence = next_sequence(state.sequence);
        let packet = encode_echo_request(state.identifier, state.sequence, &self.config.payload);

        let Engine { socket, runtime } = &engine;
        runtime.block_on(send_and_wait(
            socket,
            &packet,
            target,
            address,
            (state.identifier, state.sequence),
            self.config.timeout,
        ))
    }
}

async fn send_and_wait<T: IcmpTransport>(
    socket: &T,
    packet: &[u8],
    target: &str,
    address: Ipv4Addr,
    (identifier, sequence): (u16, u16),
    timeout: Duration,
) -> anyhow::Result<ProbeResult> {
    let bytes_sent = socket
        .send_to(packet, address)
        .with_context(|| format!("Failed to send echo request to {}", address))?;
    let sent_at = Instant::now();

    if bytes_sent != packet.len() {
        return Err(anyhow::anyhow!(
            "Short send to {}: {} of {} bytes",
            address,
            bytes_sent,
            packet.len()
        ));
    }

    let pending = PendingRequest {
        target: target.to_string(),
        address,
        identifier,
        sequence,
        sent_at,
    };

    let expiry = tokio::time::sleep_until(tokio::time::Instant::from_std(sent_at + timeout));
    tokio::pin!(expiry);

    let mut buffer = vec![0u8; MAX_PACKET_SIZE];
    loop {
        tokio::select! {
            biased;

            received = socket.recv(&mut buffer) => {
                let len = received.context("Failed to receive from ICMP socket")?;
                if let Some(reply) = pending.accept(&buffer[..len], Instant::now()) {
                    log::debug!(
                        "Reply from {}: seq={} ttl={} time={:?}",
                        reply.source,
                        reply.sequence,
                        reply.ttl,
                        reply.rtt
                    );
                    return Ok(ProbeResult::Reply(reply));
                }
            }
            () = &mut expiry => {
                log::debug!("Request to {} (seq={}) timed out", address, sequence);
                return Ok(ProbeResult::Timeout { target: pending.target.clone() });
            }
        }
    }
}

/// One-shot helper: a fresh executor, `count` attempts.
pub fn send_icmp_ping_to_target(target: &str, count: usize) -> PingOutcome {
    PingExecutor::new().execute(target, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::{ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, IcmpHeader};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TARGET_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const REPLY_SOURCE: [u8; 4] = [8, 8, 8, 8];
    const REPLY_TTL: u8 = 57;

    #[derive(Clone, Copy, Debug)]
    enum OnRecv {
        Reply { delay: Duration },
        WrongIdentifier,
        WrongSequence,
        OwnRequest,
        NotIpv4,
        Silent,
        Error,
    }

    type SentPackets = Arc<Mutex<Vec<(Vec<u8>, Ipv4Addr)>>>;

    #[derive(Clone)]
    struct ScriptedFactory {
        script: Arc<Mutex<VecDeque<OnRecv>>>,
        sent: SentPackets,
        opened: Arc<Mutex<usize>>,
        fail_send: bool,
    }

    impl ScriptedFactory {
        fn new(script: &[OnRecv]) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.iter().copied().collect())),
                sent: Arc::new(Mutex::new(Vec::new())),
                opened: Arc::new(Mutex::new(0)),
                fail_send: false,
            }
        }

        fn opened(&self) -> usize {
            *self.opened.lock().unwrap()
        }

        fn sent_headers(&self) -> Vec<IcmpHeader> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(packet, _)| decode_icmp_header(packet).unwrap())
                .collect()
        }
    }

    struct ScriptedSocket {
        on_recv: OnRecv,
        fail_send: bool,
        sent: SentPackets,
        last_request: RefCell<Option<Vec<u8>>>,
        delivered: Cell<bool>,
    }

    impl TransportFactory for ScriptedFactory {
        type Transport = ScriptedSocket;

        fn open(&self) -> anyhow::Result<ScriptedSocket> {
            *self.opened.lock().unwrap() += 1;
            let on_recv = self.script.lock().unwrap().pop_front().unwrap_or(OnRecv::Silent);
            Ok(ScriptedSocket {
                on_recv,
                fail_send: self.fail_send,
                sent: self.sent.clone(),
                last_request: RefCell::new(None),
                delivered: Cell::new(false),
            })
        }
    }

    impl IcmpTransport for ScriptedSocket {
        fn send_to(&self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
            if self.fail_send {
                return Err(io::Error::other("simulating send error in mock"));
            }
            self.sent.lock().unwrap().push((packet.to_vec(), target));
            *self.last_request.borrow_mut() = Some(packet.to_vec());
            Ok(packet.len())
        }

        async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            if self.delivered.replace(true) {
                return std::future::pending().await;
            }

            let request = self.last_request.borrow().clone().expect("recv before send");
            let datagram = match self.on_recv {
                OnRecv::Reply { delay } => {
                    tokio::time::sleep(delay).await;
                    datagram_for(&request, |_| {})
                }
                OnRecv::WrongIdentifier => {
                    datagram_for(&request, |h| h.identifier = h.identifier.wrapping_add(1))
                }
                OnRecv::WrongSequence => {
                    datagram_for(&request, |h| h.sequence = h.sequence.wrapping_add(1))
                }
                OnRecv::OwnRequest => datagram_for(&request, |h| h.icmp_type = ICMP_ECHO_REQUEST),
                OnRecv::NotIpv4 => {
                    let mut datagram = datagram_for(&request, |_| {});
                    datagram[0] = 0x65;
                    datagram
                }
                OnRecv::Silent => return std::future::pending().await,
                OnRecv::Error => return Err(io::Error::other("simulating receive error in mock")),
            };

            buf[..datagram.len()].copy_from_slice(&datagram);
            Ok(datagram.len())
        }
    }

    /// IPv4 datagram carrying an echo reply to `request`, adjusted by `tweak`.
    fn datagram_for(request: &[u8], tweak: impl FnOnce(&mut IcmpHeader)) -> Vec<u8> {
        let payload = &request[8..];
        let mut header = decode_icmp_header(request).unwrap();
        header.icmp_type = ICMP_ECHO_REPLY;
        tweak(&mut header);
        header.update_checksum(payload);

        let mut datagram = vec![
            0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, REPLY_TTL, 0x01, 0x00, 0x00,
        ];
        datagram.extend_from_slice(&REPLY_SOURCE);
        datagram.extend_from_slice(&TARGET_ADDR.octets());
        datagram.extend_from_slice(&header.to_bytes());
        datagram.extend_from_slice(payload);
        datagram
    }

    struct MapResolver;

    impl Resolve for MapResolver {
        fn resolve_v4(&self, host: &str) -> Result<Ipv4Addr, ResolveError> {
            match host {
                "nonexistent.invalid" => Err(ResolveError::NotFound(host.to_string())),
                "servfail.example" => {
                    Err(ResolveError::Other(anyhow::anyhow!("temporary failure")))
                }
                _ => Ok(TARGET_ADDR),
            }
        }
    }

    fn executor(factory: &ScriptedFactory) -> PingExecutor<MapResolver, ScriptedFactory> {
        let config = ExecutorConfig {
            timeout: Duration::from_millis(100),
            ..ExecutorConfig::default()
        };
        let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(7)));
        PingExecutor::with_parts(config, MapResolver, factory.clone(), rng)
    }

    fn reply_after(ms: u64) -> OnRecv {
        OnRecv::Reply {
            delay: Duration::from_millis(ms),
        }
    }

    #[test]
    fn test_reply_is_finalized() {
        let factory = ScriptedFactory::new(&[reply_after(20)]);
        let outcome = executor(&factory).execute("example.com", 1);

        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 1);
        let reply = outcome.results[0].reply().expect("expected a reply");
        let request = factory.sent_headers()[0];

        assert_eq!(reply.target, "example.com");
        assert_eq!(reply.source, Ipv4Addr::from(REPLY_SOURCE));
        assert_eq!(reply.ttl, REPLY_TTL);
        assert_eq!(reply.identifier, request.identifier);
        assert_eq!(reply.sequence, 1);
        assert!(reply.rtt >= Duration::from_millis(20));
        assert!(reply.rtt_ms() > 0.0);
    }

    #[test]
    fn test_request_goes_to_resolved_address() {
        let factory = ScriptedFactory::new(&[reply_after(1)]);
        executor(&factory).execute("example.com", 1);

        let sent = factory.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, TARGET_ADDR);
        assert_eq!(&sent[0].0[8..], DEFAULT_PAYLOAD);
        assert_eq!(crate::icmp::internet_checksum(&sent[0].0), 0);
    }

    #[test]
    fn test_no_reply_times_out() {
        let factory = ScriptedFactory::new(&[OnRecv::Silent]);
        let started = Instant::now();
        let outcome = executor(&factory).execute("example.com", 1);

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(
            outcome.results,
            vec![ProbeResult::Timeout {
                target: "example.com".to_string()
            }]
        );
    }

    #[test]
    fn test_late_reply_loses_to_timer() {
        let factory = ScriptedFactory::new(&[reply_after(500)]);
        let outcome = executor(&factory).execute("example.com", 1);
        assert!(outcome.results[0].is_timeout());
    }

    #[test]
    fn test_mismatched_replies_resolve_via_timeout() {
        let mismatches = [
            OnRecv::WrongIdentifier,
            OnRecv::WrongSequence,
            OnRecv::OwnRequest,
            OnRecv::NotIpv4,
        ];
        for on_recv in mismatches {
            let factory = ScriptedFactory::new(&[on_recv]);
            let outcome = executor(&factory).execute("example.com", 1);

            assert!(outcome.success, "{:?}", on_recv);
            assert!(
                outcome.results[0].is_timeout(),
                "{:?} gave {:?}",
                on_recv,
                outcome.results[0]
            );
        }
    }

    #[test]
    fn test_host_not_found_skips_transport_and_instance_is_reusable() {
        let factory = ScriptedFactory::new(&[reply_after(1)]);
        let pinger = executor(&factory);

        let first = pinger.execute("nonexistent.invalid", 1);
        assert!(first.success);
        assert_eq!(
            first.results,
            vec![ProbeResult::HostNotFound {
                target: "nonexistent.invalid".to_string()
            }]
        );
        assert_eq!(factory.opened(), 0);

        let second = pinger.execute("example.com", 1);
        assert!(second.success);
        assert!(second.results[0].is_reply());
        assert_eq!(factory.opened(), 1);
    }

    #[test]
    fn test_transport_errors_drop_only_that_attempt() {
        let factory = ScriptedFactory::new(&[OnRecv::Error, reply_after(1), OnRecv::Error]);
        let outcome = executor(&factory).execute("example.com", 3);

        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].reply().unwrap().sequence, 2);
    }

    #[test]
    fn test_send_failure_yields_no_result() {
        let mut factory = ScriptedFactory::new(&[reply_after(1), reply_after(1)]);
        factory.fail_send = true;
        let outcome = executor(&factory).execute("example.com", 2);

        assert!(!outcome.success);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_resolution_error_is_not_host_not_found() {
        let factory = ScriptedFactory::new(&[]);
        let outcome = executor(&factory).execute("servfail.example", 2);

        assert!(!outcome.success);
        assert!(outcome.results.is_empty());
        assert_eq!(factory.opened(), 0);
    }

    #[test]
    fn test_invalid_arguments_do_nothing() {
        let factory = ScriptedFactory::new(&[reply_after(1)]);
        let pinger = executor(&factory);

        assert_eq!(pinger.execute("", 3), PingOutcome::default());
        assert_eq!(pinger.execute("example.com", 0), PingOutcome::default());
        assert_eq!(factory.opened(), 0);
    }

    #[test]
    fn test_results_keep_attempt_order() {
        let factory = ScriptedFactory::new(&[
            reply_after(1),
            OnRecv::Silent,
            reply_after(1),
            OnRecv::WrongSequence,
        ]);
        let outcome = executor(&factory).execute("example.com", 4);

        assert_eq!(outcome.results.len(), 4);
        assert!(outcome.results[0].is_reply());
        assert!(outcome.results[1].is_timeout());
        assert!(outcome.results[2].is_reply());
        assert!(outcome.results[3].is_timeout());
        assert_eq!(factory.opened(), 4);
    }

    #[test]
    fn test_sequence_increments_and_wraps_past_zero() {
        let factory = ScriptedFactory::new(&[reply_after(1), reply_after(1), reply_after(1)]);
        let pinger = executor(&factory);
        pinger.state.lock().unwrap().sequence = 65534;

        let outcome = pinger.execute("example.com", 3);

        let sent: Vec<u16> = factory.sent_headers().iter().map(|h| h.sequence).collect();
        assert_eq!(sent, vec![65535, 1, 2]);
        let replied: Vec<u16> = outcome
            .results
            .iter()
            .map(|r| r.reply().unwrap().sequence)
            .collect();
        assert_eq!(replied, sent);
    }

    #[test]
    fn test_identifier_is_regenerated_from_injected_rng() {
        let factory = ScriptedFactory::new(&[reply_after(1), reply_after(1)]);
        executor(&factory).execute("example.com", 2);

        let mut expected = StdRng::seed_from_u64(7);
        let identifiers: Vec<u16> = factory.sent_headers().iter().map(|h| h.identifier).collect();
        assert_eq!(
            identifiers,
            vec![generate_identifier(&mut expected), generate_identifier(&mut expected)]
        );
        assert!(identifiers.iter().all(|id| *id != 0));
    }

    #[test]
    fn test_identifier_is_regenerated_on_host_not_found() {
        let factory = ScriptedFactory::new(&[reply_after(1)]);
        let pinger = executor(&factory);

        pinger.execute("nonexistent.invalid", 1);
        pinger.execute("example.com", 1);

        let mut expected = StdRng::seed_from_u64(7);
        let skipped = generate_identifier(&mut expected);
        let sent = factory.sent_headers();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].identifier, generate_identifier(&mut expected));
        assert_eq!(pinger.state.lock().unwrap().identifier, sent[0].identifier);
        assert_ne!(skipped, 0);
    }

    /// Reports every host as missing and stops the run after `limit` lookups.
    struct LimitedResolver {
        calls: AtomicUsize,
        limit: usize,
    }

    impl Resolve for LimitedResolver {
        fn resolve_v4(&self, host: &str) -> Result<Ipv4Addr, ResolveError> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if calls > self.limit {
                panic!("attempt limit reached");
            }
            Err(ResolveError::NotFound(host.to_string()))
        }
    }

    #[test]
    fn test_huge_count_starts_attempting() {
        let resolver = LimitedResolver {
            calls: AtomicUsize::new(0),
            limit: 3,
        };
        let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(7)));
        let factory = ScriptedFactory::new(&[]);
        let pinger = PingExecutor::with_parts(ExecutorConfig::default(), resolver, factory, rng);

        let panic = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pinger.execute("x.invalid", usize::MAX / 2)
        }))
        .expect_err("run should stop at the attempt limit");

        assert_eq!(panic.downcast_ref::<&str>(), Some(&"attempt limit reached"));
        assert_eq!(pinger.resolver.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_accept_requires_positive_rtt() {
        let request = encode_echo_request(7, 1, b"AB");
        let sent_at = Instant::now();
        let pending = PendingRequest {
            target: "example.com".to_string(),
            address: TARGET_ADDR,
            identifier: 7,
            sequence: 1,
            sent_at,
        };
        let datagram = datagram_for(&request, |_| {});

        assert!(pending.accept(&datagram, sent_at).is_none());
        let reply = pending.accept(&datagram, sent_at + Duration::from_millis(20)).unwrap();
        assert_eq!(reply.rtt, Duration::from_millis(20));
        assert_eq!(reply.identifier, 7);
    }

    #[test]
    fn test_accept_ignores_truncated_icmp() {
        let request = encode_echo_request(7, 1, b"AB");
        let pending = PendingRequest {
            target: "example.com".to_string(),
            address: TARGET_ADDR,
            identifier: 7,
            sequence: 1,
            sent_at: Instant::now(),
        };
        let datagram = datagram_for(&request, |_| {});

        assert!(pending.accept(&datagram[..24], Instant::now()).is_none());
        assert!(pending.accept(&datagram[..10], Instant::now()).is_none());
    }
}
