use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, OnceLock};

pub type SharedRng = Arc<Mutex<StdRng>>;

/// Process-wide generator, seeded from entropy on first use.
pub fn process_rng() -> SharedRng {
    static RNG: OnceLock<SharedRng> = OnceLock::new();
    RNG.get_or_init(|| Arc::new(Mutex::new(StdRng::from_entropy())))
        .clone()
}

/// Generate a random identifier for ICMP packets, never 0.
pub fn generate_identifier<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    rng.gen_range(1..=u16::MAX)
}

/// Sequence number following `current`; wraps from 65535 to 1, skipping 0.
pub fn next_sequence(current: u16) -> u16 {
    if current == u16::MAX { 1 } else { current + 1 }
}

/// Validate ping parameters
pub fn validate_ping_params(
    size: Option<u32>,
    count: Option<u32>,
    timeout: Option<u32>,
) -> anyhow::Result<()> {
    if let Some(size) = size {
        if size > 65500 {
            return Err(anyhow::anyhow!("Payload size too large, maximum is 65500 bytes"));
        }
    }

    if let Some(count) = count {
        if count == 0 {
            return Err(anyhow::anyhow!("Count must be greater than 0"));
        }
    }

    if let Some(timeout) = timeout {
        if timeout == 0 {
            return Err(anyhow::anyhow!("Timeout must be greater than 0"));
        }
    }

    Ok(())
}

/// Format time duration for display
pub fn format_time(ms: f64) -> String {
    if ms < 1.0 {
        "<1ms".to_string()
    } else {
        format!("{:.0}ms", ms)
    }
}
