use icmp_pinger::report::{PingRow, to_rows};
use icmp_pinger::stats::PingStatistics;
use icmp_pinger::{PingExecutor, ProbeResult, cli, dns, utils};

fn main() {
    // Enable debug logging if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    // Parse command line arguments
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => match e.downcast::<clap::Error>() {
            Ok(clap_error) => clap_error.exit(),
            Err(e) => exit_with_error(&format!("Invalid arguments: {}", e), 1),
        },
    };

    // Validate parameters
    if let Err(e) = utils::validate_ping_params(args.size, args.count, args.timeout) {
        exit_with_error(&e.to_string(), 1);
    }

    let config = args.executor_config();
    println!("Pinging {} with {} bytes of data:", args.target, config.payload.len());

    let pinger = PingExecutor::with_config(config);
    let count = args.count.unwrap_or(4) as usize;
    let outcome = pinger.execute(&args.target, count);

    if args.rows {
        println!("{}", PingRow::columns().join("\t"));
        for row in to_rows(&outcome.results) {
            println!("{}", row.values().join("\t"));
        }
    } else {
        let stats = PingStatistics::from_results(&outcome.results);
        for result in &outcome.results {
            match result {
                ProbeResult::Reply(reply) => {
                    let line = stats.format_response(reply);
                    let name = args
                        .resolve_addresses
                        .then(|| dns::reverse_lookup(reply.source))
                        .flatten();
                    match name {
                        Some(name) => println!("{} [{}]", line, name),
                        None => println!("{}", line),
                    }
                }
                ProbeResult::Timeout { .. } => println!("Request timed out."),
                ProbeResult::HostNotFound { target } => {
                    println!("Ping request could not find host {}.", target)
                }
            }
        }
        println!("{}", stats.format_summary(&args.target));
    }

    if !outcome.success {
        exit_with_error("no attempt produced a result", 1);
    }
}

/// Print error message and exit with error code
fn exit_with_error(message: &str, code: i32) -> ! {
    eprintln!("icmp-pinger: {}", message);
    std::process::exit(code);
}
