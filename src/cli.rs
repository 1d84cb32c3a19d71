use clap::{Arg, ArgAction, Command};
use std::time::Duration;

use crate::executor::{DEFAULT_PAYLOAD, ExecutorConfig};

#[derive(Debug, Clone)]
pub struct PingArgs {
    pub target: String,
    pub count: Option<u32>,
    pub size: Option<u32>,
    pub timeout: Option<u32>,
    pub resolve_addresses: bool,
    pub rows: bool,
}

impl Default for PingArgs {
    fn default() -> Self {
        Self {
            target: String::new(),
            count: Some(4),
            size: None,
            timeout: Some(5000),
            resolve_addresses: false,
            rows: false,
        }
    }
}

impl PingArgs {
    pub fn executor_config(&self) -> ExecutorConfig {
        let payload = match self.size {
            // Fill with 'a' characters like Windows ping
            Some(size) => vec![0x61; size as usize],
            None => DEFAULT_PAYLOAD.to_vec(),
        };

        ExecutorConfig {
            timeout: Duration::from_millis(u64::from(self.timeout.unwrap_or(5000))),
            payload,
        }
    }
}

pub fn build_cli() -> Command {
    Command::new("icmp-pinger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Send ICMPv4 echo requests and classify the outcome")
        .arg(
            Arg::new("target")
                .help("Target hostname or IPv4 address")
                .required(true)
                .index(1)
        )
        .arg(
            Arg::new("count")
                .short('n')
                .help("Number of echo requests to send")
                .value_name("count")
                .value_parser(clap::value_parser!(u32))
        )
        .arg(
            Arg::new("size")
                .short('l')
                .help("Send buffer size")
                .value_name("size")
                .value_parser(clap::value_parser!(u32))
        )
        .arg(
            Arg::new("timeout")
                .short('w')
                .help("Timeout in milliseconds to wait for each reply")
                .value_name("timeout")
                .value_parser(clap::value_parser!(u32))
        )
        .arg(
            Arg::new("resolve")
                .short('a')
                .help("Resolve reply addresses to hostnames")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("rows")
                .long("rows")
                .help("Print results as tab-separated table rows")
                .action(ArgAction::SetTrue)
        )
}

pub fn parse_args() -> anyhow::Result<PingArgs> {
    parse_args_from(std::env::args_os())
}

pub fn parse_args_from<I, T>(args: I) -> anyhow::Result<PingArgs>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = build_cli().try_get_matches_from(args)?;

    let mut args = PingArgs::default();

    args.target = matches
        .get_one::<String>("target")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Missing target"))?;
    args.resolve_addresses = matches.get_flag("resolve");
    args.rows = matches.get_flag("rows");

    if let Some(count) = matches.get_one::<u32>("count") {
        args.count = Some(*count);
    }

    if let Some(size) = matches.get_one::<u32>("size") {
        args.size = Some(*size);
    }

    if let Some(timeout) = matches.get_one::<u32>("timeout") {
        args.timeout = Some(*timeout);
    }

    if args.target.trim().is_empty() {
        return Err(anyhow::anyhow!("Target must not be empty"));
    }

    Ok(args)
}
