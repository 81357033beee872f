//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Output format selection (human/JSON)
//! - Pid filtering
//! - Engine configuration file and overrides
//! - Verbosity and quiet modes

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use procevents::EngineConfig;
use std::path::PathBuf;

/// Settings gathered from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub json_output: bool,
    pub quiet_mode: bool,
    pub verbosity: u8,
    /// Only events involving one of these pids are printed; empty means all
    pub pid_filter: Vec<u32>,
    pub config_path: Option<PathBuf>,
    pub queue_capacity: Option<usize>,
    pub buffer_size: Option<usize>,
}

/// Build the clap command
pub fn command() -> Command {
    Command::new("procevents")
        .version(env!("PROCEVENTS_VERSION"))
        .long_version(concat!(env!("PROCEVENTS_VERSION"), " (", env!("GIT_HASH"), ")"))
        .about("Print Linux process fork, exec and exit events as they happen")
        .long_about(
            "Subscribes to the kernel process connector and prints every fork, exec and \
             exit event until interrupted. Requires root or CAP_NET_ADMIN.",
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Output one JSON object per event")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("pid")
                .short('p')
                .long("pid")
                .value_name("PID")
                .help("Only print events involving this pid (repeatable)")
                .value_parser(value_parser!(u32))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine configuration file (TOML)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("queue-capacity")
                .long("queue-capacity")
                .value_name("N")
                .help("Events buffered per queue; 0 hands each event over before reading the next")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("buffer-size")
                .long("buffer-size")
                .value_name("BYTES")
                .help("Receive buffer size for one kernel datagram")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress warnings and the summary")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v info, -vv debug)")
                .action(ArgAction::Count),
        )
}

/// Parse command line arguments and return configuration
pub fn parse_args() -> Result<CliConfig> {
    let matches = command().get_matches();
    Ok(from_matches(&matches))
}

fn from_matches(matches: &ArgMatches) -> CliConfig {
    let pid_filter = matches
        .get_many::<u32>("pid")
        .map(|values| values.copied().collect())
        .unwrap_or_default();

    CliConfig {
        json_output: matches.get_flag("json"),
        quiet_mode: matches.get_flag("quiet"),
        verbosity: matches.get_count("verbose"),
        pid_filter,
        config_path: matches.get_one::<PathBuf>("config").cloned(),
        queue_capacity: matches.get_one::<usize>("queue-capacity").copied(),
        buffer_size: matches.get_one::<usize>("buffer-size").copied(),
    }
}

impl CliConfig {
    pub fn output_format(&self) -> OutputFormat {
        if self.json_output {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    /// Whether `event` passes the pid filter
    pub fn wants(&self, event: &procevents::ProcessEvent) -> bool {
        self.pid_filter.is_empty() || self.pid_filter.iter().any(|pid| event.involves(*pid))
    }

    /// Engine configuration: file (explicit or default location), then
    /// command-line overrides, then validation
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::resolve(self.config_path.as_deref())?;

        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(size) = self.buffer_size {
            config.receive_buffer_size = size;
        }

        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }
}
