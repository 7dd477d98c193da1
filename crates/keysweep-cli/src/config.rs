use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use keysweep::{
    DEFAULT_ALPHABET, DEFAULT_LENGTH, DEFAULT_MATCH_FIELD, DEFAULT_PAYLOAD_FIELD, Keyspace,
    ProbeConfig, ScanConfig, default_workers,
};
use std::path::PathBuf;

/// Runtime configuration for the `keysweep` binary.
///
/// Every option can also be set through a `KEYSWEEP_*` environment variable
/// or a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keysweep",
    version,
    about = "Probe every candidate of a fixed-length keyspace against an HTTP endpoint"
)]
pub struct CliArgs {
    /// Endpoint each candidate is `POST`ed to as JSON.
    ///
    /// Environment variable: `KEYSWEEP_TARGET`
    #[arg(long, env = "KEYSWEEP_TARGET")]
    pub target: String,

    /// Ordered, distinct symbols candidates are built from. The first symbol
    /// is the padding symbol.
    ///
    /// Environment variable: `KEYSWEEP_ALPHABET`
    #[arg(long, env = "KEYSWEEP_ALPHABET", default_value_t = String::from(DEFAULT_ALPHABET))]
    pub alphabet: String,

    /// Number of symbols in every candidate.
    ///
    /// Environment variable: `KEYSWEEP_LENGTH`
    #[arg(long, env = "KEYSWEEP_LENGTH", default_value_t = DEFAULT_LENGTH)]
    pub length: usize,

    /// Number of worker threads. Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `KEYSWEEP_WORKERS`
    #[arg(long, env = "KEYSWEEP_WORKERS")]
    pub workers: Option<usize>,

    /// Concurrent connections (lanes) per worker. Bounds the number of
    /// in-flight requests to `workers * lanes`.
    ///
    /// Environment variable: `KEYSWEEP_LANES`
    #[arg(long, env = "KEYSWEEP_LANES", default_value_t = 1)]
    pub lanes: usize,

    /// JSON field of the request body holding the candidate.
    ///
    /// Environment variable: `KEYSWEEP_PAYLOAD_FIELD`
    #[arg(long, env = "KEYSWEEP_PAYLOAD_FIELD", default_value_t = String::from(DEFAULT_PAYLOAD_FIELD))]
    pub payload_field: String,

    /// Boolean JSON field of the response that flags a match.
    ///
    /// Environment variable: `KEYSWEEP_MATCH_FIELD`
    #[arg(long, env = "KEYSWEEP_MATCH_FIELD", default_value_t = String::from(DEFAULT_MATCH_FIELD))]
    pub match_field: String,

    /// Per-request timeout in milliseconds. Timed out requests count as
    /// failed.
    ///
    /// Environment variable: `KEYSWEEP_TIMEOUT_MS`
    #[arg(long, env = "KEYSWEEP_TIMEOUT_MS", default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// How often workers report statistics, in milliseconds.
    ///
    /// Environment variable: `KEYSWEEP_REPORT_INTERVAL_MS`
    #[arg(long, env = "KEYSWEEP_REPORT_INTERVAL_MS", default_value_t = 1_000)]
    pub report_interval_ms: u64,

    /// Append every matched candidate to this file, one per line.
    ///
    /// Environment variable: `KEYSWEEP_FOUND_FILE`
    #[arg(long, env = "KEYSWEEP_FOUND_FILE")]
    pub found_file: Option<PathBuf>,

    /// Omit timestamps from log output.
    #[arg(long, env = "KEYSWEEP_HIDE_TIMESTAMPS", default_value_t = false)]
    pub hide_timestamps: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub probe: ProbeConfig,
    pub found_file: Option<PathBuf>,
    pub hide_timestamps: bool,
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let workers = args.workers.unwrap_or_else(default_workers);

        if workers == 0 {
            bail!("KEYSWEEP_WORKERS must be greater than 0");
        }
        if args.lanes == 0 {
            bail!("KEYSWEEP_LANES must be greater than 0");
        }
        if args.timeout_ms == 0 {
            bail!("KEYSWEEP_TIMEOUT_MS must be greater than 0");
        }

        let keyspace = Keyspace::new(&args.alphabet, args.length)?;
        let scan = ScanConfig::new(keyspace, workers, args.lanes)?
            .with_report_interval(Duration::from_millis(args.report_interval_ms))?;

        let probe = ProbeConfig::new(&args.target)?
            .with_payload_field(args.payload_field)
            .with_match_field(args.match_field)
            .with_timeout(Duration::from_millis(args.timeout_ms));

        Ok(Self {
            scan,
            probe,
            found_file: args.found_file,
            hide_timestamps: args.hide_timestamps,
        })
    }
}
