use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use roboid::PoolConfig;

/// Upper bound on the worker pool. Each worker may hold a full render in
/// memory.
const MAX_POOL_SIZE: usize = 256;

/// Upper bound on `READINESS_TIMEOUT_SECS` (one day).
const MAX_READINESS_TIMEOUT_SECS: u64 = 86_400;

/// Upper bound on `SHUTDOWN_TIMEOUT_SECS` (one hour).
const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 3_600;

/// Runtime configuration for the `roboid-host` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is honoured), with defaults suitable for an app-embedded host.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "roboid-host",
    version,
    about = "Serves robot avatar and name requests over stdio as JSON lines"
)]
pub struct CliArgs {
    /// Number of workers rendering concurrently.
    ///
    /// Requests beyond this many distinct in-flight identities wait in a FIFO
    /// queue.
    ///
    /// Environment variable: `POOL_SIZE`
    #[arg(long, env = "POOL_SIZE", default_value_t = roboid::DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Seconds to wait for the rendering engine to initialize before failing
    /// requests. `0` waits forever.
    ///
    /// Environment variable: `READINESS_TIMEOUT_SECS`
    #[arg(long, env = "READINESS_TIMEOUT_SECS", default_value_t = 30)]
    pub readiness_timeout_secs: u64,

    /// Grace period, in seconds, for in-flight renders during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Log every request and its outcome at `info` level.
    ///
    /// Environment variable: `LOG_REQUESTS`
    #[arg(long, env = "LOG_REQUESTS", default_value_t = false)]
    pub log_requests: bool,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub pool: PoolConfig,
    pub log_requests: bool,
}

impl TryFrom<CliArgs> for HostConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.pool_size == 0 {
            bail!("POOL_SIZE must be greater than 0");
        }

        if args.pool_size > MAX_POOL_SIZE {
            bail!(
                "POOL_SIZE ({}) exceeds the maximum of {}",
                args.pool_size,
                MAX_POOL_SIZE
            );
        }

        if args.readiness_timeout_secs > MAX_READINESS_TIMEOUT_SECS {
            bail!(
                "READINESS_TIMEOUT_SECS ({}) exceeds the maximum of {}",
                args.readiness_timeout_secs,
                MAX_READINESS_TIMEOUT_SECS
            );
        }

        if args.shutdown_timeout_secs > MAX_SHUTDOWN_TIMEOUT_SECS {
            bail!(
                "SHUTDOWN_TIMEOUT_SECS ({}) exceeds the maximum of {}",
                args.shutdown_timeout_secs,
                MAX_SHUTDOWN_TIMEOUT_SECS
            );
        }

        let mut pool = PoolConfig::default()
            .with_pool_size(args.pool_size)
            .with_shutdown_timeout(Duration::from_secs(args.shutdown_timeout_secs));
        if args.readiness_timeout_secs > 0 {
            pool = pool.with_readiness_timeout(Duration::from_secs(args.readiness_timeout_secs));
        }

        Ok(Self {
            pool,
            log_requests: args.log_requests,
        })
    }
}
