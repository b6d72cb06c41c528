use anyhow::{Result, anyhow};
use clap::Parser;
use limitcrab::{
    RateLimiterConfig, SlidingWindowCounterConfig, SlidingWindowLogConfig, StrategiesConfig,
    TokenBucketConfig,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: ListenConfig,
    pub redis_url: String,
    pub limiter: RateLimiterConfig,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

const KNOWN_STRATEGIES: [&str; 3] = [
    "token_bucket",
    "sliding_window_log",
    "sliding_window_counter",
];

#[derive(Parser, Debug)]
#[command(
    name = "limitcrab-server",
    about = "Redis-backed distributed rate limiting service",
    long_about = "A distributed rate limiting service. Per-key counters live in Redis, so any number of server replicas share one consistent view of each client's budget.\n\nEnvironment variables with LIMITCRAB_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // HTTP listener
    #[arg(
        long,
        value_name = "HOST",
        help = "Listen host",
        default_value = "127.0.0.1",
        env = "LIMITCRAB_HOST"
    )]
    pub host: String,
    #[arg(
        long,
        value_name = "PORT",
        help = "Listen port",
        default_value_t = 8080,
        env = "LIMITCRAB_PORT"
    )]
    pub port: u16,

    // Store
    #[arg(
        long,
        value_name = "URL",
        help = "Redis URL",
        default_value = "redis://127.0.0.1:6379",
        env = "LIMITCRAB_REDIS_URL"
    )]
    pub redis_url: String,

    // Strategy selection
    #[arg(
        long,
        value_name = "NAME",
        help = "Strategy: token_bucket, sliding_window_log, sliding_window_counter",
        default_value = "sliding_window_counter",
        env = "LIMITCRAB_STRATEGY"
    )]
    pub strategy: String,

    // Token bucket
    #[arg(
        long,
        value_name = "N",
        help = "Token bucket capacity",
        default_value_t = 100,
        env = "LIMITCRAB_TB_BUCKET_SIZE"
    )]
    pub tb_bucket_size: i64,
    #[arg(
        long,
        value_name = "N",
        help = "Token bucket refill rate (tokens per second)",
        default_value_t = 10,
        env = "LIMITCRAB_TB_REFILL_RATE"
    )]
    pub tb_refill_rate: i64,
    #[arg(
        long,
        value_name = "PREFIX",
        help = "Token bucket key prefix",
        default_value = "rl:tb",
        env = "LIMITCRAB_TB_KEY_PREFIX"
    )]
    pub tb_key_prefix: String,
    #[arg(
        long,
        value_name = "SECS",
        help = "Token bucket TTL buffer (seconds)",
        default_value_t = 5,
        env = "LIMITCRAB_TB_TTL_BUFFER"
    )]
    pub tb_ttl_buffer: i64,

    // Sliding window log
    #[arg(
        long,
        value_name = "SECS",
        help = "Sliding window log window size (seconds)",
        default_value_t = 3600,
        env = "LIMITCRAB_SWL_WINDOW_SECONDS"
    )]
    pub swl_window_seconds: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Sliding window log bucket size",
        default_value_t = 1000,
        env = "LIMITCRAB_SWL_BUCKET_SIZE"
    )]
    pub swl_bucket_size: i64,
    #[arg(
        long,
        value_name = "PREFIX",
        help = "Sliding window log key prefix",
        default_value = "rl:swl",
        env = "LIMITCRAB_SWL_KEY_PREFIX"
    )]
    pub swl_key_prefix: String,
    #[arg(
        long,
        value_name = "SECS",
        help = "Sliding window log TTL buffer (seconds)",
        default_value_t = 30,
        env = "LIMITCRAB_SWL_TTL_BUFFER"
    )]
    pub swl_ttl_buffer: i64,

    // Sliding window counter
    #[arg(
        long,
        value_name = "SECS",
        help = "Sliding window counter window size (seconds)",
        default_value_t = 3600,
        env = "LIMITCRAB_SWC_WINDOW_SECONDS"
    )]
    pub swc_window_seconds: u64,
    #[arg(
        long,
        value_name = "N",
        help = "Sliding window counter bucket size",
        default_value_t = 1000,
        env = "LIMITCRAB_SWC_BUCKET_SIZE"
    )]
    pub swc_bucket_size: i64,
    #[arg(
        long,
        value_name = "PREFIX",
        help = "Sliding window counter key prefix",
        default_value = "rl:swc",
        env = "LIMITCRAB_SWC_KEY_PREFIX"
    )]
    pub swc_key_prefix: String,
    #[arg(
        long,
        value_name = "SECS",
        help = "Sliding window counter TTL buffer (seconds)",
        default_value_t = 15,
        env = "LIMITCRAB_SWC_TTL_BUFFER"
    )]
    pub swc_ttl_buffer: i64,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "LIMITCRAB_LOG_LEVEL"
    )]
    pub log_level: String,
}

impl Config {
    pub fn from_env_and_args() -> Result<Self> {
        // Clap resolves precedence: CLI arguments, then environment
        // variables, then defaults.
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let config = Config {
            listen: ListenConfig {
                host: args.host,
                port: args.port,
            },
            redis_url: args.redis_url,
            limiter: RateLimiterConfig {
                strategy: args.strategy,
                strategies: StrategiesConfig {
                    token_bucket: TokenBucketConfig {
                        key_prefix: args.tb_key_prefix,
                        ttl_buffer_seconds: args.tb_ttl_buffer,
                        bucket_size: args.tb_bucket_size,
                        refill_rate_per_second: args.tb_refill_rate,
                    },
                    sliding_window_log: SlidingWindowLogConfig {
                        key_prefix: args.swl_key_prefix,
                        ttl_buffer_seconds: args.swl_ttl_buffer,
                        window_size_seconds: args.swl_window_seconds,
                        bucket_size: args.swl_bucket_size,
                    },
                    sliding_window_counter: SlidingWindowCounterConfig {
                        key_prefix: args.swc_key_prefix,
                        ttl_buffer_seconds: args.swc_ttl_buffer,
                        window_size_seconds: args.swc_window_seconds,
                        bucket_size: args.swc_bucket_size,
                    },
                },
            },
            log_level: args.log_level,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !KNOWN_STRATEGIES.contains(&self.limiter.strategy.as_str()) {
            return Err(anyhow!(
                "Invalid strategy: {}. Valid options are: {}",
                self.limiter.strategy,
                KNOWN_STRATEGIES.join(", ")
            ));
        }

        Ok(())
    }
}
