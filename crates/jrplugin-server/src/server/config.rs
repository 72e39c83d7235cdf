use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use jrplugin_core::types::DEFAULT_APP_PROTOCOL_VERSION;
use std::net::SocketAddr;
use tracing_subscriber::filter::LevelFilter;

/// Runtime configuration for the `jrplugin-server` binary.
///
/// The host normally launches the plugin without arguments, so every option
/// has an environment variable and a default that matches what JR hosts
/// expect. A `.env` file next to the binary is loaded first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "jrplugin-server",
    version,
    about = "A JR producer plugin speaking the go-plugin gRPC protocol"
)]
pub struct CliArgs {
    /// Loopback address to listen on (TCP), or a socket path with `--uds`.
    ///
    /// Use port 0 to let the OS pick a free port; the handshake line always
    /// reports the bound address.
    ///
    /// Environment variable: `PLUGIN_SERVER_ADDR`
    #[arg(long, env = "PLUGIN_SERVER_ADDR", default_value_t = String::from("127.0.0.1:1234"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `PLUGIN_SERVER_ADDR`
    /// must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Number of workers running `Produce` calls concurrently.
    ///
    /// Environment variable: `PLUGIN_NUM_WORKERS`
    #[arg(long, env = "PLUGIN_NUM_WORKERS", default_value_t = 10)]
    pub num_workers: usize,

    /// Application protocol version announced in the handshake.
    ///
    /// Environment variable: `PLUGIN_APP_PROTOCOL_VERSION`
    #[arg(long, env = "PLUGIN_APP_PROTOCOL_VERSION", default_value_t = DEFAULT_APP_PROTOCOL_VERSION)]
    pub app_protocol_version: u32,

    /// Seconds in-flight calls get to finish once shutdown starts.
    ///
    /// Environment variable: `PLUGIN_SHUTDOWN_TIMEOUT`
    #[arg(long, env = "PLUGIN_SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,

    /// Frames buffered between the log bridge and the stdio stream.
    ///
    /// Frames in this buffer are lost if the host disconnects, so keep it
    /// small.
    ///
    /// Environment variable: `PLUGIN_STREAM_BUFFER_SIZE`
    #[arg(long, env = "PLUGIN_STREAM_BUFFER_SIZE", default_value_t = 1)]
    pub stream_buffer_size: usize,

    /// Minimum level of log events mirrored to the host (`off`, `error`,
    /// `warn`, `info`, `debug`, `trace`).
    ///
    /// Environment variable: `PLUGIN_BRIDGE_LEVEL`
    #[arg(long, env = "PLUGIN_BRIDGE_LEVEL", default_value_t = String::from("info"))]
    pub bridge_level: String,

    /// Let `GRPCController/Shutdown` stop the server instead of only logging
    /// the request.
    ///
    /// Environment variable: `PLUGIN_HONOR_SHUTDOWN_RPC`
    #[arg(long, env = "PLUGIN_HONOR_SHUTDOWN_RPC", default_value_t = false)]
    pub honor_shutdown_rpc: bool,

    /// Environment variable the host sets to prove it launched the plugin.
    ///
    /// Environment variable: `PLUGIN_MAGIC_COOKIE_KEY`
    #[arg(long, env = "PLUGIN_MAGIC_COOKIE_KEY", default_value_t = String::from("JR_PRODUCER_PLUGIN"))]
    pub magic_cookie_key: String,

    /// Expected value of the magic cookie variable.
    ///
    /// Environment variable: `PLUGIN_MAGIC_COOKIE_VALUE`
    #[arg(long, env = "PLUGIN_MAGIC_COOKIE_VALUE", default_value_t = String::from("producer"))]
    pub magic_cookie_value: String,

    /// Do not check the magic cookie (for running the plugin by hand).
    #[arg(long, default_value_t = false)]
    pub skip_magic_cookie: bool,
}

/// Environment variable/value pair a host sets when it launches the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicCookie {
    pub key: String,
    pub value: String,
}

impl MagicCookie {
    /// Checks `lookup(key)` against the expected value.
    ///
    /// # Errors
    ///
    /// Fails with an explanation when the variable is missing or differs,
    /// which means the binary was not started by a plugin host.
    pub fn verify_with(&self, lookup: impl FnOnce(&str) -> Option<String>) -> anyhow::Result<()> {
        match lookup(&self.key) {
            Some(value) if value == self.value => Ok(()),
            _ => bail!(
                "This binary is a plugin and is not meant to be executed directly. \
                 Run the program that loads it instead (expected {}={}).",
                self.key,
                self.value
            ),
        }
    }

    /// Checks the process environment.
    pub fn verify(&self) -> anyhow::Result<()> {
        self.verify_with(|key| std::env::var(key).ok())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub num_workers: usize,
    pub app_protocol_version: u32,
    pub shutdown_timeout: Duration,
    pub stream_buffer_size: usize,
    pub bridge_level: LevelFilter,
    pub honor_shutdown_rpc: bool,
    pub magic_cookie: Option<MagicCookie>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("127.0.0.1:1234"),
            uds: false,
            num_workers: 10,
            app_protocol_version: DEFAULT_APP_PROTOCOL_VERSION,
            shutdown_timeout: Duration::from_secs(5),
            stream_buffer_size: 1,
            bridge_level: LevelFilter::INFO,
            honor_shutdown_rpc: false,
            magic_cookie: None,
        }
    }
}

impl ServerConfig {
    /// Parses and checks `server_addr` as a loopback TCP address.
    ///
    /// # Errors
    ///
    /// Fails for unparsable or non-loopback addresses such as `0.0.0.0`.
    pub fn loopback_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr: SocketAddr = self
            .server_addr
            .parse()
            .with_context(|| format!("invalid PLUGIN_SERVER_ADDR {:?}", self.server_addr))?;

        if !addr.ip().is_loopback() {
            bail!(
                "PLUGIN_SERVER_ADDR ({addr}) must be a loopback address; the plugin protocol is unauthenticated"
            );
        }

        Ok(addr)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("PLUGIN_NUM_WORKERS must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("PLUGIN_STREAM_BUFFER_SIZE must be greater than 0");
        }

        let bridge_level: LevelFilter = args
            .bridge_level
            .parse()
            .with_context(|| format!("invalid PLUGIN_BRIDGE_LEVEL {:?}", args.bridge_level))?;

        let magic_cookie = (!args.skip_magic_cookie).then(|| MagicCookie {
            key: args.magic_cookie_key,
            value: args.magic_cookie_value,
        });

        let config = Self {
            server_addr: args.server_addr,
            uds: args.uds,
            num_workers: args.num_workers,
            app_protocol_version: args.app_protocol_version,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            stream_buffer_size: args.stream_buffer_size,
            bridge_level,
            honor_shutdown_rpc: args.honor_shutdown_rpc,
            magic_cookie,
        };

        if !config.uds {
            config.loopback_addr()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("jrplugin-server").chain(args.iter().copied()))?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn defaults_match_the_protocol() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:1234");
        assert_eq!(config.num_workers, 10);
        assert_eq!(config.app_protocol_version, 1);
        assert_eq!(config.bridge_level, LevelFilter::INFO);
        assert!(!config.honor_shutdown_rpc);
        assert_eq!(
            config.magic_cookie,
            Some(MagicCookie {
                key: "JR_PRODUCER_PLUGIN".into(),
                value: "producer".into(),
            })
        );
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(parse(&["--num-workers", "0"]).is_err());
    }

    #[test]
    fn rejects_non_loopback_addresses() {
        let err = parse(&["--server-addr", "0.0.0.0:1234"]).unwrap_err();
        assert!(err.to_string().contains("loopback"));
        assert!(parse(&["--server-addr", "[::1]:0"]).is_ok());
    }

    #[test]
    fn uds_paths_skip_the_loopback_check() {
        let config = parse(&["--uds", "--server-addr", "/tmp/jrplugin.sock"]).unwrap();
        assert!(config.uds);
    }

    #[test]
    fn rejects_unknown_bridge_levels() {
        assert!(parse(&["--bridge-level", "loud"]).is_err());
        let config = parse(&["--bridge-level", "debug"]).unwrap();
        assert_eq!(config.bridge_level, LevelFilter::DEBUG);
    }

    #[test]
    fn skip_magic_cookie_disables_the_check() {
        let config = parse(&["--skip-magic-cookie"]).unwrap();
        assert!(config.magic_cookie.is_none());
    }

    #[test]
    fn magic_cookie_must_match() {
        let cookie = MagicCookie {
            key: "JR_PRODUCER_PLUGIN".into(),
            value: "producer".into(),
        };
        assert!(cookie.verify_with(|_| Some("producer".into())).is_ok());
        assert!(cookie.verify_with(|_| Some("consumer".into())).is_err());
        assert!(cookie.verify_with(|_| None).is_err());
    }
}
