//! Startup configuration: command line first, then environment, then
//! defaults.

use std::time::Duration;

use facet::Facet;
use figue as args;
use framestat_wire::DEFAULT_MAX_FRAME_BYTES;
use tracing::warn;

use crate::history::DEFAULT_HISTORY_SECS;
use crate::server::{DEFAULT_MAX_DEAD_SESSIONS, DEFAULT_POLL_INTERVAL, DispatchMode, ServerSettings};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5185";
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:5186";
pub const DEFAULT_MAX_SESSIONS: usize = 64;

#[derive(Facet, Debug)]
pub struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::named, default)]
    listen: Option<String>,
    #[facet(args::named, default)]
    http: Option<String>,
    #[facet(args::named, default)]
    history_secs: Option<String>,
    #[facet(args::named, default)]
    dispatch: Option<String>,
    #[facet(args::named, default)]
    max_sessions: Option<String>,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            listen: self.listen.clone(),
            http: self.http.clone(),
            history_secs: self.history_secs.clone(),
            dispatch: self.dispatch.clone(),
            max_sessions: self.max_sessions.clone(),
        }
    }
}

/// Values given on the command line, before any fallback.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen: Option<String>,
    pub http: Option<String>,
    pub history_secs: Option<String>,
    pub dispatch: Option<String>,
    pub max_sessions: Option<String>,
}

pub fn parse_cli() -> Result<Cli, String> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("framestat")
                .description("Collects frame timing data from profiled programs and serves it over HTTP")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;
    Ok(cli.value)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub http_addr: String,
    pub max_sessions: usize,
    pub history_secs: f64,
    pub dispatch: DispatchMode,
    pub max_frame_bytes: usize,
    pub poll_interval: Duration,
    pub max_dead_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            http_addr: DEFAULT_HTTP_ADDR.to_owned(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            history_secs: DEFAULT_HISTORY_SECS,
            dispatch: DispatchMode::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_dead_sessions: DEFAULT_MAX_DEAD_SESSIONS,
        }
    }
}

impl ServerConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, String> {
        Self::resolve(&cli.overrides(), |key| std::env::var(key).ok())
    }

    /// Builds the configuration from command-line values and an environment
    /// lookup. Bad numbers fall back to their default with a warning; a bad
    /// dispatch mode is an error.
    pub fn resolve(
        cli: &CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let pick = |flag: &Option<String>, key: &str| flag.clone().or_else(|| env(key));

        let listen_addr = pick(&cli.listen, "FRAMESTAT_LISTEN")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let http_addr =
            pick(&cli.http, "FRAMESTAT_HTTP").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_owned());

        let history_secs = parse_or_default(
            pick(&cli.history_secs, "FRAMESTAT_HISTORY_SECS"),
            "history window",
            DEFAULT_HISTORY_SECS,
            |v: &f64| v.is_finite() && *v > 0.0,
        );
        let max_sessions = parse_or_default(
            pick(&cli.max_sessions, "FRAMESTAT_MAX_SESSIONS"),
            "max sessions",
            DEFAULT_MAX_SESSIONS,
            |v: &usize| *v > 0,
        );
        let max_frame_bytes = parse_or_default(
            env("FRAMESTAT_MAX_FRAME_BYTES"),
            "FRAMESTAT_MAX_FRAME_BYTES",
            DEFAULT_MAX_FRAME_BYTES,
            |v: &usize| *v > 0,
        );
        let poll_ms = parse_or_default(
            env("FRAMESTAT_POLL_MS"),
            "FRAMESTAT_POLL_MS",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
            |v: &u64| *v > 0,
        );
        let max_dead_sessions = parse_or_default(
            env("FRAMESTAT_MAX_DEAD_SESSIONS"),
            "FRAMESTAT_MAX_DEAD_SESSIONS",
            DEFAULT_MAX_DEAD_SESSIONS,
            |_: &usize| true,
        );

        let dispatch = match pick(&cli.dispatch, "FRAMESTAT_DISPATCH") {
            Some(raw) => raw.parse::<DispatchMode>()?,
            None => DispatchMode::default(),
        };

        Ok(Self {
            listen_addr,
            http_addr,
            max_sessions,
            history_secs,
            dispatch,
            max_frame_bytes,
            poll_interval: Duration::from_millis(poll_ms),
            max_dead_sessions,
        })
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            dispatch: self.dispatch,
            history_secs: self.history_secs,
            max_frame_bytes: self.max_frame_bytes,
            poll_interval: self.poll_interval,
            max_dead_sessions: self.max_dead_sessions,
        }
    }
}

fn parse_or_default<T>(
    raw: Option<String>,
    what: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => v,
        _ => {
            warn!(value = %raw, %default, "invalid {what}, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ServerConfig::resolve(&CliOverrides::default(), env_from(&[]))
            .expect("defaults are valid");
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.http_addr, DEFAULT_HTTP_ADDR);
        assert_eq!(config.history_secs, DEFAULT_HISTORY_SECS);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(config.dispatch, DispatchMode::Threaded);
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.max_dead_sessions, DEFAULT_MAX_DEAD_SESSIONS);
    }

    #[test]
    fn flags_win_over_environment() {
        let cli = CliOverrides {
            listen: Some("0.0.0.0:7000".into()),
            history_secs: Some("12.5".into()),
            ..CliOverrides::default()
        };
        let env = env_from(&[
            ("FRAMESTAT_LISTEN", "127.0.0.1:1"),
            ("FRAMESTAT_HTTP", "127.0.0.1:8080"),
            ("FRAMESTAT_HISTORY_SECS", "3"),
            ("FRAMESTAT_DISPATCH", "cooperative"),
            ("FRAMESTAT_POLL_MS", "20"),
            ("FRAMESTAT_MAX_DEAD_SESSIONS", "0"),
        ]);
        let config = ServerConfig::resolve(&cli, env).expect("valid config");
        assert_eq!(config.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.http_addr, "127.0.0.1:8080");
        assert_eq!(config.history_secs, 12.5);
        assert_eq!(config.dispatch, DispatchMode::Cooperative);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.server_settings().history_secs, 12.5);
        assert_eq!(config.server_settings().max_dead_sessions, 0);
    }

    #[test]
    fn bad_numbers_fall_back_to_defaults() {
        let env = env_from(&[
            ("FRAMESTAT_HISTORY_SECS", "-4"),
            ("FRAMESTAT_MAX_SESSIONS", "lots"),
            ("FRAMESTAT_MAX_FRAME_BYTES", "0"),
            ("FRAMESTAT_POLL_MS", ""),
        ]);
        let config = ServerConfig::resolve(&CliOverrides::default(), env).expect("still valid");
        assert_eq!(config.history_secs, DEFAULT_HISTORY_SECS);
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn unknown_dispatch_mode_is_an_error() {
        let cli = CliOverrides {
            dispatch: Some("forked".into()),
            ..CliOverrides::default()
        };
        let err = ServerConfig::resolve(&cli, env_from(&[])).expect_err("not a mode");
        assert!(err.contains("forked"), "{err}");
    }
}
