//! Agent configuration: CLI flags first, then `BEATCAST_*` environment, then defaults.

use std::time::Duration;

use crate::error::{AgentError, Result};

pub const DEFAULT_INDEX: &str = "metricbeat";
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PORT: u16 = 4000;

pub const USAGE: &str = "Usage: beatcast_agent --backend URL|-b URL [--index NAME|-i NAME] \
[--window DUR|-w DUR] [--interval DUR] [--port PORT|-p PORT] [--profile full|minimal] \
[--timeout DUR] [--log-level LEVEL]";

/// Which query/transform pair the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryProfile {
    /// Full host telemetry aggregates.
    #[default]
    Full,
    /// Latest document's timestamp and hostname only.
    Minimal,
}

impl std::str::FromStr for QueryProfile {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(QueryProfile::Full),
            "minimal" => Ok(QueryProfile::Minimal),
            other => Err(AgentError::InvalidConfig(format!("unknown profile '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub backend_url: String,
    pub index: String,
    pub window: Duration,
    pub interval: Duration,
    pub port: u16,
    pub profile: QueryProfile,
    pub backend_timeout: Option<Duration>,
    pub log_level: String,
}

impl AgentConfig {
    /// Config with defaults for everything but the backend endpoint.
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            index: DEFAULT_INDEX.to_string(),
            window: DEFAULT_WINDOW,
            interval: DEFAULT_INTERVAL,
            port: DEFAULT_PORT,
            profile: QueryProfile::Full,
            backend_timeout: None,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum Command {
    Help,
    Run(AgentConfig),
}

#[derive(Default)]
struct RawSettings {
    backend: Option<String>,
    index: Option<String>,
    window: Option<String>,
    interval: Option<String>,
    port: Option<String>,
    profile: Option<String>,
    timeout: Option<String>,
    log_level: Option<String>,
}

/// Parse process args (first item is the program name) with `env` as the fallback source.
pub fn parse_args<I, F>(args: I, env: F) -> Result<Command>
where
    I: IntoIterator<Item = String>,
    F: Fn(&str) -> Option<String>,
{
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut raw = RawSettings::default();

    while let Some(arg) = it.next() {
        // --flag=value form
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let slot = match flag.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--backend" | "-b" => &mut raw.backend,
            "--index" | "-i" => &mut raw.index,
            "--window" | "-w" => &mut raw.window,
            "--interval" => &mut raw.interval,
            "--port" | "-p" => &mut raw.port,
            "--profile" => &mut raw.profile,
            "--timeout" => &mut raw.timeout,
            "--log-level" => &mut raw.log_level,
            _ => {
                return Err(AgentError::InvalidConfig(format!(
                    "unexpected argument '{arg}'. {USAGE}"
                )))
            }
        };
        let value = match inline {
            Some(v) => Some(v),
            None => it.next(),
        };
        match value {
            Some(v) if !v.is_empty() => *slot = Some(v),
            _ => {
                return Err(AgentError::InvalidConfig(format!(
                    "missing value for {flag}"
                )))
            }
        }
    }

    let or_env = |v: Option<String>, key: &str| v.or_else(|| env(key).filter(|s| !s.is_empty()));

    let backend_url = or_env(raw.backend, "BEATCAST_BACKEND").ok_or_else(|| {
        AgentError::InvalidConfig(format!("a backend URL is required. {USAGE}"))
    })?;
    let mut cfg = AgentConfig::new(backend_url.trim_end_matches('/'));

    if let Some(index) = or_env(raw.index, "BEATCAST_INDEX") {
        cfg.index = index;
    }
    if let Some(w) = or_env(raw.window, "BEATCAST_WINDOW") {
        cfg.window = parse_duration(&w)?;
        if cfg.window < Duration::from_secs(1) {
            return Err(AgentError::InvalidConfig(
                "window must be at least one second".into(),
            ));
        }
    }
    if let Some(i) = or_env(raw.interval, "BEATCAST_INTERVAL") {
        cfg.interval = parse_duration(&i)?;
    }
    if let Some(p) = or_env(raw.port, "BEATCAST_PORT") {
        cfg.port = p
            .parse()
            .map_err(|_| AgentError::InvalidConfig(format!("invalid port '{p}'")))?;
    }
    if let Some(p) = or_env(raw.profile, "BEATCAST_PROFILE") {
        cfg.profile = p.parse()?;
    }
    if let Some(t) = or_env(raw.timeout, "BEATCAST_TIMEOUT") {
        cfg.backend_timeout = Some(parse_duration(&t)?);
    }
    if let Some(l) = or_env(raw.log_level, "BEATCAST_LOG") {
        cfg.log_level = l;
    }
    Ok(Command::Run(cfg))
}

/// Parses `250ms`, `30s`, `15m`, `1h`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let invalid = || AgentError::InvalidConfig(format!("invalid duration '{s}'"));
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let d = match unit {
        "ms" => Duration::from_millis(n),
        "" | "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(n.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    if d.is_zero() {
        return Err(AgentError::InvalidConfig(format!("duration '{s}' must be non-zero")));
    }
    Ok(d)
}
