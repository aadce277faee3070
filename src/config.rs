/**
 * CONNECT OPTIONS - Agent identity, broker URL, and credentials
 *
 * RÔLE :
 * The options that gate how this agent announces itself and which broker
 * it dials. `ConnectOptions` is filled from defaults, then from CLI flags;
 * command-line parsing is hand-rolled here rather than via a flags crate,
 * matching the rest of this workspace.
 */
use crate::error::AgentError;
use crate::identity;

pub const DEFAULT_DOMAIN: &str = "public.vrpc";
const TOKEN_USERNAME_SENTINEL: &str = "__token__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Mqtt,
    Ssl,
    Mqtts,
}

impl Scheme {
    fn parse(raw: &str) -> Option<Scheme> {
        match raw {
            "tcp" => Some(Scheme::Tcp),
            "mqtt" => Some(Scheme::Mqtt),
            "ssl" => Some(Scheme::Ssl),
            "mqtts" => Some(Scheme::Mqtts),
            _ => None,
        }
    }

    fn is_tls(self) -> bool {
        matches!(self, Scheme::Ssl | Scheme::Mqtts)
    }

    fn default_port(self) -> u16 {
        if self.is_tls() {
            8883
        } else {
            1883
        }
    }
}

/// A parsed broker URL: scheme, host and port, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn is_tls(&self) -> bool {
        self.scheme.is_tls()
    }

    /// Parses `scheme://host[:port]`. Missing scheme or host is a
    /// `Config` error; a missing port falls back to 1883/8883 by scheme.
    pub fn parse(url: &str) -> Result<Self, AgentError> {
        let (scheme_raw, rest) = url.split_once("://").ok_or_else(|| {
            AgentError::Config(format!(
                "missing scheme in broker url (use e.g. mqtts://<hostname>): {url}"
            ))
        })?;
        let scheme = Scheme::parse(scheme_raw)
            .ok_or_else(|| AgentError::Config(format!("unsupported broker scheme: {scheme_raw}")))?;

        if rest.is_empty() {
            return Err(AgentError::Config(format!("missing host in broker url: {url}")));
        }

        let (host, port) = match rest.split_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| AgentError::Config(format!("invalid port in broker url: {url}")))?;
                (host.to_string(), port)
            }
            None => (rest.to_string(), scheme.default_port()),
        };

        Ok(BrokerAddress { scheme, host, port })
    }
}

/// Credentials accepted by the transport. A `token` collapses to the
/// sentinel username `"__token__"` with the token carried as password,
/// mirroring the wire convention brokers of this family expect.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    fn from_parts(username: Option<String>, password: Option<String>, token: Option<String>) -> Self {
        match token {
            Some(token) => Credentials {
                username: Some(TOKEN_USERNAME_SENTINEL.to_string()),
                password: Some(token),
            },
            None => Credentials { username, password },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub domain: String,
    pub agent: String,
    pub broker: String,
    pub credentials: Credentials,
    pub version: Option<String>,
    pub plugin: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            agent: identity::generate_agent_name(),
            broker: "tcp://localhost:1883".to_string(),
            credentials: Credentials::default(),
            version: None,
            plugin: None,
        }
    }
}

impl ConnectOptions {
    pub fn broker_address(&self) -> Result<BrokerAddress, AgentError> {
        BrokerAddress::parse(&self.broker)
    }
}

/// Outcome of parsing argv: either options to run with, or a request to
/// print something and exit without connecting (`--help`/`--version`).
pub enum CliOutcome {
    Run(ConnectOptions),
    PrintAndExit(String),
}

/// Parses the thin CLI surface named in the external interfaces: `-d
/// domain`, `-a agent`, `-u username`, `-p password`, `-t token`, `-v
/// version`, `-b broker`, `-l plugin`, `--help`, `--version`.
///
/// `-p` is resolved as password (not plugin): the external-interfaces
/// listing names `-p password` and `-l plugin` as distinct flags, so this
/// implementation keeps them distinct rather than reproducing the
/// upstream ambiguity.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliOutcome, AgentError> {
    let mut opts = ConnectOptions::default();
    let mut token: Option<String> = None;
    let args: Vec<String> = args.into_iter().collect();

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--help" => return Ok(CliOutcome::PrintAndExit(help_text())),
            "--version" => return Ok(CliOutcome::PrintAndExit(env!("CARGO_PKG_VERSION").to_string())),
            "-d" | "-a" | "-u" | "-p" | "-t" | "-v" | "-b" | "-l" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    AgentError::Config(format!("missing value for flag {arg}"))
                })?;
                match arg {
                    "-d" => opts.domain = value.clone(),
                    "-a" => opts.agent = value.clone(),
                    "-u" => opts.credentials.username = Some(value.clone()),
                    "-p" => opts.credentials.password = Some(value.clone()),
                    "-t" => token = Some(value.clone()),
                    "-v" => opts.version = Some(value.clone()),
                    "-b" => opts.broker = value.clone(),
                    "-l" => opts.plugin = Some(value.clone()),
                    _ => unreachable!(),
                }
            }
            other => return Err(AgentError::Config(format!("unrecognized argument: {other}"))),
        }
        i += 1;
    }

    opts.credentials = Credentials::from_parts(
        opts.credentials.username.clone(),
        opts.credentials.password.clone(),
        token,
    );
    Ok(CliOutcome::Run(opts))
}

fn help_text() -> String {
    "usage: vrpc-agent -d <domain> -a <agent> -t <token> -u <user> -p <password> -b <broker> -l <plugin>"
        .to_string()
}
