//! URI model for holon transport endpoints.
//!
//! Endpoints are addressed by scheme-tagged URIs: `tcp://host:port`,
//! `unix:///path`, `stdio://`, `mem://name`, and the WebSocket pair
//! `ws://` / `wss://`. Parsing is pure (no I/O, no name resolution) and
//! total apart from [`UriError::Invalid`] and [`UriError::Unsupported`].
//!
//! Parsed URIs print back in canonical form, so
//! `parse(&parsed.to_string())` reproduces the same descriptor.

use std::fmt;

/// Default port for `tcp://` URIs with no explicit port.
pub const DEFAULT_TCP_PORT: u16 = 9090;
/// Default port for `ws://` URIs with no explicit port.
pub const DEFAULT_WS_PORT: u16 = 80;
/// Default port for `wss://` URIs with no explicit port.
pub const DEFAULT_WSS_PORT: u16 = 443;
/// Default request path for `ws://` / `wss://` URIs with no explicit path.
pub const DEFAULT_WS_PATH: &str = "/grpc";

/// Host used when a `tcp://` authority leaves the host empty.
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// Error parsing an endpoint URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// The URI is malformed (bad authority, missing required part, ...).
    Invalid(String),
    /// The scheme is not one this SDK knows about.
    Unsupported(String),
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::Invalid(msg) => write!(f, "invalid URI: {msg}"),
            UriError::Unsupported(msg) => write!(f, "unsupported URI: {msg}"),
        }
    }
}

impl std::error::Error for UriError {}

/// The six schemes an endpoint URI may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Tcp,
    Unix,
    Stdio,
    Mem,
    Ws,
    Wss,
}

impl Scheme {
    /// The scheme token as it appears before `://`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Unix => "unix",
            Scheme::Stdio => "stdio",
            Scheme::Mem => "mem",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "tcp" => Scheme::Tcp,
            "unix" => Scheme::Unix,
            "stdio" => Scheme::Stdio,
            "mem" => Scheme::Mem,
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            _ => return None,
        })
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded endpoint URI.
///
/// `host`/`port` are populated for `tcp`, `ws` and `wss`; `path` holds the
/// socket path for `unix`, the listener name for `mem` (possibly empty),
/// and the request path for `ws`/`wss`. IPv6 hosts are stored without
/// brackets and re-bracketed on output.
///
/// Equality ignores `raw`: two URIs are the same endpoint if their decoded
/// parts agree, whatever spelling they were parsed from.
#[derive(Debug, Clone)]
pub struct Uri {
    /// The input this descriptor was parsed from.
    pub raw: String,
    pub scheme: Scheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
    }
}

impl Eq for Uri {}

impl Uri {
    /// Build a `tcp://` URI from a concrete bound address.
    pub fn tcp(host: &str, port: u16) -> Self {
        let raw = format!("tcp://{}", authority(host, port));
        Uri {
            raw,
            scheme: Scheme::Tcp,
            host: Some(host.to_string()),
            port: Some(port),
            path: None,
        }
    }

    /// Build a `unix://` URI for a socket path.
    pub fn unix(path: &str) -> Self {
        Uri {
            raw: format!("unix://{path}"),
            scheme: Scheme::Unix,
            host: None,
            port: None,
            path: Some(path.to_string()),
        }
    }

    /// Build a `mem://` URI for a named in-process listener.
    pub fn mem(name: &str) -> Self {
        Uri {
            raw: format!("mem://{name}"),
            scheme: Scheme::Mem,
            host: None,
            port: None,
            path: Some(name.to_string()),
        }
    }

    /// The `stdio://` URI.
    pub fn stdio() -> Self {
        Uri {
            raw: "stdio://".to_string(),
            scheme: Scheme::Stdio,
            host: None,
            port: None,
            path: None,
        }
    }

    /// `host:port` with the host re-bracketed when it embeds colons.
    ///
    /// Empty for schemes without an authority.
    pub fn authority(&self) -> String {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => authority(host, port),
            _ => String::new(),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Tcp => write!(f, "tcp://{}", self.authority()),
            Scheme::Unix => write!(f, "unix://{}", self.path.as_deref().unwrap_or("")),
            Scheme::Stdio => f.write_str("stdio://"),
            Scheme::Mem => write!(f, "mem://{}", self.path.as_deref().unwrap_or("")),
            Scheme::Ws | Scheme::Wss => write!(
                f,
                "{}://{}{}",
                self.scheme,
                self.authority(),
                self.path.as_deref().unwrap_or(DEFAULT_WS_PATH),
            ),
        }
    }
}

/// Format `host:port`, bracketing hosts that embed colons (IPv6 literals).
pub fn authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// The scheme token of `raw`: everything before `://`, or `raw` itself
/// when no separator is present.
pub fn scheme_of(raw: &str) -> &str {
    match raw.find("://") {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

/// Parse an endpoint URI.
pub fn parse(raw: &str) -> Result<Uri, UriError> {
    let (token, rest) = match raw.split_once("://") {
        Some(parts) => parts,
        None => {
            return Err(UriError::Invalid(format!("{raw}: missing '://'")));
        }
    };

    let scheme = Scheme::from_token(token)
        .ok_or_else(|| UriError::Unsupported(format!("{raw}: unknown scheme {token:?}")))?;

    match scheme {
        Scheme::Tcp => {
            let (host, port) = split_host_port(raw, rest)?;
            let host = if host.is_empty() {
                ALL_INTERFACES.to_string()
            } else {
                host
            };
            Ok(Uri {
                raw: raw.to_string(),
                scheme,
                host: Some(host),
                port: Some(port.unwrap_or(DEFAULT_TCP_PORT)),
                path: None,
            })
        }
        Scheme::Unix => {
            if rest.is_empty() {
                return Err(UriError::Invalid(format!("{raw}: unix:// requires a socket path")));
            }
            Ok(Uri {
                raw: raw.to_string(),
                scheme,
                host: None,
                port: None,
                path: Some(rest.to_string()),
            })
        }
        Scheme::Stdio => {
            if !rest.is_empty() {
                return Err(UriError::Invalid(format!("{raw}: stdio:// takes no address")));
            }
            Ok(Uri {
                raw: raw.to_string(),
                scheme,
                host: None,
                port: None,
                path: None,
            })
        }
        Scheme::Mem => Ok(Uri {
            raw: raw.to_string(),
            scheme,
            host: None,
            port: None,
            path: Some(rest.to_string()),
        }),
        Scheme::Ws | Scheme::Wss => {
            let (auth, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            let (host, port) = split_host_port(raw, auth)?;
            let host = if host.is_empty() {
                ALL_INTERFACES.to_string()
            } else {
                host
            };
            let default_port = if scheme == Scheme::Ws {
                DEFAULT_WS_PORT
            } else {
                DEFAULT_WSS_PORT
            };
            let path = if path.is_empty() { DEFAULT_WS_PATH } else { path };
            Ok(Uri {
                raw: raw.to_string(),
                scheme,
                host: Some(host),
                port: Some(port.unwrap_or(default_port)),
                path: Some(path.to_string()),
            })
        }
    }
}

/// Split an authority into host and optional port.
///
/// Accepts `host`, `host:port`, `[v6]` and `[v6]:port`; the returned host
/// carries no brackets.
fn split_host_port(raw: &str, auth: &str) -> Result<(String, Option<u16>), UriError> {
    if let Some(inner) = auth.strip_prefix('[') {
        let (host, tail) = inner
            .split_once(']')
            .ok_or_else(|| UriError::Invalid(format!("{raw}: unterminated '[' in host")))?;
        let port = match tail {
            "" => None,
            _ => {
                let digits = tail
                    .strip_prefix(':')
                    .ok_or_else(|| UriError::Invalid(format!("{raw}: junk after ']'")))?;
                Some(parse_port(raw, digits)?)
            }
        };
        return Ok((host.to_string(), port));
    }

    match auth.split_once(':') {
        None => Ok((auth.to_string(), None)),
        Some((host, digits)) => {
            if digits.contains(':') {
                return Err(UriError::Invalid(format!(
                    "{raw}: IPv6 hosts must be bracketed"
                )));
            }
            let port = if digits.is_empty() {
                None
            } else {
                Some(parse_port(raw, digits)?)
            };
            Ok((host.to_string(), port))
        }
    }
}

fn parse_port(raw: &str, digits: &str) -> Result<u16, UriError> {
    digits
        .parse::<u16>()
        .map_err(|_| UriError::Invalid(format!("{raw}: bad port {digits:?}")))
}
