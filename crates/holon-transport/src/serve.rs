//! Serve-flag surface.
//!
//! Helper binaries take their listen address as `--listen URI` or
//! `--port N`; the latter is shorthand for `tcp://:N`. With neither flag
//! the default endpoint applies.

use holon_uri::{self as uri, Uri};

use crate::error::{Result, TransportError};

/// Endpoint used when no serve flag is given.
pub const DEFAULT_LISTEN_URI: &str = "tcp://:9090";

/// Extract the listen endpoint from an argument vector.
///
/// Both `--flag value` and `--flag=value` spellings are accepted. The last
/// occurrence wins when flags repeat.
pub fn listen_uri_from_args(args: &[String]) -> Result<Uri> {
    let mut chosen: Option<String> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        match flag {
            "--listen" => {
                let value = take_value(inline, &mut iter, "--listen")?;
                chosen = Some(value);
            }
            "--port" => {
                let value = take_value(inline, &mut iter, "--port")?;
                let port: u16 = value.parse().map_err(|_| {
                    TransportError::InvalidUri(format!("--port {value}: not a port number"))
                })?;
                chosen = Some(format!("tcp://:{port}"));
            }
            _ => {}
        }
    }

    let raw = chosen.unwrap_or_else(|| DEFAULT_LISTEN_URI.to_string());
    Ok(uri::parse(&raw)?)
}

fn take_value<'a>(
    inline: Option<String>,
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<String> {
    if let Some(value) = inline {
        return Ok(value);
    }
    iter.next()
        .cloned()
        .ok_or_else(|| TransportError::InvalidUri(format!("{flag} requires a value")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use holon_uri::Scheme;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_to_tcp_9090() {
        let uri = listen_uri_from_args(&[]).expect("default parses");
        assert_eq!(uri.scheme, Scheme::Tcp);
        assert_eq!(uri.port, Some(9090));
    }

    #[test]
    fn listen_flag_takes_a_uri() {
        let uri = listen_uri_from_args(&args(&["--listen", "unix:///tmp/h.sock"]))
            .expect("listen flag parses");
        assert_eq!(uri.scheme, Scheme::Unix);
        assert_eq!(uri.path.as_deref(), Some("/tmp/h.sock"));

        let uri = listen_uri_from_args(&args(&["--listen=mem://certify"]))
            .expect("inline form parses");
        assert_eq!(uri.scheme, Scheme::Mem);
    }

    #[test]
    fn port_flag_rewrites_to_tcp() {
        let uri = listen_uri_from_args(&args(&["--port", "4422"])).expect("port flag parses");
        assert_eq!(uri.scheme, Scheme::Tcp);
        assert_eq!(uri.host.as_deref(), Some(holon_uri::ALL_INTERFACES));
        assert_eq!(uri.port, Some(4422));
    }

    #[test]
    fn missing_and_bad_values_fail() {
        assert!(listen_uri_from_args(&args(&["--listen"])).is_err());
        assert!(listen_uri_from_args(&args(&["--port", "zero"])).is_err());
        assert!(listen_uri_from_args(&args(&["--listen", "ftp://x"])).is_err());
    }
}
