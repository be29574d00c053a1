//! Connect-target parsing.

use std::fmt;

use crate::error::{BridgeError, BridgeResult};

/// The only transport scheme the client understands.
pub const SCHEME: &str = "udp";

/// Parsed `[udp://]host[:port]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Host name or IP literal, without brackets.
    pub host: String,
    /// Port, or the configured default when none was given.
    pub port: u16,
}

impl ConnectTarget {
    /// Parses `host`, `host:port`, `[v6]:port`, a bare IPv6 literal, or any
    /// of those behind `udp://`.
    ///
    /// # Errors
    ///
    /// `UnsupportedScheme` for any scheme other than `udp`, `InvalidTarget`
    /// for an empty host or an unparsable port.
    pub fn parse(input: &str, default_port: u16) -> BridgeResult<Self> {
        let input = input.trim();
        let rest = match input.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case(SCHEME) => rest,
            Some((scheme, _)) => return Err(BridgeError::UnsupportedScheme(scheme.to_string())),
            None => input,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let Some((host, tail)) = bracketed.split_once(']') else {
                return Err(BridgeError::InvalidTarget(input.to_string()));
            };
            let port = match tail {
                "" => None,
                _ => match tail.strip_prefix(':') {
                    Some(port) => Some(port),
                    None => return Err(BridgeError::InvalidTarget(input.to_string())),
                },
            };
            (host, port)
        } else if rest.matches(':').count() > 1 {
            // Unbracketed IPv6 literal, no port.
            (rest, None)
        } else {
            match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(BridgeError::InvalidTarget(input.to_string()));
        }
        let port = match port {
            None => default_port,
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| BridgeError::InvalidTarget(input.to_string()))?,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{SCHEME}://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{SCHEME}://{}:{}", self.host, self.port)
        }
    }
}
