//! Minimal SIP address parsing.
//!
//! Only the shape the mock endpoint and the call controls need is accepted:
//! `sip:user@host` or `sips:user@host`, with an optional `:port`. URI
//! parameters (`;transport=tcp`) and headers (`?subject=x`) are tolerated and
//! dropped.

use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, SessionError};

/// A parsed `scheme:user@host[:port]` address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipUri {
    pub scheme: String,
    pub user: String,
    pub host: String,
    pub port: Option<u16>,
}

impl SipUri {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        SipUri {
            scheme: "sip".to_string(),
            user: user.into(),
            host: host.into(),
            port: None,
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let raw = uri.trim();
        let fail = |reason: &str| SessionError::invalid_uri(raw, reason);

        let (scheme, rest) = raw.split_once(':').ok_or_else(|| fail("missing scheme"))?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "sip" && scheme != "sips" {
            return Err(fail(&format!("unsupported scheme '{}'", scheme)));
        }

        let rest = rest.split(|c| c == ';' || c == '?').next().unwrap_or_default();
        let (user, host_part) = rest.split_once('@').ok_or_else(|| fail("missing user part"))?;
        if user.is_empty() || user.chars().any(char::is_whitespace) {
            return Err(fail("invalid user part"));
        }

        let (host, port) = if let Some(v6) = host_part.strip_prefix('[') {
            let (host, tail) = v6.split_once(']').ok_or_else(|| fail("unterminated IPv6 host"))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => Some(parse_port(p).ok_or_else(|| fail("invalid port"))?),
                None if tail.is_empty() => None,
                None => return Err(fail("unexpected text after host")),
            };
            (host.to_string(), port)
        } else {
            match host_part.split_once(':') {
                Some((host, p)) => (
                    host.to_string(),
                    Some(parse_port(p).ok_or_else(|| fail("invalid port"))?),
                ),
                None => (host_part.to_string(), None),
            }
        };

        if host.is_empty() {
            return Err(fail("missing host"));
        }
        if !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
        {
            return Err(fail("invalid host"));
        }

        Ok(SipUri {
            scheme,
            user: user.to_string(),
            host,
            port,
        })
    }

    /// Whether `uri` parses as a SIP address
    pub fn is_valid(uri: &str) -> bool {
        Self::parse(uri).is_ok()
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|p| *p != 0)
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@", self.scheme, self.user)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl FromStr for SipUri {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let uri = SipUri::parse("sip:a@b.com").unwrap();
        assert_eq!(uri.scheme, "sip");
        assert_eq!(uri.user, "a");
        assert_eq!(uri.host, "b.com");
        assert_eq!(uri.port, None);
        assert_eq!(uri.to_string(), "sip:a@b.com");
    }

    #[test]
    fn test_parse_port_and_params() {
        let uri: SipUri = "SIPS:bob@10.0.0.1:5061;transport=tls".parse().unwrap();
        assert_eq!(uri.scheme, "sips");
        assert_eq!(uri.host, "10.0.0.1");
        assert_eq!(uri.port, Some(5061));
        assert_eq!(uri.to_string(), "sips:bob@10.0.0.1:5061");
    }

    #[test]
    fn test_parse_ipv6_host() {
        let uri = SipUri::parse("sip:carol@[2001:db8::1]:5060").unwrap();
        assert_eq!(uri.host, "2001:db8::1");
        assert_eq!(uri.port, Some(5060));
        assert_eq!(uri.to_string(), "sip:carol@[2001:db8::1]:5060");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "not-a-uri",
            "http:a@b.com",
            "sip:b.com",
            "sip:@b.com",
            "sip:a@",
            "sip:a@b.com:notaport",
            "sip:a b@c.com",
            "sip:a@b_c!.com",
        ] {
            assert!(
                matches!(SipUri::parse(bad), Err(SessionError::InvalidUri { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_error_names_the_constraint() {
        let err = SipUri::parse("sip:example.com").unwrap_err();
        assert_eq!(err.to_string(), "Invalid SIP URI 'sip:example.com': missing user part");
    }
}
