use std::fmt;
use std::str::FromStr;

use crate::error::StompError;

/// Default STOMP broker port.
pub const DEFAULT_PORT: u16 = 61613;

/// One broker endpoint: `scheme://host:port`.
///
/// The scheme is preserved verbatim for transport selection (`tcp`, `ssl`,
/// ...); this crate dials every scheme over TCP and leaves TLS wrapping to
/// the caller's transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

fn parse_endpoint(uri: &str, input: &str) -> Result<Endpoint, StompError> {
    let invalid = |reason: &str| StompError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = input
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(invalid("missing host"));
    }
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| invalid("port is not a number"))?;
            (host, port)
        }
        None => (rest, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok(Endpoint {
        scheme: scheme.to_string(),
        host: host.to_string(),
        port,
    })
}

/// A parsed broker URI: either a single endpoint or a
/// `failover://(u1,u2,…)?randomize=bool` list tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUri {
    pub endpoints: Vec<Endpoint>,
    pub randomize: bool,
}

impl FromStr for BrokerUri {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if let Some(rest) = input.strip_prefix("failover://") {
            let (list, query) = match rest.split_once('?') {
                Some((list, query)) => (list, Some(query)),
                None => (rest, None),
            };
            let list = list
                .strip_prefix('(')
                .and_then(|l| l.strip_suffix(')'))
                .unwrap_or(list);
            let endpoints = list
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| parse_endpoint(input, part))
                .collect::<Result<Vec<_>, _>>()?;
            if endpoints.is_empty() {
                return Err(StompError::InvalidUri {
                    uri: input.to_string(),
                    reason: "failover list is empty".to_string(),
                });
            }
            let mut randomize = false;
            if let Some(query) = query {
                for pair in query.split('&') {
                    if let Some((key, value)) = pair.split_once('=') {
                        if key == "randomize" {
                            randomize = value.eq_ignore_ascii_case("true");
                        }
                    }
                }
            }
            Ok(BrokerUri {
                endpoints,
                randomize,
            })
        } else {
            Ok(BrokerUri {
                endpoints: vec![parse_endpoint(input, input)?],
                randomize: false,
            })
        }
    }
}

impl fmt::Display for BrokerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.endpoints.len() == 1 && !self.randomize {
            return write!(f, "{}", self.endpoints[0]);
        }
        write!(f, "failover://(")?;
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", endpoint)?;
        }
        write!(f, ")?randomize={}", self.randomize)
    }
}
