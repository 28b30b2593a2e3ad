//! # Listener module
//!
//! This module provide the validation of gateway listeners which selects the
//! ports exposed by the data plane.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    net::IpAddr,
    str::FromStr,
};

use crate::svc::crd::gateway::{Listener, PROTOCOL_HTTP, PROTOCOL_HTTPS, PROTOCOL_TLS};

// -----------------------------------------------------------------------------
// Constants

const MAX_SUBDOMAIN_LENGTH: usize = 253;
const MAX_LABEL_LENGTH: usize = 63;

// -----------------------------------------------------------------------------
// Reason enumeration

/// why a listener is excluded from the provisioned ports
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Reason {
    UnsupportedProtocol(String),
    InvalidHostname(String),
    PortMismatch(i32),
    HostnameConflict,
    ProtocolConflict,
}

impl Display for Reason {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedProtocol(protocol) => write!(
                f,
                "protocol '{protocol}' is not supported, available options are '{PROTOCOL_HTTP}', '{PROTOCOL_HTTPS}' or '{PROTOCOL_TLS}'"
            ),
            Self::InvalidHostname(hostname) => write!(
                f,
                "hostname '{hostname}' must be a dns subdomain, optionally prefixed by a wildcard label, and not an ip address"
            ),
            Self::PortMismatch(port) => write!(
                f,
                "only one port is supported per protocol family, expected port {port}"
            ),
            Self::HostnameConflict => write!(
                f,
                "another listener uses the same port and hostname"
            ),
            Self::ProtocolConflict => write!(
                f,
                "port is already used by insecure listeners"
            ),
        }
    }
}

// -----------------------------------------------------------------------------
// Validation structure

/// outcome of the listeners validation, ports are unset when no valid listener
/// of the family exists
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Validation {
    pub insecure_port: Option<i32>,
    pub secure_port: Option<i32>,
    /// invalid listeners by name, in declaration order
    pub invalid: Vec<(String, Reason)>,
}

impl Validation {
    pub fn is_valid(&self, name: &str) -> bool {
        !self.invalid.iter().any(|(listener, _)| listener == name)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Family {
    Insecure,
    Secure,
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the hostname is a dns-1123 subdomain, optionally prefixed by the
/// `*.` wildcard label
pub fn is_valid_hostname(hostname: &str) -> bool {
    if IpAddr::from_str(hostname).is_ok() {
        return false;
    }

    let subdomain = hostname.strip_prefix("*.").unwrap_or(hostname);
    if subdomain.is_empty() || subdomain.len() > MAX_SUBDOMAIN_LENGTH {
        return false;
    }

    subdomain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LENGTH
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// validate listeners and returns the ports to program
pub fn validate(listeners: &[Listener]) -> Validation {
    let mut invalid = vec![];
    let mut candidates = vec![];
    let mut insecure_port = None;
    let mut secure_port = None;

    for listener in listeners {
        let family = match listener.protocol.as_str() {
            PROTOCOL_HTTP => Family::Insecure,
            PROTOCOL_HTTPS | PROTOCOL_TLS => Family::Secure,
            protocol => {
                invalid.push((listener.name.to_owned(), Reason::UnsupportedProtocol(protocol.to_string())));
                continue;
            }
        };

        if let Some(hostname) = &listener.hostname {
            if !is_valid_hostname(hostname) {
                invalid.push((listener.name.to_owned(), Reason::InvalidHostname(hostname.to_owned())));
                continue;
            }
        }

        let port = match family {
            Family::Insecure => insecure_port.get_or_insert(listener.port),
            Family::Secure => secure_port.get_or_insert(listener.port),
        };

        if *port != listener.port {
            invalid.push((listener.name.to_owned(), Reason::PortMismatch(*port)));
            continue;
        }

        candidates.push((listener, family));
    }

    // listeners sharing both port and hostname are all excluded
    let mut occurrences: BTreeMap<(i32, &str), usize> = BTreeMap::new();
    for (listener, _) in &candidates {
        *occurrences
            .entry((listener.port, listener.hostname.as_deref().unwrap_or_default()))
            .or_default() += 1;
    }

    let mut valid = vec![];
    for (listener, family) in candidates {
        let key = (listener.port, listener.hostname.as_deref().unwrap_or_default());
        if occurrences.get(&key).copied().unwrap_or_default() > 1 {
            invalid.push((listener.name.to_owned(), Reason::HostnameConflict));
            continue;
        }

        valid.push((listener, family));
    }

    let insecure_port = valid
        .iter()
        .find(|(_, family)| *family == Family::Insecure)
        .map(|(listener, _)| listener.port);

    let mut secure_port = valid
        .iter()
        .find(|(_, family)| *family == Family::Secure)
        .map(|(listener, _)| listener.port);

    if insecure_port.is_some() && insecure_port == secure_port {
        secure_port = None;
        for (listener, family) in &valid {
            if *family == Family::Secure {
                invalid.push((listener.name.to_owned(), Reason::ProtocolConflict));
            }
        }
    }

    // keep the declaration order in the report
    let position = |name: &str| listeners.iter().position(|l| l.name == name);
    invalid.sort_by_key(|(name, _)| position(name));

    Validation {
        insecure_port,
        secure_port,
        invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(name: &str, protocol: &str, port: i32, hostname: Option<&str>) -> Listener {
        Listener {
            name: name.to_string(),
            hostname: hostname.map(ToString::to_string),
            port,
            protocol: protocol.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn http_and_https_select_both_ports() {
        let validation = validate(&[
            listener("http", PROTOCOL_HTTP, 80, None),
            listener("https", PROTOCOL_HTTPS, 443, None),
        ]);

        assert_eq!(validation.insecure_port, Some(80));
        assert_eq!(validation.secure_port, Some(443));
        assert!(validation.invalid.is_empty());
    }

    #[test]
    fn tls_counts_as_secure() {
        let validation = validate(&[listener("passthrough", PROTOCOL_TLS, 8443, None)]);

        assert_eq!(validation.insecure_port, None);
        assert_eq!(validation.secure_port, Some(8443));
    }

    #[test]
    fn unsupported_protocol_is_excluded() {
        let validation = validate(&[
            listener("udp", "UDP", 53, None),
            listener("http", PROTOCOL_HTTP, 80, None),
        ]);

        assert_eq!(validation.insecure_port, Some(80));
        assert_eq!(
            validation.invalid,
            vec![("udp".to_string(), Reason::UnsupportedProtocol("UDP".to_string()))]
        );
    }

    #[test]
    fn second_port_of_a_family_is_excluded() {
        let validation = validate(&[
            listener("first", PROTOCOL_HTTP, 80, Some("a.example.com")),
            listener("second", PROTOCOL_HTTP, 8080, Some("b.example.com")),
        ]);

        assert_eq!(validation.insecure_port, Some(80));
        assert_eq!(
            validation.invalid,
            vec![("second".to_string(), Reason::PortMismatch(80))]
        );
        assert!(validation.is_valid("first"));
    }

    #[test]
    fn same_port_and_hostname_conflict() {
        let validation = validate(&[
            listener("first", PROTOCOL_HTTP, 80, Some("example.com")),
            listener("second", PROTOCOL_HTTP, 80, Some("example.com")),
            listener("third", PROTOCOL_HTTP, 80, Some("other.example.com")),
        ]);

        assert_eq!(validation.insecure_port, Some(80));
        assert!(!validation.is_valid("first"));
        assert!(!validation.is_valid("second"));
        assert!(validation.is_valid("third"));
    }

    #[test]
    fn secure_family_is_dropped_on_shared_port() {
        let validation = validate(&[
            listener("http", PROTOCOL_HTTP, 80, Some("a.example.com")),
            listener("https", PROTOCOL_HTTPS, 80, Some("b.example.com")),
        ]);

        assert_eq!(validation.insecure_port, Some(80));
        assert_eq!(validation.secure_port, None);
        assert_eq!(
            validation.invalid,
            vec![("https".to_string(), Reason::ProtocolConflict)]
        );
    }

    #[test]
    fn hostnames_are_checked() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("*.example.com"));
        assert!(is_valid_hostname("a-b.c1"));
        assert!(!is_valid_hostname("10.0.0.1"));
        assert!(!is_valid_hostname("Example.com"));
        assert!(!is_valid_hostname("-example.com"));
        assert!(!is_valid_hostname("example..com"));
        assert!(!is_valid_hostname("*.*.example.com"));
        assert!(!is_valid_hostname(""));

        let validation = validate(&[listener("ip", PROTOCOL_HTTP, 80, Some("10.0.0.1"))]);
        assert_eq!(validation.insecure_port, None);
        assert_eq!(
            validation.invalid,
            vec![("ip".to_string(), Reason::InvalidHostname("10.0.0.1".to_string()))]
        );
    }
}
