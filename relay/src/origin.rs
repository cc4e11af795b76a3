//! Static allow-list of browser origins permitted to open a session.

use std::collections::BTreeSet;
use std::net::{IpAddr, UdpSocket};

/// Ports the companion web frontends are served from.
pub const DEFAULT_ORIGIN_PORTS: [u16; 4] = [5000, 3000, 8000, 8443];

const ABSENT_ORIGIN: &str = "null"; // file:// pages and non-browser clients

#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: BTreeSet<String>,
    allow_absent: bool,
}

impl OriginPolicy {
    /// Allows `http` and `https` for every host/port combination.
    pub fn new<I, S>(hosts: I, ports: &[u16], allow_absent: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = BTreeSet::new();
        for host in hosts {
            let host = host.as_ref().to_ascii_lowercase();
            let host = if host.contains(':') && !host.starts_with('[') {
                format!("[{host}]") // bare IPv6 literal
            } else {
                host
            };
            for port in ports {
                allowed.insert(format!("http://{host}:{port}"));
                allowed.insert(format!("https://{host}:{port}"));
            }
        }
        Self {
            allowed,
            allow_absent,
        }
    }

    /// Loopback names, this machine's address and any extra hosts.
    pub fn for_local_network(extra_hosts: &[String], ports: &[u16], allow_absent: bool) -> Self {
        let mut hosts = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        if let Some(ip) = local_ip() {
            hosts.push(ip.to_string());
        }
        hosts.extend(extra_hosts.iter().cloned());
        Self::new(hosts, ports, allow_absent)
    }

    pub fn admits(&self, origin: Option<&str>) -> bool {
        let origin = match origin.map(str::trim) {
            None | Some("") => return self.allow_absent,
            Some(o) if o.eq_ignore_ascii_case(ABSENT_ORIGIN) => return self.allow_absent,
            Some(o) => o.trim_end_matches('/').to_ascii_lowercase(),
        };
        self.allowed.contains(&origin)
    }

    /// Every accepted origin, in a stable order, for the startup log.
    pub fn origins(&self) -> Vec<&str> {
        let mut origins: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        if self.allow_absent {
            origins.push(ABSENT_ORIGIN);
        }
        origins
    }
}

/// Address of the interface that routes outward. No packet is sent.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> OriginPolicy {
        OriginPolicy::new(["localhost", "127.0.0.1"], &DEFAULT_ORIGIN_PORTS, true)
    }

    #[test]
    fn admits_known_origins() {
        let policy = fixed();
        assert!(policy.admits(Some("https://localhost:5000")));
        assert!(policy.admits(Some("http://127.0.0.1:8443")));
        assert!(policy.admits(Some("HTTPS://LOCALHOST:3000/")));
    }

    #[test]
    fn rejects_unknown_origins() {
        let policy = fixed();
        assert!(!policy.admits(Some("https://evil.example:5000")));
        assert!(!policy.admits(Some("https://localhost:9999")));
        assert!(!policy.admits(Some("https://localhost")));
        assert!(!policy.admits(Some("https://localhost.evil.example:5000")));
    }

    #[test]
    fn absent_origin_follows_flag() {
        assert!(fixed().admits(None));
        assert!(fixed().admits(Some("null")));

        let strict = OriginPolicy::new(["localhost"], &[5000], false);
        assert!(!strict.admits(None));
        assert!(!strict.admits(Some("null")));
        assert!(strict.admits(Some("http://localhost:5000")));
    }

    #[test]
    fn lists_both_schemes_for_every_pair() {
        let policy = OriginPolicy::new(["localhost", "::1"], &[5000, 8443], true);
        let origins = policy.origins();
        assert_eq!(origins.len(), 2 * 2 * 2 + 1);
        assert!(origins.contains(&"https://[::1]:8443"));
        assert_eq!(origins.last(), Some(&"null"));
    }

    #[test]
    fn local_network_includes_extra_hosts() {
        let policy = OriginPolicy::for_local_network(
            &["10.30.11.51".to_string()],
            &DEFAULT_ORIGIN_PORTS,
            true,
        );
        assert!(policy.admits(Some("https://10.30.11.51:8000")));
        assert!(policy.admits(Some("http://localhost:5000")));
    }
}
