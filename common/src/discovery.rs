//! mDNS-SD (multicast DNS Service Discovery) for booth nodes.
//!
//! Each process registers itself on the local network with a sequential
//! instance name like `server-01` or `kiosk-02`.  A kiosk configured with
//! `SERVER_URL=auto` locates the booth server by browsing for a server
//! peer, so a booth spread over several machines needs no hard-coded
//! URLs or DNS.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

/// How long to scan for existing peers before claiming an instance number.
const DISCOVERY_SCAN: Duration = Duration::from_secs(3);

// ── Service roles ────────────────────────────────────────────────────────────

/// The role a booth node plays on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Server,
    Kiosk,
}

impl ServiceRole {
    /// mDNS service-type string including domain, e.g.
    /// `_booth-server._tcp.local.`
    pub fn service_type(&self) -> &'static str {
        match self {
            Self::Server => "_booth-server._tcp.local.",
            Self::Kiosk => "_booth-kiosk._tcp.local.",
        }
    }

    /// Human-readable prefix used in instance names (e.g. `server`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Kiosk => "kiosk",
        }
    }
}

// ── Peer ─────────────────────────────────────────────────────────────────────

/// A service discovered on the network.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Instance name, e.g. `server-01`.
    pub instance_name: String,
    /// All advertised IP addresses.
    pub addresses: Vec<IpAddr>,
    /// Listening port.
    pub port: u16,
}

impl Peer {
    /// Build an HTTP base URL for this peer, preferring IPv4.
    pub fn http_url(&self) -> Option<String> {
        let addr = self
            .addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| self.addresses.first())?;

        Some(match addr {
            IpAddr::V4(v4) => format!("http://{}:{}", v4, self.port),
            IpAddr::V6(v6) => format!("http://[{}]:{}", v6, self.port),
        })
    }
}

// ── Discovery handle ─────────────────────────────────────────────────────────

/// Handle returned by [`register`].  Keeps the mDNS daemon alive and can
/// locate peers of other roles.
pub struct DiscoveryHandle {
    daemon: ServiceDaemon,
    instance_name: String,
    fullname: String,
}

impl DiscoveryHandle {
    /// Our assigned instance name, e.g. `server-01`.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Browse for the first reachable peer of the given `role`.
    ///
    /// Blocks for up to `timeout`; returns as soon as one peer resolves
    /// (excluding ourselves), or `None` when the deadline passes.
    pub fn find_peer(&self, role: ServiceRole, timeout: Duration) -> Option<Peer> {
        let receiver = match self.daemon.browse(role.service_type()) {
            Ok(r) => r,
            Err(e) => {
                warn!("mDNS browse for {} failed: {e}", role.service_type());
                return None;
            }
        };

        debug!(
            "mDNS: browsing for {} (timeout={}s)",
            role.service_type(),
            timeout.as_secs()
        );
        let deadline = Instant::now() + timeout;
        let mut found = None;

        while found.is_none() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match receiver.recv_timeout(remaining) {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    let name = info.get_fullname().to_string();
                    if name == self.fullname {
                        debug!("mDNS: ignoring self ({})", name);
                        continue;
                    }
                    let addrs: Vec<IpAddr> =
                        info.get_addresses().iter().map(|a| a.to_ip_addr()).collect();
                    let port = info.get_port();
                    info!("mDNS: discovered peer {} at {:?}:{}", name, addrs, port);
                    found = Some(Peer {
                        instance_name: extract_instance_name(&name),
                        addresses: addrs,
                        port,
                    });
                }
                Ok(event) => {
                    debug!("mDNS: event {:?}", format_event(&event));
                }
                Err(_) => break,
            }
        }

        let _ = self.daemon.stop_browse(role.service_type());
        if found.is_none() {
            debug!(
                "mDNS: browse completed, no peer found for {}",
                role.service_type()
            );
        }
        found
    }

    /// Unregister from mDNS and shut down the daemon.
    pub fn shutdown(self) {
        let _ = self.daemon.unregister(&self.fullname);
        let _ = self.daemon.shutdown();
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Register this node on the local network via mDNS.
///
/// Scans for existing peers of the same role, picks the next available
/// sequential number, and registers an instance like `server-01` or
/// `kiosk-03`.
pub fn register(role: ServiceRole, port: u16) -> Result<DiscoveryHandle> {
    let daemon = ServiceDaemon::new().context("Cannot start mDNS daemon")?;

    // ── scan for existing instances of the same role ────────────────
    let receiver = daemon
        .browse(role.service_type())
        .context("Cannot browse mDNS")?;

    let mut existing: BTreeSet<u32> = BTreeSet::new();
    let deadline = Instant::now() + DISCOVERY_SCAN;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                if let Some(n) = parse_instance_number(info.get_fullname(), role.prefix()) {
                    debug!("Found existing {} instance #{}", role.prefix(), n);
                    existing.insert(n);
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    let _ = daemon.stop_browse(role.service_type());

    // ── pick next sequential number ─────────────────────────────────
    let our_number = next_available(&existing);
    let instance_name = format!("{}-{:02}", role.prefix(), our_number);
    let host = format!("{}.local.", instance_name);

    let service_info = ServiceInfo::new(
        role.service_type(),
        &instance_name,
        &host,
        "",   // auto-detect addresses
        port,
        None, // no TXT properties
    )
    .context("Cannot create mDNS ServiceInfo")?;

    let fullname = service_info.get_fullname().to_string();
    let registered_addrs = format!("{:?}", service_info.get_addresses());

    daemon
        .register(service_info)
        .context("Cannot register mDNS service")?;

    info!(
        "Registered on mDNS as '{}' (type={}, port={}, addrs={})",
        instance_name,
        role.service_type(),
        port,
        registered_addrs
    );

    Ok(DiscoveryHandle {
        daemon,
        instance_name,
        fullname,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Format a ServiceEvent for debug logging (without dumping the full struct).
fn format_event(event: &ServiceEvent) -> String {
    match event {
        ServiceEvent::ServiceFound(ty, name) => format!("Found({ty}, {name})"),
        ServiceEvent::ServiceResolved(info) => format!("Resolved({})", info.get_fullname()),
        ServiceEvent::ServiceRemoved(ty, name) => format!("Removed({ty}, {name})"),
        ServiceEvent::SearchStarted(ty) => format!("SearchStarted({ty})"),
        ServiceEvent::SearchStopped(ty) => format!("SearchStopped({ty})"),
        _ => "Other".to_string(),
    }
}

/// Extract the instance number from a fullname like
/// `server-03._booth-server._tcp.local.`
fn parse_instance_number(fullname: &str, prefix: &str) -> Option<u32> {
    let instance = fullname.split('.').next()?;
    let suffix = instance.strip_prefix(prefix)?.strip_prefix('-')?;
    suffix.parse().ok()
}

/// Extract the short instance name from a fullname like
/// `server-01._booth-server._tcp.local.`
fn extract_instance_name(fullname: &str) -> String {
    fullname.split('.').next().unwrap_or(fullname).to_string()
}

/// Return the smallest positive integer not in `used`.
fn next_available(used: &BTreeSet<u32>) -> u32 {
    let mut n = 1;
    while used.contains(&n) {
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instance_number() {
        assert_eq!(
            parse_instance_number("server-01._booth-server._tcp.local.", "server"),
            Some(1)
        );
        assert_eq!(
            parse_instance_number("kiosk-12._booth-kiosk._tcp.local.", "kiosk"),
            Some(12)
        );
        assert_eq!(
            parse_instance_number("kiosk-01._booth-kiosk._tcp.local.", "server"),
            None
        );
        assert_eq!(parse_instance_number("garbage", "server"), None);
    }

    #[test]
    fn test_next_available() {
        let empty = BTreeSet::new();
        assert_eq!(next_available(&empty), 1);

        let set: BTreeSet<u32> = [1, 2, 3].into();
        assert_eq!(next_available(&set), 4);

        let gap: BTreeSet<u32> = [1, 3].into();
        assert_eq!(next_available(&gap), 2);
    }

    #[test]
    fn test_extract_instance_name() {
        assert_eq!(
            extract_instance_name("server-01._booth-server._tcp.local."),
            "server-01"
        );
    }

    #[test]
    fn test_peer_http_url_prefers_ipv4() {
        let peer = Peer {
            instance_name: "server-01".into(),
            addresses: vec![
                "fe80::1".parse().unwrap(),
                "192.168.1.20".parse().unwrap(),
            ],
            port: 3000,
        };
        assert_eq!(peer.http_url().unwrap(), "http://192.168.1.20:3000");
    }
}
