//! Address classification for outbound targets.
//!
//! # What is private
//! - IPv4: `127.0.0.0/8`, `10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16`,
//!   `169.254.0.0/16` (cloud metadata lives here), `0.0.0.0/8`
//! - IPv6: `::1`, `::`, `fc00::/7`, `fe80::/10`, and any IPv4-mapped
//!   (`::ffff:a.b.c.d`), IPv4-compatible (`::a.b.c.d`) or NAT64
//!   (`64:ff9b::a.b.c.d`) address whose embedded IPv4 address is private
//! - Anything that does not parse as an IP address
//!
//! Classification is pure and total; unknown input fails closed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Hostnames refused before any name resolution.
pub const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata",
    "metadata.google.internal",
    "metadata.goog",
    "instance-data",
    "instance-data.ec2.internal",
];

const CLOUD_METADATA_V4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// Classify an IP literal. Unparseable input is private.
pub fn is_private(ip: &str) -> bool {
    let trimmed = ip.trim();
    let literal = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    match literal.parse::<IpAddr>() {
        Ok(addr) => is_private_ip(addr),
        Err(_) => true,
    }
}

/// Classify a parsed address.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    if ip == CLOUD_METADATA_V4 {
        return true;
    }

    let [a, b, _, _] = ip.octets();
    match a {
        0 | 10 | 127 => true,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        169 => b == 254,
        _ => false,
    }
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = embedded_v4(ip) {
        return is_private_v4(v4);
    }

    let first = ip.segments()[0];
    // fc00::/7 unique local
    if first & 0xfe00 == 0xfc00 {
        return true;
    }
    // fe80::/10 link-local
    first & 0xffc0 == 0xfe80
}

/// IPv4 carried in the low 32 bits of IPv4-compatible (`::a.b.c.d`) or
/// NAT64 well-known-prefix (`64:ff9b::/96`) addresses.
fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let seg = ip.segments();
    let compatible = seg[..6] == [0; 6];
    let nat64 = seg[..6] == [0x64, 0xff9b, 0, 0, 0, 0];
    if compatible || nat64 {
        let [.., a, b, c, d] = ip.octets();
        Some(Ipv4Addr::new(a, b, c, d))
    } else {
        None
    }
}

/// Whether a hostname is on the static blocklist (case-insensitive, trailing dot ignored).
pub fn is_blocked_hostname(host: &str) -> bool {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();
    BLOCKED_HOSTNAMES.iter().any(|blocked| *blocked == normalized)
}
