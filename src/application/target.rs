//! # Target Policy
//!
//! Decides which hosts the bot may talk to. Loopback, private, link-local and otherwise
//! non-global addresses are refused so chat users cannot probe the bot's own network.
//! Used on the literal URL host by the request builder and on resolved addresses by the transport.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// `host` as returned by `Url::host_str` (IPv6 literals keep their brackets).
pub fn is_private_or_local_host(host: &str) -> bool {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
        .trim_end_matches('.')
        .to_ascii_lowercase();

    let has_local_tld = bare
        .rsplit('.')
        .next()
        .is_some_and(|label| label == "local" || label == "internal");

    if bare == "localhost" || bare.ends_with(".localhost") || has_local_tld {
        return true;
    }

    match bare.parse::<IpAddr>() {
        Ok(ip) => is_non_global(ip),
        Err(_) => false,
    }
}

pub fn is_non_global(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_non_global_v4(v4),
        IpAddr::V6(v6) => is_non_global_v6(v6),
    }
}

fn is_non_global_v4(v4: Ipv4Addr) -> bool {
    let [a, b, c, _] = v4.octets();
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
        || v4.is_multicast()
        || a == 0                                   // "this network" (0.0.0.0/8)
        || (a == 100 && (64..=127).contains(&b))    // shared address space (RFC 6598)
        || a >= 240                                 // reserved
        || (a == 192 && b == 0 && (c == 0 || c == 2))
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113)
        || (a == 198 && (18..=19).contains(&b))
}

fn is_non_global_v6(v6: Ipv6Addr) -> bool {
    let segs = v6.segments();
    v6.is_loopback()
        || v6.is_unspecified()
        || v6.is_multicast()
        || (segs[0] & 0xfe00) == 0xfc00              // unique local (fc00::/7)
        || (segs[0] & 0xffc0) == 0xfe80              // link local (fe80::/10)
        || (segs[0] == 0x2001 && segs[1] == 0x0db8)  // documentation
        || embedded_v4(v6).is_some_and(is_non_global_v4)
}

/// The IPv4 address carried by a mapped (`::ffff:0:0/96`), compatible (`::/96`)
/// or NAT64 (`64:ff9b::/96`) address.
fn embedded_v4(v6: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = v6.to_ipv4_mapped() {
        return Some(v4);
    }
    let segs = v6.segments();
    let compatible = segs[..6].iter().all(|&s| s == 0);
    let nat64 = segs[..6] == [0x64, 0xff9b, 0, 0, 0, 0];
    if !(compatible || nat64) {
        return None;
    }
    let [.., a, b, c, d] = v6.octets();
    Some(Ipv4Addr::new(a, b, c, d))
}
