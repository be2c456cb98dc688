use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use cidr::IpInet;

/// Whether `address` parses as an IPv6 address.
pub fn is_v6(address: &str) -> bool {
    Ipv6Addr::from_str(address).is_ok()
}

/// The `n`th address of the network `cidr` belongs to.
///
/// `cidr` must carry a prefix length; host bits are ignored. A negative `n`
/// counts back from the last address, so `-1` is the broadcast address of an
/// IPv4 network. Returns `None` when `cidr` does not parse or `n` falls
/// outside the network.
pub fn nth_address(cidr: &str, n: i64) -> Option<IpAddr> {
    let cidr = cidr.trim();
    if !cidr.contains('/') {
        return None;
    }
    let network = IpInet::from_str(cidr).ok()?.network();
    let (first, width) = match network.first_address() {
        IpAddr::V4(addr) => (u128::from(u32::from(addr)), 32),
        IpAddr::V6(addr) => (u128::from(addr), 128),
    };

    let host_bits = width - u32::from(network.network_length());
    let last_offset = if host_bits == 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    };

    let offset = if n >= 0 {
        u128::from(n.unsigned_abs())
    } else {
        last_offset.checked_sub(u128::from(n.unsigned_abs()) - 1)?
    };
    if offset > last_offset {
        return None;
    }

    let address = first.checked_add(offset)?;
    Some(if width == 32 {
        IpAddr::V4(Ipv4Addr::from(u32::try_from(address).ok()?))
    } else {
        IpAddr::V6(Ipv6Addr::from(address))
    })
}

/// `IP` for a literal address, `DNS` for anything else.
pub fn ip_type(value: &str) -> &'static str {
    if IpAddr::from_str(value).is_ok() {
        "IP"
    } else {
        "DNS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn nth(cidr: &str, n: i64) -> Option<String> {
        nth_address(cidr, n).map(|addr| addr.to_string())
    }

    #[test]
    fn test_is_v6() {
        assert!(is_v6("fd00::1"));
        assert!(is_v6("::"));
        assert!(!is_v6("10.0.0.1"));
        assert!(!is_v6("fd00::1/64"));
        assert!(!is_v6("master.example.com"));
    }

    #[test]
    fn test_nth_address_ipv4() {
        assert_eq!(nth("10.21.0.0/16", 1).as_deref(), Some("10.21.0.1"));
        assert_eq!(nth("10.21.0.0/16", 10).as_deref(), Some("10.21.0.10"));
        assert_eq!(nth("10.21.0.0/16", 256).as_deref(), Some("10.21.1.0"));
        assert_eq!(nth("10.21.0.0/16", -1).as_deref(), Some("10.21.255.255"));
        assert_eq!(nth("10.21.0.0/16", -2).as_deref(), Some("10.21.255.254"));
    }

    #[test]
    fn test_nth_address_ignores_host_bits() {
        assert_eq!(nth("192.168.7.42/24", 1).as_deref(), Some("192.168.7.1"));
    }

    #[test]
    fn test_nth_address_ipv6() {
        assert_eq!(nth("fd00:101::/64", 1).as_deref(), Some("fd00:101::1"));
        assert_eq!(nth("fd00:101::/64", 10).as_deref(), Some("fd00:101::a"));
    }

    #[test]
    fn test_nth_address_out_of_range() {
        assert_eq!(nth("10.0.0.0/30", 4), None);
        assert_eq!(nth("10.0.0.0/30", -5), None);
        assert_eq!(nth("10.0.0.0/30", 3).as_deref(), Some("10.0.0.3"));
        assert_eq!(nth("10.0.0.0/30", -4).as_deref(), Some("10.0.0.0"));
    }

    #[test]
    fn test_nth_address_malformed() {
        assert_eq!(nth("10.0.0.1", 1), None);
        assert_eq!(nth("not-a-cidr", 1), None);
        assert_eq!(nth("10.0.0.0/33", 1), None);
    }

    #[test]
    fn test_ip_type() {
        assert_eq!(ip_type("10.0.0.1"), "IP");
        assert_eq!(ip_type("fd00::1"), "IP");
        assert_eq!(ip_type("master.example.com"), "DNS");
        assert_eq!(ip_type("10.0.0.1/24"), "DNS");
    }
}
