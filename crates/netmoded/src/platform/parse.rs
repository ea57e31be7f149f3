//! Parsers for network utility output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;

static ADDR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\binet6?\s+([0-9A-Fa-f:.]+)(?:/\d+)?").expect("valid regex"));

static SSID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*SSID:\s?(.*)$").expect("valid regex"));

static COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Country:\s*([A-Za-z0-9]+)").expect("valid regex"));

static REG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"country\s+([A-Za-z0-9]*):").expect("valid regex"));

/// Addresses from `ip -o addr show dev <iface>`
pub fn parse_addresses(output: &str) -> Vec<IpAddr> {
    output
        .lines()
        .filter_map(|line| ADDR_RE.captures(line))
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}

/// Addresses that never prove a working connection
///
/// Unspecified addresses and IPv6 link-local addresses (fe80::/10), which
/// the kernel assigns without any network. IPv4 link-local (169.254/16)
/// is usable: dhcpcd only assigns it on an associated link after DHCP
/// gave up, and peers on that link can still reach the device.
pub fn is_placeholder(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_unspecified() || (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

pub fn usable_addresses(addrs: &[IpAddr]) -> Vec<IpAddr> {
    addrs.iter().filter(|a| !is_placeholder(a)).copied().collect()
}

/// SSIDs from `iw <iface> scan`, hidden networks skipped
pub fn parse_scan_ssids(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| SSID_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim_end().to_string()))
        .filter(|ssid| !ssid.is_empty())
        .collect()
}

/// Beacon country codes from `iw <iface> scan`, in scan order
pub fn parse_scan_countries(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| COUNTRY_RE.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// First domain from `iw reg get`
pub fn parse_regdomain(output: &str) -> String {
    REG_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Value of `key=` in a supplicant status report
pub fn status_field<'a>(status: &'a str, key: &str) -> Option<&'a str> {
    status.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::trim)
    })
}
