use crate::errors::*;

use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Try to read a host mask as an address range.
///
/// Accepted forms are explicit CIDR (`10.0.0.0/8`, `fc00::/7`), trailing
/// wildcards over whole octets or groups (`192.168.*`, `fc00:1:2:3:*`) and bare
/// addresses, which match exactly one host.
///
/// Returns `Ok(None)` when the mask is not an address at all and should be
/// treated as a hostname mask. A mask whose address part parses but whose
/// prefix length doesn't is an error, not a hostname.
pub fn parse_cidr(mask: &str) -> RegistrationResult<Option<IpNet>> {
    if let Some((addr, len)) = mask.split_once('/') {
        // Cloaked hostnames contain slashes too; only treat it as CIDR if the
        // address half really is an address
        let Ok(addr) = addr.parse::<IpAddr>() else {
            return Ok(None);
        };
        let net = len
            .parse::<u8>()
            .ok()
            .and_then(|len| IpNet::new(addr, len).ok())
            .ok_or_else(|| RegistrationError::MalformedCidr(mask.to_string()))?;
        return Ok(Some(net.trunc()));
    }

    if let Ok(addr) = mask.parse::<IpAddr>() {
        return Ok(host_net(addr));
    }

    if let Some(fixed) = mask.strip_suffix(".*") {
        return Ok(ipv4_wildcard(fixed));
    }

    if let Some(fixed) = mask.strip_suffix(":*") {
        return Ok(ipv6_wildcard(fixed));
    }

    Ok(None)
}

fn host_net(addr: IpAddr) -> Option<IpNet> {
    let len = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(addr, len).ok()
}

fn ipv4_wildcard(fixed: &str) -> Option<IpNet> {
    let mut octets = [0u8; 4];
    let mut count = 0;

    for part in fixed.split('.') {
        if count >= 3 {
            return None;
        }
        octets[count] = part.parse().ok()?;
        count += 1;
    }

    IpNet::new(Ipv4Addr::from(octets).into(), (count * 8) as u8).ok()
}

fn ipv6_wildcard(fixed: &str) -> Option<IpNet> {
    let mut segments = [0u16; 8];
    let mut count = 0;

    for part in fixed.split(':') {
        if count >= 7 || part.is_empty() || part.len() > 4 {
            return None;
        }
        segments[count] = u16::from_str_radix(part, 16).ok()?;
        count += 1;
    }

    let addr = Ipv6Addr::new(
        segments[0],
        segments[1],
        segments[2],
        segments[3],
        segments[4],
        segments[5],
        segments[6],
        segments[7],
    );
    IpNet::new(addr.into(), (count * 16) as u8).ok()
}
