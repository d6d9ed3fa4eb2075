use std::net::IpAddr;

/// Collapse IPv4-mapped IPv6 addresses to plain IPv4, so that an address
/// arriving on a dual-stack socket matches the same rules as its v4 form.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => ip,
        },
        IpAddr::V4(_) => ip,
    }
}
