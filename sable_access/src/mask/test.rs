use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use super::*;
use crate::errors::RegistrationError;

fn net(addr: std::net::IpAddr, len: u8) -> Option<IpNet> {
    Some(IpNet::new(addr, len).unwrap())
}

fn labels(path: &[&str]) -> Shape {
    Shape::Sortable(LabelPath(path.iter().map(|s| s.to_string()).collect()))
}

#[test]
fn parse_ip4_exact() {
    let parsed = parse_cidr("192.168.0.1").unwrap();
    assert_eq!(parsed, net(Ipv4Addr::new(192, 168, 0, 1).into(), 32));
}

#[test]
fn parse_ip4_wildcard() {
    let parsed = parse_cidr("192.168.0.*").unwrap();
    assert_eq!(parsed, net(Ipv4Addr::new(192, 168, 0, 0).into(), 24));

    let parsed = parse_cidr("192.168.*").unwrap();
    assert_eq!(parsed, net(Ipv4Addr::new(192, 168, 0, 0).into(), 16));
}

#[test]
fn parse_ip4_cidr() {
    let parsed = parse_cidr("192.168.0.0/24").unwrap();
    assert_eq!(parsed, net(Ipv4Addr::new(192, 168, 0, 0).into(), 24));
}

#[test]
fn parse_ip4_cidr_with_host_bits() {
    let parsed = parse_cidr("10.1.2.3/8").unwrap();
    assert_eq!(parsed, net(Ipv4Addr::new(10, 0, 0, 0).into(), 8));
}

#[test]
fn parse_ip6_exact() {
    let parsed = parse_cidr("::1").unwrap();
    assert_eq!(parsed, net(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1).into(), 128));
}

#[test]
fn parse_ip6_wildcard() {
    let parsed = parse_cidr("fc00:1:2:3:*").unwrap();
    let ip = Ipv6Addr::new(0xfc00, 1, 2, 3, 0, 0, 0, 0).into();
    assert_eq!(parsed, net(ip, 64));
}

#[test]
fn parse_ip6_cidr() {
    let parsed = parse_cidr("fc00:1:2:3::/64").unwrap();
    let ip = Ipv6Addr::new(0xfc00, 1, 2, 3, 0, 0, 0, 0).into();
    assert_eq!(parsed, net(ip, 64));
}

#[test]
fn bad_prefix_length_is_rejected() {
    assert_eq!(
        parse_cidr("10.0.0.0/33"),
        Err(RegistrationError::MalformedCidr("10.0.0.0/33".to_string()))
    );
    assert!(parse_cidr("10.0.0.0/abc").is_err());
}

#[test]
fn hostnames_are_not_addresses() {
    assert_eq!(parse_cidr("foo.bar.example.com").unwrap(), None);
    assert_eq!(parse_cidr("*.example.com").unwrap(), None);
    assert_eq!(parse_cidr("foo.*").unwrap(), None);
    assert_eq!(parse_cidr("*").unwrap(), None);
    assert_eq!(parse_cidr("user/libera/staff").unwrap(), None);
}

#[test]
fn classify_wildcard_only() {
    assert_eq!(classify("*"), Shape::WildcardOnly);
}

#[test]
fn classify_hostname_exact() {
    assert_eq!(
        classify("Foo.Bar.example.com"),
        labels(&["com", "example", "bar", "foo"])
    );
}

#[test]
fn classify_hostname_suffix() {
    let shape = classify("*.mail.example.com");
    assert_eq!(shape, labels(&["com", "example", "mail", "*"]));
}

#[test]
fn classify_hostname_freeform() {
    assert_eq!(classify("foo.*.example.com"), Shape::Unsortable);
    assert_eq!(classify("foo*.example.com"), Shape::Unsortable);
    assert_eq!(classify("*foo.example.com"), Shape::Unsortable);
    assert_eq!(classify("*.*.example.com"), Shape::Unsortable);
    assert_eq!(classify("irc?.example.com"), Shape::Unsortable);
    assert_eq!(classify("example.com."), Shape::Unsortable);
}

#[test]
fn hostname_labels_for_lookup() {
    let path = LabelPath::from_hostname("Shell.Example.com");
    assert_eq!(path.labels(), &["com", "example", "shell"]);
}
