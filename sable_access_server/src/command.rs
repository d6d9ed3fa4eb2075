//! Operator commands accepted on the server's control input.

use sable_access::rule::RuleCategory;
use std::{net::IpAddr, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// `check <user> <host|-> <ip>`: full decision for a connection
    Check {
        user: String,
        host: Option<String>,
        ip: IpAddr,
    },
    /// `checkip <ip>`: address-only decision
    CheckIp(IpAddr),
    /// `list`: every rule in force
    List,
    /// `stats`: rule counts
    Stats,
    /// `rehash`: reload the rule file
    Rehash,
    /// `unban <category> <mask>`: remove a rule by its mask
    Unban {
        category: RuleCategory,
        mask: String,
    },
    /// `expire`: prune expired temporary rules
    Expire,
    /// `reap`: release retired rules with no connections left
    Reap,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command {0}")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid address {0}")]
    BadAddress(String),
    #[error("Unknown rule category {0}")]
    BadCategory(String),
}

fn parse_ip(arg: &str) -> Result<IpAddr, CommandError> {
    arg.parse()
        .map_err(|_| CommandError::BadAddress(arg.to_string()))
}

fn parse_category(arg: &str) -> Result<RuleCategory, CommandError> {
    use strum::IntoEnumIterator;

    RuleCategory::iter()
        .find(|category| category.to_string().eq_ignore_ascii_case(arg))
        .ok_or_else(|| CommandError::BadCategory(arg.to_string()))
}

impl FromStr for AdminCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = args.split_first() else {
            return Err(CommandError::Empty);
        };

        match (command.to_ascii_lowercase().as_str(), args) {
            ("check", [user, host, ip]) => Ok(Self::Check {
                user: user.to_string(),
                host: Some(host).filter(|h| **h != "-").map(|h| h.to_string()),
                ip: parse_ip(ip)?,
            }),
            ("check", _) => Err(CommandError::Usage("check <user> <host|-> <ip>")),
            ("checkip", [ip]) => Ok(Self::CheckIp(parse_ip(ip)?)),
            ("checkip", _) => Err(CommandError::Usage("checkip <ip>")),
            ("list", []) => Ok(Self::List),
            ("stats", []) => Ok(Self::Stats),
            ("rehash", []) => Ok(Self::Rehash),
            ("unban", [category, mask]) => Ok(Self::Unban {
                category: parse_category(category)?,
                mask: mask.to_string(),
            }),
            ("unban", _) => Err(CommandError::Usage("unban <category> <mask>")),
            ("expire", []) => Ok(Self::Expire),
            ("reap", []) => Ok(Self::Reap),
            ("list" | "stats" | "rehash" | "expire" | "reap", _) => {
                Err(CommandError::Usage("command takes no arguments"))
            }
            _ => Err(CommandError::UnknownCommand(command.to_string())),
        }
    }
}
