//! The access server: a rule registry plus an operator command loop.

use crate::command::*;

use anyhow::Context;
use sable_access::prelude::*;
use sable_access::utils::{format_timestamp, now, OrLog};

use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

/// Owns the registry and answers operator commands against it
pub struct AccessServer
{
    registry: RuleRegistry,
    engine: MatchEngine,
    rules_file: Option<PathBuf>,
}

impl AccessServer
{
    /// Build a server from an already-parsed rule set
    pub fn from_config(config: &AccessConfig) -> Result<(Self, LoadReport), RegistrationError>
    {
        let mut registry = RuleRegistry::new(config.settings());
        let report = registry.rehash(config)?;
        let engine = registry.engine();

        Ok((Self { registry, engine, rules_file: None }, report))
    }

    /// Build a server from a rule file, which is re-read on every rehash
    pub fn load(rules_file: impl AsRef<Path>) -> Result<(Self, LoadReport), anyhow::Error>
    {
        let rules_file = rules_file.as_ref();
        let config = AccessConfig::load_file(rules_file)?;
        let (mut server, report) = Self::from_config(&config)
            .with_context(|| format!("Failed to load rules from {}", rules_file.display()))?;
        server.rules_file = Some(rules_file.to_owned());

        Ok((server, report))
    }

    pub fn registry(&self) -> &RuleRegistry
    {
        &self.registry
    }

    pub fn engine(&self) -> &MatchEngine
    {
        &self.engine
    }

    fn rehash(&mut self) -> Result<LoadReport, anyhow::Error>
    {
        let rules_file = self.rules_file.as_ref().context("No rule file to reload")?;
        let config = AccessConfig::load_file(rules_file)?;
        Ok(self.registry.rehash(&config)?)
    }

    /// Run one command, returning the lines of its response
    pub fn handle(&mut self, command: AdminCommand) -> Vec<String>
    {
        tracing::debug!(?command, "Handling operator command");

        match command
        {
            AdminCommand::Check { user, host, ip } =>
            {
                let decision = self.engine.resolve(host.as_deref(), &user, ip);
                vec![describe_decision(&decision)]
            }
            AdminCommand::CheckIp(ip) =>
            {
                let line = match self.engine.resolve_ip(ip)
                {
                    IpDecision::Accept { exemption: Some(rule) } => format!("accept (exempted by {})", rule.mask_text()),
                    IpDecision::Accept { exemption: None } => "accept".to_string(),
                    IpDecision::Deny(rejection) => format!("deny {}: {}", rejection.rule().mask_text(), rejection.reason()),
                };
                vec![line]
            }
            AdminCommand::List =>
            {
                self.registry.rules().iter()
                    .filter_map(|summary| serde_json::to_string(summary).or_log("serialising rule summary"))
                    .collect()
            }
            AdminCommand::Stats =>
            {
                serde_json::to_string_pretty(&self.registry.stats())
                    .or_log("serialising stats")
                    .into_iter()
                    .collect()
            }
            AdminCommand::Rehash =>
            {
                match self.rehash()
                {
                    Ok(report) => describe_report(&report),
                    Err(e) =>
                    {
                        tracing::error!("Rehash failed: {:#}", e);
                        vec![format!("rehash failed: {:#}", e)]
                    }
                }
            }
            AdminCommand::Unban { category, mask } =>
            {
                let Some(id) = self.registry.find(category, &mask) else {
                    return vec![format!("no {} rule for {}", category, mask)];
                };
                match self.registry.unregister(id)
                {
                    Ok(rule) => vec![format!("removed {} {}", rule.category(), rule.mask_text())],
                    Err(e) => vec![format!("error: {}", e)],
                }
            }
            AdminCommand::Expire =>
            {
                self.registry.expire(now()).iter()
                    .map(|rule| format!("expired {} {}", rule.category(), rule.mask_text()))
                    .chain(std::iter::once("expire done".to_string()))
                    .collect()
            }
            AdminCommand::Reap =>
            {
                let reaped = self.registry.reap();
                vec![format!("reaped {} rules, {} still held", reaped, self.registry.retired().len())]
            }
        }
    }

    /// Read commands from `input` one per line until it is exhausted,
    /// writing each response to `output`.
    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) -> std::io::Result<()>
    {
        for line in input.lines()
        {
            let line = line?;
            if line.trim().is_empty()
            {
                continue;
            }

            let response = match line.parse::<AdminCommand>()
            {
                Ok(command) => self.handle(command),
                Err(e) => vec![format!("error: {}", e)],
            };
            for response_line in response
            {
                writeln!(output, "{}", response_line)?;
            }
            output.flush()?;
        }
        Ok(())
    }
}

fn describe_rejection(kind: &str, rejection: &Rejection) -> String
{
    let mut line = format!("{} {}: {}", kind, rejection.rule().mask_text(), rejection.reason());
    if let Some(expires) = rejection.expires()
    {
        line.push_str(&format!(" (until {})", format_timestamp(expires)));
    }
    line
}

/// One-line summary of a decision for the operator
pub fn describe_decision(decision: &AccessDecision) -> String
{
    match decision
    {
        AccessDecision::Admit(admission) => format!(
            "admit class={} rule={}",
            admission.class().name,
            admission.rule().mask_text()
        ),
        AccessDecision::Kill(r) | AccessDecision::GlobalKill(r) | AccessDecision::Deny(r) => {
            describe_rejection(decision.kind(), r)
        }
        AccessDecision::NoMatch => "no_match".to_string(),
    }
}

pub fn describe_report(report: &LoadReport) -> Vec<String>
{
    let mut lines = vec![format!("loaded {} rules, skipped {}", report.loaded.len(), report.skipped.len())];
    lines.extend(report.skipped.iter().map(|skipped| {
        format!("  rule {} ({}): {}", skipped.index, skipped.mask, skipped.error)
    }));
    lines
}
