//! Create command.

use anyhow::{bail, Result};
use clap::Args;
use pocketdock_core::{create_new_container, CreateOptions};
use std::path::PathBuf;
use std::time::Duration;

/// Arguments for the create command.
#[derive(Args)]
pub struct CreateArgs {
    /// Image to run (overrides --profile)
    #[arg(long)]
    pub image: Option<String>,

    /// Image profile (minimal, dev, agent, ...)
    #[arg(long)]
    pub profile: Option<String>,

    /// Container name (auto-generated if omitted)
    #[arg(long)]
    pub name: Option<String>,

    /// Memory limit (e.g. 256m, 1g)
    #[arg(long)]
    pub mem: Option<String>,

    /// CPU cap as a percentage of one CPU
    #[arg(long)]
    pub cpu: Option<u32>,

    /// Keep the container across shutdown (enables resume)
    #[arg(long)]
    pub persist: bool,

    /// Bind mount host:container (repeatable)
    #[arg(long = "volume", short = 'v')]
    pub volumes: Vec<String>,

    /// Port mapping host:container (repeatable)
    #[arg(long = "port", short = 'p')]
    pub ports: Vec<String>,

    /// Host device to pass through (repeatable)
    #[arg(long = "device")]
    pub devices: Vec<String>,

    /// Environment variable KEY=value (repeatable)
    #[arg(long = "env", short = 'e')]
    pub env: Vec<String>,

    /// Working directory inside the container
    #[arg(long)]
    pub workdir: Option<String>,

    /// Network mode (bridge, none, ...)
    #[arg(long)]
    pub network: Option<String>,

    /// Default exec timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Project tag
    #[arg(long)]
    pub project: Option<String>,
}

/// Executes the create command.
pub async fn execute(args: CreateArgs, socket: Option<PathBuf>) -> Result<()> {
    let options = CreateOptions {
        image: args.image,
        profile: args.profile,
        name: args.name,
        timeout: Duration::from_secs(args.timeout),
        mem_limit: args.mem,
        cpu_percent: args.cpu,
        persist: args.persist,
        volumes: parse_pairs(&args.volumes, "volume")?,
        devices: args.devices,
        ports: parse_ports(&args.ports)?,
        env: args.env,
        workdir: args.workdir,
        network_mode: args.network,
        project: args.project,
        socket,
    };
    let container = create_new_container(options).await?;
    println!(
        "{}  {}",
        container.name(),
        crate::output::short_id(&container.id())
    );
    Ok(())
}

fn parse_pairs(values: &[String], what: &str) -> Result<Vec<(String, String)>> {
    values
        .iter()
        .map(|v| match v.split_once(':') {
            Some((host, container)) if !host.is_empty() && !container.is_empty() => {
                Ok((host.to_string(), container.to_string()))
            }
            _ => bail!("invalid {what} mapping (expected host:container): {v}"),
        })
        .collect()
}

fn parse_ports(values: &[String]) -> Result<Vec<(u16, u16)>> {
    values
        .iter()
        .map(|v| {
            let parsed = v
                .split_once(':')
                .and_then(|(h, c)| Some((h.parse().ok()?, c.parse().ok()?)));
            match parsed {
                Some(pair) => Ok(pair),
                None => bail!("invalid port mapping (expected host:container): {v}"),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ports() {
        assert_eq!(
            parse_ports(&["8080:80".to_string()]).unwrap(),
            vec![(8080, 80)]
        );
        assert!(parse_ports(&["8080".to_string()]).is_err());
        assert!(parse_ports(&["a:b".to_string()]).is_err());
    }

    #[test]
    fn test_parse_pairs() {
        assert_eq!(
            parse_pairs(&["/h:/c".to_string()], "volume").unwrap(),
            vec![("/h".to_string(), "/c".to_string())]
        );
        assert!(parse_pairs(&["broken".to_string()], "volume").is_err());
    }
}
