use anyhow::{Result, anyhow};

use crate::config::DEFAULT_SCAN_INTERVAL_MINUTES;

#[derive(Debug, PartialEq, Eq)]
pub enum CliCommand {
    Scan {
        interface: Option<String>,
    },
    Monitor {
        interface: Option<String>,
        interval_minutes: Option<u64>,
    },
    Interfaces,
    Help,
    Version,
}

pub fn version_text() -> String {
    format!("lanwatch {}", env!("CARGO_PKG_VERSION"))
}

pub fn usage_text() -> String {
    format!(
        "{version}
LAN device discovery and security monitoring

Usage:
  lanwatch [scan] [--interface <NAME>]
  lanwatch monitor [--interface <NAME>] [--interval <MIN>]
  lanwatch interfaces
  lanwatch --help
  lanwatch --version

Options:
  -i, --interface <NAME>  Select network interface by exact name
      --interval <MIN>    Monitor: minutes between automatic scans (default: {default_interval})
  -h, --help              Show this help text
  -V, --version           Show version",
        version = version_text(),
        default_interval = DEFAULT_SCAN_INTERVAL_MINUTES
    )
}

fn parse_minutes_arg(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .ok()
        .filter(|v| (1..=1_440).contains(v))
        .ok_or_else(|| {
            anyhow!(
                "Invalid value for --interval: '{}'. Expected minutes between 1 and 1440.\n\n{}",
                raw,
                usage_text()
            )
        })
}

fn flag_value(arg: &str, flag: &str) -> Result<String> {
    let value = arg.split_once('=').map(|(_, v)| v).unwrap_or_default();
    if value.is_empty() {
        return Err(anyhow!("Missing value for {}.\n\n{}", flag, usage_text()));
    }
    Ok(value.to_string())
}

pub fn parse_cli_args<I, S>(args: I) -> Result<CliCommand>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut command: Option<String> = None;
    let mut interface: Option<String> = None;
    let mut interval: Option<u64> = None;

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref();
        match arg {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "-V" | "--version" => return Ok(CliCommand::Version),
            "scan" | "monitor" | "interfaces" => {
                if command.as_deref().is_some_and(|existing| existing != arg) {
                    return Err(anyhow!(
                        "Multiple commands provided. Use only one command.\n\n{}",
                        usage_text()
                    ));
                }
                command = Some(arg.to_string());
            }
            "-i" | "--interface" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("Missing value for --interface.\n\n{}", usage_text()))?;
                interface = Some(value.as_ref().to_string());
            }
            "--interval" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("Missing value for --interval.\n\n{}", usage_text()))?;
                interval = Some(parse_minutes_arg(value.as_ref())?);
            }
            _ if arg.starts_with("--interface=") => {
                interface = Some(flag_value(arg, "--interface")?);
            }
            _ if arg.starts_with("--interval=") => {
                interval = Some(parse_minutes_arg(&flag_value(arg, "--interval")?)?);
            }
            _ => {
                return Err(anyhow!("Unknown argument: {arg}\n\n{}", usage_text()));
            }
        }
    }

    match command.as_deref().unwrap_or("scan") {
        "monitor" => Ok(CliCommand::Monitor {
            interface,
            interval_minutes: interval,
        }),
        "interfaces" => {
            if interface.is_some() || interval.is_some() {
                return Err(anyhow!(
                    "--interface/--interval are only valid with scan or monitor.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Interfaces)
        }
        _ => {
            if interval.is_some() {
                return Err(anyhow!(
                    "--interval is only valid with monitor.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Scan { interface })
        }
    }
}
