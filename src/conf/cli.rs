// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Manual argv parsing, matching the reference family's lean dependency
//! footprint (no `clap`).

use std::path::PathBuf;

use crate::conf::config::CONFIG_FILE_DEFAULT;

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub moduledir: Option<PathBuf>,
    pub mountsource: Option<String>,
    pub verbose: bool,
    pub partitions: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Run {
        config_path: PathBuf,
        overrides: ConfigOverrides,
    },
    Scan {
        json: bool,
    },
    GenConfig {
        output: PathBuf,
    },
    ShowConfig {
        config_path: PathBuf,
        overrides: ConfigOverrides,
    },
}

/// Parses the `--config`/`--moduledir`/`--mountsource`/`--verbose`/
/// `--partitions` flags shared by the default run and `show-config`, since
/// `show-config` is defined to print the configuration after the same
/// CLI-override merge a real run would apply.
fn parse_config_flags<'a>(mut iter: impl Iterator<Item = &'a String>) -> (PathBuf, ConfigOverrides) {
    let mut config_path = PathBuf::from(CONFIG_FILE_DEFAULT);
    let mut overrides = ConfigOverrides::default();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(v) = iter.next() {
                    config_path = PathBuf::from(v);
                }
            }
            "--moduledir" => {
                if let Some(v) = iter.next() {
                    overrides.moduledir = Some(PathBuf::from(v));
                }
            }
            "--mountsource" => {
                if let Some(v) = iter.next() {
                    overrides.mountsource = Some(v.clone());
                }
            }
            "--verbose" => overrides.verbose = true,
            "--partitions" => {
                if let Some(v) = iter.next() {
                    overrides.partitions =
                        v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
                }
            }
            _ => {}
        }
    }

    (config_path, overrides)
}

pub fn parse(args: &[String]) -> Command {
    let mut iter = args.iter().skip(1).peekable();

    match iter.peek().map(String::as_str) {
        Some("scan") => {
            iter.next();
            let json = iter.any(|a| a == "--json");
            Command::Scan { json }
        }
        Some("gen-config") => {
            iter.next();
            let mut output = PathBuf::from(CONFIG_FILE_DEFAULT);
            while let Some(arg) = iter.next() {
                if arg == "-o"
                    && let Some(path) = iter.next()
                {
                    output = PathBuf::from(path);
                }
            }
            Command::GenConfig { output }
        }
        Some("show-config") => {
            iter.next();
            let (config_path, overrides) = parse_config_flags(iter);
            Command::ShowConfig { config_path, overrides }
        }
        _ => {
            let (config_path, overrides) = parse_config_flags(iter);
            Command::Run { config_path, overrides }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scan_with_json_flag() {
        let args: Vec<String> = ["bin", "scan", "--json"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(parse(&args), Command::Scan { json: true }));
    }

    #[test]
    fn parses_default_run_with_overrides() {
        let args: Vec<String> = ["bin", "--verbose", "--partitions", "a, b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match parse(&args) {
            Command::Run { overrides, .. } => {
                assert!(overrides.verbose);
                assert_eq!(overrides.partitions, vec!["a", "b"]);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn parses_gen_config_output_path() {
        let args: Vec<String> = ["bin", "gen-config", "-o", "/tmp/x.toml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match parse(&args) {
            Command::GenConfig { output } => assert_eq!(output, PathBuf::from("/tmp/x.toml")),
            _ => panic!("expected GenConfig"),
        }
    }

    #[test]
    fn show_config_merges_cli_overrides() {
        let args: Vec<String> = ["bin", "show-config", "--moduledir", "/custom/modules", "--verbose"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match parse(&args) {
            Command::ShowConfig { overrides, .. } => {
                assert_eq!(overrides.moduledir, Some(PathBuf::from("/custom/modules")));
                assert!(overrides.verbose);
            }
            _ => panic!("expected ShowConfig"),
        }
    }
}
