//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use holo_ospf6_lsa::config::LsdbCfg;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub router_id: Ipv4Addr,
    pub logging: Logging,
    pub lsdb: LsdbCfg,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub enabled: bool,
    // Default filter directives, overridden by the `RUST_LOG` environment
    // variable.
    pub filter: String,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/holo-lsa-replay.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => match toml::from_str(&config_str) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("Failed to parse configuration file: {err}");
                    std::process::exit(1);
                }
            },
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            router_id: Ipv4Addr::new(1, 1, 1, 1),
            logging: Default::default(),
            lsdb: Default::default(),
        }
    }
}

// ===== impl Logging =====

impl Default for Logging {
    fn default() -> Logging {
        Logging {
            enabled: true,
            filter: "holo=debug,lsa_replay=info".to_owned(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Compact,
            colors: true,
            show_thread_id: false,
            show_source: false,
        }
    }
}

// ===== unit tests =====
