//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use std::fmt::Write;
use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use clap::{App, Arg};
use config::{Config, LoggingFmtStyle};
use holo_ospf6_lsa::error::Error;
use holo_ospf6_lsa::events;
use holo_ospf6_lsa::handler::{HandlerRegistry, LsaHandler};
use holo_ospf6_lsa::lsa::{Lsa, LsaHandle};
use holo_ospf6_lsa::lsdb::{Lifecycle, LsdbMap};
use holo_ospf6_lsa::packet::lsa::{LsaHdr, LsaType};
use holo_ospf6_lsa::show;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

// Size of the fixed part of the Link-LSA body.
const LINK_LSA_MIN_BODY_LENGTH: usize = 24;

fn init_tracing(config: &config::Logging) {
    // Enable logging to stdout.
    let stdout = config.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.fmt.show_thread_id)
            .with_file(config.fmt.show_source)
            .with_line_number(config.fmt.show_source)
            .with_ansi(config.fmt.colors);
        let layer = match config.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            config.filter.clone()
        }));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .init();
}

// Parses a line of hexadecimal digits. Whitespace is ignored.
fn parse_hex(line: &str) -> Result<Bytes, String> {
    let digits = line
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<Vec<_>>();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".to_owned());
    }

    digits
        .chunks(2)
        .map(|pair| {
            let pair = pair.iter().collect::<String>();
            u8::from_str_radix(&pair, 16).map_err(|error| error.to_string())
        })
        .collect::<Result<Vec<u8>, _>>()
        .map(Bytes::from)
}

// Decodes and installs the LSAs contained in the given file.
//
// Each line holds one or more hex-encoded LSAs. Empty lines and lines
// starting with '#' are ignored.
fn load(
    lc: &Lifecycle,
    lsdb: &mut LsdbMap,
    filename: &str,
) -> std::io::Result<()> {
    let data = std::fs::read_to_string(filename)?;

    for (lineno, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut buf = match parse_hex(line) {
            Ok(buf) => buf,
            Err(error) => {
                error!(line = lineno + 1, %error, "invalid hex string");
                continue;
            }
        };

        while buf.has_remaining() {
            let now = Instant::now();
            let lsa = match LsaHandle::decode(&mut buf, now) {
                Ok(lsa) => lsa,
                Err(error) => {
                    Error::from(error).log();
                    break;
                }
            };
            if let Err(error) = lc.receive(lsdb, lsa, now) {
                error.log();
            }
        }
    }

    Ok(())
}

// Runs the LSA timers for the given amount of time. LSAs reaching MaxAge are
// removed from the LSDB.
async fn run(
    lc: &Lifecycle,
    lsdb: &mut LsdbMap,
    duration: Duration,
) -> Result<(), Error> {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            now = lc.timers.wait() => {
                events::process_timers(lc, lsdb, now)?;
                for key in lsdb.take_maxage() {
                    info!(lsa = %key, "removing LSA that reached MaxAge");
                    if let Err(error) = lc.retire(lsdb, &key, now) {
                        error.log();
                    }
                }
            }
            _ = &mut deadline => return Ok(()),
        }
    }
}

fn print_lsdb(lsdb: &LsdbMap, registry: &HandlerRegistry, detail: bool) {
    let now = Instant::now();

    if !detail {
        println!("{}", show::summary_header());
        for (_, lsa) in lsdb.iter() {
            println!("{}", show::summary(lsa, now));
        }
        return;
    }

    for (_, lsa) in lsdb.iter() {
        let mut output = String::new();
        if show::detail(lsa, registry, now, &mut output).is_ok()
            && show::internal(lsa, now, &mut output).is_ok()
        {
            println!("{}", output);
        }
    }
}

// Displays the body of a Link-LSA.
fn display_link(lsa: &Lsa, f: &mut dyn Write) -> std::fmt::Result {
    let mut body = lsa.raw().slice(LsaHdr::LENGTH as usize..);
    if body.remaining() < LINK_LSA_MIN_BODY_LENGTH {
        return writeln!(f, "    Truncated Link-LSA body");
    }

    let priority = body.get_u8();
    let options = body.get_uint(3);
    let linklocal = Ipv6Addr::from(body.get_u128());
    let prefixes = body.get_u32();
    writeln!(f, "    Priority: {}", priority)?;
    writeln!(f, "    Options: {:#08x}", options)?;
    writeln!(f, "    Link-Local Address: {}", linklocal)?;
    writeln!(f, "    Number of Prefixes: {}", prefixes)?;
    Ok(())
}

// ===== main =====

#[tokio::main]
async fn main() {
    // Parse command-line parameters.
    let matches = App::new("LSA replay")
        .about("Install OSPFv3 LSAs from a file and run their lifecycle")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("duration")
                .short("d")
                .long("duration")
                .value_name("seconds")
                .default_value("0")
                .help("Time to keep running the LSA timers."),
        )
        .arg(
            Arg::with_name("detail")
                .long("detail")
                .help("Display the LSAs in detail."),
        )
        .arg(
            Arg::with_name("FILENAME")
                .help("LSA file path")
                .required(true)
                .index(1),
        )
        .get_matches();
    let Some(filename) = matches.value_of("FILENAME") else {
        eprintln!("Missing LSA file path");
        std::process::exit(1);
    };
    let duration = match matches.value_of("duration").map(str::parse::<u64>) {
        Some(Ok(duration)) => Duration::from_secs(duration),
        _ => {
            eprintln!("Invalid duration");
            std::process::exit(1);
        }
    };
    let detail = matches.is_present("detail");

    // Read configuration file.
    let config = Config::load(matches.value_of("config"));

    // Initialize tracing.
    init_tracing(&config.logging);

    if let Err(error) = config.lsdb.validate() {
        error!(%error, "invalid LSDB configuration");
        std::process::exit(1);
    }

    let lc = Lifecycle::new(config.router_id, config.lsdb);
    let mut lsdb = LsdbMap::new(1);
    let mut registry = HandlerRegistry::default();
    registry.install_handler(
        LsaType::LINK,
        LsaHandler {
            name: "Link",
            display: display_link,
        },
    );

    if let Err(error) = load(&lc, &mut lsdb, filename) {
        error!(%filename, %error, "failed to read LSA file");
        std::process::exit(1);
    }
    info!(count = lsdb.len(), "LSAs installed");
    print_lsdb(&lsdb, &registry, detail);

    if !duration.is_zero() {
        if let Err(error) = run(&lc, &mut lsdb, duration).await {
            error!(%error, "aborting");
            std::process::exit(1);
        }
        print_lsdb(&lsdb, &registry, detail);
    }
}

// ===== unit tests =====
