// Copyright 2025 Meta-Hybrid Mount Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::Write;

use env_logger::Builder;

pub fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder.format(|buf, record| {
        writeln!(buf, "[{}] [{}] {}", record.level(), record.target(), record.args())
    });
    builder.filter_level(level).init();

    log::info!("log level: {}", level.as_str());
}
