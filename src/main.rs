#![deny(clippy::all, clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]

mod conf;
mod defs;
mod mount;
mod notify;
mod utils;

use anyhow::{Context, Result};
use mimalloc::MiMalloc;

use crate::{
    conf::{Config, cli, cli::Command, config::CONFIG_FILE_DEFAULT},
    mount::{context::MountContext, orchestrator, scan},
    notify::Notifier,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn load_config(path: &std::path::Path) -> Config {
    if let Ok(config) = Config::from_file(path) {
        log::info!("loaded config from {}", path.display());
        return config;
    }
    log::info!("using default configuration (no config file at {})", path.display());
    Config::default()
}

fn make_notifier(disable_umount: bool) -> Box<dyn Notifier> {
    if disable_umount {
        return Box::new(notify::NullNotifier);
    }
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        Box::new(notify::KsuNotifier::default())
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        Box::new(notify::NullNotifier)
    }
}

fn run_daemon(config_path: &std::path::Path, overrides: &cli::ConfigOverrides) -> Result<()> {
    let mut config = load_config(config_path);
    config.merge_with_cli(overrides);

    utils::log::init_logger(config.verbose);

    log::info!("magic mount starting");
    log::info!("module dir      : {}", config.moduledir.display());
    log::info!("mount source    : {}", config.mountsource);
    log::info!("verbose mode    : {}", config.verbose);
    log::info!(
        "extra partitions: {}",
        if config.partitions.is_empty() { "none".to_string() } else { format!("{:?}", config.partitions) }
    );

    let tmp_root = utils::select_temp_dir().context("failed to select a tmpfs mount point for the scaffold")?;
    log::info!("scaffold root   : {}", tmp_root.display());
    utils::ensure_temp_dir(&tmp_root)?;

    let mut notifier = make_notifier(config.disable_umount);
    let mut ctx = MountContext::new(config.partitions.clone(), notifier.as_mut());

    let result = orchestrator::run(&tmp_root, &config.moduledir, &config.mountsource, &mut ctx);

    utils::cleanup_temp_dir(&tmp_root);

    match result {
        Ok(()) if ctx.ok() => {
            log::info!("magic mount completed successfully");
            Ok(())
        }
        Ok(()) => {
            log::warn!("magic mount completed with failures: {:?}", ctx.failed_modules());
            anyhow::bail!("one or more modules failed to mount completely")
        }
        Err(e) => {
            log::error!("magic mount failed");
            for cause in e.chain() {
                log::error!("{cause:#}");
            }
            Err(e)
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match cli::parse(&args) {
        Command::Scan { json } => {
            let config = load_config(std::path::Path::new(CONFIG_FILE_DEFAULT));
            let modules = scan::scan_modules(&config.moduledir);

            if json {
                println!("{}", serde_json::to_string(&modules)?);
            } else {
                for module in modules {
                    if !module.disabled && !module.skip {
                        println!("{}", module.id);
                    }
                }
            }
            Ok(())
        }
        Command::GenConfig { output } => {
            Config::default().save_to_file(&output)?;
            println!("wrote default config to {}", output.display());
            Ok(())
        }
        Command::ShowConfig { config_path, overrides } => {
            let mut config = load_config(&config_path);
            config.merge_with_cli(&overrides);
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run { config_path, overrides } => run_daemon(&config_path, &overrides),
    }
}
