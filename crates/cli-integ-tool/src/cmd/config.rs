use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use integ_core::config::{ConfigWarning, HarnessConfig, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration (defaults, file, then environment)
    Show,

    /// Validate the configuration for common mistakes
    Validate,
}

pub fn run(file: Option<&Path>, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load(file)?;
    match subcmd {
        ConfigSubcommand::Show => show(&config, json),
        ConfigSubcommand::Validate => validate(&config, json),
    }
}

fn load(file: Option<&Path>) -> anyhow::Result<HarnessConfig> {
    match file {
        Some(path) => {
            let mut config = HarnessConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => HarnessConfig::load().context("failed to load config"),
    }
}

fn show(config: &HarnessConfig, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(config);
    }
    let path_or = |p: Option<&Path>, fallback: &str| {
        p.map(|p| p.display().to_string())
            .unwrap_or_else(|| fallback.to_string())
    };
    let rows = vec![
        vec!["cdk_bin".into(), config.cdk_bin.clone()],
        vec!["sam_bin".into(), config.sam_bin.clone()],
        vec!["app_dir".into(), path_or(config.app_dir.as_deref(), "-")],
        vec!["work_root".into(), config.work_root().display().to_string()],
        vec!["lock_dir".into(), config.lock_dir.display().to_string()],
        vec!["regions".into(), config.regions.join(",")],
        vec!["keep_on_failure".into(), config.keep_on_failure.to_string()],
        vec!["no_clean".into(), config.no_clean.to_string()],
        vec!["verbose".into(), config.verbose.to_string()],
        vec!["only".into(), config.only.join(",")],
        vec!["skip".into(), config.skip.join(",")],
        vec!["default_timeout_secs".into(), config.default_timeout_secs.to_string()],
        vec!["start_api_timeout_secs".into(), config.start_api_timeout_secs.to_string()],
        vec!["cleanup_timeout_secs".into(), config.cleanup_timeout_secs.to_string()],
    ];
    print_table(&["KEY", "VALUE"], &rows);
    Ok(())
}

fn validate(config: &HarnessConfig, json: bool) -> anyhow::Result<()> {
    let mut warnings = config.validate();
    for bin in [&config.cdk_bin, &config.sam_bin] {
        if let Err(e) = cli_driver::resolve_binary(bin) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: e.to_string(),
            });
        }
    }

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
