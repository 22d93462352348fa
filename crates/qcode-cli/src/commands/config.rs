//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use qcode_core::{Color, Config};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            output.print_json(&config)?;
        }
        OutputFormat::Quiet => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("{}", effective_path.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!(
                "  history_limit:         {}",
                config
                    .history_limit
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "(unbounded)".to_string())
            );
            println!("  show_colors:           {}", config.style.show_colors);
            println!("  fill_alpha:            {}", config.style.fill_alpha);
            println!("  highlight_alpha:       {}", config.style.highlight_alpha);
            println!("  search_current:        {}", config.style.search_current);
            println!("  search_other:          {}", config.style.search_other);
            println!("  query_window_ms:       {}", config.coordinator.query_window_ms);
            println!(
                "  heartbeat_interval_ms: {}",
                config.coordinator.heartbeat_interval_ms
            );
            println!(
                "  stale_threshold_ms:    {}",
                config.coordinator.stale_threshold_ms
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "history_limit" => {
            config.history_limit = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.parse().context("Invalid value for history_limit")?)
            };
        }
        "show_colors" => {
            config.style.show_colors = value
                .parse()
                .context("Invalid value for show_colors. Use 'true' or 'false'.")?;
        }
        "fill_alpha" => config.style.fill_alpha = parse_alpha(key, value)?,
        "highlight_alpha" => config.style.highlight_alpha = parse_alpha(key, value)?,
        "search_current" => config.style.search_current = parse_color(key, value)?,
        "search_other" => config.style.search_other = parse_color(key, value)?,
        "query_window_ms" => config.coordinator.query_window_ms = parse_millis(key, value)?,
        "heartbeat_interval_ms" => {
            config.coordinator.heartbeat_interval_ms = parse_millis(key, value)?
        }
        "stale_threshold_ms" => {
            config.coordinator.stale_threshold_ms = parse_millis(key, value)?
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: history_limit, show_colors, fill_alpha, highlight_alpha, \
                 search_current, search_other, query_window_ms, heartbeat_interval_ms, \
                 stale_threshold_ms",
                key
            );
        }
    }
    Ok(())
}

fn parse_alpha(key: &str, value: &str) -> Result<f32> {
    let alpha: f32 = value
        .parse()
        .with_context(|| format!("Invalid value for {}", key))?;
    if !(0.0..=1.0).contains(&alpha) {
        bail!("{} must be between 0 and 1", key);
    }
    Ok(alpha)
}

fn parse_color(key: &str, value: &str) -> Result<Color> {
    value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use #RRGGBB.", key))
}

fn parse_millis(key: &str, value: &str) -> Result<u64> {
    let ms: u64 = value
        .parse()
        .with_context(|| format!("Invalid value for {}", key))?;
    if ms == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(ms)
}
