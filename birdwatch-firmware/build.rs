//! Build script for birdwatch-firmware
//!
//! - Places memory.x on the linker search path
//! - Validates node.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate node.toml at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=node.toml");

    let config_path = Path::new("node.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: node.toml not found!                                     ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds node.toml for WiFi and broker settings.     ║\n\
            ║  Please create one in the birdwatch-firmware directory.          ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read node.toml                                 ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in node.toml                         ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                {}\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();
    validate_wifi(&config, &mut errors);
    validate_broker(&config, &mut errors);
    validate_display(&config, &mut errors);
    validate_timing(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid node.toml                                        ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=node.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.chars().count() > 64 {
                format!("{}...", line.chars().take(61).collect::<String>())
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn section<'a>(
    config: &'a toml::Value,
    names: &[&str],
    errors: &mut Vec<String>,
) -> Option<&'a toml::value::Table> {
    let found = names.iter().find_map(|name| config.get(name));
    match found {
        Some(toml::Value::Table(t)) => Some(t),
        Some(_) => {
            errors.push(format!("[{}] must be a table", names[0]));
            None
        }
        None => {
            errors.push(format!("Missing [{}] section", names[0]));
            None
        }
    }
}

fn optional_section<'a>(
    config: &'a toml::Value,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<&'a toml::value::Table> {
    match config.get(name) {
        Some(toml::Value::Table(t)) => Some(t),
        Some(_) => {
            errors.push(format!("[{}] must be a table", name));
            None
        }
        None => None,
    }
}

/// Check a string key: required when `required`, and at most `max` bytes
fn check_string(
    table: &toml::value::Table,
    section: &str,
    key: &str,
    max: usize,
    required: bool,
    errors: &mut Vec<String>,
) {
    match table.get(key) {
        Some(toml::Value::String(s)) => {
            if required && s.is_empty() {
                errors.push(format!("[{}] '{}' cannot be empty", section, key));
            }
            if s.len() > max {
                errors.push(format!("[{}] '{}' longer than {} bytes", section, key, max));
            }
        }
        Some(_) => errors.push(format!("[{}] '{}' must be a string", section, key)),
        None if required => errors.push(format!("[{}] missing '{}'", section, key)),
        None => {}
    }
}

/// Check an optional integer key against an inclusive range
fn check_range(
    table: &toml::value::Table,
    section: &str,
    key: &str,
    min: i64,
    max: i64,
    errors: &mut Vec<String>,
) {
    match table.get(key) {
        Some(toml::Value::Integer(v)) => {
            if *v < min || *v > max {
                errors.push(format!("[{}] {} must be {}-{}", section, key, min, max));
            }
        }
        Some(_) => errors.push(format!("[{}] '{}' must be an integer", section, key)),
        None => {}
    }
}

fn validate_wifi(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(wifi) = section(config, &["wifi"], errors) else {
        return;
    };
    check_string(wifi, "wifi", "ssid", 32, true, errors);
    check_string(wifi, "wifi", "password", 64, false, errors);
}

fn validate_broker(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(broker) = section(config, &["broker", "mqtt"], errors) else {
        return;
    };
    check_string(broker, "broker", "host", 64, true, errors);
    check_string(broker, "broker", "client_id", 32, true, errors);
    check_string(broker, "broker", "topic", 64, true, errors);
    check_string(broker, "broker", "username", 32, false, errors);
    check_string(broker, "broker", "password", 64, false, errors);
    check_range(broker, "broker", "port", 1, 65_535, errors);
    check_range(broker, "broker", "keepalive_s", 0, 65_535, errors);

    let has_user = matches!(broker.get("username"), Some(toml::Value::String(s)) if !s.is_empty());
    let has_pass = matches!(broker.get("password"), Some(toml::Value::String(s)) if !s.is_empty());
    if has_pass && !has_user {
        println!("cargo:warning=node.toml: broker password is ignored without a username");
    }
}

fn validate_display(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(display) = optional_section(config, "display", errors) else {
        return;
    };
    check_range(display, "display", "width", 1, 128, errors);
    check_range(display, "display", "height", 1, 64, errors);
    check_range(display, "display", "line_height", 1, 64, errors);
}

fn validate_timing(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(timing) = optional_section(config, "timing", errors) else {
        return;
    };
    check_range(timing, "timing", "connect_attempts", 1, 255, errors);
    check_range(timing, "timing", "address_dwell_ms", 0, u32::MAX as i64, errors);
    check_range(timing, "timing", "poll_interval_ms", 1, u32::MAX as i64, errors);
    check_range(timing, "timing", "restart_delay_ms", 0, u32::MAX as i64, errors);
}
