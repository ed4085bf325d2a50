//! Minimal TOML parser for `node.toml`
//!
//! Handles only the subset the node configuration uses. It does NOT support
//! full TOML syntax.
//!
//! Supported features:
//! - `[section]` headers: `wifi`, `broker`, `display`, `timing`
//! - Key = value pairs (string, integer)
//! - Comments (# ...), including after a value
//!
//! NOT supported:
//! - Arrays, inline tables, dotted keys
//! - Multi-line strings or escape sequences

use heapless::String;

use super::types::NodeConfig;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Unknown or malformed section header
    InvalidSection,
    /// Value has the wrong type or is out of range
    InvalidValue(&'static str),
    /// String longer than its field allows
    TooLong(&'static str),
    /// Required key not present
    MissingField(&'static str),
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Wifi,
    Broker,
    Display,
    Timing,
}

/// Parse `node.toml` into a [`NodeConfig`]
///
/// Unknown keys are ignored. Missing optional keys keep their defaults.
pub fn parse_config(input: &str) -> Result<NodeConfig, ParseError> {
    let mut config = NodeConfig::default();
    let mut section = Section::Root;

    for line in input.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = parse_section_header(&line[1..line.len() - 1])?;
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config)?;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn parse_section_header(header: &str) -> Result<Section, ParseError> {
    match header.trim() {
        "wifi" => Ok(Section::Wifi),
        "broker" | "mqtt" => Ok(Section::Broker),
        "display" => Ok(Section::Display),
        "timing" => Ok(Section::Timing),
        _ => Err(ParseError::InvalidSection),
    }
}

/// Parse "key = value" line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Remove inline comments
    let value = if let Some(hash_pos) = value.find('#') {
        // Make sure # is not inside a string
        let quote_count = value[..hash_pos].matches('"').count();
        if quote_count % 2 == 0 {
            value[..hash_pos].trim()
        } else {
            value
        }
    } else {
        value
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

/// Parse a string value (removes quotes)
fn parse_string(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        // Allow unquoted strings for simple values
        value
    }
}

/// Parse a string into a bounded field
fn parse_bounded<const N: usize>(value: &str, field: &'static str) -> Result<String<N>, ParseError> {
    String::try_from(parse_string(value)).map_err(|_| ParseError::TooLong(field))
}

/// Parse an optional string; empty means absent
fn parse_optional<const N: usize>(
    value: &str,
    field: &'static str,
) -> Result<Option<String<N>>, ParseError> {
    let s: String<N> = parse_bounded(value, field)?;
    Ok(if s.is_empty() { None } else { Some(s) })
}

/// Parse an integer value
fn parse_int<T: core::str::FromStr>(value: &str, field: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue(field))
}

fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut NodeConfig,
) -> Result<(), ParseError> {
    match section {
        Section::Wifi => {
            let w = &mut config.wifi;
            match key {
                "ssid" => w.ssid = parse_bounded(value, "wifi.ssid")?,
                "password" => w.password = parse_bounded(value, "wifi.password")?,
                _ => {} // Ignore unknown keys
            }
        }
        Section::Broker => {
            let b = &mut config.broker;
            match key {
                "host" => b.host = parse_bounded(value, "broker.host")?,
                "port" => b.port = parse_int(value, "broker.port")?,
                "client_id" | "client" => b.client_id = parse_bounded(value, "broker.client_id")?,
                "username" => b.username = parse_optional(value, "broker.username")?,
                "password" => b.password = parse_optional(value, "broker.password")?,
                "topic" => b.topic = parse_bounded(value, "broker.topic")?,
                "keepalive_s" => b.keepalive_s = parse_int(value, "broker.keepalive_s")?,
                _ => {}
            }
        }
        Section::Display => {
            let d = &mut config.display;
            match key {
                "width" => d.width = parse_int(value, "display.width")?,
                "height" => d.height = parse_int(value, "display.height")?,
                "line_height" => d.line_height = parse_int(value, "display.line_height")?,
                _ => {}
            }
        }
        Section::Timing => {
            let t = &mut config.timing;
            match key {
                "connect_attempts" => {
                    t.connect_attempts = parse_int(value, "timing.connect_attempts")?
                }
                "address_dwell_ms" => {
                    t.address_dwell_ms = parse_int(value, "timing.address_dwell_ms")?
                }
                "poll_interval_ms" => {
                    t.poll_interval_ms = parse_int(value, "timing.poll_interval_ms")?
                }
                "restart_delay_ms" => {
                    t.restart_delay_ms = parse_int(value, "timing.restart_delay_ms")?
                }
                _ => {}
            }
        }
        Section::Root => {
            // No root-level keys
        }
    }

    Ok(())
}

/// Check required fields and ranges
fn validate(config: &NodeConfig) -> Result<(), ParseError> {
    if config.wifi.ssid.is_empty() {
        return Err(ParseError::MissingField("wifi.ssid"));
    }
    if config.broker.host.is_empty() {
        return Err(ParseError::MissingField("broker.host"));
    }
    if config.broker.client_id.is_empty() {
        return Err(ParseError::MissingField("broker.client_id"));
    }
    if config.broker.topic.is_empty() {
        return Err(ParseError::MissingField("broker.topic"));
    }
    if config.broker.port == 0 {
        return Err(ParseError::InvalidValue("broker.port"));
    }
    if config.display.width == 0 || config.display.height == 0 {
        return Err(ParseError::InvalidValue("display.width"));
    }
    if config.display.line_height == 0 {
        return Err(ParseError::InvalidValue("display.line_height"));
    }
    if config.timing.connect_attempts == 0 {
        return Err(ParseError::InvalidValue("timing.connect_attempts"));
    }
    if config.timing.poll_interval_ms == 0 {
        return Err(ParseError::InvalidValue("timing.poll_interval_ms"));
    }
    Ok(())
}
