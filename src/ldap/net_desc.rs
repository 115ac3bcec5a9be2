use crate::error::{AppError, Result};

const HOST_PREFIX: &str = "(HOST=";
const PORT_PREFIX: &str = "(PORT=";
const SERVICE_NAME_PREFIX: &str = "(SERVICE_NAME=";
const VALUE_SUFFIX: char = ')';

/// Host, port and service name taken from an `orclNetDescString` directory attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetDesc {
    pub host: String,
    pub port: u16,
    pub service_name: String,
}

impl NetDesc {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self {
            host: require_value(raw, HOST_PREFIX, "HOST")?.to_string(),
            port: require_port(raw)?,
            service_name: require_value(raw, SERVICE_NAME_PREFIX, "SERVICE_NAME")?.to_string(),
        })
    }
}

fn require_port(raw: &str) -> Result<u16> {
    let value = require_value(raw, PORT_PREFIX, "PORT")?;
    let port: i128 = value
        .trim()
        .parse()
        .map_err(|_| parse_error("net descriptor contained an invalid PORT value"))?;

    if port > u16::MAX as i128 {
        return Err(parse_error(
            "net descriptor contained a PORT value that was too large to be a valid port",
        ));
    }
    if port < 0 {
        return Err(parse_error(
            "net descriptor contained a PORT value that was less than zero",
        ));
    }
    Ok(port as u16)
}

fn require_value<'a>(raw: &'a str, prefix: &str, name: &str) -> Result<&'a str> {
    let start = raw
        .find(prefix)
        .ok_or_else(|| parse_error(&format!("net descriptor did not contain a {} value", name)))?;
    let value_start = start + prefix.len();
    let end = raw[value_start..]
        .find(VALUE_SUFFIX)
        .ok_or_else(|| parse_error(&format!("malformed net descriptor {} value", name)))?;

    let value = &raw[value_start..value_start + end];
    if value.is_empty() {
        return Err(parse_error(&format!(
            "net descriptor contained an empty {} value",
            name
        )));
    }
    Ok(value)
}

fn parse_error(message: &str) -> AppError {
    AppError::NetDescParse(message.to_string())
}
