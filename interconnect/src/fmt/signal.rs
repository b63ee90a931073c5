use std::fmt::Display;
use std::num::ParseIntError;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deps::arcstr::ArcStr;
use crate::graph::Endpoint;

/// An enumeration of bus formatting styles.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum BusFmt {
    /// Delimits the bus index using two characters, eg. `data[3]`.
    DoubleDelimiter(char, char),

    /// Delimits the bus index using one character, eg. `data_3`.
    SingleDelimiter(char),
}

impl Default for BusFmt {
    fn default() -> Self {
        Self::DoubleDelimiter('[', ']')
    }
}

pub fn format_signal(name: impl Into<ArcStr>, idx: usize, width: usize, format: BusFmt) -> ArcStr {
    let name = name.into();
    if width == 1 {
        name
    } else {
        format_bus(&name, idx, format)
    }
}

pub fn format_bus(name: &str, idx: usize, format: BusFmt) -> ArcStr {
    use BusFmt::*;
    match format {
        DoubleDelimiter(a, b) => arcstr::format!("{name}{a}{idx}{b}"),
        SingleDelimiter(d) => arcstr::format!("{name}{d}{idx}"),
    }
}

/// Builds the name of the wire carrying one signal of a port element.
///
/// Instance ports are prefixed with the instance name; boundary ports are not.
/// Array ports get the element index appended using `format`.
pub fn wire_name(
    endpoint: &Endpoint,
    idx: usize,
    array_count: usize,
    suffix: &str,
    format: BusFmt,
) -> ArcStr {
    let base = match endpoint.instance() {
        Some(inst) => arcstr::format!("{}_{}_{}", inst, endpoint.port(), suffix),
        None => arcstr::format!("{}_{}", endpoint.port(), suffix),
    };
    format_signal(base, idx, array_count, format)
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseRefError {
    #[error("expected `instance.port` or `instance.port[index]`, got `{0}`")]
    InvalidSyntax(String),

    #[error("error parsing port index: {0}")]
    ParseInt(#[from] ParseIntError),
}

/// A textual reference to an instance port, eg. `fir.in[2]`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Serialize)]
pub struct ParsedPortRef<'a> {
    pub instance: &'a str,
    pub port: &'a str,
    pub index: Option<usize>,
}

impl Display for ParsedPortRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.instance, self.port)?;
        if let Some(idx) = self.index {
            write!(f, "[{idx}]")?;
        }
        Ok(())
    }
}

lazy_static! {
    static ref PORT_REF_REGEX: Regex =
        Regex::new(r"^(?P<inst>[^.\[\]\s]+)\.(?P<port>[^.\[\]\s]+)(\[(?P<idx>\d+)\])?$")
            .expect("failed to compile port reference regex");
}

pub fn parse_port_ref(text: &str) -> Result<ParsedPortRef<'_>, ParseRefError> {
    let text = text.trim();
    let caps = PORT_REF_REGEX
        .captures(text)
        .ok_or_else(|| ParseRefError::InvalidSyntax(text.to_string()))?;
    let instance = caps
        .name("inst")
        .ok_or_else(|| ParseRefError::InvalidSyntax(text.to_string()))?
        .as_str();
    let port = caps
        .name("port")
        .ok_or_else(|| ParseRefError::InvalidSyntax(text.to_string()))?
        .as_str();
    let index = match caps.name("idx") {
        Some(idx) => Some(idx.as_str().parse::<usize>()?),
        None => None,
    };

    Ok(ParsedPortRef {
        instance,
        port,
        index,
    })
}
