//! Naming and parsing of wires and port references.

pub mod signal;

pub use signal::{
    format_bus, format_signal, parse_port_ref, wire_name, BusFmt, ParseRefError, ParsedPortRef,
};
