//! Port profiles, directions and protocol attributes.

use std::fmt::Display;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::deps::arcstr::ArcStr;

/// The fixed catalog of interface kinds a port may implement.
#[derive(
    Clone, Copy, Eq, PartialEq, Hash, Default, Debug, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Control plane port. Every worker has one; it is always clocked
    /// by the designated control clock.
    Control,
    /// Streaming data port.
    #[default]
    Stream,
    /// Message-oriented data port.
    Message,
    /// Memory-mapped port.
    Memory,
    /// Time service port.
    Time,
}

impl Profile {
    /// Returns `true` for profiles whose connections carry data messages.
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Stream | Self::Message)
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Control => write!(f, "control"),
            Self::Stream => write!(f, "stream"),
            Self::Message => write!(f, "message"),
            Self::Memory => write!(f, "memory"),
            Self::Time => write!(f, "time"),
        }
    }
}

/// An enumeration of port directions, as declared by the port's owner.
#[derive(
    Clone, Copy, Eq, PartialEq, Hash, Default, Debug, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Input,
    Output,
}

impl Direction {
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// The role a port plays within a connection.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Role {
    Producer,
    Consumer,
}

impl From<Direction> for Role {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Output => Self::Producer,
            Direction::Input => Self::Consumer,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Producer => write!(f, "producer"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

/// The set of message kinds (opcodes) a protocol declares.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageKinds {
    /// Only the number of message kinds is known.
    Count(usize),
    /// Named message kinds; the ordinal of each is its position.
    Named(Vec<ArcStr>),
}

impl MessageKinds {
    #[inline]
    pub fn count(&self) -> usize {
        match self {
            Self::Count(n) => *n,
            Self::Named(names) => names.len(),
        }
    }

    pub fn names(&self) -> Option<&[ArcStr]> {
        match self {
            Self::Count(_) => None,
            Self::Named(names) => Some(names),
        }
    }
}

/// The burst modes a port supports.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct BurstModes {
    pub precise: bool,
    pub imprecise: bool,
}

impl Display for BurstModes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match (self.precise, self.imprecise) {
            (true, true) => "precise and imprecise",
            (true, false) => "precise only",
            (false, true) => "imprecise only",
            (false, false) => "none",
        };
        write!(f, "{s}")
    }
}

/// Protocol and transport attributes of a data port.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct PortProtocol {
    /// Payload bits per transfer.
    pub data_width: usize,
    /// Payload bits per unit (byte). One validity bit covers each unit.
    pub byte_width: usize,
    /// Extra bits carried alongside each unit.
    pub sideband_width: usize,
    /// Width of one data value (message element).
    pub data_value_width: usize,
    /// Number of data values messages are a multiple of.
    pub data_value_granularity: usize,
    /// Largest message, in data values. `None` means unbounded.
    #[builder(setter(strip_option))]
    pub max_message_values: Option<usize>,
    /// Declared message kinds. `None` if the port declares no protocol.
    #[builder(setter(strip_option))]
    pub message_kinds: Option<MessageKinds>,
    /// Name of the declared protocol.
    #[builder(setter(into, strip_option))]
    pub protocol: Option<ArcStr>,
    pub variable_length: bool,
    pub zero_length_allowed: bool,
    pub continuous: bool,
    pub precise_burst: bool,
    pub imprecise_burst: bool,
    pub abortable: bool,
    pub early_request: bool,
}

impl Default for PortProtocol {
    fn default() -> Self {
        Self {
            data_width: 32,
            byte_width: 8,
            sideband_width: 0,
            data_value_width: 8,
            data_value_granularity: 1,
            max_message_values: None,
            message_kinds: None,
            protocol: None,
            variable_length: true,
            zero_length_allowed: true,
            continuous: false,
            precise_burst: false,
            imprecise_burst: true,
            abortable: false,
            early_request: false,
        }
    }
}

/// Bits needed to represent `n`, ie. `floor(log2(n)) + 1` for `n > 0`.
#[inline]
pub(crate) fn bit_length(n: usize) -> usize {
    (usize::BITS - n.leading_zeros()) as usize
}

/// Bits needed to encode `n` distinct values.
#[inline]
pub(crate) fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        bit_length(n - 1)
    }
}

impl PortProtocol {
    #[inline]
    pub fn builder() -> PortProtocolBuilder {
        PortProtocolBuilder::default()
    }

    /// Returns `true` if the port declares a message protocol.
    #[inline]
    pub fn declares_protocol(&self) -> bool {
        self.message_kinds.is_some()
    }

    #[inline]
    pub fn burst_modes(&self) -> BurstModes {
        BurstModes {
            precise: self.precise_burst,
            imprecise: self.imprecise_burst,
        }
    }

    #[inline]
    pub fn message_kind_count(&self) -> Option<usize> {
        self.message_kinds.as_ref().map(MessageKinds::count)
    }

    /// Number of units (bytes) per transfer.
    #[inline]
    pub fn units(&self) -> usize {
        if self.byte_width == 0 {
            1
        } else {
            std::cmp::max(1, self.data_width / self.byte_width)
        }
    }

    /// Total bits per unit, payload plus sideband.
    #[inline]
    pub fn unit_width(&self) -> usize {
        self.byte_width + self.sideband_width
    }

    /// Raw transport width: every bit crossing the connection per transfer.
    #[inline]
    pub fn transport_width(&self) -> usize {
        self.units() * self.unit_width()
    }

    /// Width of the per-unit validity vector, if the port has one.
    #[inline]
    pub fn byte_enable_width(&self) -> Option<usize> {
        let units = self.units();
        (units > 1).then_some(units)
    }

    /// Width of the message-kind field.
    ///
    /// Ports without a declared protocol use `default_width`.
    pub fn opcode_width(&self, default_width: usize) -> usize {
        match self.message_kind_count() {
            Some(n) => ceil_log2(n),
            None => default_width,
        }
    }

    /// Largest message size in transfers, if bounded.
    pub fn words_per_message(&self) -> Option<usize> {
        let values = self.max_message_values?;
        let bits = values.saturating_mul(self.data_value_width);
        Some(std::cmp::max(1, bits.div_ceil(std::cmp::max(1, self.data_width))))
    }

    /// Width of the burst-length counter.
    pub fn burst_length_width(&self) -> usize {
        if !self.precise_burst {
            return 2;
        }
        match self.words_per_message() {
            Some(words) => std::cmp::max(2, bit_length(words)),
            None => 12,
        }
    }

    /// Width of the given signal on this port, or `None` if the port
    /// has no such signal.
    pub fn signal_width(&self, kind: SignalKind, default_opcode_width: usize) -> Option<usize> {
        use SignalKind::*;
        let width = match kind {
            Data => self.units() * self.byte_width,
            Sideband => self.units() * self.sideband_width,
            ByteEnable => self.byte_enable_width().unwrap_or(0),
            Opcode => self.opcode_width(default_opcode_width),
            BurstLength => self.burst_length_width(),
            BurstPrecise => usize::from(self.precise_burst),
            Command => 3,
            EarlyValid => usize::from(self.early_request),
            Last => 1,
            Abort => usize::from(self.abortable),
        };
        (width > 0).then_some(width)
    }
}

/// Signals of a data port that adaptation plans can drive.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Ord, PartialOrd, Serialize, Deserialize)]
pub enum SignalKind {
    Data,
    Sideband,
    ByteEnable,
    Opcode,
    BurstLength,
    BurstPrecise,
    Command,
    EarlyValid,
    Last,
    Abort,
}

impl SignalKind {
    /// The suffix used when naming wires of this signal.
    pub fn suffix(&self) -> &'static str {
        use SignalKind::*;
        match *self {
            Data => "data",
            Sideband => "sideband",
            ByteEnable => "byte_en",
            Opcode => "opcode",
            BurstLength => "burst_length",
            BurstPrecise => "burst_precise",
            Command => "cmd",
            EarlyValid => "early_valid",
            Last => "last",
            Abort => "abort",
        }
    }
}

impl Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}
