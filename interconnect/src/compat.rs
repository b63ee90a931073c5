//! Producer/consumer protocol compatibility.

use serde::Serialize;
use thiserror::Error;

use crate::deps::arcstr::ArcStr;
use crate::graph::{Assembly, Attachment, ConnectionKey, Endpoint, Port};
use crate::log::debug;
use crate::protocol::{Profile, Role};

/// The outcome of checking one producer/consumer pair.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub enum Compatibility {
    /// Ancillary signals may still differ; the synthesizer bridges them.
    Compatible,
    /// Raw transport widths differ; a width adapter must be spliced in.
    NeedsAdapterInstance {
        input_width: usize,
        output_width: usize,
    },
}

/// The specific reason two ports cannot be connected.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum Incompatibility {
    #[error("data value width {producer} does not match {consumer}")]
    ElementWidth { producer: usize, consumer: usize },

    #[error("producer granularity {producer} is not a multiple of consumer granularity {consumer}")]
    Granularity { producer: usize, consumer: usize },

    #[error("producer maximum message size {producer} exceeds consumer maximum {consumer}")]
    MaxMessageValues { producer: usize, consumer: usize },

    #[error("protocol `{producer}` does not match `{consumer}`")]
    ProtocolName { producer: ArcStr, consumer: ArcStr },

    #[error("producer declares {producer} message kinds, consumer declares {consumer}")]
    MessageKindCount { producer: usize, consumer: usize },

    #[error("producer variable length is {producer} but consumer variable length is {consumer}")]
    VariableLength { producer: bool, consumer: bool },

    #[error("zero length messages allowed by producer: {producer}, by consumer: {consumer}")]
    ZeroLength { producer: bool, consumer: bool },

    #[error("profile {producer} does not match {consumer}")]
    ProfileMismatch { producer: Profile, consumer: Profile },

    #[error("producer continuous is {producer} but consumer continuous is {consumer}")]
    Continuity { producer: bool, consumer: bool },

    #[error("transport width {producer} does not match {consumer} and adapters are disabled")]
    TransportWidth { producer: usize, consumer: usize },

    #[error("fan-in producers have different transport widths ({first} and {second})")]
    MixedProducerWidths { first: usize, second: usize },
}

impl Incompatibility {
    /// The name of the attribute in conflict.
    pub fn attribute(&self) -> &'static str {
        use Incompatibility::*;
        match self {
            ElementWidth { .. } => "dataValueWidth",
            Granularity { .. } => "dataValueGranularity",
            MaxMessageValues { .. } => "maxMessageValues",
            ProtocolName { .. } => "protocol",
            MessageKindCount { .. } => "nOpcodes",
            VariableLength { .. } => "variableMessageLength",
            ZeroLength { .. } => "zeroLengthMessages",
            ProfileMismatch { .. } => "profile",
            Continuity { .. } => "continuous",
            TransportWidth { .. } | MixedProducerWidths { .. } => "dataWidth",
        }
    }
}

/// A producer/consumer pair that cannot be connected.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("connection {connection}: {producer} cannot feed {consumer}: {}: {reason}", .reason.attribute())]
pub struct ProtocolError {
    pub connection: ArcStr,
    pub producer: Endpoint,
    pub consumer: Endpoint,
    pub reason: Incompatibility,
}

impl ProtocolError {
    #[inline]
    pub fn attribute(&self) -> &'static str {
        self.reason.attribute()
    }
}

/// The verdict for one producer/consumer attachment pair.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct PairVerdict {
    pub producer: Attachment,
    pub consumer: Attachment,
    pub compatibility: Compatibility,
}

/// Compares the attributes of a producer port and a consumer port.
pub fn compare(producer: &Port, consumer: &Port) -> Result<Compatibility, Incompatibility> {
    use Incompatibility::*;
    let p = producer.protocol();
    let c = consumer.protocol();

    if p.declares_protocol() && c.declares_protocol() {
        if p.data_value_width != c.data_value_width {
            return Err(ElementWidth {
                producer: p.data_value_width,
                consumer: c.data_value_width,
            });
        }
        let granularity = std::cmp::max(1, c.data_value_granularity);
        if p.data_value_granularity % granularity != 0 {
            return Err(Granularity {
                producer: p.data_value_granularity,
                consumer: c.data_value_granularity,
            });
        }
        if let (Some(pm), Some(cm)) = (p.max_message_values, c.max_message_values) {
            if pm > cm {
                return Err(MaxMessageValues {
                    producer: pm,
                    consumer: cm,
                });
            }
        }
        if let (Some(pn), Some(cn)) = (&p.protocol, &c.protocol) {
            if pn != cn {
                return Err(ProtocolName {
                    producer: pn.clone(),
                    consumer: cn.clone(),
                });
            }
        }
        if let (Some(pk), Some(ck)) = (p.message_kind_count(), c.message_kind_count()) {
            if pk != ck {
                return Err(MessageKindCount {
                    producer: pk,
                    consumer: ck,
                });
            }
        }
        if p.variable_length && !c.variable_length {
            return Err(VariableLength {
                producer: p.variable_length,
                consumer: c.variable_length,
            });
        }
        if p.zero_length_allowed && !c.zero_length_allowed {
            return Err(ZeroLength {
                producer: p.zero_length_allowed,
                consumer: c.zero_length_allowed,
            });
        }
    }

    if producer.profile() != consumer.profile() {
        return Err(ProfileMismatch {
            producer: producer.profile(),
            consumer: consumer.profile(),
        });
    }

    if c.continuous && !p.continuous {
        return Err(Continuity {
            producer: p.continuous,
            consumer: c.continuous,
        });
    }

    let input_width = p.transport_width();
    let output_width = c.transport_width();
    if input_width != output_width {
        return Ok(Compatibility::NeedsAdapterInstance {
            input_width,
            output_width,
        });
    }

    Ok(Compatibility::Compatible)
}

/// Checks one producer/consumer attachment pair of `conn`.
pub fn check_pair(
    assembly: &Assembly,
    conn: ConnectionKey,
    producer: Attachment,
    consumer: Attachment,
) -> Result<Compatibility, ProtocolError> {
    compare(assembly.port(producer.port), assembly.port(consumer.port)).map_err(|reason| {
        ProtocolError {
            connection: assembly.connection(conn).name().clone(),
            producer: assembly.endpoint(producer.port),
            consumer: assembly.endpoint(consumer.port),
            reason,
        }
    })
}

/// Returns `true` if any port attached to `conn` carries data messages.
pub fn is_data_connection(assembly: &Assembly, conn: ConnectionKey) -> bool {
    assembly
        .connection(conn)
        .attachments()
        .iter()
        .any(|a| assembly.port(a.port).profile().is_data())
}

/// Checks every producer/consumer pair of a connection.
///
/// Connections without data-carrying ports yield no verdicts.
pub fn check_connection(
    assembly: &Assembly,
    conn: ConnectionKey,
) -> Result<Vec<PairVerdict>, ProtocolError> {
    if !is_data_connection(assembly, conn) {
        return Ok(Vec::new());
    }

    let producers = assembly.attachments_with_role(conn, Role::Producer);
    let consumers = assembly.attachments_with_role(conn, Role::Consumer);

    if let Some((first, rest)) = producers.split_first() {
        let width = assembly.port(first.port).protocol().transport_width();
        let mixed = rest
            .iter()
            .find(|a| assembly.port(a.port).protocol().transport_width() != width);
        if let (Some(other), Some(consumer)) = (mixed, consumers.first()) {
            return Err(ProtocolError {
                connection: assembly.connection(conn).name().clone(),
                producer: assembly.endpoint(other.port),
                consumer: assembly.endpoint(consumer.port),
                reason: Incompatibility::MixedProducerWidths {
                    first: width,
                    second: assembly.port(other.port).protocol().transport_width(),
                },
            });
        }
    }

    let mut verdicts = Vec::with_capacity(producers.len() * consumers.len());
    for producer in producers.iter().copied() {
        for consumer in consumers.iter().copied() {
            let compatibility = check_pair(assembly, conn, producer, consumer)?;
            debug!(
                "connection {}: {} -> {}: {:?}",
                assembly.connection(conn).name(),
                assembly.endpoint(producer.port),
                assembly.endpoint(consumer.port),
                compatibility
            );
            verdicts.push(PairVerdict {
                producer,
                consumer,
                compatibility,
            });
        }
    }
    Ok(verdicts)
}

/// The verdicts of every pair on one connection.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CheckedConnection {
    pub connection: ConnectionKey,
    pub verdicts: Vec<PairVerdict>,
}

impl CheckedConnection {
    /// Returns the pairs that need a width adapter.
    pub fn needing_adapters(&self) -> impl Iterator<Item = &PairVerdict> {
        self.verdicts
            .iter()
            .filter(|v| matches!(v.compatibility, Compatibility::NeedsAdapterInstance { .. }))
    }
}

/// Checks every data-carrying connection of `assembly`, in name order.
pub fn check_all(assembly: &Assembly) -> Result<Vec<CheckedConnection>, ProtocolError> {
    assembly
        .sorted_connections()
        .into_iter()
        .filter(|key| is_data_connection(assembly, *key))
        .map(|key| {
            Ok(CheckedConnection {
                connection: key,
                verdicts: check_connection(assembly, key)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::worker::{PortDecl, Worker};
    use crate::graph::PortKey;
    use crate::protocol::{Direction, MessageKinds, PortProtocol};

    fn pair(
        producer: (Profile, PortProtocol),
        consumer: (Profile, PortProtocol),
    ) -> (Assembly, PortKey, PortKey) {
        let src = Worker::new(
            "src",
            vec![PortDecl::new("out", Direction::Output, producer.0).with_protocol(producer.1)],
        )
        .unwrap();
        let dst = Worker::new(
            "dst",
            vec![PortDecl::new("in", Direction::Input, consumer.0).with_protocol(consumer.1)],
        )
        .unwrap();
        let mut a = Assembly::new("top");
        let s = a.add_instance("s", Arc::new(src)).unwrap();
        let d = a.add_instance("d", Arc::new(dst)).unwrap();
        let out = a.instance_port(s, "out").unwrap();
        let inp = a.instance_port(d, "in").unwrap();
        (a, out, inp)
    }

    fn stream(protocol: PortProtocol) -> (Profile, PortProtocol) {
        (Profile::Stream, protocol)
    }

    /// A protocol declaring four message kinds, tweaked by `f`.
    fn declared(f: impl FnOnce(&mut PortProtocol)) -> PortProtocol {
        let mut p = PortProtocol {
            message_kinds: Some(MessageKinds::Count(4)),
            ..Default::default()
        };
        f(&mut p);
        p
    }

    #[test]
    fn identical_ports_are_compatible() {
        let p = declared(|_| {});
        let (a, out, inp) = pair(stream(p.clone()), stream(p));
        assert_eq!(
            compare(a.port(out), a.port(inp)),
            Ok(Compatibility::Compatible)
        );
    }

    #[test]
    fn protocol_rules_apply_in_order() {
        let (a, out, inp) = pair(
            stream(declared(|p| p.data_value_width = 16)),
            (Profile::Memory, declared(|_| {})),
        );
        assert_eq!(
            compare(a.port(out), a.port(inp)),
            Err(Incompatibility::ElementWidth {
                producer: 16,
                consumer: 8
            })
        );

        let (a, out, inp) = pair(
            stream(declared(|p| p.data_value_granularity = 6)),
            stream(declared(|p| p.data_value_granularity = 4)),
        );
        assert!(matches!(
            compare(a.port(out), a.port(inp)),
            Err(Incompatibility::Granularity { .. })
        ));

        let (a, out, inp) = pair(
            stream(declared(|p| p.protocol = Some(arcstr::literal!("iq")))),
            stream(declared(|p| p.protocol = Some(arcstr::literal!("real")))),
        );
        assert_eq!(compare(a.port(out), a.port(inp)).unwrap_err().attribute(), "protocol");

        let (a, out, inp) = pair(
            stream(declared(|_| {})),
            stream(declared(|p| p.message_kinds = Some(MessageKinds::Count(2)))),
        );
        assert!(matches!(
            compare(a.port(out), a.port(inp)),
            Err(Incompatibility::MessageKindCount {
                producer: 4,
                consumer: 2
            })
        ));

        let (a, out, inp) = pair(
            stream(declared(|_| {})),
            stream(declared(|p| p.variable_length = false)),
        );
        assert_eq!(
            compare(a.port(out), a.port(inp)),
            Err(Incompatibility::VariableLength {
                producer: true,
                consumer: false
            })
        );

        let (a, out, inp) = pair(
            stream(declared(|_| {})),
            stream(declared(|p| p.zero_length_allowed = false)),
        );
        assert_eq!(
            compare(a.port(out), a.port(inp)),
            Err(Incompatibility::ZeroLength {
                producer: true,
                consumer: false
            })
        );
    }

    #[test]
    fn protocol_rules_need_both_sides_declared() {
        // Only the consumer declares a protocol, so message-level rules are skipped.
        let (a, out, inp) = pair(
            stream(PortProtocol::default()),
            stream(declared(|p| p.variable_length = false)),
        );
        assert_eq!(
            compare(a.port(out), a.port(inp)),
            Ok(Compatibility::Compatible)
        );
    }

    #[test]
    fn profile_and_continuity() {
        let (a, out, inp) = pair(
            stream(PortProtocol::default()),
            (Profile::Message, PortProtocol::default()),
        );
        assert_eq!(
            compare(a.port(out), a.port(inp)).unwrap_err().attribute(),
            "profile"
        );

        let continuous = PortProtocol {
            continuous: true,
            ..Default::default()
        };
        let (a, out, inp) = pair(stream(PortProtocol::default()), stream(continuous.clone()));
        assert_eq!(
            compare(a.port(out), a.port(inp)),
            Err(Incompatibility::Continuity {
                producer: false,
                consumer: true
            })
        );
        let (a, out, inp) = pair(stream(continuous), stream(PortProtocol::default()));
        assert!(compare(a.port(out), a.port(inp)).is_ok());
    }

    #[test]
    fn transport_width_mismatch_needs_an_adapter() {
        let wide = PortProtocol {
            data_width: 128,
            ..Default::default()
        };
        let (a, out, inp) = pair(stream(PortProtocol::default()), stream(wide));
        assert_eq!(
            compare(a.port(out), a.port(inp)),
            Ok(Compatibility::NeedsAdapterInstance {
                input_width: 32,
                output_width: 128
            })
        );
    }

    #[test]
    fn non_data_connections_are_skipped() {
        let (mut a, out, inp) = pair(
            (Profile::Time, PortProtocol::default()),
            (Profile::Time, PortProtocol::default()),
        );
        let c = a.add_connection("time").unwrap();
        a.attach(c, out, 0, 1).unwrap();
        a.attach(c, inp, 0, 1).unwrap();
        assert!(check_connection(&a, c).unwrap().is_empty());
    }
}
