//! Verifies that every connection is well formed before resolution.

use std::fmt::Display;

use super::error::StructuralError;
use super::{Assembly, ConnectionKey, Endpoint, PortOwner};
use crate::deps::arcstr::ArcStr;
use crate::log::Log;
use crate::protocol::Role;
use crate::validation::ValidatorOutput;

/// Validates the structure of an assembly.
///
/// Every connection must carry at least one producer and one consumer, unless
/// all of its attachments are boundary ports, and all attachments of a
/// connection must bind the same number of elements.
pub(crate) fn validate_structure(assembly: &Assembly) -> StructureValidatorOutput {
    StructureValidator {
        assembly,
        output: ValidatorOutput::default(),
    }
    .validate()
}

pub type StructureValidatorOutput =
    ValidatorOutput<PartialArray, UnconnectedPort, StructuralError, StructureSummary>;

struct StructureValidator<'a> {
    assembly: &'a Assembly,
    output: StructureValidatorOutput,
}

/// A data port of an instance that no connection uses.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct UnconnectedPort {
    pub endpoint: Endpoint,
}

impl Display for UnconnectedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not connected", self.endpoint)
    }
}

impl Log for UnconnectedPort {
    fn log(&self) {
        use crate::log::warn;
        warn!("{self}");
    }
}

/// An array port with only some of its elements connected.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PartialArray {
    pub endpoint: Endpoint,
    pub connected: usize,
    pub array_count: usize,
}

impl Display for PartialArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} has {} of {} elements connected; the rest are tied idle",
            self.endpoint, self.connected, self.array_count
        )
    }
}

impl Log for PartialArray {
    fn log(&self) {
        use crate::log::info;
        info!("{self}");
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct StructureSummary {
    pub assembly: ArcStr,
    pub instances: usize,
    pub connections: usize,
    /// Connections whose attachments are all boundary ports.
    pub pass_throughs: usize,
}

impl Log for StructureSummary {
    fn log(&self) {
        use crate::log::info;
        info!(
            "assembly {}: {} instances, {} connections ({} pass-through)",
            self.assembly, self.instances, self.connections, self.pass_throughs
        );
    }
}

impl<'a> StructureValidator<'a> {
    fn validate(mut self) -> StructureValidatorOutput {
        self.output.data.assembly = self.assembly.name().clone();
        self.output.data.instances = self.assembly.instances().count();
        self.output.data.connections = self.assembly.num_connections();

        for key in self.assembly.sorted_connections() {
            self.validate_connection(key);
        }
        self.validate_ports();
        self.output
    }

    fn validate_connection(&mut self, key: ConnectionKey) {
        let assembly = self.assembly;
        let conn = assembly.connection(key);
        let attachments = conn.attachments();

        let Some(first) = attachments.first() else {
            self.output.errors.push(StructuralError::EmptyConnection {
                connection: conn.name().clone(),
            });
            return;
        };

        let expected = first.count;
        for a in attachments.iter().skip(1) {
            if a.count != expected {
                self.output.errors.push(StructuralError::CountMismatch {
                    connection: conn.name().clone(),
                    endpoint: assembly.endpoint(a.port),
                    count: a.count,
                    expected,
                });
            }
        }

        if attachments
            .iter()
            .all(|a| assembly.port(a.port).is_boundary())
        {
            self.output.data.pass_throughs += 1;
            return;
        }

        for role in [Role::Producer, Role::Consumer] {
            if assembly.attachments_with_role(key, role).is_empty() {
                self.output.errors.push(StructuralError::MissingAttachment {
                    connection: conn.name().clone(),
                    role,
                });
            }
        }
    }

    fn validate_ports(&mut self) {
        let assembly = self.assembly;
        let mut found = assembly
            .ports()
            .filter(|(_, p)| matches!(p.owner(), PortOwner::Instance(_)) && p.profile().is_data())
            .filter_map(|(key, p)| {
                let connected = p.occupied().iter().filter(|c| c.is_some()).count();
                (connected < p.array_count()).then(|| (assembly.endpoint(key), connected, p))
            })
            .collect::<Vec<_>>();
        found.sort_by(|a, b| a.0.cmp(&b.0));

        for (endpoint, connected, port) in found {
            if connected == 0 {
                self.output.warnings.push(UnconnectedPort { endpoint });
            } else {
                self.output.infos.push(PartialArray {
                    endpoint,
                    connected,
                    array_count: port.array_count(),
                });
            }
        }
    }
}
