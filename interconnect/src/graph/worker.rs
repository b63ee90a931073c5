//! Reusable component templates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::StructuralError;
use crate::deps::arcstr::ArcStr;
use crate::protocol::{Direction, PortProtocol, Profile};

/// Name of the clock used by ports that do not name one.
pub const DEFAULT_CLOCK: &str = "clk";

/// A port as declared by a worker template (or by the assembly boundary).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortDecl {
    pub name: ArcStr,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default = "default_array_count")]
    pub array_count: usize,
    /// The worker clock this port is synchronous to.
    ///
    /// May name another port that has its own clock.
    #[serde(default)]
    pub clock: Option<ArcStr>,
    /// Whether the port structurally requires its own clock.
    #[serde(default)]
    pub own_clock: bool,
    #[serde(default)]
    pub protocol: PortProtocol,
}

const fn default_array_count() -> usize {
    1
}

impl PortDecl {
    pub fn new(name: impl Into<ArcStr>, direction: Direction, profile: Profile) -> Self {
        Self {
            name: name.into(),
            direction,
            profile,
            array_count: 1,
            clock: None,
            own_clock: false,
            protocol: PortProtocol::default(),
        }
    }

    /// A consuming method to set the port's protocol attributes.
    #[inline]
    pub fn with_protocol(mut self, protocol: PortProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// A consuming method to turn the port into an array of `count` ports.
    #[inline]
    pub fn with_array_count(mut self, count: usize) -> Self {
        self.array_count = count;
        self
    }

    /// A consuming method to clock the port with the named worker clock.
    #[inline]
    pub fn with_clock(mut self, clock: impl Into<ArcStr>) -> Self {
        self.clock = Some(clock.into());
        self
    }

    /// A consuming method to give the port a clock of its own.
    #[inline]
    pub fn with_own_clock(mut self) -> Self {
        self.own_clock = true;
        self
    }

    pub(crate) fn validate(&self, owner: &ArcStr) -> Result<(), StructuralError> {
        if self.array_count == 0 {
            return Err(StructuralError::EmptyArray {
                owner: owner.clone(),
                port: self.name.clone(),
            });
        }
        let p = &self.protocol;
        if self.profile.is_data() && (p.byte_width == 0 || p.data_width % p.byte_width != 0) {
            return Err(StructuralError::InvalidWidth {
                owner: owner.clone(),
                port: self.name.clone(),
                data_width: p.data_width,
                byte_width: p.byte_width,
            });
        }
        Ok(())
    }
}

/// A clock declared by a worker.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct WorkerClock {
    pub(crate) name: ArcStr,
    /// Index of the port that owns this clock, if any.
    pub(crate) owner: Option<usize>,
}

impl WorkerClock {
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn owner(&self) -> Option<usize> {
        self.owner
    }
}

/// A reusable component template with typed ports.
#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    name: ArcStr,
    ports: Vec<PortDecl>,
    clocks: Vec<WorkerClock>,
    /// Index into `clocks` for each port.
    port_clocks: Vec<usize>,
}

impl Worker {
    /// Creates a new worker template, assigning every port to a worker clock.
    ///
    /// Ports with their own clock get a clock named after the port.
    /// Other ports share the clock they name, or [`DEFAULT_CLOCK`].
    pub fn new(name: impl Into<ArcStr>, ports: Vec<PortDecl>) -> Result<Self, StructuralError> {
        let name = name.into();

        let mut seen = HashSet::with_capacity(ports.len());
        for port in ports.iter() {
            port.validate(&name)?;
            if !seen.insert(port.name.clone()) {
                return Err(StructuralError::DuplicatePort {
                    owner: name,
                    port: port.name.clone(),
                });
            }
        }

        let mut clocks: Vec<WorkerClock> = Vec::new();
        let mut port_clocks = vec![0; ports.len()];
        for (i, port) in ports.iter().enumerate().filter(|(_, p)| p.own_clock) {
            port_clocks[i] = clocks.len();
            clocks.push(WorkerClock {
                name: port.name.clone(),
                owner: Some(i),
            });
        }
        for (i, port) in ports.iter().enumerate().filter(|(_, p)| !p.own_clock) {
            let clock = port
                .clock
                .clone()
                .unwrap_or_else(|| ArcStr::from(DEFAULT_CLOCK));
            port_clocks[i] = match clocks.iter().position(|c| c.name == clock) {
                Some(idx) => idx,
                None => {
                    clocks.push(WorkerClock {
                        name: clock,
                        owner: None,
                    });
                    clocks.len() - 1
                }
            };
        }

        Ok(Self {
            name,
            ports,
            clocks,
            port_clocks,
        })
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn ports(&self) -> &[PortDecl] {
        &self.ports
    }

    #[inline]
    pub fn clocks(&self) -> &[WorkerClock] {
        &self.clocks
    }

    /// Returns the index of the worker clock driving the `idx`-th port.
    #[inline]
    pub fn port_clock(&self, idx: usize) -> usize {
        self.port_clocks[idx]
    }

    pub fn port(&self, name: &str) -> Option<(usize, &PortDecl)> {
        self.ports.iter().enumerate().find(|(_, p)| p.name.as_str() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_share_the_default_clock() {
        let w = Worker::new(
            "fir",
            vec![
                PortDecl::new("ctl", Direction::Input, Profile::Control),
                PortDecl::new("in", Direction::Input, Profile::Stream),
                PortDecl::new("out", Direction::Output, Profile::Stream),
            ],
        )
        .unwrap();
        assert_eq!(w.clocks().len(), 1);
        assert_eq!(w.clocks()[0].name().as_str(), DEFAULT_CLOCK);
        assert_eq!(w.port_clock(1), w.port_clock(2));
    }

    #[test]
    fn own_clocks_can_be_referenced_by_name() {
        let w = Worker::new(
            "adc",
            vec![
                PortDecl::new("ctl", Direction::Input, Profile::Control),
                PortDecl::new("out", Direction::Output, Profile::Stream).with_own_clock(),
                PortDecl::new("status", Direction::Output, Profile::Stream).with_clock("out"),
            ],
        )
        .unwrap();
        assert_eq!(w.clocks().len(), 2);
        assert_eq!(w.port_clock(1), w.port_clock(2));
        assert_ne!(w.port_clock(0), w.port_clock(1));
        assert_eq!(w.clocks()[w.port_clock(1)].owner(), Some(1));
    }

    #[test]
    fn rejects_duplicate_ports() {
        let err = Worker::new(
            "bad",
            vec![
                PortDecl::new("in", Direction::Input, Profile::Stream),
                PortDecl::new("in", Direction::Input, Profile::Stream),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, StructuralError::DuplicatePort { .. }));
    }

    #[test]
    fn rejects_ragged_units() {
        let mut protocol = PortProtocol::default();
        protocol.data_width = 12;
        protocol.byte_width = 8;
        let err = Worker::new(
            "bad",
            vec![PortDecl::new("in", Direction::Input, Profile::Stream).with_protocol(protocol)],
        )
        .unwrap_err();
        assert!(matches!(err, StructuralError::InvalidWidth { .. }));
    }
}
