//! The assembly graph.
//!
//! An [`Assembly`] owns every instance, port, connection and clock of one
//! declared assembly. Entities refer to each other through [`slotmap`] keys,
//! so resolution stages can annotate and rewire the graph in place.

use std::fmt::Display;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use self::error::StructuralError;
use self::worker::{PortDecl, Worker};
use crate::deps::arcstr::ArcStr;
use crate::protocol::{Direction, PortProtocol, Profile, Role};

pub mod builder;
pub mod error;
pub mod validation;
pub mod worker;

new_key_type! {
    /// A key identifying an [`Instance`] within an [`Assembly`].
    pub struct InstanceKey;

    /// A key identifying a [`Port`] within an [`Assembly`].
    pub struct PortKey;

    /// A key identifying a [`Connection`] within an [`Assembly`].
    pub struct ConnectionKey;

    /// A key identifying a [`Clock`] within an [`Assembly`].
    pub struct ClockKey;

    /// A key identifying a [`ClockSlot`] within an [`Assembly`].
    pub struct ClockSlotKey;
}

/// A human-readable name for a port: the owning instance (if any) and the port name.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Endpoint {
    instance: Option<ArcStr>,
    port: ArcStr,
}

impl Endpoint {
    #[inline]
    pub fn new(instance: Option<ArcStr>, port: ArcStr) -> Self {
        Self { instance, port }
    }

    /// The owning instance, or `None` for assembly boundary ports.
    #[inline]
    pub fn instance(&self) -> Option<&ArcStr> {
        self.instance.as_ref()
    }

    #[inline]
    pub fn port(&self) -> &ArcStr {
        &self.port
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.instance {
            Some(ref inst) => write!(f, "{}.{}", inst, self.port),
            None => write!(f, "external port {}", self.port),
        }
    }
}

/// The owner of a [`Port`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PortOwner {
    Instance(InstanceKey),
    /// The port is on the boundary of the assembly.
    Boundary,
}

/// A typed interface point.
#[derive(Debug, Clone, Serialize)]
pub struct Port {
    name: ArcStr,
    owner: PortOwner,
    direction: Direction,
    profile: Profile,
    array_count: usize,
    own_clock: bool,
    protocol: PortProtocol,
    clock_slot: ClockSlotKey,
    /// The connection bound to each array element.
    occupied: Vec<Option<ConnectionKey>>,
}

impl Port {
    fn from_decl(decl: &PortDecl, owner: PortOwner, clock_slot: ClockSlotKey) -> Self {
        Self {
            name: decl.name.clone(),
            owner,
            direction: decl.direction,
            profile: decl.profile,
            array_count: decl.array_count,
            own_clock: decl.own_clock,
            protocol: decl.protocol.clone(),
            clock_slot,
            occupied: vec![None; decl.array_count],
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn owner(&self) -> PortOwner {
        self.owner
    }

    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.owner == PortOwner::Boundary
    }

    /// The direction declared by the port's owner.
    ///
    /// For boundary ports this is the direction seen from outside the assembly.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The role the port plays inside the assembly.
    ///
    /// Boundary ports play the opposite role from their declared direction:
    /// an assembly input produces data for the instances connected to it.
    #[inline]
    pub fn role(&self) -> Role {
        match self.owner {
            PortOwner::Instance(_) => self.direction.into(),
            PortOwner::Boundary => self.direction.flip().into(),
        }
    }

    #[inline]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    #[inline]
    pub fn array_count(&self) -> usize {
        self.array_count
    }

    /// Whether the port structurally requires a clock of its own.
    #[inline]
    pub fn requires_own_clock(&self) -> bool {
        self.own_clock
    }

    #[inline]
    pub fn protocol(&self) -> &PortProtocol {
        &self.protocol
    }

    #[inline]
    pub(crate) fn set_protocol(&mut self, protocol: PortProtocol) {
        self.protocol = protocol;
    }

    #[inline]
    pub fn clock_slot(&self) -> ClockSlotKey {
        self.clock_slot
    }

    #[inline]
    pub fn occupied(&self) -> &[Option<ConnectionKey>] {
        &self.occupied
    }

    /// Returns `true` if any element of the port is bound to a connection.
    pub fn is_connected(&self) -> bool {
        self.occupied.iter().any(Option::is_some)
    }
}

/// Parameters of a synthetic width-adapter instance.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AdapterParams {
    pub input_width: usize,
    pub output_width: usize,
}

/// One placement of a [`Worker`] in an assembly.
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    name: ArcStr,
    worker: Arc<Worker>,
    ports: Vec<PortKey>,
    /// One slot per worker clock.
    clock_slots: Vec<ClockSlotKey>,
    /// Set for width adapters inserted during resolution.
    adapter: Option<AdapterParams>,
}

impl Instance {
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    #[inline]
    pub fn ports(&self) -> &[PortKey] {
        &self.ports
    }

    #[inline]
    pub fn clock_slots(&self) -> &[ClockSlotKey] {
        &self.clock_slots
    }

    #[inline]
    pub fn adapter(&self) -> Option<AdapterParams> {
        self.adapter
    }

    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.adapter.is_some()
    }
}

/// Storage for the clock driving a group of ports.
///
/// Every worker clock of an instance gets one slot; every boundary port gets its own.
#[derive(Debug, Clone, Serialize)]
pub struct ClockSlot {
    name: ArcStr,
    instance: Option<InstanceKey>,
    owner: Option<PortKey>,
    clock: Option<ClockKey>,
}

impl ClockSlot {
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn instance(&self) -> Option<InstanceKey> {
        self.instance
    }

    /// The port that owns this clock, if any.
    #[inline]
    pub fn owner(&self) -> Option<PortKey> {
        self.owner
    }

    /// The raw clock assignment, not following merges.
    #[inline]
    pub fn clock(&self) -> Option<ClockKey> {
        self.clock
    }
}

/// A clock identity.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Clock {
    name: ArcStr,
    owner: Option<PortKey>,
    control: bool,
    merged_into: Option<ClockKey>,
}

impl Clock {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            control: false,
            merged_into: None,
        }
    }

    /// Creates the designated control clock.
    pub fn control(name: impl Into<ArcStr>) -> Self {
        Self {
            control: true,
            ..Self::new(name)
        }
    }

    /// A consuming method to set the port owning the clock.
    #[inline]
    pub fn owned_by(mut self, port: PortKey) -> Self {
        self.owner = Some(port);
        self
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn owner(&self) -> Option<PortKey> {
        self.owner
    }

    #[inline]
    pub fn is_control(&self) -> bool {
        self.control
    }

    /// The clock this clock was merged into, if any.
    #[inline]
    pub fn merged_into(&self) -> Option<ClockKey> {
        self.merged_into
    }
}

/// The binding of elements `index..index + count` of a port into a [`Connection`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    pub port: PortKey,
    pub index: usize,
    pub count: usize,
}

/// A set of attachments wiring producer ports to consumer ports.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    name: ArcStr,
    attachments: Vec<Attachment>,
    clock: Option<ClockKey>,
    /// The boundary port this connection exposes, if any.
    external: Option<PortKey>,
}

impl Connection {
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    #[inline]
    pub fn clock(&self) -> Option<ClockKey> {
        self.clock
    }

    #[inline]
    pub(crate) fn set_clock(&mut self, clock: ClockKey) {
        self.clock = Some(clock);
    }

    #[inline]
    pub fn external(&self) -> Option<PortKey> {
        self.external
    }

    /// The number of elements carried by the connection.
    pub fn element_count(&self) -> usize {
        self.attachments.iter().map(|a| a.count).max().unwrap_or(0)
    }
}

/// A declared assembly of instances, ports and connections.
#[derive(Debug, Clone, Serialize)]
pub struct Assembly {
    name: ArcStr,
    instances: SlotMap<InstanceKey, Instance>,
    ports: SlotMap<PortKey, Port>,
    connections: SlotMap<ConnectionKey, Connection>,
    clocks: SlotMap<ClockKey, Clock>,
    slots: SlotMap<ClockSlotKey, ClockSlot>,
    control_clock: Option<ClockKey>,
}

impl Assembly {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            instances: SlotMap::with_key(),
            ports: SlotMap::with_key(),
            connections: SlotMap::with_key(),
            clocks: SlotMap::with_key(),
            slots: SlotMap::with_key(),
            control_clock: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Places an instance of `worker`, creating its ports and clock slots.
    pub fn add_instance(
        &mut self,
        name: impl Into<ArcStr>,
        worker: Arc<Worker>,
    ) -> Result<InstanceKey, StructuralError> {
        let name = name.into();
        if self.instance_by_name(&name).is_some() {
            return Err(StructuralError::DuplicateInstance(name));
        }

        let key = self.instances.insert(Instance {
            name,
            worker: worker.clone(),
            ports: Vec::new(),
            clock_slots: Vec::new(),
            adapter: None,
        });

        let slots = worker
            .clocks()
            .iter()
            .map(|clock| {
                self.slots.insert(ClockSlot {
                    name: clock.name().clone(),
                    instance: Some(key),
                    owner: None,
                    clock: None,
                })
            })
            .collect::<Vec<_>>();

        let ports = worker
            .ports()
            .iter()
            .enumerate()
            .map(|(i, decl)| {
                let slot = slots[worker.port_clock(i)];
                self.ports
                    .insert(Port::from_decl(decl, PortOwner::Instance(key), slot))
            })
            .collect::<Vec<_>>();

        for (clock, slot) in worker.clocks().iter().zip(slots.iter()) {
            if let Some(owner) = clock.owner() {
                self.slots[*slot].owner = Some(ports[owner]);
            }
        }

        let inst = &mut self.instances[key];
        inst.ports = ports;
        inst.clock_slots = slots;
        Ok(key)
    }

    pub(crate) fn mark_adapter(&mut self, inst: InstanceKey, params: AdapterParams) {
        self.instances[inst].adapter = Some(params);
    }

    /// Adds a port on the assembly boundary.
    ///
    /// `decl.direction` is the direction seen from outside the assembly.
    pub fn add_boundary_port(&mut self, decl: PortDecl) -> Result<PortKey, StructuralError> {
        decl.validate(&self.name)?;
        if self.boundary_port(&decl.name).is_some() {
            return Err(StructuralError::DuplicatePort {
                owner: self.name.clone(),
                port: decl.name.clone(),
            });
        }
        let slot = self.slots.insert(ClockSlot {
            name: decl.name.clone(),
            instance: None,
            owner: None,
            clock: None,
        });
        let port = self
            .ports
            .insert(Port::from_decl(&decl, PortOwner::Boundary, slot));
        self.slots[slot].owner = Some(port);
        Ok(port)
    }

    pub fn add_connection(
        &mut self,
        name: impl Into<ArcStr>,
    ) -> Result<ConnectionKey, StructuralError> {
        let name = name.into();
        if self.connection_by_name(&name).is_some() {
            return Err(StructuralError::DuplicateConnection(name));
        }
        Ok(self.connections.insert(Connection {
            name,
            attachments: Vec::new(),
            clock: None,
            external: None,
        }))
    }

    /// Binds elements `index..index + count` of `port` into `conn`.
    pub fn attach(
        &mut self,
        conn: ConnectionKey,
        port: PortKey,
        index: usize,
        count: usize,
    ) -> Result<Attachment, StructuralError> {
        let connection = self.connections[conn].name.clone();
        let p = &self.ports[port];

        if count == 0 || index + count > p.array_count {
            return Err(StructuralError::IndexOutOfBounds {
                connection,
                endpoint: self.endpoint(port),
                index,
                count,
                array_count: p.array_count,
            });
        }

        for i in index..index + count {
            if let Some(existing) = p.occupied[i] {
                let existing = self.connections[existing].name.clone();
                let endpoint = self.endpoint(port);
                return Err(if p.array_count == 1 {
                    StructuralError::RebindScalar {
                        connection,
                        endpoint,
                        existing,
                    }
                } else {
                    StructuralError::IndexOccupied {
                        connection,
                        endpoint,
                        index: i,
                        existing,
                    }
                });
            }
        }

        let is_boundary = p.is_boundary();
        let p = &mut self.ports[port];
        for slot in &mut p.occupied[index..index + count] {
            *slot = Some(conn);
        }

        let attachment = Attachment { port, index, count };
        let c = &mut self.connections[conn];
        c.attachments.push(attachment);
        if is_boundary {
            c.external = Some(port);
        }
        Ok(attachment)
    }

    /// Removes `port`'s attachment from `conn`, returning it.
    pub fn detach(&mut self, conn: ConnectionKey, port: PortKey) -> Option<Attachment> {
        let c = &mut self.connections[conn];
        let pos = c.attachments.iter().position(|a| a.port == port)?;
        let attachment = c.attachments.remove(pos);
        if c.external == Some(port) {
            c.external = None;
        }
        let p = &mut self.ports[port];
        for slot in &mut p.occupied[attachment.index..attachment.index + attachment.count] {
            *slot = None;
        }
        Some(attachment)
    }

    #[inline]
    pub fn instance(&self, key: InstanceKey) -> &Instance {
        &self.instances[key]
    }

    #[inline]
    pub fn instances(&self) -> impl Iterator<Item = (InstanceKey, &Instance)> {
        self.instances.iter()
    }

    pub fn instance_by_name(&self, name: &str) -> Option<InstanceKey> {
        self.instances
            .iter()
            .find(|(_, inst)| inst.name.as_str() == name)
            .map(|(key, _)| key)
    }

    #[inline]
    pub fn port(&self, key: PortKey) -> &Port {
        &self.ports[key]
    }

    #[inline]
    pub(crate) fn port_mut(&mut self, key: PortKey) -> &mut Port {
        &mut self.ports[key]
    }

    #[inline]
    pub fn ports(&self) -> impl Iterator<Item = (PortKey, &Port)> {
        self.ports.iter()
    }

    pub fn instance_port(&self, inst: InstanceKey, name: &str) -> Option<PortKey> {
        self.instances[inst]
            .ports
            .iter()
            .copied()
            .find(|p| self.ports[*p].name.as_str() == name)
    }

    pub fn boundary_port(&self, name: &str) -> Option<PortKey> {
        self.ports
            .iter()
            .find(|(_, p)| p.is_boundary() && p.name.as_str() == name)
            .map(|(key, _)| key)
    }

    /// Looks up a port by instance name and port name.
    pub fn find_port(&self, instance: &str, port: &str) -> Option<PortKey> {
        self.instance_port(self.instance_by_name(instance)?, port)
    }

    pub fn endpoint(&self, port: PortKey) -> Endpoint {
        let p = &self.ports[port];
        let instance = match p.owner {
            PortOwner::Instance(inst) => Some(self.instances[inst].name.clone()),
            PortOwner::Boundary => None,
        };
        Endpoint::new(instance, p.name.clone())
    }

    #[inline]
    pub fn connection(&self, key: ConnectionKey) -> &Connection {
        &self.connections[key]
    }

    #[inline]
    pub(crate) fn connection_mut(&mut self, key: ConnectionKey) -> &mut Connection {
        &mut self.connections[key]
    }

    #[inline]
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionKey, &Connection)> {
        self.connections.iter()
    }

    #[inline]
    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_by_name(&self, name: &str) -> Option<ConnectionKey> {
        self.connections
            .iter()
            .find(|(_, c)| c.name.as_str() == name)
            .map(|(key, _)| key)
    }

    /// Connection keys sorted by connection name.
    pub fn sorted_connections(&self) -> Vec<ConnectionKey> {
        self.connections
            .iter()
            .sorted_by(|a, b| a.1.name.cmp(&b.1.name))
            .map(|(key, _)| key)
            .collect()
    }

    /// The attachments of `conn` whose ports play `role`.
    pub fn attachments_with_role(&self, conn: ConnectionKey, role: Role) -> Vec<Attachment> {
        self.connections[conn]
            .attachments
            .iter()
            .copied()
            .filter(|a| self.ports[a.port].role() == role)
            .collect()
    }

    #[inline]
    pub fn clock(&self, key: ClockKey) -> &Clock {
        &self.clocks[key]
    }

    #[inline]
    pub fn clocks(&self) -> impl Iterator<Item = (ClockKey, &Clock)> {
        self.clocks.iter()
    }

    #[inline]
    pub fn add_clock(&mut self, clock: Clock) -> ClockKey {
        self.clocks.insert(clock)
    }

    /// Follows merges to the clock that now represents `key`.
    pub fn resolve_clock(&self, mut key: ClockKey) -> ClockKey {
        while let Some(next) = self.clocks[key].merged_into {
            key = next;
        }
        key
    }

    /// Merges `from` into `into`. Both keep existing; `from` forwards to `into`.
    pub(crate) fn merge_clock(&mut self, from: ClockKey, into: ClockKey) {
        let from = self.resolve_clock(from);
        let into = self.resolve_clock(into);
        if from != into {
            self.clocks[from].merged_into = Some(into);
        }
    }

    #[inline]
    pub fn slot(&self, key: ClockSlotKey) -> &ClockSlot {
        &self.slots[key]
    }

    #[inline]
    pub fn slots(&self) -> impl Iterator<Item = (ClockSlotKey, &ClockSlot)> {
        self.slots.iter()
    }

    /// The resolved clock of a slot.
    pub fn slot_clock(&self, key: ClockSlotKey) -> Option<ClockKey> {
        self.slots[key].clock.map(|c| self.resolve_clock(c))
    }

    /// Binds an unassigned slot to `clock`. Returns `false` if the slot was already bound.
    pub(crate) fn assign_slot(&mut self, key: ClockSlotKey, clock: ClockKey) -> bool {
        let slot = &mut self.slots[key];
        if slot.clock.is_some() {
            return false;
        }
        slot.clock = Some(clock);
        true
    }

    /// The resolved clock of a port.
    pub fn port_clock(&self, port: PortKey) -> Option<ClockKey> {
        self.slot_clock(self.ports[port].clock_slot)
    }

    /// The resolved clock name of a port.
    pub fn port_clock_name(&self, port: PortKey) -> Option<&ArcStr> {
        self.port_clock(port).map(|c| &self.clocks[c].name)
    }

    #[inline]
    pub fn control_clock(&self) -> Option<ClockKey> {
        self.control_clock
    }

    /// Designates the control clock, creating it on first use.
    pub fn set_control_clock(&mut self, name: impl Into<ArcStr>) -> ClockKey {
        if let Some(key) = self.control_clock {
            return key;
        }
        let key = self.clocks.insert(Clock::control(name));
        self.control_clock = Some(key);
        key
    }

    /// Binds the clock slot of `port` to the clock called `name`.
    ///
    /// Clocks pinned by name are shared: pinning two ports to the same name
    /// puts them in the same domain. If the slot is already bound, the
    /// existing binding is kept and returned.
    pub fn pin_clock(&mut self, port: PortKey, name: impl Into<ArcStr>) -> ClockKey {
        let slot = self.ports[port].clock_slot;
        if let Some(existing) = self.slots[slot].clock {
            return existing;
        }
        let name = name.into();
        let clock = match self
            .clocks
            .iter()
            .find(|(_, c)| c.name == name && c.merged_into.is_none())
        {
            Some((key, _)) => key,
            None => self.clocks.insert(Clock::new(name)),
        };
        self.slots[slot].clock = Some(clock);
        clock
    }
}
