//! Clock domain unification.
//!
//! Every port ends up with exactly one resolved clock. Ports that meet at a
//! connection share a domain; the designated control clock wins any merge.

use itertools::Itertools;
use thiserror::Error;

use crate::deps::arcstr::ArcStr;
use crate::graph::{Assembly, Clock, ClockKey, ClockSlotKey, ConnectionKey, Endpoint, PortKey};
use crate::log::{debug, info};
use crate::protocol::Profile;

/// Two independently driven clocks meet at a connection.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error(
    "connection {connection} joins clock {first} at {first_port} and clock {second} at {second_port}, which cannot be merged"
)]
pub struct ClockConflictError {
    pub connection: ArcStr,
    pub first: ArcStr,
    /// The first attachment carrying `first`.
    pub first_port: Endpoint,
    pub second: ArcStr,
    /// The first attachment carrying `second`.
    pub second_port: Endpoint,
}

/// Assigns a resolved clock to every port of `assembly`.
///
/// Connections are visited in a canonical order (control connections first,
/// then by name), and propagation runs to a fixpoint before any new clock is
/// minted, so the result does not depend on declaration order.
pub fn unify_clocks(assembly: &mut Assembly) -> Result<(), ClockConflictError> {
    bind_control_ports(assembly);

    let order = canonical_order(assembly);

    loop {
        propagate_to_fixpoint(assembly, &order)?;
        if !mint_owned_clock(assembly, &order) {
            break;
        }
    }

    // Anything left was never reached through a connection that had a clock.
    while let Some(slot) = first_unassigned_slot(assembly) {
        let s = assembly.slot(slot);
        let name = match s.instance() {
            Some(inst) => arcstr::format!("{}_{}", assembly.instance(inst).name(), s.name()),
            None => s.name().clone(),
        };
        let clock = match s.owner() {
            Some(port) => Clock::new(name).owned_by(port),
            None => Clock::new(name),
        };
        debug!("minting fallback clock {}", clock.name());
        let clock = assembly.add_clock(clock);
        assembly.assign_slot(slot, clock);
        propagate_to_fixpoint(assembly, &order)?;
    }

    for key in order {
        let clock = assembly
            .connection(key)
            .attachments()
            .first()
            .and_then(|a| assembly.port_clock(a.port));
        if let Some(clock) = clock {
            assembly.connection_mut(key).set_clock(clock);
        }
    }

    info!(
        "unified clocks of assembly {}: {} clock domain(s)",
        assembly.name(),
        count_domains(assembly)
    );
    Ok(())
}

/// Binds every control port to the designated control clock.
fn bind_control_ports(assembly: &mut Assembly) {
    let Some(control) = assembly.control_clock() else {
        return;
    };
    let slots = assembly
        .ports()
        .filter(|(_, p)| p.profile() == Profile::Control)
        .map(|(_, p)| p.clock_slot())
        .collect::<Vec<_>>();
    for slot in slots {
        match assembly.slot_clock(slot) {
            None => {
                assembly.assign_slot(slot, control);
            }
            Some(existing) => assembly.merge_clock(existing, control),
        }
    }
}

fn is_control_connection(assembly: &Assembly, key: ConnectionKey) -> bool {
    assembly
        .connection(key)
        .attachments()
        .iter()
        .any(|a| assembly.port(a.port).profile() == Profile::Control)
}

/// Control connections first, each group ordered by name.
fn canonical_order(assembly: &Assembly) -> Vec<ConnectionKey> {
    let (mut order, rest): (Vec<_>, Vec<_>) = assembly
        .sorted_connections()
        .into_iter()
        .partition(|key| is_control_connection(assembly, *key));
    order.extend(rest);
    order
}

fn attachment_slots(assembly: &Assembly, key: ConnectionKey) -> Vec<ClockSlotKey> {
    assembly
        .connection(key)
        .attachments()
        .iter()
        .map(|a| assembly.port(a.port).clock_slot())
        .collect()
}

fn propagate_to_fixpoint(
    assembly: &mut Assembly,
    order: &[ConnectionKey],
) -> Result<(), ClockConflictError> {
    let mut changed = true;
    while changed {
        changed = false;
        for key in order.iter().copied() {
            changed |= propagate(assembly, key)?;
        }
    }
    Ok(())
}

/// Propagates the clock of one connection to its unassigned attachments.
///
/// Returns `true` if any slot was assigned or any clock merged.
fn propagate(assembly: &mut Assembly, key: ConnectionKey) -> Result<bool, ClockConflictError> {
    let slots = attachment_slots(assembly, key);

    // Distinct clocks, each with the first port carrying it.
    let mut clocks: Vec<(ClockKey, PortKey)> = Vec::new();
    for a in assembly.connection(key).attachments() {
        let slot = assembly.port(a.port).clock_slot();
        if let Some(clock) = assembly.slot_clock(slot) {
            if clocks.iter().all(|(c, _)| *c != clock) {
                clocks.push((clock, a.port));
            }
        }
    }

    let mut changed = false;
    let winner = match clocks.as_slice() {
        [] => return Ok(false),
        [(only, _)] => *only,
        [(first, first_port), (second, second_port), ..] => {
            let control = assembly
                .control_clock()
                .map(|c| assembly.resolve_clock(c))
                .filter(|c| clocks.iter().any(|(k, _)| k == c));
            let Some(control) = control else {
                return Err(ClockConflictError {
                    connection: assembly.connection(key).name().clone(),
                    first: assembly.clock(*first).name().clone(),
                    first_port: assembly.endpoint(*first_port),
                    second: assembly.clock(*second).name().clone(),
                    second_port: assembly.endpoint(*second_port),
                });
            };
            for other in clocks.iter().map(|(c, _)| *c).filter(|c| *c != control) {
                debug!(
                    "connection {}: merging clock {} into control clock {}",
                    assembly.connection(key).name(),
                    assembly.clock(other).name(),
                    assembly.clock(control).name()
                );
                assembly.merge_clock(other, control);
            }
            changed = true;
            control
        }
    };

    for slot in slots {
        changed |= assembly.assign_slot(slot, winner);
    }
    Ok(changed)
}

/// Mints a clock for the first clockless connection with a port that needs its own clock.
///
/// Returns `true` if a clock was minted.
fn mint_owned_clock(assembly: &mut Assembly, order: &[ConnectionKey]) -> bool {
    for key in order.iter().copied() {
        let slots = attachment_slots(assembly, key);
        if slots.iter().any(|s| assembly.slot_clock(*s).is_some()) {
            continue;
        }
        let owner = assembly
            .connection(key)
            .attachments()
            .iter()
            .map(|a| a.port)
            .find(|p| assembly.port(*p).requires_own_clock());
        let Some(owner) = owner else {
            continue;
        };

        let name = assembly.connection(key).name().clone();
        debug!("minting clock {name} owned by {}", assembly.endpoint(owner));
        let clock = assembly.add_clock(Clock::new(name).owned_by(owner));
        for slot in slots {
            assembly.assign_slot(slot, clock);
        }
        return true;
    }
    false
}

/// The first slot without a clock, ordered by instance name then clock name.
fn first_unassigned_slot(assembly: &Assembly) -> Option<ClockSlotKey> {
    assembly
        .slots()
        .filter(|(_, s)| s.clock().is_none())
        .map(|(key, s)| {
            let inst = s.instance().map(|i| assembly.instance(i).name().clone());
            (inst, s.name().clone(), key)
        })
        .min_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)))
        .map(|(_, _, key)| key)
}

fn count_domains(assembly: &Assembly) -> usize {
    assembly
        .slots()
        .filter_map(|(key, _)| assembly.slot_clock(key))
        .unique()
        .count()
}
