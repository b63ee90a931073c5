//! Signal bundle allocation.
//!
//! Every connection is carried by one bundle of per-element signals. Where an
//! attached port is at least as wide as every other attachment, the port's own
//! signals are reused; otherwise a fresh bundle is minted.

use serde::Serialize;

use crate::deps::arcstr::ArcStr;
use crate::graph::{Assembly, Attachment, ConnectionKey, Endpoint, Port, PortKey};
use crate::log::{debug, info};
use crate::protocol::Role;

/// The signals carrying a connection.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub enum Bundle {
    /// The signals of an attached instance port are shared by the connection.
    Port { port: PortKey, endpoint: Endpoint },
    /// The assembly boundary port stands in directly; nothing is minted.
    Boundary { port: PortKey, endpoint: Endpoint },
    /// A bundle minted for the connection.
    Fresh { name: ArcStr, width: usize },
}

impl Bundle {
    #[inline]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }
}

/// One attachment's view of the connection bundle.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct BundleMember {
    pub attachment: Attachment,
    pub endpoint: Endpoint,
    /// Index of the bundle element bound to the attachment's first element.
    pub start: usize,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SignalBinding {
    pub connection: ConnectionKey,
    pub name: ArcStr,
    pub bundle: Bundle,
    pub members: Vec<BundleMember>,
}

/// The value an unattached array element is held at.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub enum Idle {
    /// A consumer element that never sees traffic.
    NoTraffic,
    /// A producer element whose output is always accepted and dropped.
    Discard,
}

impl From<Role> for Idle {
    fn from(value: Role) -> Self {
        match value {
            Role::Consumer => Self::NoTraffic,
            Role::Producer => Self::Discard,
        }
    }
}

/// An array element of a partially connected port, tied to its idle value.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct IdleTie {
    pub port: PortKey,
    pub endpoint: Endpoint,
    pub index: usize,
    pub idle: Idle,
}

/// Bundle assignments for an entire assembly.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Bindings {
    pub signals: Vec<SignalBinding>,
    pub ties: Vec<IdleTie>,
}

impl Bindings {
    pub fn binding(&self, conn: ConnectionKey) -> Option<&SignalBinding> {
        self.signals.iter().find(|b| b.connection == conn)
    }

    pub fn binding_by_name(&self, name: &str) -> Option<&SignalBinding> {
        self.signals.iter().find(|b| b.name.as_str() == name)
    }

    /// The number of bundles minted rather than shared.
    pub fn num_fresh(&self) -> usize {
        self.signals.iter().filter(|b| b.bundle.is_fresh()).count()
    }
}

/// A port's signals can carry at most one connection.
fn bound_only_to(port: &Port, key: ConnectionKey) -> bool {
    port.occupied().iter().all(|c| c.is_none() || *c == Some(key))
}

fn bind_connection(assembly: &Assembly, key: ConnectionKey) -> SignalBinding {
    let conn = assembly.connection(key);
    let attachments = conn.attachments();
    let member = |a: &Attachment, start: usize| BundleMember {
        attachment: *a,
        endpoint: assembly.endpoint(a.port),
        start,
    };

    let boundary = match attachments {
        [a, b] => [a, b]
            .into_iter()
            .find(|x| assembly.port(x.port).is_boundary()),
        _ => None,
    };
    if let Some(boundary) = boundary {
        return SignalBinding {
            connection: key,
            name: conn.name().clone(),
            bundle: Bundle::Boundary {
                port: boundary.port,
                endpoint: assembly.endpoint(boundary.port),
            },
            members: attachments
                .iter()
                .map(|a| member(a, if a == boundary { a.index } else { boundary.index }))
                .collect(),
        };
    }

    let widest = attachments.iter().enumerate().find(|(i, a)| {
        let others = attachments
            .iter()
            .enumerate()
            .filter(|(j, _)| j != i)
            .map(|(_, o)| assembly.port(o.port).array_count())
            .max()
            .unwrap_or(0);
        let own = assembly.port(a.port);
        !own.is_boundary() && own.array_count() >= others && bound_only_to(own, key)
    });

    match widest {
        Some((_, owner)) => SignalBinding {
            connection: key,
            name: conn.name().clone(),
            bundle: Bundle::Port {
                port: owner.port,
                endpoint: assembly.endpoint(owner.port),
            },
            members: attachments.iter().map(|a| member(a, owner.index)).collect(),
        },
        None => SignalBinding {
            connection: key,
            name: conn.name().clone(),
            bundle: Bundle::Fresh {
                name: conn.name().clone(),
                width: conn.element_count(),
            },
            members: attachments.iter().map(|a| member(a, 0)).collect(),
        },
    }
}

fn idle_ties(assembly: &Assembly) -> Vec<IdleTie> {
    let mut ties = Vec::new();
    for (key, port) in assembly.ports() {
        if port.array_count() < 2 || !port.is_connected() {
            continue;
        }
        let endpoint = assembly.endpoint(key);
        for (index, _) in port
            .occupied()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
        {
            ties.push(IdleTie {
                port: key,
                endpoint: endpoint.clone(),
                index,
                idle: port.role().into(),
            });
        }
    }
    ties.sort_by(|a, b| (&a.endpoint, a.index).cmp(&(&b.endpoint, b.index)));
    ties
}

/// Decides which connections reuse an existing port's signals and which need
/// a fresh bundle, and ties off unattached array elements.
pub fn allocate_signals(assembly: &Assembly) -> Bindings {
    let signals = assembly
        .sorted_connections()
        .into_iter()
        .map(|key| bind_connection(assembly, key))
        .collect::<Vec<_>>();
    for binding in signals.iter() {
        debug!("connection {}: {:?}", binding.name, binding.bundle);
    }

    let bindings = Bindings {
        signals,
        ties: idle_ties(assembly),
    };
    info!(
        "allocated signals for assembly {}: {} connection(s), {} fresh bundle(s), {} idle tie(s)",
        assembly.name(),
        bindings.signals.len(),
        bindings.num_fresh(),
        bindings.ties.len()
    );
    bindings
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::worker::{PortDecl, Worker};
    use crate::protocol::{Direction, Profile};

    fn worker(name: &str, direction: Direction, count: usize) -> Arc<Worker> {
        Arc::new(
            Worker::new(
                name,
                vec![PortDecl::new("p", direction, Profile::Stream).with_array_count(count)],
            )
            .unwrap(),
        )
    }

    #[test]
    fn widest_port_is_shared() {
        let mut a = Assembly::new("top");
        a.add_instance("src", worker("src", Direction::Output, 4)).unwrap();
        a.add_instance("dst", worker("dst", Direction::Input, 1)).unwrap();
        let c = a.add_connection("c").unwrap();
        a.attach(c, a.find_port("src", "p").unwrap(), 2, 1).unwrap();
        a.attach(c, a.find_port("dst", "p").unwrap(), 0, 1).unwrap();

        let bindings = allocate_signals(&a);
        let binding = bindings.binding(c).unwrap();
        assert_eq!(
            binding.bundle,
            Bundle::Port {
                port: a.find_port("src", "p").unwrap(),
                endpoint: a.endpoint(a.find_port("src", "p").unwrap()),
            }
        );
        assert!(binding.members.iter().all(|m| m.start == 2));

        let ties = bindings
            .ties
            .iter()
            .map(|t| (t.endpoint.to_string(), t.index, t.idle))
            .collect::<Vec<_>>();
        assert_eq!(
            ties,
            [
                ("src.p".to_string(), 0, Idle::Discard),
                ("src.p".to_string(), 1, Idle::Discard),
                ("src.p".to_string(), 3, Idle::Discard),
            ]
        );
    }

    #[test]
    fn boundary_port_stands_in() {
        let mut a = Assembly::new("top");
        let inst = a
            .add_instance("dst", worker("dst", Direction::Input, 1))
            .unwrap();
        let ext = a
            .add_boundary_port(PortDecl::new("in", Direction::Input, Profile::Stream))
            .unwrap();
        let c = a.add_connection("in").unwrap();
        a.attach(c, ext, 0, 1).unwrap();
        a.attach(c, a.instance_port(inst, "p").unwrap(), 0, 1).unwrap();

        let bindings = allocate_signals(&a);
        assert!(matches!(
            bindings.binding(c).unwrap().bundle,
            Bundle::Boundary { port, .. } if port == ext
        ));
        assert_eq!(bindings.num_fresh(), 0);
    }

    #[test]
    fn split_array_gets_fresh_bundles() {
        let mut a = Assembly::new("top");
        let src = a
            .add_instance("src", worker("src", Direction::Output, 2))
            .unwrap();
        let dst = worker("dst", Direction::Input, 1);
        let out = a.instance_port(src, "p").unwrap();
        for i in 0..2 {
            let inst = a.add_instance(format!("dst{i}"), dst.clone()).unwrap();
            let c = a.add_connection(format!("c{i}")).unwrap();
            a.attach(c, out, i, 1).unwrap();
            a.attach(c, a.instance_port(inst, "p").unwrap(), 0, 1).unwrap();
        }

        let bindings = allocate_signals(&a);
        assert_eq!(bindings.num_fresh(), 2);
        let c1 = bindings.binding_by_name("c1").unwrap();
        assert_eq!(
            c1.bundle,
            Bundle::Fresh {
                name: "c1".into(),
                width: 1
            }
        );
        assert!(c1.members.iter().all(|m| m.start == 0));
        assert!(bindings.ties.is_empty());
    }

    #[test]
    fn consumer_elements_idle_without_traffic() {
        let mut a = Assembly::new("top");
        let s = a.add_instance("s", worker("s", Direction::Output, 1)).unwrap();
        let d = a.add_instance("d", worker("d", Direction::Input, 3)).unwrap();
        let c = a.add_connection("c").unwrap();
        a.attach(c, a.instance_port(s, "p").unwrap(), 0, 1).unwrap();
        a.attach(c, a.instance_port(d, "p").unwrap(), 1, 1).unwrap();

        let bindings = allocate_signals(&a);
        let binding = bindings.binding(c).unwrap();
        assert!(matches!(
            binding.bundle,
            Bundle::Port { port, .. } if port == a.instance_port(d, "p").unwrap()
        ));
        let ties = bindings
            .ties
            .iter()
            .map(|t| (t.endpoint.to_string(), t.index, t.idle))
            .collect::<Vec<_>>();
        assert_eq!(
            ties,
            [
                ("d.p".to_string(), 0, Idle::NoTraffic),
                ("d.p".to_string(), 2, Idle::NoTraffic),
            ]
        );
    }

    #[test]
    fn fan_out_shares_the_widest_port() {
        let mut a = Assembly::new("top");
        let wide = worker("w", Direction::Output, 3);
        let narrow = worker("n", Direction::Input, 2);
        let w = a.add_instance("w", wide).unwrap();
        let n0 = a.add_instance("n0", narrow.clone()).unwrap();
        let n1 = a.add_instance("n1", narrow).unwrap();
        let c = a.add_connection("c").unwrap();
        a.attach(c, a.instance_port(n0, "p").unwrap(), 0, 2).unwrap();
        a.attach(c, a.instance_port(w, "p").unwrap(), 1, 2).unwrap();
        a.attach(c, a.instance_port(n1, "p").unwrap(), 0, 2).unwrap();

        let bindings = allocate_signals(&a);
        let binding = bindings.binding(c).unwrap();
        assert!(matches!(
            binding.bundle,
            Bundle::Port { port, .. } if port == a.instance_port(w, "p").unwrap()
        ));
        assert!(binding.members.iter().all(|m| m.start == 1));
        assert_eq!(bindings.ties.len(), 1);
        assert_eq!(bindings.ties[0].index, 0);
        assert_eq!(bindings.ties[0].idle, Idle::Discard);
    }
}
