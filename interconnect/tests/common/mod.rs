#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use interconnect::config::ResolverConfig;
use interconnect::decl::AssemblyDecl;
use interconnect::graph::worker::{PortDecl, Worker};
use interconnect::graph::{Assembly, ConnectionKey};
use interconnect::protocol::{Direction, PortProtocol, Profile};
use interconnect::Resolver;

pub const DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/tests");

pub fn workers_dir() -> PathBuf {
    PathBuf::from(DATA_DIR).join("workers")
}

/// Returns the path to the assembly TOML file with the given name.
pub fn assembly_path(name: &str) -> PathBuf {
    PathBuf::from(DATA_DIR).join(format!("assemblies/{name}.toml"))
}

pub fn load_assembly(name: &str) -> AssemblyDecl {
    AssemblyDecl::from_toml_file(assembly_path(name)).unwrap()
}

/// A resolver that finds worker templates in the test data directory.
pub fn setup_resolver() -> Resolver {
    let config = ResolverConfig::builder()
        .template_paths(vec![workers_dir()])
        .build()
        .unwrap();
    Resolver::new(config)
}

/// A worker with a control port and one stream port.
pub fn stream_worker(name: &str, direction: Direction, protocol: PortProtocol) -> Worker {
    let port = match direction {
        Direction::Input => "in",
        Direction::Output => "out",
    };
    Worker::new(
        name,
        vec![
            PortDecl::new("ctl", Direction::Input, Profile::Control),
            PortDecl::new(port, direction, Profile::Stream).with_protocol(protocol),
        ],
    )
    .unwrap()
}

/// Builds `src.out -> dst.in` on a connection named `link`.
pub fn link(producer: PortProtocol, consumer: PortProtocol) -> Assembly {
    let mut a = Assembly::new("link");
    a.add_instance(
        "src",
        Arc::new(stream_worker("src", Direction::Output, producer)),
    )
    .unwrap();
    a.add_instance(
        "dst",
        Arc::new(stream_worker("dst", Direction::Input, consumer)),
    )
    .unwrap();
    let c = a.add_connection("link").unwrap();
    a.attach(c, a.find_port("src", "out").unwrap(), 0, 1).unwrap();
    a.attach(c, a.find_port("dst", "in").unwrap(), 0, 1).unwrap();
    a
}

pub fn width(data_width: usize) -> PortProtocol {
    PortProtocol::builder()
        .data_width(data_width)
        .build()
        .unwrap()
}

/// The endpoints attached to a connection, in attachment order.
pub fn endpoints(a: &Assembly, conn: ConnectionKey) -> Vec<String> {
    a.connection(conn)
        .attachments()
        .iter()
        .map(|att| a.endpoint(att.port).to_string())
        .collect()
}

/// The resolved clock name of every port, keyed by endpoint.
pub fn clock_assignment(a: &Assembly) -> BTreeMap<String, String> {
    a.ports()
        .map(|(key, _)| {
            let clock = a
                .port_clock_name(key)
                .map(|c| c.to_string())
                .unwrap_or_default();
            (a.endpoint(key).to_string(), clock)
        })
        .collect()
}
