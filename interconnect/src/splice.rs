//! Width-adapter insertion.
//!
//! A producer/consumer pair whose raw transport widths differ is bridged by a
//! synthetic adapter instance. The consumer moves to a new connection driven by
//! the adapter, and the adapter's input takes the consumer's place in the
//! original connection.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::compat::{compare, CheckedConnection, Compatibility};
use crate::deps::arcstr::ArcStr;
use crate::error::{ErrorSource, Result};
use crate::graph::worker::{PortDecl, Worker};
use crate::graph::{AdapterParams, Assembly, Attachment, ConnectionKey, InstanceKey, PortKey};
use crate::log::{debug, info};
use crate::protocol::{Direction, PortProtocol, Profile};

/// Name of the adapter port attached to the original connection.
pub const ADAPTER_INPUT: &str = "in";
/// Name of the adapter port driving the consumer.
pub const ADAPTER_OUTPUT: &str = "out";

#[derive(Serialize)]
struct TemplateKey {
    params: AdapterParams,
    profile: Profile,
    elements: usize,
}

/// Uses [`flexbuffers`] to serialize adapter template parameters.
///
/// For caching purposes.
fn serialize_key(key: &TemplateKey) -> Result<Vec<u8>> {
    let mut s = flexbuffers::FlexbufferSerializer::new();
    key.serialize(&mut s)
        .map_err(|err| ErrorSource::Internal(format!("cannot serialize adapter key: {err}")))?;
    Ok(s.take_buffer())
}

/// Width-adapter templates and the adapter name counter of one resolver.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    worker: ArcStr,
    templates: HashMap<Vec<u8>, Arc<Worker>>,
    counter: usize,
}

impl AdapterRegistry {
    /// Creates a registry producing instances of the worker named `worker`.
    pub fn new(worker: impl Into<ArcStr>) -> Self {
        Self {
            worker: worker.into(),
            templates: HashMap::new(),
            counter: 0,
        }
    }

    #[inline]
    pub fn worker_name(&self) -> &ArcStr {
        &self.worker
    }

    /// The number of distinct adapter templates created so far.
    #[inline]
    pub fn num_templates(&self) -> usize {
        self.templates.len()
    }

    /// The number of adapter instances named so far.
    #[inline]
    pub fn num_instances(&self) -> usize {
        self.counter
    }

    fn template(
        &mut self,
        params: AdapterParams,
        profile: Profile,
        elements: usize,
    ) -> Result<Arc<Worker>> {
        let key = serialize_key(&TemplateKey {
            params,
            profile,
            elements,
        })?;
        if let Some(worker) = self.templates.get(&key) {
            return Ok(worker.clone());
        }

        let port = |name: &str, direction, width: usize| {
            PortDecl::new(name, direction, profile)
                .with_array_count(elements)
                .with_protocol(PortProtocol {
                    data_width: width,
                    byte_width: width,
                    ..Default::default()
                })
        };
        let worker = Worker::new(
            self.worker.clone(),
            vec![
                port(ADAPTER_INPUT, Direction::Input, params.input_width),
                port(ADAPTER_OUTPUT, Direction::Output, params.output_width),
            ],
        )?;
        debug!(
            "created adapter template {} ({} -> {}, {} element(s))",
            worker.name(),
            params.input_width,
            params.output_width,
            elements
        );
        let worker = Arc::new(worker);
        self.templates.insert(key, worker.clone());
        Ok(worker)
    }

    /// The next adapter instance name not already used in `assembly`.
    fn next_name(&mut self, assembly: &Assembly) -> ArcStr {
        loop {
            let name = arcstr::format!("{}_{}", self.worker, self.counter);
            self.counter += 1;
            if assembly.instance_by_name(&name).is_none() {
                return name;
            }
        }
    }
}

/// A width adapter placed by [`insert_width_adapter`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SplicedAdapter {
    pub instance: InstanceKey,
    pub name: ArcStr,
    pub params: AdapterParams,
    /// The connection now feeding the adapter.
    pub original: ConnectionKey,
    /// The new connection from the adapter to the consumer.
    pub spliced: ConnectionKey,
}

fn unique_connection_name(assembly: &Assembly, base: ArcStr) -> ArcStr {
    if assembly.connection_by_name(&base).is_none() {
        return base;
    }
    (1..)
        .map(|i| arcstr::format!("{base}_{i}"))
        .find(|name| assembly.connection_by_name(name).is_none())
        .unwrap_or(base)
}

/// Splices a width adapter between `producer` and `consumer` on `conn`.
///
/// The adapter's input mirrors the producer's protocol. Its output carries the
/// consumer's transport shape (data, byte and sideband widths) and every other
/// attribute of the producer, so later stages only see same-width pairs.
pub fn insert_width_adapter(
    assembly: &mut Assembly,
    registry: &mut AdapterRegistry,
    conn: ConnectionKey,
    producer: Attachment,
    consumer: Attachment,
) -> Result<SplicedAdapter> {
    let p = assembly.port(producer.port);
    let c = assembly.port(consumer.port);
    let params = AdapterParams {
        input_width: p.protocol().transport_width(),
        output_width: c.protocol().transport_width(),
    };
    let profile = p.profile();
    let input_protocol = p.protocol().clone();
    let output_protocol = PortProtocol {
        data_width: c.protocol().data_width,
        byte_width: c.protocol().byte_width,
        sideband_width: c.protocol().sideband_width,
        ..input_protocol.clone()
    };

    let worker = registry.template(params, profile, consumer.count)?;
    let name = registry.next_name(assembly);
    let inst = assembly.add_instance(name.clone(), worker)?;
    assembly.mark_adapter(inst, params);

    let input = adapter_port(assembly, inst, ADAPTER_INPUT)?;
    let output = adapter_port(assembly, inst, ADAPTER_OUTPUT)?;
    assembly.port_mut(input).set_protocol(input_protocol);
    assembly.port_mut(output).set_protocol(output_protocol);

    let clock = assembly
        .connection(conn)
        .clock()
        .or_else(|| assembly.port_clock(producer.port));
    if let Some(clock) = clock {
        for slot in assembly.instance(inst).clock_slots().to_vec() {
            assembly.assign_slot(slot, clock);
        }
    }

    let original_name = assembly.connection(conn).name().clone();
    assembly.detach(conn, consumer.port).ok_or_else(|| {
        ErrorSource::Internal(format!(
            "{} is not attached to connection {original_name}",
            assembly.endpoint(consumer.port)
        ))
    })?;
    assembly.attach(conn, input, 0, consumer.count)?;

    let spliced_name =
        unique_connection_name(assembly, arcstr::format!("{original_name}_{name}"));
    let spliced = assembly.add_connection(spliced_name.clone())?;
    assembly.attach(spliced, output, 0, consumer.count)?;
    assembly.attach(spliced, consumer.port, consumer.index, consumer.count)?;
    if let Some(clock) = clock {
        assembly.connection_mut(spliced).set_clock(clock);
    }

    for (from, to) in [(producer.port, input), (output, consumer.port)] {
        let verdict = compare(assembly.port(from), assembly.port(to));
        if !matches!(verdict, Ok(Compatibility::Compatible)) {
            return Err(ErrorSource::Internal(format!(
                "width mismatch remains between {} and {} after inserting adapter {name}",
                assembly.endpoint(from),
                assembly.endpoint(to)
            ))
            .into());
        }
    }

    debug!(
        "inserted adapter {name} ({} -> {}) on connection {original_name}, consumer moved to {spliced_name}",
        params.input_width, params.output_width
    );

    Ok(SplicedAdapter {
        instance: inst,
        name,
        params,
        original: conn,
        spliced,
    })
}

fn adapter_port(assembly: &Assembly, inst: InstanceKey, name: &str) -> Result<PortKey> {
    assembly.instance_port(inst, name).ok_or_else(|| {
        ErrorSource::Internal(format!(
            "adapter {} has no port {name}",
            assembly.instance(inst).name()
        ))
        .into()
    })
}

/// Inserts one adapter per consumer whose checked pairs need one.
///
/// Consumers fed by several producers get a single adapter; the checker has
/// already rejected fan-in from producers of different widths.
pub fn insert_adapters(
    assembly: &mut Assembly,
    registry: &mut AdapterRegistry,
    checked: &[CheckedConnection],
) -> Result<Vec<SplicedAdapter>> {
    let mut adapters = Vec::new();
    for conn in checked {
        let mut done: Vec<PortKey> = Vec::new();
        for verdict in conn.needing_adapters() {
            if done.contains(&verdict.consumer.port) {
                continue;
            }
            done.push(verdict.consumer.port);
            adapters.push(insert_width_adapter(
                assembly,
                registry,
                conn.connection,
                verdict.producer,
                verdict.consumer,
            )?);
        }
    }
    if !adapters.is_empty() {
        info!(
            "inserted {} width adapter(s) into assembly {}",
            adapters.len(),
            assembly.name()
        );
    }
    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::check_all;

    fn link(producer: PortProtocol, consumer: PortProtocol) -> Assembly {
        let src = Worker::new(
            "src",
            vec![PortDecl::new("out", Direction::Output, Profile::Stream).with_protocol(producer)],
        )
        .unwrap();
        let dst = Worker::new(
            "dst",
            vec![PortDecl::new("in", Direction::Input, Profile::Stream).with_protocol(consumer)],
        )
        .unwrap();
        let mut a = Assembly::new("top");
        a.add_instance("src", Arc::new(src)).unwrap();
        a.add_instance("dst", Arc::new(dst)).unwrap();
        let c = a.add_connection("link").unwrap();
        a.attach(c, a.find_port("src", "out").unwrap(), 0, 1).unwrap();
        a.attach(c, a.find_port("dst", "in").unwrap(), 0, 1).unwrap();
        a
    }

    fn width(w: usize) -> PortProtocol {
        PortProtocol::builder().data_width(w).build().unwrap()
    }

    #[test]
    fn splits_the_connection() {
        let mut a = link(width(32), width(128));
        let mut registry = AdapterRegistry::new("width_adapter");
        let checked = check_all(&a).unwrap();
        let adapters = insert_adapters(&mut a, &mut registry, &checked).unwrap();

        assert_eq!(adapters.len(), 1);
        let adapter = &adapters[0];
        assert_eq!(adapter.name.as_str(), "width_adapter_0");
        assert_eq!(
            adapter.params,
            AdapterParams {
                input_width: 32,
                output_width: 128
            }
        );
        assert_eq!(a.num_connections(), 2);
        assert!(a.instance(adapter.instance).is_synthetic());

        let original = a.connection(adapter.original);
        let endpoints = original
            .attachments()
            .iter()
            .map(|att| a.endpoint(att.port).to_string())
            .collect::<Vec<_>>();
        assert_eq!(endpoints, ["src.out", "width_adapter_0.in"]);

        let spliced = a.connection(adapter.spliced);
        assert_eq!(spliced.name().as_str(), "link_width_adapter_0");
        let endpoints = spliced
            .attachments()
            .iter()
            .map(|att| a.endpoint(att.port).to_string())
            .collect::<Vec<_>>();
        assert_eq!(endpoints, ["width_adapter_0.out", "dst.in"]);

        let rechecked = check_all(&a).unwrap();
        assert!(rechecked.iter().all(|c| c.needing_adapters().next().is_none()));
    }

    #[test]
    fn templates_are_shared_and_names_are_unique() {
        let mut registry = AdapterRegistry::new("width_adapter");
        for _ in 0..2 {
            let mut a = link(width(32), width(64));
            let checked = check_all(&a).unwrap();
            insert_adapters(&mut a, &mut registry, &checked).unwrap();
        }
        assert_eq!(registry.num_templates(), 1);
        assert_eq!(registry.num_instances(), 2);

        let mut a = link(width(64), width(32));
        let checked = check_all(&a).unwrap();
        let adapters = insert_adapters(&mut a, &mut registry, &checked).unwrap();
        assert_eq!(registry.num_templates(), 2);
        assert_eq!(adapters[0].name.as_str(), "width_adapter_2");
    }

    #[test]
    fn adapter_output_keeps_producer_attributes() {
        let producer = PortProtocol::builder()
            .data_width(32)
            .precise_burst(true)
            .build()
            .unwrap();
        let mut a = link(producer, width(128));
        let mut registry = AdapterRegistry::new("width_adapter");
        let checked = check_all(&a).unwrap();
        let adapter = insert_adapters(&mut a, &mut registry, &checked)
            .unwrap()
            .remove(0);

        let out = a.instance_port(adapter.instance, ADAPTER_OUTPUT).unwrap();
        let protocol = a.port(out).protocol();
        assert_eq!(protocol.data_width, 128);
        assert!(protocol.precise_burst);
        assert_eq!(protocol.transport_width(), 128);
    }
}
