//! Materializes an [`Assembly`] from its declaration.

use super::error::StructuralError;
use super::worker::PortDecl;
use super::{Assembly, Endpoint, PortKey};
use crate::decl::{AssemblyDecl, AttachTarget, ConnectionDecl, ExternalDecl};
use crate::deps::arcstr::ArcStr;
use crate::error::{with_err_context, ErrorContext, Result};
use crate::log::debug;
use crate::template::TemplateCache;

/// Builds assembly graphs, pulling worker templates from a [`TemplateCache`].
pub struct GraphBuilder<'a> {
    templates: &'a mut TemplateCache,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(templates: &'a mut TemplateCache) -> Self {
        Self { templates }
    }

    pub fn build(&mut self, decl: &AssemblyDecl) -> Result<Assembly> {
        let mut assembly = Assembly::new(decl.name.clone());
        if let Some(ref clock) = decl.control_clock {
            assembly.set_control_clock(clock.clone());
        }

        for inst in decl.instances.iter() {
            let worker = with_err_context(self.templates.get(&inst.worker), || {
                ErrorContext::Task(arcstr::format!("placing instance {}", inst.name))
            })?;
            assembly.add_instance(inst.name.clone(), worker)?;
        }

        for ext in decl.externals.iter() {
            add_external(&mut assembly, ext)?;
        }

        for (i, conn) in decl.connections.iter().enumerate() {
            add_connection(&mut assembly, conn, i)?;
        }

        debug!(
            "built assembly {} with {} connections",
            assembly.name(),
            assembly.num_connections()
        );
        Ok(assembly)
    }
}

fn lookup_port(
    assembly: &Assembly,
    connection: &ArcStr,
    instance: Option<&ArcStr>,
    port: &ArcStr,
) -> std::result::Result<PortKey, StructuralError> {
    let key = match instance {
        Some(name) => {
            let inst = assembly.instance_by_name(name).ok_or_else(|| {
                StructuralError::NoSuchInstance {
                    connection: connection.clone(),
                    instance: name.clone(),
                }
            })?;
            assembly.instance_port(inst, port)
        }
        None => assembly.boundary_port(port),
    };
    key.ok_or_else(|| StructuralError::NoSuchPort {
        connection: connection.clone(),
        endpoint: Endpoint::new(instance.cloned(), port.clone()),
    })
}

fn add_external(assembly: &mut Assembly, ext: &ExternalDecl) -> Result<()> {
    let mirrored = match (&ext.instance, &ext.port) {
        (Some(inst), Some(port)) => {
            let key = lookup_port(assembly, &ext.name, Some(inst), port)?;
            Some(key)
        }
        _ => None,
    };

    let mut decl = match mirrored {
        Some(key) => {
            let p = assembly.port(key);
            let index = ext.index.unwrap_or(0);
            let mut decl = PortDecl::new(ext.name.clone(), p.direction(), p.profile())
                .with_protocol(p.protocol().clone());
            decl.array_count = ext
                .count
                .unwrap_or_else(|| p.array_count().saturating_sub(index));
            decl
        }
        None => {
            let mut decl = PortDecl::new(
                ext.name.clone(),
                ext.direction.unwrap_or_default(),
                ext.profile.unwrap_or_default(),
            );
            decl.array_count = ext.count.unwrap_or(1);
            decl
        }
    };
    if let Some(direction) = ext.direction {
        decl.direction = direction;
    }
    if let Some(profile) = ext.profile {
        decl.profile = profile;
    }
    if let Some(ref protocol) = ext.protocol {
        decl.protocol = protocol.clone();
    }

    let boundary = assembly.add_boundary_port(decl)?;
    if let Some(ref clock) = ext.clock {
        assembly.pin_clock(boundary, clock.clone());
    }

    if let Some(inner) = mirrored {
        let count = assembly.port(boundary).array_count();
        let conn = assembly.add_connection(ext.name.clone())?;
        assembly.attach(conn, inner, ext.index.unwrap_or(0), count)?;
        assembly.attach(conn, boundary, 0, count)?;
    }
    Ok(())
}

fn connection_name(decl: &ConnectionDecl, index: usize, first: Option<&AttachTarget>) -> ArcStr {
    if let Some(ref name) = decl.name {
        return name.clone();
    }
    match first {
        Some(AttachTarget {
            instance: Some(inst),
            port,
            ..
        }) => arcstr::format!("{inst}_{port}"),
        Some(AttachTarget {
            instance: None,
            port,
            ..
        }) => port.clone(),
        None => arcstr::format!("conn{index}"),
    }
}

fn add_connection(assembly: &mut Assembly, decl: &ConnectionDecl, index: usize) -> Result<()> {
    let targets = decl
        .attachments
        .iter()
        .map(|a| a.target())
        .collect::<Result<Vec<_>>>()?;
    let name = connection_name(decl, index, targets.first());
    let conn = assembly.add_connection(name.clone())?;

    for target in targets.iter() {
        let port = lookup_port(assembly, &name, target.instance.as_ref(), &target.port)?;
        let count = target.count.unwrap_or_else(|| {
            assembly
                .port(port)
                .array_count()
                .saturating_sub(target.index)
        });
        assembly.attach(conn, port, target.index, count)?;
    }
    Ok(())
}
