//! The resolution pipeline.
//!
//! A [`Resolver`] owns everything shared between assemblies: configuration,
//! the worker template cache, the adapter registry and the target platform.
//! Each assembly is resolved independently, in one pass per stage.

use std::sync::Arc;

use serde::Serialize;

use crate::adapt::{synthesize_plans, AdaptationPlan, SynthesisOptions};
use crate::binding::{allocate_signals, Bindings};
use crate::clock::unify_clocks;
use crate::compat::{check_all, CheckedConnection, Compatibility, Incompatibility, ProtocolError};
use crate::config::ResolverConfig;
use crate::decl::AssemblyDecl;
use crate::deps::arcstr::ArcStr;
use crate::error::{with_err_context, ErrorContext, ErrorSource, InterconnectError, Result, Stage};
use crate::graph::builder::GraphBuilder;
use crate::graph::validation::validate_structure;
use crate::graph::worker::Worker;
use crate::graph::Assembly;
use crate::log::{info, warn};
use crate::platform::Platform;
use crate::splice::{insert_adapters, AdapterRegistry, SplicedAdapter};
use crate::template::TemplateCache;

/// The outcome of resolving one assembly.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAssembly {
    /// The final graph, including synthetic adapter instances.
    pub graph: Assembly,
    pub plans: Vec<AdaptationPlan>,
    pub adapters: Vec<SplicedAdapter>,
    pub bindings: Bindings,
}

impl ResolvedAssembly {
    #[inline]
    pub fn name(&self) -> &ArcStr {
        self.graph.name()
    }

    /// The adaptation plan of the named connection.
    pub fn plan(&self, connection: &str) -> Option<&AdaptationPlan> {
        self.plans.iter().find(|p| p.name.as_str() == connection)
    }

    /// Serializes the resolved assembly for downstream emitters.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn stage<T, E>(result: std::result::Result<T, E>, stage: Stage) -> Result<T>
where
    E: Into<InterconnectError>,
{
    with_err_context(result, || ErrorContext::Stage(stage))
}

#[derive(Debug)]
pub struct Resolver {
    config: ResolverConfig,
    templates: TemplateCache,
    adapters: AdapterRegistry,
    platform: Option<Platform>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            templates: TemplateCache::new(config.template_paths.iter().cloned()),
            adapters: AdapterRegistry::new(config.adapter_worker.clone()),
            platform: None,
            config,
        }
    }

    /// A consuming method to set the target platform.
    #[inline]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    #[inline]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[inline]
    pub fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }

    #[inline]
    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    #[inline]
    pub fn templates_mut(&mut self) -> &mut TemplateCache {
        &mut self.templates
    }

    #[inline]
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Registers a worker template under its own name.
    pub fn register_worker(&mut self, worker: Worker) -> Arc<Worker> {
        self.templates.insert(worker)
    }

    /// Builds the assembly graph of `decl`.
    pub fn build(&mut self, decl: &AssemblyDecl) -> Result<Assembly> {
        let mut builder = GraphBuilder::new(&mut self.templates);
        stage(builder.build(decl), Stage::Build)
            .map_err(|err| err.with_context(ErrorContext::ResolveAssembly(decl.name.clone())))
    }

    /// Builds and resolves `decl`.
    pub fn resolve_decl(&mut self, decl: &AssemblyDecl) -> Result<ResolvedAssembly> {
        let assembly = self.build(decl)?;
        self.resolve(assembly)
    }

    /// Resolves every declaration, continuing past assemblies that fail.
    pub fn resolve_all<'a>(
        &mut self,
        decls: impl IntoIterator<Item = &'a AssemblyDecl>,
    ) -> Vec<(ArcStr, Result<ResolvedAssembly>)> {
        decls
            .into_iter()
            .map(|decl| {
                let result = self.resolve_decl(decl);
                if let Err(ref err) = result {
                    warn!("failed to resolve assembly {}: {}", decl.name, err.source());
                }
                (decl.name.clone(), result)
            })
            .collect()
    }

    /// Runs every resolution stage on `assembly`.
    pub fn resolve(&mut self, assembly: Assembly) -> Result<ResolvedAssembly> {
        let name = assembly.name().clone();
        let resolved = with_err_context(self.resolve_inner(assembly), || {
            ErrorContext::ResolveAssembly(name.clone())
        })?;
        info!(
            "resolved assembly {name}: {} connection(s), {} adapter(s), {} plan entries",
            resolved.graph.num_connections(),
            resolved.adapters.len(),
            resolved.plans.iter().map(|p| p.entries.len()).sum::<usize>()
        );
        Ok(resolved)
    }

    fn control_clock(&self) -> Option<ArcStr> {
        self.platform
            .as_ref()
            .and_then(Platform::control_clock)
            .or_else(|| self.config.control_clock.clone())
    }

    fn resolve_inner(&mut self, mut assembly: Assembly) -> Result<ResolvedAssembly> {
        if assembly.control_clock().is_none() {
            if let Some(clock) = self.control_clock() {
                assembly.set_control_clock(clock);
            }
        }

        let output = validate_structure(&assembly);
        output.log();
        if let Some(err) = output.into_first_error() {
            return stage(Err(err), Stage::Validate);
        }

        stage(unify_clocks(&mut assembly), Stage::UnifyClocks)?;

        let checked = stage(check_all(&assembly), Stage::CheckProtocols)?;
        let (checked, adapters) = if self.config.insert_adapters {
            let adapters = stage(
                insert_adapters(&mut assembly, &mut self.adapters, &checked),
                Stage::InsertAdapters,
            )?;
            if adapters.is_empty() {
                (checked, adapters)
            } else {
                let rechecked = stage(check_all(&assembly), Stage::CheckProtocols)?;
                stage(no_width_mismatch(&rechecked), Stage::InsertAdapters)?;
                (rechecked, adapters)
            }
        } else {
            stage(reject_width_mismatch(&assembly, &checked), Stage::CheckProtocols)?;
            (checked, Vec::new())
        };

        let options = SynthesisOptions::from(&self.config);
        let plans = stage(
            synthesize_plans(&assembly, &checked, &options),
            Stage::SynthesizePlans,
        )?;

        let bindings = allocate_signals(&assembly);

        Ok(ResolvedAssembly {
            graph: assembly,
            plans,
            adapters,
            bindings,
        })
    }
}

fn no_width_mismatch(checked: &[CheckedConnection]) -> Result<()> {
    if checked.iter().any(|c| c.needing_adapters().next().is_some()) {
        return Err(ErrorSource::Internal(
            "width mismatch remains after adapter insertion".into(),
        )
        .into());
    }
    Ok(())
}

fn reject_width_mismatch(
    assembly: &Assembly,
    checked: &[CheckedConnection],
) -> std::result::Result<(), ProtocolError> {
    let mismatch = checked
        .iter()
        .flat_map(|c| c.needing_adapters().map(move |v| (c.connection, v)))
        .next();
    if let Some((conn, verdict)) = mismatch {
        if let Compatibility::NeedsAdapterInstance {
            input_width,
            output_width,
        } = verdict.compatibility
        {
            return Err(ProtocolError {
                connection: assembly.connection(conn).name().clone(),
                producer: assembly.endpoint(verdict.producer.port),
                consumer: assembly.endpoint(verdict.consumer.port),
                reason: Incompatibility::TransportWidth {
                    producer: input_width,
                    consumer: output_width,
                },
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::ConnectionDecl;
    use crate::graph::worker::PortDecl;
    use crate::platform::Board;
    use crate::protocol::{Direction, PortProtocol, Profile};

    fn resolver(config: ResolverConfig) -> Resolver {
        let mut resolver = Resolver::new(config);
        for (name, width) in [("narrow", 32), ("wide", 128)] {
            let protocol = PortProtocol::builder().data_width(width).build().unwrap();
            resolver.register_worker(
                Worker::new(
                    format!("{name}_src"),
                    vec![
                        PortDecl::new("ctl", Direction::Input, Profile::Control),
                        PortDecl::new("out", Direction::Output, Profile::Stream)
                            .with_protocol(protocol.clone()),
                    ],
                )
                .unwrap(),
            );
            resolver.register_worker(
                Worker::new(
                    format!("{name}_dst"),
                    vec![
                        PortDecl::new("ctl", Direction::Input, Profile::Control),
                        PortDecl::new("in", Direction::Input, Profile::Stream)
                            .with_protocol(protocol),
                    ],
                )
                .unwrap(),
            );
        }
        resolver
    }

    fn decl(name: &str, src: &str, dst: &str) -> AssemblyDecl {
        AssemblyDecl::new(name)
            .with_instance("a", src)
            .with_instance("b", dst)
            .with_connection(
                ConnectionDecl::new("link")
                    .with_attachment("a.out")
                    .with_attachment("b.in"),
            )
    }

    #[test]
    fn control_clock_comes_from_the_platform() {
        let platform = Platform::new("board").with_part(Board::new("b").with_oscillator("osc"));
        let mut resolver = resolver(ResolverConfig::default()).with_platform(platform);
        let resolved = resolver
            .resolve_decl(&decl("top", "narrow_src", "narrow_dst"))
            .unwrap();
        let graph = &resolved.graph;
        let out = graph.find_port("a", "out").unwrap();
        assert_eq!(graph.port_clock_name(out).unwrap().as_str(), "osc");
        assert!(resolved.adapters.is_empty());
        assert!(resolved.plan("link").unwrap().is_empty());
    }

    #[test]
    fn disabled_adapters_report_width_mismatch() {
        let config = ResolverConfig::builder()
            .insert_adapters(false)
            .build()
            .unwrap();
        let mut resolver = resolver(config);
        let err = resolver
            .resolve_decl(&decl("top", "narrow_src", "wide_dst"))
            .unwrap_err();
        match err.source() {
            ErrorSource::Protocol(err) => {
                assert_eq!(err.attribute(), "dataWidth");
                assert_eq!(
                    err.reason,
                    Incompatibility::TransportWidth {
                        producer: 32,
                        consumer: 128
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.context().contains(&ErrorContext::Stage(Stage::CheckProtocols)));
        assert!(err
            .context()
            .contains(&ErrorContext::ResolveAssembly(arcstr::literal!("top"))));
    }

    #[test]
    fn batch_isolates_failures() {
        let mut resolver = resolver(ResolverConfig::default());
        let decls = [
            decl("ok", "narrow_src", "wide_dst"),
            decl("missing", "narrow_src", "no_such_worker"),
            decl("also_ok", "wide_src", "wide_dst"),
        ];
        let results = resolver.resolve_all(decls.iter());
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[1].1.as_ref().unwrap_err().source(),
            ErrorSource::WorkerNotFound(name) if name.as_str() == "no_such_worker"
        ));
        assert!(results[2].1.is_ok());
        assert_eq!(resolver.adapters().num_instances(), 1);

        let json = results[0].1.as_ref().unwrap().to_json().unwrap();
        assert!(json.contains("width_adapter_0"));
    }
}
