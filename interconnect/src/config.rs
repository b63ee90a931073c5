//! Resolver configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::deps::arcstr::ArcStr;
use crate::error::Result;
use crate::fmt::signal::BusFmt;

/// Settings shared by every assembly a [`Resolver`](crate::resolve::Resolver) processes.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct ResolverConfig {
    /// Name of the designated control clock.
    ///
    /// Used when neither the assembly nor the platform names one.
    /// `None` leaves control ports to ordinary propagation.
    #[builder(setter(into, strip_option))]
    pub control_clock: Option<ArcStr>,
    /// Width of the message-kind field on ports without a declared protocol.
    pub default_opcode_width: usize,
    /// Name of the generic width-adapter template.
    #[builder(setter(into))]
    pub adapter_worker: ArcStr,
    /// Format used for bus indices in wire names.
    pub bus_format: BusFmt,
    /// Directories searched for `<worker>.toml` template files.
    pub template_paths: Vec<PathBuf>,
    /// Whether transport width mismatches are bridged with adapter instances.
    ///
    /// When disabled, they are reported as protocol errors.
    pub insert_adapters: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            control_clock: Some(arcstr::literal!("ctl_clk")),
            default_opcode_width: 8,
            adapter_worker: arcstr::literal!("width_adapter"),
            bus_format: BusFmt::default(),
            template_paths: Vec::new(),
            insert_adapters: true,
        }
    }
}

impl ResolverConfig {
    #[inline]
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }

    pub fn from_toml(input: &str) -> Result<Self> {
        let value = toml::from_str(input)?;
        Ok(value)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)?;
        let mut value = Self::from_toml(&input)?;
        value.resolve_paths(path);
        Ok(value)
    }

    /// Makes relative template paths relative to the directory of the config file.
    fn resolve_paths(&mut self, path: &Path) {
        let Some(base) = path.parent() else {
            return;
        };
        for p in self.template_paths.iter_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}
