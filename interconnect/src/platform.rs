//! Platform descriptions.
//!
//! A [`Platform`] is composed of named parts (boards, devices). Parts advertise
//! optional capabilities through trait-object accessors; the resolver asks the
//! platform for the part that sources the designated control clock.

use std::fmt::Debug;
use std::sync::Arc;

use crate::deps::arcstr::ArcStr;

/// A part that drives the control clock of assemblies built for the platform.
pub trait ControlClockSource {
    fn control_clock(&self) -> ArcStr;
}

/// A named description making up part of a platform.
pub trait Description: Debug + Send + Sync {
    fn name(&self) -> &ArcStr;

    /// Returns the part as a control clock source, if it is one.
    fn as_control_clock_source(&self) -> Option<&dyn ControlClockSource> {
        None
    }
}

/// A circuit board hosting one or more devices.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Board {
    pub name: ArcStr,
    /// The board oscillator feeding the control clock, if any.
    pub oscillator: Option<ArcStr>,
}

impl Board {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            oscillator: None,
        }
    }

    /// A consuming method to set the board oscillator.
    #[inline]
    pub fn with_oscillator(mut self, clock: impl Into<ArcStr>) -> Self {
        self.oscillator = Some(clock.into());
        self
    }
}

impl ControlClockSource for Board {
    fn control_clock(&self) -> ArcStr {
        self.oscillator.clone().unwrap_or_else(|| self.name.clone())
    }
}

impl Description for Board {
    fn name(&self) -> &ArcStr {
        &self.name
    }

    fn as_control_clock_source(&self) -> Option<&dyn ControlClockSource> {
        self.oscillator.as_ref().map(|_| self as &dyn ControlClockSource)
    }
}

/// A programmable device, eg. an FPGA part.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Device {
    pub name: ArcStr,
    pub family: ArcStr,
}

impl Device {
    pub fn new(name: impl Into<ArcStr>, family: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            family: family.into(),
        }
    }
}

impl Description for Device {
    fn name(&self) -> &ArcStr {
        &self.name
    }
}

/// A target platform composed of named parts.
#[derive(Debug, Clone)]
pub struct Platform {
    name: ArcStr,
    parts: Vec<Arc<dyn Description>>,
}

impl Platform {
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            parts: Vec::new(),
        }
    }

    /// A consuming method to add a part to the platform.
    pub fn with_part(mut self, part: impl Description + 'static) -> Self {
        self.parts.push(Arc::new(part));
        self
    }

    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    #[inline]
    pub fn parts(&self) -> &[Arc<dyn Description>] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&Arc<dyn Description>> {
        self.parts.iter().find(|p| p.name().as_str() == name)
    }

    /// The control clock of the first part that sources one.
    pub fn control_clock(&self) -> Option<ArcStr> {
        self.parts
            .iter()
            .find_map(|p| p.as_control_clock_source().map(|s| s.control_clock()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_clock_source_wins() {
        let platform = Platform::new("zed")
            .with_part(Device::new("xc7z020", "zynq"))
            .with_part(Board::new("carrier"))
            .with_part(Board::new("zedboard").with_oscillator("sys_clk"))
            .with_part(Board::new("spare").with_oscillator("spare_clk"));
        assert_eq!(platform.control_clock().unwrap().as_str(), "sys_clk");
        assert!(platform.part("carrier").is_some());
        assert!(platform
            .part("xc7z020")
            .unwrap()
            .as_control_clock_source()
            .is_none());
    }

    #[test]
    fn platform_without_source() {
        let platform = Platform::new("sim").with_part(Device::new("model", "sim"));
        assert_eq!(platform.control_clock(), None);
    }
}
