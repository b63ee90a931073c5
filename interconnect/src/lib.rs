//! Interconnect resolution for component assemblies.
//!
//! Given an assembly of worker instances wired together through typed ports,
//! a [`Resolver`](resolve::Resolver) unifies clock domains, checks every
//! producer/consumer pair, inserts width adapters, synthesizes adaptation
//! plans for the remaining signal mismatches and allocates signal bundles.

pub mod adapt;
pub mod binding;
pub mod clock;
pub mod compat;
pub mod config;
pub mod decl;
pub mod deps;
pub mod error;
pub mod fmt;
pub mod graph;
pub mod index;
pub mod platform;
pub mod protocol;
pub mod resolve;
pub mod splice;
pub mod template;
pub mod validation;

pub(crate) mod log;

pub use resolve::{ResolvedAssembly, Resolver};
