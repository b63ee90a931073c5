//! Adaptation plans.
//!
//! For every producer/consumer pair the checker certified compatible, the
//! synthesizer emits one [`PlanEntry`] per ancillary signal whose shape differs
//! between the two ports. Transport width differences never reach this module;
//! they are bridged by adapter instances.

use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

use crate::compat::{CheckedConnection, Compatibility};
use crate::config::ResolverConfig;
use crate::deps::arcstr::ArcStr;
use crate::fmt::signal::{wire_name, BusFmt};
use crate::graph::{Assembly, Attachment, ConnectionKey, Endpoint};
use crate::index::IndexOwned;
use crate::log::debug;
use crate::protocol::{BurstModes, PortProtocol, SignalKind};

pub mod expr;

pub use expr::{BitRange, Expr, Side, SignalRef};

/// Settings that affect synthesized plans.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct SynthesisOptions {
    pub default_opcode_width: usize,
    pub bus_format: BusFmt,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            default_opcode_width: 8,
            bus_format: BusFmt::default(),
        }
    }
}

impl From<&ResolverConfig> for SynthesisOptions {
    fn from(value: &ResolverConfig) -> Self {
        Self {
            default_opcode_width: value.default_opcode_width,
            bus_format: value.bus_format,
        }
    }
}

/// How a target signal is driven.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub enum Driver {
    Expr(Expr),
    /// The target is a producer signal nothing reads; no driver is materialized.
    Unused,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct PlanEntry {
    pub producer: Attachment,
    pub consumer: Attachment,
    /// Offset of the array element within both attachments.
    pub element: usize,
    pub target: SignalRef,
    /// The bits of `target` the entry covers, or `None` for all of them.
    pub bits: Option<BitRange>,
    pub driver: Driver,
}

impl PlanEntry {
    #[inline]
    pub fn is_unused(&self) -> bool {
        self.driver == Driver::Unused
    }

    pub fn expr(&self) -> Option<&Expr> {
        match self.driver {
            Driver::Expr(ref expr) => Some(expr),
            Driver::Unused => None,
        }
    }
}

impl Display for PlanEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.target.wire)?;
        if let Some(bits) = self.bits {
            write!(f, "{bits}")?;
        }
        match self.driver {
            Driver::Expr(ref expr) => write!(f, " = {expr}"),
            Driver::Unused => write!(f, " unused"),
        }
    }
}

/// The adaptation entries of one connection.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AdaptationPlan {
    pub connection: ConnectionKey,
    pub name: ArcStr,
    pub entries: Vec<PlanEntry>,
}

impl AdaptationPlan {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries targeting signals of the given kind.
    pub fn entries_for(&self, kind: SignalKind) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |e| e.target.kind == kind)
    }

    pub fn unused(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.is_unused())
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum SynthesisFailure {
    #[error("unit width {producer} (payload plus sideband) does not match {consumer}")]
    UnitWidthMismatch { producer: usize, consumer: usize },

    #[error("byte enable widths {producer} and {consumer} are not integer multiples of each other")]
    ByteEnableRatio { producer: usize, consumer: usize },

    #[error("consumer burst modes ({consumer}) do not include any producer burst mode ({producer})")]
    PreciseBurstRequired {
        producer: BurstModes,
        consumer: BurstModes,
    },

    #[error("burst length field of {producer} bits would be truncated to {consumer} bits")]
    BurstLengthTruncation { producer: usize, consumer: usize },

    #[error("message kind `{0}` is not declared by the consumer")]
    UnknownMessageKind(ArcStr),

    #[error("producer abortable is {producer} but consumer abortable is {consumer}")]
    AbortUnsupported { producer: bool, consumer: bool },
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("connection {connection}: cannot adapt {producer} to {consumer}: {reason}")]
pub struct SynthesisError {
    pub connection: ArcStr,
    pub producer: Endpoint,
    pub consumer: Endpoint,
    pub reason: SynthesisFailure,
}

struct PairSynthesizer<'a> {
    p: &'a PortProtocol,
    c: &'a PortProtocol,
    p_endpoint: Endpoint,
    c_endpoint: Endpoint,
    p_array_count: usize,
    c_array_count: usize,
    producer: Attachment,
    consumer: Attachment,
    element: usize,
    options: &'a SynthesisOptions,
    entries: Vec<PlanEntry>,
}

impl<'a> PairSynthesizer<'a> {
    fn signal(&self, side: Side, kind: SignalKind) -> Option<SignalRef> {
        let (protocol, endpoint, index, array_count) = match side {
            Side::Producer => (
                self.p,
                &self.p_endpoint,
                self.producer.index,
                self.p_array_count,
            ),
            Side::Consumer => (
                self.c,
                &self.c_endpoint,
                self.consumer.index,
                self.c_array_count,
            ),
        };
        let width = protocol.signal_width(kind, self.options.default_opcode_width)?;
        Some(SignalRef {
            side,
            kind,
            wire: wire_name(
                endpoint,
                index + self.element,
                array_count,
                kind.suffix(),
                self.options.bus_format,
            ),
            width,
        })
    }

    fn push(&mut self, target: SignalRef, bits: Option<BitRange>, driver: Driver) {
        self.entries.push(PlanEntry {
            producer: self.producer,
            consumer: self.consumer,
            element: self.element,
            target,
            bits,
            driver,
        });
    }

    /// Drives a consumer signal with `expr`.
    fn drive(&mut self, kind: SignalKind, expr: Expr) {
        if let Some(target) = self.signal(Side::Consumer, kind) {
            self.push(target, None, Driver::Expr(expr));
        }
    }

    /// Marks (some bits of) a producer signal unused.
    fn unused(&mut self, kind: SignalKind, bits: Option<BitRange>) {
        if let Some(target) = self.signal(Side::Producer, kind) {
            self.push(target, bits, Driver::Unused);
        }
    }

    fn synthesize(&mut self) -> Result<(), SynthesisFailure> {
        self.repack()?;
        self.byte_enables()?;
        self.opcode()?;
        self.burst()?;
        self.early_valid();
        self.abort()?;
        Ok(())
    }

    /// Bits `lo..lo + len` of producer unit `unit`, payload bits first, in MSB order.
    fn unit_bits(&self, unit: usize, lo: usize, len: usize) -> Vec<Expr> {
        let bw = self.p.byte_width;
        let sw = self.p.sideband_width;
        let hi = lo + len;
        let mut lsb_first = Vec::with_capacity(2);
        if lo < bw {
            if let Some(data) = self.signal(Side::Producer, SignalKind::Data) {
                let end = std::cmp::min(hi, bw);
                lsb_first.push(data.index(unit * bw + lo..unit * bw + end));
            }
        }
        if hi > bw {
            if let Some(sideband) = self.signal(Side::Producer, SignalKind::Sideband) {
                let start = std::cmp::max(lo, bw) - bw;
                lsb_first.push(sideband.index(unit * sw + start..unit * sw + hi - bw));
            }
        }
        lsb_first.reverse();
        lsb_first
    }

    fn repack(&mut self) -> Result<(), SynthesisFailure> {
        if self.p.sideband_width == self.c.sideband_width {
            return Ok(());
        }
        let producer = self.p.unit_width();
        let consumer = self.c.unit_width();
        if producer != consumer || self.p.units() != self.c.units() {
            return Err(SynthesisFailure::UnitWidthMismatch { producer, consumer });
        }

        let units = self.p.units();
        let bw = self.c.byte_width;
        let sw = self.c.sideband_width;
        let data = Expr::concat(
            (0..units)
                .rev()
                .flat_map(|u| self.unit_bits(u, 0, bw))
                .collect::<Vec<_>>(),
        );
        self.drive(SignalKind::Data, data);
        if sw > 0 {
            let sideband = Expr::concat(
                (0..units)
                    .rev()
                    .flat_map(|u| self.unit_bits(u, bw, sw))
                    .collect::<Vec<_>>(),
            );
            self.drive(SignalKind::Sideband, sideband);
        }
        Ok(())
    }

    fn byte_enables(&mut self) -> Result<(), SynthesisFailure> {
        match (self.p.byte_enable_width(), self.c.byte_enable_width()) {
            (Some(pw), Some(cw)) if pw == cw => {}
            (Some(pw), Some(cw)) => {
                let Some(be) = self.signal(Side::Producer, SignalKind::ByteEnable) else {
                    return Ok(());
                };
                let parts = if pw % cw == 0 {
                    let k = pw / cw;
                    (0..cw)
                        .rev()
                        .map(|j| be.index(j * k..(j + 1) * k).or_reduce())
                        .collect::<Vec<_>>()
                } else if cw % pw == 0 {
                    let k = cw / pw;
                    (0..pw)
                        .rev()
                        .map(|i| be.index(i).replicate(k))
                        .collect::<Vec<_>>()
                } else {
                    return Err(SynthesisFailure::ByteEnableRatio {
                        producer: pw,
                        consumer: cw,
                    });
                };
                self.drive(SignalKind::ByteEnable, Expr::concat(parts));
            }
            (None, Some(cw)) => self.drive(SignalKind::ByteEnable, Expr::ones(cw)),
            (Some(_), None) => self.unused(SignalKind::ByteEnable, None),
            (None, None) => {}
        }
        Ok(())
    }

    fn opcode(&mut self) -> Result<(), SynthesisFailure> {
        let (p, c) = (self.p, self.c);
        let default = self.options.default_opcode_width;
        let pw = p.opcode_width(default);
        let cw = c.opcode_width(default);
        let opcode = self.signal(Side::Producer, SignalKind::Opcode);

        let names = p
            .message_kinds
            .as_ref()
            .and_then(|k| k.names())
            .zip(c.message_kinds.as_ref().and_then(|k| k.names()));
        if let Some((pn, cn)) = names {
            if pn.len() == cn.len() && pn != cn {
                let table = pn
                    .iter()
                    .map(|name| {
                        cn.iter()
                            .position(|n| n == name)
                            .ok_or_else(|| SynthesisFailure::UnknownMessageKind(name.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(op) = opcode {
                    self.drive(SignalKind::Opcode, Expr::signal(op).remap(table, cw));
                }
                return Ok(());
            }
        }

        if cw > pw {
            let expr = match opcode {
                Some(op) => Expr::signal(op).zero_extend(cw),
                None => Expr::zeros(cw),
            };
            self.drive(SignalKind::Opcode, expr);
        } else if cw < pw {
            match opcode {
                Some(op) if cw > 0 => self.drive(SignalKind::Opcode, op.index(0..cw)),
                _ => {}
            }
            self.unused(SignalKind::Opcode, Some(BitRange::new(cw, pw - cw)));
        }
        Ok(())
    }

    fn burst(&mut self) -> Result<(), SynthesisFailure> {
        let (pp, pi) = (self.p.precise_burst, self.p.imprecise_burst);
        let (cp, ci) = (self.c.precise_burst, self.c.imprecise_burst);

        if ci && !cp {
            if pp {
                if let Some(last) = self.signal(Side::Producer, SignalKind::Last) {
                    let remaining = Expr::constant(2, 2).sub(Expr::signal(last).zero_extend(2), 2);
                    self.drive(SignalKind::BurstLength, remaining);
                }
                self.unused(SignalKind::BurstPrecise, None);
                self.unused(SignalKind::BurstLength, None);
            }
            return Ok(());
        }

        if cp && !ci && !pp {
            return Err(SynthesisFailure::PreciseBurstRequired {
                producer: self.p.burst_modes(),
                consumer: self.c.burst_modes(),
            });
        }
        if cp && ci && !(pp && pi) {
            self.drive(SignalKind::BurstPrecise, Expr::constant(usize::from(pp), 1));
        }

        let producer = self.p.burst_length_width();
        let consumer = self.c.burst_length_width();
        if consumer > producer {
            if let Some(length) = self.signal(Side::Producer, SignalKind::BurstLength) {
                self.drive(SignalKind::BurstLength, Expr::signal(length).zero_extend(consumer));
            }
        } else if consumer < producer {
            return Err(SynthesisFailure::BurstLengthTruncation { producer, consumer });
        }
        Ok(())
    }

    fn early_valid(&mut self) {
        match (self.p.early_request, self.c.early_request) {
            (false, true) => {
                if let Some(cmd) = self.signal(Side::Producer, SignalKind::Command) {
                    self.drive(SignalKind::EarlyValid, Expr::signal(cmd).or_reduce());
                }
            }
            (true, false) => self.unused(SignalKind::EarlyValid, None),
            _ => {}
        }
    }

    fn abort(&mut self) -> Result<(), SynthesisFailure> {
        match (self.p.abortable, self.c.abortable) {
            (false, true) => self.drive(SignalKind::Abort, Expr::zeros(1)),
            (true, false) => {
                return Err(SynthesisFailure::AbortUnsupported {
                    producer: true,
                    consumer: false,
                })
            }
            _ => {}
        }
        Ok(())
    }
}

/// Synthesizes the plan entries bridging one compatible producer/consumer pair.
pub fn synthesize_pair(
    assembly: &Assembly,
    conn: ConnectionKey,
    producer: Attachment,
    consumer: Attachment,
    options: &SynthesisOptions,
) -> Result<Vec<PlanEntry>, SynthesisError> {
    let pp = assembly.port(producer.port);
    let cp = assembly.port(consumer.port);
    let mut synth = PairSynthesizer {
        p: pp.protocol(),
        c: cp.protocol(),
        p_endpoint: assembly.endpoint(producer.port),
        c_endpoint: assembly.endpoint(consumer.port),
        p_array_count: pp.array_count(),
        c_array_count: cp.array_count(),
        producer,
        consumer,
        element: 0,
        options,
        entries: Vec::new(),
    };

    for element in 0..std::cmp::min(producer.count, consumer.count) {
        synth.element = element;
        synth.synthesize().map_err(|reason| SynthesisError {
            connection: assembly.connection(conn).name().clone(),
            producer: synth.p_endpoint.clone(),
            consumer: synth.c_endpoint.clone(),
            reason,
        })?;
    }
    Ok(synth.entries)
}

/// Builds one plan per checked connection from its compatible pairs.
pub fn synthesize_plans(
    assembly: &Assembly,
    checked: &[CheckedConnection],
    options: &SynthesisOptions,
) -> Result<Vec<AdaptationPlan>, SynthesisError> {
    let mut plans = Vec::with_capacity(checked.len());
    for conn in checked {
        let mut entries = Vec::new();
        for verdict in conn
            .verdicts
            .iter()
            .filter(|v| v.compatibility == Compatibility::Compatible)
        {
            entries.extend(synthesize_pair(
                assembly,
                conn.connection,
                verdict.producer,
                verdict.consumer,
                options,
            )?);
        }
        let plan = AdaptationPlan {
            connection: conn.connection,
            name: assembly.connection(conn.connection).name().clone(),
            entries,
        };
        debug!("plan for connection {}: {} entries", plan.name, plan.entries.len());
        for entry in plan.entries.iter() {
            debug!("  {entry}");
        }
        plans.push(plan);
    }
    Ok(plans)
}
