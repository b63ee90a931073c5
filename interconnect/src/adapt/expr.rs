//! Bit-manipulation expressions over the signals of two connected ports.
//!
//! Expressions are pure data. [`Display`] renders them as a template over
//! wire names; [`Expr::eval`] computes them on concrete bit vectors.
//! Bit vectors are least-significant bit first.

use std::fmt::Display;
use std::ops::Range;

use bitvec::bitvec;
use bitvec::slice::BitSlice;
use bitvec::vec::BitVec;
use serde::Serialize;

use crate::deps::arcstr::ArcStr;
use crate::index::IndexOwned;
use crate::protocol::SignalKind;

/// Which side of a producer/consumer pair a signal belongs to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub enum Side {
    Producer,
    Consumer,
}

/// A signal of one port element, named by its wire.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
pub struct SignalRef {
    pub side: Side,
    pub kind: SignalKind,
    pub wire: ArcStr,
    pub width: usize,
}

/// A contiguous range of bits, `start..start + len`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
pub struct BitRange {
    pub start: usize,
    pub len: usize,
}

impl BitRange {
    #[inline]
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

impl From<Range<usize>> for BitRange {
    fn from(value: Range<usize>) -> Self {
        Self::new(value.start, value.end.saturating_sub(value.start))
    }
}

impl Display for BitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.len == 1 {
            write!(f, "[{}]", self.start)
        } else {
            write!(f, "[{}:{}]", self.end() - 1, self.start)
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub enum Expr {
    Signal(SignalRef),
    Slice {
        expr: Box<Expr>,
        range: BitRange,
    },
    Literal(BitVec),
    /// Concatenation in MSB order: the first part holds the most significant bits.
    Concat(Vec<Expr>),
    /// The inner expression repeated `times` times.
    Replicate {
        expr: Box<Expr>,
        times: usize,
    },
    /// A single bit, set if any bit of the inner expression is set.
    OrReduce(Box<Expr>),
    /// Subtraction modulo `2^width`.
    Sub {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        width: usize,
    },
    /// Pads the inner expression with zeros on its most significant side.
    ZeroExtend {
        expr: Box<Expr>,
        width: usize,
    },
    /// Maps input code `i` to output code `table[i]`.
    Remap {
        expr: Box<Expr>,
        table: Vec<usize>,
        width: usize,
    },
}

/// Builds a `width` bit vector holding `value`, truncated if necessary.
pub fn bits_from_value(mut value: usize, width: usize) -> BitVec {
    let mut bits = BitVec::with_capacity(width);
    for _ in 0..width {
        bits.push(value & 1 != 0);
        value >>= 1;
    }
    bits
}

/// Interprets a bit slice as an unsigned integer, ignoring bits beyond `usize`.
pub fn value_from_bits(bits: &BitSlice) -> usize {
    bits.iter()
        .by_vals()
        .take(usize::BITS as usize)
        .enumerate()
        .fold(0, |acc, (i, bit)| acc | (usize::from(bit) << i))
}

impl Expr {
    #[inline]
    pub fn signal(signal: SignalRef) -> Self {
        Self::Signal(signal)
    }

    #[inline]
    pub fn constant(value: usize, width: usize) -> Self {
        Self::Literal(bits_from_value(value, width))
    }

    #[inline]
    pub fn ones(width: usize) -> Self {
        Self::Literal(bitvec![1; width])
    }

    #[inline]
    pub fn zeros(width: usize) -> Self {
        Self::Literal(bitvec![0; width])
    }

    /// Concatenates `parts` (most significant first), flattening nested concatenations.
    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Self::Concat(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(Self::Concat(Vec::new()))
        } else {
            Self::Concat(flat)
        }
    }

    pub fn replicate(self, times: usize) -> Self {
        if times == 1 {
            self
        } else {
            Self::Replicate {
                expr: Box::new(self),
                times,
            }
        }
    }

    pub fn or_reduce(self) -> Self {
        if self.width() == 1 {
            self
        } else {
            Self::OrReduce(Box::new(self))
        }
    }

    pub fn zero_extend(self, width: usize) -> Self {
        if self.width() >= width {
            self
        } else {
            Self::ZeroExtend {
                expr: Box::new(self),
                width,
            }
        }
    }

    pub fn sub(self, rhs: Expr, width: usize) -> Self {
        Self::Sub {
            lhs: Box::new(self),
            rhs: Box::new(rhs),
            width,
        }
    }

    pub fn remap(self, table: Vec<usize>, width: usize) -> Self {
        Self::Remap {
            expr: Box::new(self),
            table,
            width,
        }
    }

    /// The number of bits the expression produces.
    pub fn width(&self) -> usize {
        match self {
            Self::Signal(s) => s.width,
            Self::Slice { range, .. } => range.len,
            Self::Literal(bits) => bits.len(),
            Self::Concat(parts) => parts.iter().map(Expr::width).sum(),
            Self::Replicate { expr, times } => expr.width() * times,
            Self::OrReduce(_) => 1,
            Self::Sub { width, .. }
            | Self::ZeroExtend { width, .. }
            | Self::Remap { width, .. } => *width,
        }
    }

    /// The signals the expression reads.
    pub fn signals(&self) -> Vec<&SignalRef> {
        let mut out = Vec::new();
        self.collect_signals(&mut out);
        out
    }

    fn collect_signals<'a>(&'a self, out: &mut Vec<&'a SignalRef>) {
        match self {
            Self::Signal(s) => out.push(s),
            Self::Literal(_) => {}
            Self::Concat(parts) => parts.iter().for_each(|p| p.collect_signals(out)),
            Self::Sub { lhs, rhs, .. } => {
                lhs.collect_signals(out);
                rhs.collect_signals(out);
            }
            Self::Slice { expr, .. }
            | Self::Replicate { expr, .. }
            | Self::OrReduce(expr)
            | Self::ZeroExtend { expr, .. }
            | Self::Remap { expr, .. } => expr.collect_signals(out),
        }
    }

    /// Evaluates the expression, reading signal values through `lookup`.
    ///
    /// Signal values are truncated or zero-padded to the declared signal width.
    pub fn eval<F>(&self, lookup: &F) -> BitVec
    where
        F: Fn(&SignalRef) -> BitVec,
    {
        match self {
            Self::Signal(s) => {
                let mut bits = lookup(s);
                bits.resize(s.width, false);
                bits
            }
            Self::Slice { expr, range } => {
                let mut bits = expr.eval(lookup);
                bits.resize(std::cmp::max(bits.len(), range.end()), false);
                bits[range.start..range.end()].to_bitvec()
            }
            Self::Literal(bits) => bits.clone(),
            Self::Concat(parts) => {
                let mut bits = BitVec::with_capacity(self.width());
                for part in parts.iter().rev() {
                    bits.extend_from_bitslice(part.eval(lookup).as_bitslice());
                }
                bits
            }
            Self::Replicate { expr, times } => {
                let inner = expr.eval(lookup);
                let mut bits = BitVec::with_capacity(inner.len() * times);
                for _ in 0..*times {
                    bits.extend_from_bitslice(inner.as_bitslice());
                }
                bits
            }
            Self::OrReduce(expr) => BitVec::repeat(expr.eval(lookup).any(), 1),
            Self::Sub { lhs, rhs, width } => {
                let lhs = value_from_bits(&lhs.eval(lookup));
                let rhs = value_from_bits(&rhs.eval(lookup));
                bits_from_value(lhs.wrapping_sub(rhs), *width)
            }
            Self::ZeroExtend { expr, width } => {
                let mut bits = expr.eval(lookup);
                bits.resize(*width, false);
                bits
            }
            Self::Remap { expr, table, width } => {
                let code = value_from_bits(&expr.eval(lookup));
                bits_from_value(table.get(code).copied().unwrap_or(0), *width)
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(s) => write!(f, "{}", s.wire),
            Self::Slice { expr, range } => write!(f, "{expr}{range}"),
            Self::Literal(bits) => {
                if bits.len() <= usize::BITS as usize {
                    write!(f, "{}'d{}", bits.len(), value_from_bits(bits))
                } else {
                    write!(f, "{}'b", bits.len())?;
                    for bit in bits.iter().by_vals().rev() {
                        write!(f, "{}", usize::from(bit))?;
                    }
                    Ok(())
                }
            }
            Self::Concat(parts) => {
                write!(f, "{{")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "}}")
            }
            Self::Replicate { expr, times } => write!(f, "{{{times}{{{expr}}}}}"),
            Self::OrReduce(expr) => write!(f, "|{expr}"),
            Self::Sub { lhs, rhs, .. } => write!(f, "{lhs} - {rhs}"),
            Self::ZeroExtend { expr, width } => {
                write!(f, "{{{}'d0, {expr}}}", width - expr.width())
            }
            Self::Remap { expr, table, .. } => {
                write!(f, "remap({expr}, [")?;
                for (i, code) in table.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{code}")?;
                }
                write!(f, "])")
            }
        }
    }
}

impl IndexOwned<Range<usize>> for SignalRef {
    type Output = Expr;

    fn index(&self, index: Range<usize>) -> Self::Output {
        assert!(index.end <= self.width, "index out of bounds");
        if index.start == 0 && index.end == self.width {
            Expr::Signal(self.clone())
        } else {
            Expr::Slice {
                expr: Box::new(Expr::Signal(self.clone())),
                range: index.into(),
            }
        }
    }
}

impl IndexOwned<usize> for SignalRef {
    type Output = Expr;

    fn index(&self, index: usize) -> Self::Output {
        IndexOwned::index(self, index..index + 1)
    }
}
