use std::{fmt, ops::Range, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

/// Insertion-ordered map used for labels, functions and storage compounds.
pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

pub fn fx_map<K, V>() -> FxMap<K, V> {
    IndexMap::with_hasher(FxBuildHasher::default())
}

/// Score holder that owns every register and scratch counter.
pub const HOLDER: &str = "ELVM";

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn dummy() -> Self {
        Span {
            offs: SrcOffset(0),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// The machine registers. Each one lives in its own scoreboard objective.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Register {
    A = 0,
    B,
    C,
    D,
    /// Base pointer
    Bp,
    /// Stack pointer
    Sp,
    /// Program counter. Signed; `-1` means halted.
    Pc,
}

impl Register {
    pub const ALL: [Register; 7] = [
        Register::A,
        Register::B,
        Register::C,
        Register::D,
        Register::Bp,
        Register::Sp,
        Register::Pc,
    ];

    /// Scoreboard objective holding this register.
    pub const fn objective(self) -> &'static str {
        match self {
            Register::A => "elvm_a",
            Register::B => "elvm_b",
            Register::C => "elvm_c",
            Register::D => "elvm_d",
            Register::Bp => "elvm_bp",
            Register::Sp => "elvm_sp",
            Register::Pc => "elvm_pc",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::B => "B",
            Register::C => "C",
            Register::D => "D",
            Register::Bp => "BP",
            Register::Sp => "SP",
            Register::Pc => "PC",
        }
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::ALL
            .into_iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counters private to the generated code.
///
/// Declared once by the initializer and never reset afterwards; the memory
/// routines reuse them in strictly nested order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Scratch {
    /// Comparison result
    Tmp,
    MemAddr,
    MemVal,
    MemRes,
    MemIdx,
    /// Address of the record under the chain cursor
    TestAddr,
    /// Hash multiplier
    MemPhi,
    /// Bucket count
    MemLen,
    /// Word modulus
    UintMax,
    /// `i32::MIN`, added to bias operands of unsigned comparisons
    SignBit,
    /// Biased comparison operands
    CmpLhs,
    CmpRhs,
}

impl Scratch {
    pub const ALL: [Scratch; 12] = [
        Scratch::Tmp,
        Scratch::MemAddr,
        Scratch::MemVal,
        Scratch::MemRes,
        Scratch::MemIdx,
        Scratch::TestAddr,
        Scratch::MemPhi,
        Scratch::MemLen,
        Scratch::UintMax,
        Scratch::SignBit,
        Scratch::CmpLhs,
        Scratch::CmpRhs,
    ];

    pub const fn objective(self) -> &'static str {
        match self {
            Scratch::Tmp => "elvm_tmp",
            Scratch::MemAddr => "elvm_mem_addr",
            Scratch::MemVal => "elvm_mem_val",
            Scratch::MemRes => "elvm_mem_res",
            Scratch::MemIdx => "elvm_mem_idx",
            Scratch::TestAddr => "elvm_test_addr",
            Scratch::MemPhi => "elvm_mem_phi",
            Scratch::MemLen => "elvm_mem_len",
            Scratch::UintMax => "elvm_uint_max",
            Scratch::SignBit => "elvm_sign_bit",
            Scratch::CmpLhs => "elvm_cmp_lhs",
            Scratch::CmpRhs => "elvm_cmp_rhs",
        }
    }
}
