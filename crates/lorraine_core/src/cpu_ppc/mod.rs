/*
    Lorraine
    https://github.com/dbalsom/lorraine

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    cpu_ppc::mod.rs

    PowerPC instruction model.

    Only the operation tag is classified ahead of time; every operand field
    is a pure bit extraction over the raw word, computed on demand and never
    cached. Variant encodings that differ by a single modifier bit (record,
    overflow-enable, absolute-address, link) share one tag; the modifier is
    read through an accessor instead.

*/

pub mod decode;

pub use decode::decode;

/// Options for conditional branch instructions, decoded from the upper bits
/// of the bo() field.
///
/// A `Dec` prefix decrements the count register; conditions mentioning
/// NotZero/Zero test the decremented CTR, and Set/Clear test the condition
/// bit selected by bi(). Some encodings are redundant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchOption {
    DecNotZeroAndClear = 0b0000,
    DecZeroAndClear = 0b0001,
    Clear = 0b0010,
    DecNotZeroAndSet = 0b0100,
    DecZeroAndSet = 0b0101,
    Set = 0b0110,
    DecNotZero = 0b1000,
    DecZero = 0b1001,
    Always = 0b1010,
    Reserved = 0b1111,
}

impl From<u32> for BranchOption {
    fn from(value: u32) -> Self {
        match value & 0xF {
            0b0000 => BranchOption::DecNotZeroAndClear,
            0b0001 => BranchOption::DecZeroAndClear,
            0b0010 => BranchOption::Clear,
            0b0100 => BranchOption::DecNotZeroAndSet,
            0b0101 => BranchOption::DecZeroAndSet,
            0b0110 => BranchOption::Set,
            0b1000 => BranchOption::DecNotZero,
            0b1001 => BranchOption::DecZero,
            0b1010 => BranchOption::Always,
            _ => BranchOption::Reserved,
        }
    }
}

/// The closed set of operations this decoder recognizes.
///
/// Naming follows the architecture mnemonics; a trailing `x` marks a tag that
/// covers the record and/or overflow-enable variant forms (`add`, `add.`,
/// `addo`, `addo.` are all `Addx` — test rc()/oe() to distinguish), and a
/// trailing underscore stands in for a trailing dot in the mnemonic.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum_macros::Display)]
#[repr(u8)]
pub enum Operation {
    #[default]
    Undefined,

    // Integer arithmetic.
    addx,
    addcx,
    addex,
    addi,
    addic,
    addic_,
    addis,
    addmex,
    addzex,
    subfx,
    subfcx,
    subfex,
    subfic,
    subfmex,
    subfzex,
    negx,
    mulli,
    mullwx,
    mulhwx,
    mulhwux,
    divwx,
    divwux,

    // Integer logic.
    andx,
    andcx,
    andi_,
    andis_,
    orx,
    orcx,
    ori,
    oris,
    xorx,
    xori,
    xoris,
    nandx,
    norx,
    eqvx,
    extsbx,
    extshx,
    cntlzwx,

    // Comparison.
    cmp,
    cmpi,
    cmpl,
    cmpli,

    /// Branch unconditional.
    /// Use li() for the displacement, aa() for absolute vs. relative
    /// addressing and lk() for link-register update.
    bx,
    /// Branch conditional; bd() supplies the displacement, bo()/bi() the
    /// condition, and aa()/lk() apply as for bx.
    bcx,
    /// Branch conditional to count register.
    bcctrx,
    /// Branch conditional to link register.
    bclrx,
    sc,
    rfi,

    // Condition register logic; crbA()/crbB()/crbD() select the bits.
    crand,
    crandc,
    creqv,
    crnand,
    crnor,
    cror,
    crorc,
    crxor,
    mcrf,

    // Rotates and shifts; sh()/mb()/me() supply shift and mask bounds.
    rlwimix,
    rlwinmx,
    rlwnmx,
    slwx,
    srawx,
    srawix,
    srwx,

    // Loads.
    lbz,
    lbzu,
    lbzux,
    lbzx,
    lha,
    lhau,
    lhaux,
    lhax,
    lhbrx,
    lhz,
    lhzu,
    lhzux,
    lhzx,
    lmw,
    lswi,
    lswx,
    lwarx,
    lwbrx,
    lwz,
    lwzu,
    lwzux,
    lwzx,

    // Stores.
    stb,
    stbu,
    stbux,
    stbx,
    sth,
    sthbrx,
    sthu,
    sthux,
    sthx,
    stmw,
    stswi,
    stswx,
    stw,
    stwbrx,
    stwcx_,
    stwu,
    stwux,
    stwx,

    // Condition/system register moves and synchronization.
    mfcr,
    mfmsr,
    mfspr,
    mftb,
    mtcrf,
    mtmsr,
    mtspr,
    mcrxr,
    sync,
    isync,
    eieio,
    tw,
    twi,

    // Cache and TLB management.
    dcbf,
    dcbst,
    dcbt,
    dcbtst,
    dcbz,
    dcbi,
    icbi,
    tlbie,
    tlbia,
    tlbsync,

    // Segment registers [32-bit only].
    mfsr,
    mfsrin,
    mtsr,
    mtsrin,
}

/// Holds a decoded instruction: the raw word, its classified operation, and
/// whether the operation requires supervisor privilege.
///
/// A value type: constructed per fetched word, consumed by the execution
/// stage, then discarded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Instruction {
    pub operation: Operation,
    pub is_supervisor: bool,
    pub opcode: u32,
}

impl Instruction {
    pub fn new(operation: Operation, opcode: u32) -> Self {
        Self {
            operation,
            is_supervisor: false,
            opcode,
        }
    }

    pub fn new_supervisor(operation: Operation, opcode: u32) -> Self {
        Self {
            operation,
            is_supervisor: true,
            opcode,
        }
    }

    // Field accessors. Naming is a compromise between the vendor manuals;
    // synonyms with identical extractions are given distinct entry points so
    // that call sites read like the architecture documentation.

    /// Immediate field used to specify an unsigned 16-bit integer.
    #[inline]
    pub fn uimm(&self) -> u16 {
        (self.opcode & 0xFFFF) as u16
    }

    /// Immediate field used to specify a signed 16-bit integer.
    #[inline]
    pub fn simm(&self) -> i16 {
        (self.opcode & 0xFFFF) as i16
    }

    /// Displacement for D-form loads and stores.
    #[inline]
    pub fn d(&self) -> i16 {
        (self.opcode & 0xFFFF) as i16
    }

    /// Conditions on which to trap.
    #[inline]
    pub fn to(&self) -> u32 {
        (self.opcode >> 21) & 0x1F
    }

    /// Register source A or destination.
    #[inline]
    pub fn r_a(&self) -> u32 {
        (self.opcode >> 16) & 0x1F
    }

    /// Register source B.
    #[inline]
    pub fn r_b(&self) -> u32 {
        (self.opcode >> 11) & 0x1F
    }

    /// Register destination.
    #[inline]
    pub fn r_d(&self) -> u32 {
        (self.opcode >> 21) & 0x1F
    }

    /// Register source.
    #[inline]
    pub fn r_s(&self) -> u32 {
        (self.opcode >> 21) & 0x1F
    }

    /// Branch options as encoded, i.e. options plus the prediction hint bit.
    #[inline]
    pub fn bo(&self) -> u32 {
        (self.opcode >> 21) & 0x1F
    }

    /// Just the branch options, with the prediction hint severed.
    #[inline]
    pub fn branch_options(&self) -> BranchOption {
        BranchOption::from((self.opcode >> 22) & 0xF)
    }

    /// The branch prediction hint; 0 => expect untaken, non-0 => expect taken.
    #[inline]
    pub fn branch_prediction_hint(&self) -> u32 {
        self.opcode & 0x20_0000
    }

    /// Source condition register bit for branch conditionals.
    #[inline]
    pub fn bi(&self) -> u32 {
        (self.opcode >> 16) & 0x1F
    }

    /// Branch displacement, sign extended.
    #[inline]
    pub fn bd(&self) -> i16 {
        (self.opcode & 0xFFFC) as i16
    }

    /// First 1 bit of the mask for rotate operations.
    #[inline]
    pub fn mb(&self) -> u32 {
        (self.opcode >> 6) & 0x1F
    }

    /// Last 1 bit of the mask for rotate operations.
    #[inline]
    pub fn me(&self) -> u32 {
        (self.opcode >> 1) & 0x1F
    }

    /// Condition register source bit A.
    #[inline]
    pub fn crb_a(&self) -> u32 {
        (self.opcode >> 16) & 0x1F
    }

    /// Condition register source bit B.
    #[inline]
    pub fn crb_b(&self) -> u32 {
        (self.opcode >> 11) & 0x1F
    }

    /// Condition register destination bit.
    #[inline]
    pub fn crb_d(&self) -> u32 {
        (self.opcode >> 21) & 0x1F
    }

    /// Condition register destination field.
    #[inline]
    pub fn crf_d(&self) -> u32 {
        (self.opcode >> 23) & 0x07
    }

    /// Condition register source field.
    #[inline]
    pub fn crf_s(&self) -> u32 {
        (self.opcode >> 18) & 0x07
    }

    /// Mask identifying fields to be updated by mtcrf.
    #[inline]
    pub fn crm(&self) -> u32 {
        (self.opcode >> 12) & 0xFF
    }

    /// Number of bytes to move in an immediate string load or store.
    #[inline]
    pub fn nb(&self) -> u32 {
        (self.opcode >> 11) & 0x1F
    }

    /// A shift amount.
    #[inline]
    pub fn sh(&self) -> u32 {
        (self.opcode >> 11) & 0x1F
    }

    /// One of the 16 segment registers.
    #[inline]
    pub fn sr(&self) -> u32 {
        (self.opcode >> 16) & 0xF
    }

    /// Special-purpose register selector, with its swapped halves restored
    /// to documentation order.
    #[inline]
    pub fn spr(&self) -> u32 {
        let raw = (self.opcode >> 11) & 0x3FF;
        ((raw & 0x1F) << 5) | (raw >> 5)
    }

    /// The 24-bit branch displacement, sign extended.
    #[inline]
    pub fn li(&self) -> i32 {
        const EXTENSIONS: [u32; 2] = [0x0000_0000, 0xFC00_0000];
        let value = (self.opcode & 0x03FF_FFFC) | EXTENSIONS[((self.opcode >> 25) & 1) as usize];
        value as i32
    }

    /// Absolute address bit; 0 or non-0.
    #[inline]
    pub fn aa(&self) -> u32 {
        self.opcode & 0x02
    }

    /// Link bit; 0 or non-0.
    #[inline]
    pub fn lk(&self) -> u32 {
        self.opcode & 0x01
    }

    /// Record bit; 0 or non-0.
    #[inline]
    pub fn rc(&self) -> u32 {
        self.opcode & 0x01
    }

    /// 32- vs. 64-bit comparison selector; 0 or non-0.
    #[inline]
    pub fn l(&self) -> u32 {
        self.opcode & 0x20_0000
    }

    /// Overflow-enable bit; 0 or non-0.
    #[inline]
    pub fn oe(&self) -> u32 {
        self.opcode & 0x400
    }
}
