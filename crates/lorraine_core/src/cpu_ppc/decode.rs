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

    cpu_ppc::decode.rs

    Instruction classification.

    Classifies a raw 32-bit word into exactly one operation tag via the
    primary opcode group (bits 26-31) and, for the two extended groups, the
    extended-opcode field. Arithmetic forms carrying an overflow-enable bit
    use a 9-bit extended opcode; everything else in group 31 uses 10 bits,
    so unmatched 10-bit values fall through to a second, 9-bit match.

    Encodings outside the recognized set classify as Operation::Undefined.
    That is not an error: callers decide whether an undefined word traps.

*/

use crate::cpu_ppc::{Instruction, Operation};

/// Decode `word` into an [Instruction]. Classification happens exactly once,
/// here; operand fields remain lazy accessors on the returned value.
pub fn decode(word: u32) -> Instruction {
    use Operation::*;

    let primary = word >> 26;

    let operation = match primary {
        3 => twi,
        7 => mulli,
        8 => subfic,
        10 => cmpli,
        11 => cmpi,
        12 => addic,
        13 => addic_,
        14 => addi,
        15 => addis,
        16 => bcx,
        17 => {
            // System call has a single valid form.
            if word & 2 != 0 {
                sc
            }
            else {
                Undefined
            }
        }
        18 => bx,
        19 => decode_group19(word),
        20 => rlwimix,
        21 => rlwinmx,
        23 => rlwnmx,
        24 => ori,
        25 => oris,
        26 => xori,
        27 => xoris,
        28 => andi_,
        29 => andis_,
        31 => decode_group31(word),
        32 => lwz,
        33 => lwzu,
        34 => lbz,
        35 => lbzu,
        36 => stw,
        37 => stwu,
        38 => stb,
        39 => stbu,
        40 => lhz,
        41 => lhzu,
        42 => lha,
        43 => lhau,
        44 => sth,
        45 => sthu,
        46 => lmw,
        47 => stmw,
        _ => Undefined,
    };

    if is_supervisor(operation) {
        Instruction::new_supervisor(operation, word)
    }
    else {
        Instruction::new(operation, word)
    }
}

fn decode_group19(word: u32) -> Operation {
    use Operation::*;

    match (word >> 1) & 0x3FF {
        0 => mcrf,
        16 => bclrx,
        33 => crnor,
        50 => rfi,
        129 => crandc,
        150 => isync,
        193 => crxor,
        225 => crnand,
        257 => crand,
        289 => creqv,
        417 => crorc,
        449 => cror,
        528 => bcctrx,
        _ => Undefined,
    }
}

fn decode_group31(word: u32) -> Operation {
    use Operation::*;

    // X-form: full 10-bit extended opcode.
    let op = match (word >> 1) & 0x3FF {
        0 => cmp,
        4 => tw,
        19 => mfcr,
        20 => lwarx,
        23 => lwzx,
        24 => slwx,
        26 => cntlzwx,
        28 => andx,
        32 => cmpl,
        54 => dcbst,
        55 => lwzux,
        60 => andcx,
        83 => mfmsr,
        86 => dcbf,
        87 => lbzx,
        119 => lbzux,
        124 => norx,
        144 => mtcrf,
        146 => mtmsr,
        150 => stwcx_,
        151 => stwx,
        183 => stwux,
        210 => mtsr,
        215 => stbx,
        242 => mtsrin,
        246 => dcbtst,
        247 => stbux,
        278 => dcbt,
        279 => lhzx,
        284 => eqvx,
        306 => tlbie,
        311 => lhzux,
        316 => xorx,
        339 => mfspr,
        343 => lhax,
        370 => tlbia,
        371 => mftb,
        375 => lhaux,
        407 => sthx,
        412 => orcx,
        439 => sthux,
        444 => orx,
        467 => mtspr,
        470 => dcbi,
        476 => nandx,
        512 => mcrxr,
        533 => lswx,
        534 => lwbrx,
        536 => srwx,
        566 => tlbsync,
        595 => mfsr,
        597 => lswi,
        598 => sync,
        659 => mfsrin,
        661 => stswx,
        662 => stwbrx,
        725 => stswi,
        790 => lhbrx,
        792 => srawx,
        824 => srawix,
        854 => eieio,
        918 => sthbrx,
        922 => extshx,
        954 => extsbx,
        982 => icbi,
        1014 => dcbz,
        _ => Undefined,
    };

    if op != Undefined {
        return op;
    }

    // XO-form: bit 9 of the extended field is the overflow-enable modifier,
    // so these match on 9 bits only.
    match (word >> 1) & 0x1FF {
        8 => subfcx,
        10 => addcx,
        11 => mulhwux,
        40 => subfx,
        75 => mulhwx,
        104 => negx,
        136 => subfex,
        138 => addex,
        200 => subfzex,
        202 => addzex,
        232 => subfmex,
        234 => addmex,
        235 => mullwx,
        266 => addx,
        459 => divwux,
        491 => divwx,
        _ => Undefined,
    }
}

fn is_supervisor(operation: Operation) -> bool {
    use Operation::*;

    matches!(
        operation,
        rfi | mfmsr | mtmsr | dcbi | tlbie | tlbia | tlbsync | mfsr | mfsrin | mtsr | mtsrin
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_ppc::Operation;

    fn xform(xo: u32) -> u32 {
        (31 << 26) | (xo << 1)
    }

    #[test]
    fn decode_is_deterministic() {
        let words = [
            (14u32 << 26) | 0x1234,
            xform(266),
            (18 << 26) | 0x100,
            0xFFFF_FFFF,
            0x0000_0000,
        ];
        for word in words {
            let a = decode(word);
            let b = decode(word);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn primary_group_classification() {
        assert_eq!(decode((32 << 26) | 0x10).operation, Operation::lwz);
        assert_eq!(decode((36 << 26) | 0x10).operation, Operation::stw);
        assert_eq!(decode((46 << 26) | 0x10).operation, Operation::lmw);
        assert_eq!(decode(21 << 26).operation, Operation::rlwinmx);
    }

    #[test]
    fn extended_group_classification() {
        assert_eq!(decode(xform(23)).operation, Operation::lwzx);
        assert_eq!(decode(xform(151)).operation, Operation::stwx);
        assert_eq!(decode(xform(598)).operation, Operation::sync);
        assert_eq!(decode((19 << 26) | (16 << 1)).operation, Operation::bclrx);
        assert_eq!(decode((19 << 26) | (528 << 1)).operation, Operation::bcctrx);
    }

    #[test]
    fn oe_forms_fold_into_nine_bit_match() {
        // subf and subfo share a tag; the OE bit lives at extended bit 9.
        let subf = xform(40);
        let subfo = subf | (1 << 10);
        assert_eq!(decode(subf).operation, Operation::subfx);
        assert_eq!(decode(subfo).operation, Operation::subfx);
        assert_ne!(decode(subfo).oe(), 0);
    }

    #[test]
    fn undefined_is_benign_sentinel() {
        // An unallocated primary opcode.
        let i = decode(1 << 26);
        assert_eq!(i.operation, Operation::Undefined);
        assert!(!i.is_supervisor);

        // An unallocated extended opcode in group 31.
        let j = decode(xform(1000));
        assert_eq!(j.operation, Operation::Undefined);

        // Fields still extract deterministically from an undefined word.
        assert_eq!(j.r_d(), decode(xform(1000)).r_d());
    }

    #[test]
    fn supervisor_flag() {
        assert!(decode(xform(146)).is_supervisor); // mtmsr
        assert!(decode(xform(83)).is_supervisor); // mfmsr
        assert!(decode((19 << 26) | (50 << 1)).is_supervisor); // rfi
        assert!(!decode(xform(266)).is_supervisor); // add
        assert!(!decode((14 << 26) | 1).is_supervisor); // addi
    }

    #[test]
    fn sc_requires_its_reserved_bit() {
        assert_eq!(decode((17 << 26) | 2).operation, Operation::sc);
        assert_eq!(decode(17 << 26).operation, Operation::Undefined);
    }
}
