// Opcode decoder (spec.md 4.4). The source's nested switch-on-masked-bits
// is "organizational, not algorithmic" per spec.md 9: preserved here as a
// flat sequence of `(mask, value)` checks processed in declared order, most
// specific (full 16-bit match) first, down to the coarsest family masks.
// Encoding masks are the AVR architecture's; none are invented here.

use crate::instructions::*;
use crate::memory::PointerReg;

fn rd5(word: u16) -> u8 {
    ((word >> 4) & 0x1f) as u8
}

fn rr5(word: u16) -> u8 {
    (((word >> 5) & 0x10) | (word & 0x0f)) as u8
}

fn rd4_hi(word: u16) -> u8 {
    (((word >> 4) & 0x0f) + 16) as u8
}

fn k8(word: u16) -> u8 {
    (((word >> 4) & 0xf0) | (word & 0x0f)) as u8
}

fn io_addr6(word: u16) -> u8 {
    (((word >> 5) & 0x30) | (word & 0x0f)) as u8
}

fn ldd_q(word: u16) -> u8 {
    let q5 = (word >> 13) & 1;
    let q4 = (word >> 11) & 1;
    let q3 = (word >> 10) & 1;
    let q2 = (word >> 2) & 1;
    let q1 = (word >> 1) & 1;
    let q0 = word & 1;
    ((q5 << 5) | (q4 << 4) | (q3 << 3) | (q2 << 2) | (q1 << 1) | q0) as u8
}

fn sign_extend7(c: u8) -> i8 {
    if c > 63 {
        (c as i16 - 128) as i8
    } else {
        c as i8
    }
}

fn sign_extend12(k: u16) -> i16 {
    if k > 2047 {
        (k as i32 - 4096) as i16
    } else {
        k as i16
    }
}

/// `word` is the first 16-bit instruction word; `ext` is the following word
/// for the four 32-bit encodings (LDS/STS/JMP/CALL), ignored otherwise.
pub fn decode(word: u16, ext: u16) -> Option<Instruction> {
    // Fixed-bit-pattern (no-operand) instructions, highest specificity.
    match word {
        0x0000 => return Some(Instruction::Nop),
        0x9598 => return Some(Instruction::Break),
        0x9508 => return Some(Instruction::Ret),
        0x9518 => return Some(Instruction::Reti),
        0x9409 => return Some(Instruction::Ijmp),
        0x9419 => return Some(Instruction::Eijmp),
        0x9509 => return Some(Instruction::Icall),
        0x9519 => return Some(Instruction::Eicall),
        0x95c8 => return Some(Instruction::Lpm { d: 0, mode: LpmMode::R0Z }),
        0x95d8 => return Some(Instruction::Elpm { d: 0, mode: LpmMode::R0Z }),
        0x95e8 => return Some(Instruction::Spm { post_inc: false }),
        0x95f8 => return Some(Instruction::Spm { post_inc: true }),
        _ => {}
    }

    // 32-bit instructions: LDS/STS/JMP/CALL.
    match word & 0xfe0f {
        0x9000 => return Some(Instruction::Lds { d: rd5(word), addr: ext }),
        0x9200 => return Some(Instruction::Sts { addr: ext, r: rd5(word) }),
        _ => {}
    }
    match word & 0xfe0e {
        0x940c => return Some(Instruction::Jmp { k: jmp_call_k(word, ext) }),
        0x940e => return Some(Instruction::Call { k: jmp_call_k(word, ext) }),
        _ => {}
    }

    // Specificity: full-byte-prefix families (mask 0xff00/0xff0f/0xff8x).
    match word & 0xff00 {
        0x0100 => {
            let d = ((word >> 4) & 0x0f) * 2;
            let r = (word & 0x0f) * 2;
            return Some(Instruction::Movw { d: d as u8, r: r as u8 });
        }
        0x0200 => {
            let d = ((word >> 4) & 0x0f) as u8 + 16;
            let r = (word & 0x0f) as u8 + 16;
            return Some(Instruction::WideMul { op: WideMulOp::Muls, d, r });
        }
        0x9600 => {
            let pair = ((word >> 4) & 0x03) as u8;
            return Some(Instruction::Adiw { d: 24 + pair * 2, k: adiw_k(word) });
        }
        0x9700 => {
            let pair = ((word >> 4) & 0x03) as u8;
            return Some(Instruction::Sbiw { d: 24 + pair * 2, k: adiw_k(word) });
        }
        0x9800 => return Some(Instruction::Cbi { a: io_addr5(word), b: (word & 0x07) as u8 }),
        0x9900 => return Some(Instruction::SbisSbic { a: io_addr5(word), b: (word & 0x07) as u8, set: false }),
        0x9a00 => return Some(Instruction::Sbi { a: io_addr5(word), b: (word & 0x07) as u8 }),
        0x9b00 => return Some(Instruction::SbisSbic { a: io_addr5(word), b: (word & 0x07) as u8, set: true }),
        _ => {}
    }

    match word & 0xff88 {
        0x0300 => return Some(Instruction::WideMul { op: WideMulOp::Mulsu, d: rd3_hi(word), r: rr3_hi(word) }),
        0x0308 => return Some(Instruction::WideMul { op: WideMulOp::Fmul, d: rd3_hi(word), r: rr3_hi(word) }),
        0x0380 => return Some(Instruction::WideMul { op: WideMulOp::Fmuls, d: rd3_hi(word), r: rr3_hi(word) }),
        0x0388 => return Some(Instruction::WideMul { op: WideMulOp::Fmulsu, d: rd3_hi(word), r: rr3_hi(word) }),
        _ => {}
    }

    match word & 0xff0f {
        0x9408 => return Some(Instruction::SregBit { s: ((word >> 4) & 0x07) as u8, set: true }),
        0x9488 => return Some(Instruction::SregBit { s: ((word >> 4) & 0x07) as u8, set: false }),
        _ => {}
    }

    if word & 0xff0f == 0xef0f {
        return Some(Instruction::Ser { d: rd4_hi(word) });
    }

    // LDD/STD/LD/ST displacement family (Y+q, Z+q): bits 15,14,12 fixed.
    if word & 0xd000 == 0x8000 {
        let is_store = (word >> 9) & 1 != 0;
        let is_y = (word >> 3) & 1 != 0;
        let ptr = if is_y { PointerReg::Y } else { PointerReg::Z };
        let q = ldd_q(word);
        let reg = rd5(word);
        return Some(if is_store {
            Instruction::Std { r: reg, ptr, q }
        } else {
            Instruction::Ldd { d: reg, ptr, q }
        });
    }

    // Single-operand opcodes in the 0x900x/0x920x/0x94xx block. 0x9000 and
    // 0x9200 (LDS/STS) were already claimed by the 32-bit match above.
    match word & 0xfe0f {
        0x9001 => return Some(Instruction::Ld { d: rd5(word), ptr: PointerReg::Z, mode: PtrMode::PostInc }),
        0x9002 => return Some(Instruction::Ld { d: rd5(word), ptr: PointerReg::Z, mode: PtrMode::PreDec }),
        0x9004 => return Some(Instruction::Lpm { d: rd5(word), mode: LpmMode::Z }),
        0x9005 => return Some(Instruction::Lpm { d: rd5(word), mode: LpmMode::ZPostInc }),
        0x9006 => return Some(Instruction::Elpm { d: rd5(word), mode: LpmMode::Z }),
        0x9007 => return Some(Instruction::Elpm { d: rd5(word), mode: LpmMode::ZPostInc }),
        0x9009 => return Some(Instruction::Ld { d: rd5(word), ptr: PointerReg::Y, mode: PtrMode::PostInc }),
        0x900a => return Some(Instruction::Ld { d: rd5(word), ptr: PointerReg::Y, mode: PtrMode::PreDec }),
        0x900c => return Some(Instruction::Ld { d: rd5(word), ptr: PointerReg::X, mode: PtrMode::Plain }),
        0x900d => return Some(Instruction::Ld { d: rd5(word), ptr: PointerReg::X, mode: PtrMode::PostInc }),
        0x900e => return Some(Instruction::Ld { d: rd5(word), ptr: PointerReg::X, mode: PtrMode::PreDec }),
        0x900f => return Some(Instruction::Pop { d: rd5(word) }),
        0x9201 => return Some(Instruction::St { r: rd5(word), ptr: PointerReg::Z, mode: PtrMode::PostInc }),
        0x9202 => return Some(Instruction::St { r: rd5(word), ptr: PointerReg::Z, mode: PtrMode::PreDec }),
        0x9204 => return Some(Instruction::XchFamily { op: XchOp::Xch, d: rd5(word) }),
        0x9205 => return Some(Instruction::XchFamily { op: XchOp::Las, d: rd5(word) }),
        0x9206 => return Some(Instruction::XchFamily { op: XchOp::Lac, d: rd5(word) }),
        0x9207 => return Some(Instruction::XchFamily { op: XchOp::Lat, d: rd5(word) }),
        0x9209 => return Some(Instruction::St { r: rd5(word), ptr: PointerReg::Y, mode: PtrMode::PostInc }),
        0x920a => return Some(Instruction::St { r: rd5(word), ptr: PointerReg::Y, mode: PtrMode::PreDec }),
        0x920c => return Some(Instruction::St { r: rd5(word), ptr: PointerReg::X, mode: PtrMode::Plain }),
        0x920d => return Some(Instruction::St { r: rd5(word), ptr: PointerReg::X, mode: PtrMode::PostInc }),
        0x920e => return Some(Instruction::St { r: rd5(word), ptr: PointerReg::X, mode: PtrMode::PreDec }),
        0x920f => return Some(Instruction::Push { r: rd5(word) }),
        0x9400 => return Some(Instruction::Unary { op: UnaryOp::Com, d: rd5(word) }),
        0x9401 => return Some(Instruction::Unary { op: UnaryOp::Neg, d: rd5(word) }),
        0x9402 => return Some(Instruction::Unary { op: UnaryOp::Swap, d: rd5(word) }),
        0x9403 => return Some(Instruction::Unary { op: UnaryOp::Inc, d: rd5(word) }),
        0x9405 => return Some(Instruction::Unary { op: UnaryOp::Asr, d: rd5(word) }),
        0x9406 => return Some(Instruction::Unary { op: UnaryOp::Lsr, d: rd5(word) }),
        0x9407 => return Some(Instruction::Unary { op: UnaryOp::Ror, d: rd5(word) }),
        0x940a => return Some(Instruction::Unary { op: UnaryOp::Dec, d: rd5(word) }),
        _ => {}
    }

    // IN/OUT.
    match word & 0xf800 {
        0xb000 => return Some(Instruction::In { d: rd5(word), a: io_addr6(word) }),
        0xb800 => return Some(Instruction::Out { a: io_addr6(word), r: rd5(word) }),
        _ => {}
    }

    // BLD/BST/SBRC/SBRS: mask 0xfe08.
    match word & 0xfe08 {
        0xf800 => return Some(Instruction::Bld { d: rd5(word), b: (word & 0x07) as u8 }),
        0xfa00 => return Some(Instruction::Bst { d: rd5(word), b: (word & 0x07) as u8 }),
        0xfc00 => return Some(Instruction::SbrcSbrs { d: rd5(word), b: (word & 0x07) as u8, set: false }),
        0xfe00 => return Some(Instruction::SbrcSbrs { d: rd5(word), b: (word & 0x07) as u8, set: true }),
        _ => {}
    }

    // BRBS/BRBC.
    match word & 0xfc00 {
        0xf000 => {
            let c = ((word >> 3) & 0x7f) as u8;
            return Some(Instruction::Brbs { s: (word & 0x07) as u8, k: sign_extend7(c) });
        }
        0xf400 => {
            let c = ((word >> 3) & 0x7f) as u8;
            return Some(Instruction::Brbc { s: (word & 0x07) as u8, k: sign_extend7(c) });
        }
        _ => {}
    }

    // Two-register-operand ALU family, mask 0xfc00.
    match word & 0xfc00 {
        0x0400 => return Some(Instruction::Alu { op: AluOp::Cpc, d: rd5(word), r: rr5(word) }),
        0x0800 => return Some(Instruction::Alu { op: AluOp::Sbc, d: rd5(word), r: rr5(word) }),
        0x0c00 => return Some(Instruction::Alu { op: AluOp::Add, d: rd5(word), r: rr5(word) }),
        0x1000 => return Some(Instruction::Cpse { d: rd5(word), r: rr5(word) }),
        0x1400 => return Some(Instruction::Alu { op: AluOp::Cp, d: rd5(word), r: rr5(word) }),
        0x1800 => return Some(Instruction::Alu { op: AluOp::Sub, d: rd5(word), r: rr5(word) }),
        0x1c00 => return Some(Instruction::Alu { op: AluOp::Adc, d: rd5(word), r: rr5(word) }),
        0x2000 => return Some(Instruction::Alu { op: AluOp::And, d: rd5(word), r: rr5(word) }),
        0x2400 => return Some(Instruction::Alu { op: AluOp::Eor, d: rd5(word), r: rr5(word) }),
        0x2800 => return Some(Instruction::Alu { op: AluOp::Or, d: rd5(word), r: rr5(word) }),
        0x2c00 => return Some(Instruction::Alu { op: AluOp::Mov, d: rd5(word), r: rr5(word) }),
        0x9c00 => return Some(Instruction::Mul { d: rd5(word), r: rr5(word) }),
        _ => {}
    }

    // Immediate family, mask 0xf000.
    match word & 0xf000 {
        0x3000 => return Some(Instruction::AluImm { op: AluImmOp::Cpi, d: rd4_hi(word), k: k8(word) }),
        0x4000 => return Some(Instruction::AluImm { op: AluImmOp::Sbci, d: rd4_hi(word), k: k8(word) }),
        0x5000 => return Some(Instruction::AluImm { op: AluImmOp::Subi, d: rd4_hi(word), k: k8(word) }),
        0x6000 => return Some(Instruction::AluImm { op: AluImmOp::Ori, d: rd4_hi(word), k: k8(word) }),
        0x7000 => return Some(Instruction::AluImm { op: AluImmOp::Andi, d: rd4_hi(word), k: k8(word) }),
        0xe000 => return Some(Instruction::AluImm { op: AluImmOp::Ldi, d: rd4_hi(word), k: k8(word) }),
        0xc000 => return Some(Instruction::Rjmp { k: sign_extend12(word & 0x0fff) }),
        0xd000 => return Some(Instruction::Rcall { k: sign_extend12(word & 0x0fff) }),
        _ => {}
    }

    None
}

fn io_addr5(word: u16) -> u8 {
    ((word >> 3) & 0x1f) as u8
}

fn adiw_k(word: u16) -> u8 {
    (((word >> 2) & 0x30) | (word & 0x0f)) as u8
}

fn rd3_hi(word: u16) -> u8 {
    (((word >> 4) & 0x07) + 16) as u8
}

fn rr3_hi(word: u16) -> u8 {
    ((word & 0x07) + 16) as u8
}

fn jmp_call_k(word: u16, ext: u16) -> u32 {
    let hi = ((word >> 4) & 0x1f) as u32;
    let lo = (word & 1) as u32;
    ((hi << 17) | (lo << 16) | ext as u32) * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_add_r16_r17() {
        // Scenario A.
        let inst = decode(0x0f01, 0).unwrap();
        assert_eq!(inst, Instruction::Alu { op: AluOp::Add, d: 16, r: 17 });
    }

    #[test]
    fn decodes_cpc_r24_r25() {
        // Scenario B.
        let inst = decode(0x0508, 0).unwrap();
        assert_eq!(inst, Instruction::Alu { op: AluOp::Cpc, d: 24, r: 25 });
    }

    #[test]
    fn decodes_rjmp_minus_one() {
        // Scenario C.
        let inst = decode(0xcfff, 0).unwrap();
        assert_eq!(inst, Instruction::Rjmp { k: -1 });
    }

    #[test]
    fn decodes_call_and_ret() {
        // Scenario D.
        let call = decode(0x940e, 0x0010).unwrap();
        assert_eq!(call, Instruction::Call { k: 0x20 });
        let ret = decode(0x9508, 0).unwrap();
        assert_eq!(ret, Instruction::Ret);
    }

    #[test]
    fn decodes_lpm_post_increment() {
        // Scenario F.
        let inst = decode(0x9005, 0).unwrap();
        assert_eq!(inst, Instruction::Lpm { d: 0, mode: LpmMode::ZPostInc });
    }

    #[test]
    fn decodes_ldi_every_high_register() {
        for d in 16..=31u8 {
            let field = d - 16;
            let word = 0xe000 | ((field as u16) << 4);
            let inst = decode(word, 0).unwrap();
            assert_eq!(inst, Instruction::AluImm { op: AluImmOp::Ldi, d, k: 0 });
        }
    }

    #[test]
    fn decodes_ldd_y_with_displacement() {
        // LDD R2, Y+5: 10q0 qq0d dddd 1qqq with d=2, q=5 (q5..0 = 000101)
        let d = 2u16;
        let q = 5u16;
        let word = 0x8000
            | ((q & 0x20) << 8)
            | ((q & 0x18) << 7)
            | (d << 4)
            | 0x08
            | (q & 0x07);
        let inst = decode(word, 0).unwrap();
        assert_eq!(inst, Instruction::Ldd { d: 2, ptr: PointerReg::Y, q: 5 });
    }

    #[test]
    fn unknown_opcode_returns_none() {
        assert!(decode(0xffff, 0).is_none());
    }
}
