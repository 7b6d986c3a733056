//! The `CB`-prefixed table (rotate/shift, `BIT`, `RES`, `SET`) and its
//! `DD CB d`/`FD CB d` displaced form.
use super::bus::Bus;
use super::decode::Exec;
use super::flags::{self, Flags};
use super::regs::IndexMode;

/// Executes the instruction following a (non-displaced) `CB` prefix.
/// The `CB` byte itself was already fetched (and its cost charged) by
/// [`Exec::run`]; an active index prefix means this is really a
/// displaced `DD CB d`/`FD CB d` form, which reads its sub-opcode after
/// the displacement byte instead of right after `CB`.
pub fn exec_cb<B: Bus>(exec: &mut Exec<B>) -> u32 {
    if exec.index != IndexMode::Hl {
        return exec_displaced_cb(exec);
    }
    let opcode = fetch_cb_opcode(exec);
    let x = (opcode >> 6) & 3;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;

    let value = exec.read_r8(z);
    let carry_in = exec.cpu.regs.f.contains(Flags::C);
    let addr_high = if z == 6 { Some((exec.cpu.regs.hl() >> 8) as u8) } else { None };
    let (result, f) = apply(x, y, value, carry_in, addr_high);
    exec.cpu.regs.f = f;
    if x != 1 {
        exec.write_r8(z, result);
    }
    if z == 6 {
        exec.spend(1); // (HL): 15T (BIT: 12T) vs 8T for a plain register
    }
    exec.t
}

/// `DD CB d op` / `FD CB d op`: the displacement byte precedes the CB
/// sub-opcode (unlike every other prefixed form, where the sub-opcode
/// comes right after the prefix). The result is written back to
/// `(IX+d)`/`(IY+d)` and, when `z != 6` and the operation isn't `BIT`,
/// *also* copied into the named 8-bit register — the well-known
/// undocumented "shadow" write. `BIT` never writes back at all.
fn exec_displaced_cb<B: Bus>(exec: &mut Exec<B>) -> u32 {
    let d = read_byte_no_r_bump(exec) as i8;
    exec.spend(3);
    let opcode = read_byte_no_r_bump(exec);
    exec.spend(3);
    exec.spend(2); // internal delay while the effective address is formed

    let base = if exec.index == IndexMode::Ix { exec.cpu.regs.ix } else { exec.cpu.regs.iy };
    let addr = base.wrapping_add(d as i16 as u16);

    let x = (opcode >> 6) & 3;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;

    let value = exec.bus.read_mem(addr);
    exec.spend(3);
    let carry_in = exec.cpu.regs.f.contains(Flags::C);
    let (result, f) = apply(x, y, value, carry_in, Some((addr >> 8) as u8));
    exec.cpu.regs.f = f;
    exec.spend(1); // internal delay before BIT completes / before the write

    if x != 1 {
        exec.bus.write_mem(addr, result);
        // Memory-only (z == 6): the write_mem cycle is the whole story, 23T
        // total. Register-shadow (z != 6): the write lands in the register,
        // not through another memory cycle, so the write_mem T-states don't
        // apply and the op totals 20T, same as BIT.
        if z == 6 {
            exec.spend(3);
        } else {
            exec.write_r8(z, result);
        }
    }
    exec.t
}

fn fetch_cb_opcode<B: Bus>(exec: &mut Exec<B>) -> u8 {
    let pc = exec.cpu.regs.pc;
    let v = exec.bus.read_mem(pc);
    exec.cpu.regs.pc = pc.wrapping_add(1);
    exec.cpu.regs.bump_r();
    exec.spend(4);
    v
}

/// Reads a byte at `PC` without touching `R` (used for the displacement
/// and sub-opcode bytes of `DD CB d op`; `R` was already bumped once for
/// the `CB` byte itself and is not bumped again for these).
fn read_byte_no_r_bump<B: Bus>(exec: &mut Exec<B>) -> u8 {
    let pc = exec.cpu.regs.pc;
    let v = exec.bus.read_mem(pc);
    exec.cpu.regs.pc = pc.wrapping_add(1);
    v
}

/// Applies one `CB`-table operation (`x` selects the group, `y` the
/// bit/sub-op) to `value`, returning the result and the new flags.
/// `carry_in` is the incoming `C` flag, needed by `RL`/`RR`. `addr_high`
/// is `Some(high byte of the operand's address)` for `(HL)`/displaced
/// `(IX+d)`/`(IY+d)` forms and `None` for a plain register operand;
/// `BIT` sources its undocumented X/Y flags from that address high byte
/// (the MEMPTR/WZ quirk) rather than from `value` when it's present.
fn apply(x: u8, y: u8, value: u8, carry_in: bool, addr_high: Option<u8>) -> (u8, Flags) {
    match x {
        0 => rotate_shift(y, value, carry_in),
        1 => {
            let bit = 1u8 << y;
            let mut f = Flags::H;
            let is_zero = value & bit == 0;
            f.set_cond(Flags::Z, is_zero);
            f.set_cond(Flags::PV, is_zero);
            f.set_cond(Flags::S, y == 7 && !is_zero);
            f.set_yx_from(addr_high.unwrap_or(value));
            (value, f)
        }
        2 => (value & !(1u8 << y), Flags::empty()), // RES: flags untouched by caller
        3 => (value | (1u8 << y), Flags::empty()),  // SET: flags untouched by caller
        _ => unreachable!(),
    }
}

/// `RLC, RRC, RL, RR, SLA, SRA, SLL (undocumented), SRL`.
fn rotate_shift(y: u8, value: u8, carry_in: bool) -> (u8, Flags) {
    let (result, carry_out) = match y {
        0 => (value.rotate_left(1), value & 0x80 != 0),
        1 => (value.rotate_right(1), value & 0x01 != 0),
        2 => {
            let c = if carry_in { 1 } else { 0 };
            ((value << 1) | c, value & 0x80 != 0)
        }
        3 => {
            let c = if carry_in { 0x80 } else { 0 };
            ((value >> 1) | c, value & 0x01 != 0)
        }
        4 => (value << 1, value & 0x80 != 0),
        5 => ((value >> 1) | (value & 0x80), value & 0x01 != 0),
        6 => ((value << 1) | 1, value & 0x80 != 0), // SLL: undocumented, sets bit 0
        7 => (value >> 1, value & 0x01 != 0),
        _ => unreachable!(),
    };
    let mut f = Flags::empty();
    f.set_sz_from(result);
    f.set_yx_from(result);
    f.set_cond(Flags::PV, flags::parity(result));
    f.set_cond(Flags::C, carry_out);
    (result, f)
}
