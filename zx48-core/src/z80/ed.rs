//! The `ED`-prefixed table: 16-bit arithmetic, block transfer/search/IO,
//! the `I`/`R` load pair, interrupt mode selection, and `RRD`/`RLD`.
//!
//! A preceding `DD`/`FD` is meaningless here — `ED` instructions never
//! reference `HL`/`(HL)` through the index registers — so `exec_ed`
//! ignores `exec.index` entirely.
use super::bus::Bus;
use super::decode::Exec;
use super::flags::{self, Flags};

pub fn exec_ed<B: Bus>(exec: &mut Exec<B>) -> u32 {
    let opcode = exec.fetch_opcode();
    let x = (opcode >> 6) & 3;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;

    match x {
        1 => exec_x1(exec, y, z, p, q),
        2 if z <= 3 && y >= 4 => exec_block(exec, y, z),
        _ => {} // undocumented ED opcodes (x=0, x=3, or x=2 with z>3/y<4): NOP
    }
    exec.t
}

fn exec_x1<B: Bus>(exec: &mut Exec<B>, y: u8, z: u8, p: u8, q: u8) {
    match z {
        0 => {
            // IN r,(C) / IN F,(C) (y==6: flags set, result discarded)
            let port = exec.cpu.regs.bc();
            let v = exec.bus.read_io(port, exec.io_ts());
            exec.spend(4);
            if y != 6 {
                exec.write_r8(y, v);
            }
            let mut f = exec.cpu.regs.f;
            f.set_sz_from(v);
            f.set_yx_from(v);
            f.set_cond(Flags::PV, flags::parity(v));
            f.remove(Flags::H | Flags::N);
            exec.cpu.regs.f = f;
        }
        1 => {
            // OUT (C),r / OUT (C),0
            let v = if y == 6 { 0 } else { exec.read_r8(y) };
            let port = exec.cpu.regs.bc();
            exec.bus.write_io(port, v, exec.io_ts());
            exec.spend(4);
        }
        2 => {
            let hl = exec.cpu.regs.hl();
            let rp = exec.cpu.regs.rp(super::regs::IndexMode::Hl, p);
            if q == 0 {
                let (result, f) = flags::sbc16_flags(hl, rp, if exec.cpu.regs.f.contains(Flags::C) { 1 } else { 0 });
                exec.cpu.regs.set_hl(result);
                exec.cpu.regs.f = f;
            } else {
                let (result, f) = flags::adc16_flags(hl, rp, if exec.cpu.regs.f.contains(Flags::C) { 1 } else { 0 });
                exec.cpu.regs.set_hl(result);
                exec.cpu.regs.f = f;
            }
            exec.spend(7);
        }
        3 => {
            if q == 0 {
                let nn = exec.fetch_u16();
                let v = exec.cpu.regs.rp(super::regs::IndexMode::Hl, p);
                exec.bus.write_mem(nn, v as u8);
                exec.bus.write_mem(nn.wrapping_add(1), (v >> 8) as u8);
                exec.spend(6);
            } else {
                let nn = exec.fetch_u16();
                let lo = exec.bus.read_mem(nn);
                let hi = exec.bus.read_mem(nn.wrapping_add(1));
                exec.spend(6);
                exec.cpu.regs.set_rp(super::regs::IndexMode::Hl, p, (hi as u16) << 8 | lo as u16);
            }
        }
        4 => neg(exec),
        5 => {
            let ret = exec.pop16();
            exec.cpu.regs.pc = ret;
            exec.cpu.regs.iff1 = exec.cpu.regs.iff2;
        }
        6 => {
            exec.cpu.regs.im = match y {
                0 | 1 | 4 | 5 => super::regs::InterruptMode::Im0,
                2 | 6 => super::regs::InterruptMode::Im1,
                3 | 7 => super::regs::InterruptMode::Im2,
                _ => unreachable!(),
            };
        }
        7 => exec_assorted(exec, y),
        _ => unreachable!(),
    }
}

/// `NEG` and its seven undocumented duplicates (`ED 44/4C/54/5C/64/6C/74/7C`).
fn neg<B: Bus>(exec: &mut Exec<B>) {
    let a = exec.cpu.regs.a;
    let (result, f) = flags::sub8_flags(0, a, 0, false);
    exec.cpu.regs.a = result;
    exec.cpu.regs.f = f;
}

fn exec_assorted<B: Bus>(exec: &mut Exec<B>, y: u8) {
    match y {
        0 => {
            // LD I,A
            exec.cpu.regs.i = exec.cpu.regs.a;
            exec.spend(1);
        }
        1 => {
            // LD R,A
            exec.cpu.regs.r = exec.cpu.regs.a;
            exec.spend(1);
        }
        2 => {
            // LD A,I
            let i = exec.cpu.regs.i;
            exec.cpu.regs.a = i;
            let mut f = exec.cpu.regs.f;
            f.set_sz_from(i);
            f.set_yx_from(i);
            f.set_cond(Flags::PV, exec.cpu.regs.iff2);
            f.remove(Flags::H | Flags::N);
            exec.cpu.regs.f = f;
            exec.spend(1);
        }
        3 => {
            // LD A,R
            let r = exec.cpu.regs.r;
            exec.cpu.regs.a = r;
            let mut f = exec.cpu.regs.f;
            f.set_sz_from(r);
            f.set_yx_from(r);
            f.set_cond(Flags::PV, exec.cpu.regs.iff2);
            f.remove(Flags::H | Flags::N);
            exec.cpu.regs.f = f;
            exec.spend(1);
        }
        4 => rrd(exec),
        5 => rld(exec),
        _ => {} // y==6,7: undocumented NOP
    }
}

fn rrd<B: Bus>(exec: &mut Exec<B>) {
    let addr = exec.cpu.regs.hl();
    let mem = exec.bus.read_mem(addr);
    exec.spend(3);
    exec.spend(4); // internal delay while the nibbles are shuffled
    let a = exec.cpu.regs.a;
    let new_mem = (a << 4) | (mem >> 4);
    let new_a = (a & 0xF0) | (mem & 0x0F);
    exec.bus.write_mem(addr, new_mem);
    exec.spend(3);
    exec.cpu.regs.a = new_a;
    let mut f = exec.cpu.regs.f;
    f.set_sz_from(new_a);
    f.set_yx_from(new_a);
    f.set_cond(Flags::PV, flags::parity(new_a));
    f.remove(Flags::H | Flags::N);
    exec.cpu.regs.f = f;
}

fn rld<B: Bus>(exec: &mut Exec<B>) {
    let addr = exec.cpu.regs.hl();
    let mem = exec.bus.read_mem(addr);
    exec.spend(3);
    exec.spend(4); // internal delay while the nibbles are shuffled
    let a = exec.cpu.regs.a;
    let new_mem = (mem << 4) | (a & 0x0F);
    let new_a = (a & 0xF0) | (mem >> 4);
    exec.bus.write_mem(addr, new_mem);
    exec.spend(3);
    exec.cpu.regs.a = new_a;
    let mut f = exec.cpu.regs.f;
    f.set_sz_from(new_a);
    f.set_yx_from(new_a);
    f.set_cond(Flags::PV, flags::parity(new_a));
    f.remove(Flags::H | Flags::N);
    exec.cpu.regs.f = f;
}

/// `LDI/LDD/LDIR/LDDR`, `CPI/CPD/CPIR/CPDR`, `INI/IND/INIR/INDR`,
/// `OUTI/OUTD/OTIR/OTDR`. Each call executes exactly one iteration; when
/// the repeating form's continuation condition holds, `PC` is rewound
/// to point at the `ED` prefix byte so the next [`Cpu::step`] call
/// performs another iteration — this is what gives a real Z80 its
/// interruptible-in-the-middle block instruction behaviour while still
/// letting [`Cpu::step`] honestly report "one instruction" per call.
fn exec_block<B: Bus>(exec: &mut Exec<B>, y: u8, z: u8) {
    let increment = y & 1 == 0; // y: 4=I/5=D pattern per row below
    let repeat = y & 2 != 0;
    match z {
        0 => block_transfer(exec, increment, repeat),
        1 => block_compare(exec, increment, repeat),
        2 => block_in(exec, increment, repeat),
        3 => block_out(exec, increment, repeat),
        _ => unreachable!(),
    }
}

fn step_hl_de(exec: &mut Exec<impl Bus>, increment: bool) {
    let hl = exec.cpu.regs.hl();
    let de = exec.cpu.regs.de();
    if increment {
        exec.cpu.regs.set_hl(hl.wrapping_add(1));
        exec.cpu.regs.set_de(de.wrapping_add(1));
    } else {
        exec.cpu.regs.set_hl(hl.wrapping_sub(1));
        exec.cpu.regs.set_de(de.wrapping_sub(1));
    }
}

fn rewind_to_prefix(exec: &mut Exec<impl Bus>) {
    exec.cpu.regs.pc = exec.cpu.regs.pc.wrapping_sub(2);
}

fn block_transfer<B: Bus>(exec: &mut Exec<B>, increment: bool, repeat: bool) {
    let hl = exec.cpu.regs.hl();
    let de = exec.cpu.regs.de();
    let value = exec.bus.read_mem(hl);
    exec.spend(3);
    exec.bus.write_mem(de, value);
    exec.spend(5);
    step_hl_de(exec, increment);
    let bc = exec.cpu.regs.bc().wrapping_sub(1);
    exec.cpu.regs.set_bc(bc);

    let n = exec.cpu.regs.a.wrapping_add(value);
    let mut f = exec.cpu.regs.f;
    f.remove(Flags::H | Flags::N);
    f.set_cond(Flags::PV, bc != 0);
    f.set_cond(Flags::Y, n & 0x02 != 0);
    f.set_cond(Flags::X, n & 0x08 != 0);
    exec.cpu.regs.f = f;

    if repeat && bc != 0 {
        exec.spend(5);
        rewind_to_prefix(exec);
    }
}

fn block_compare<B: Bus>(exec: &mut Exec<B>, increment: bool, repeat: bool) {
    let hl = exec.cpu.regs.hl();
    let value = exec.bus.read_mem(hl);
    exec.spend(3);
    exec.spend(5);
    let a = exec.cpu.regs.a;
    let (result, half_borrow) = {
        let r = a.wrapping_sub(value);
        let hb = (a & 0x0F) < (value & 0x0F);
        (r, hb)
    };

    if increment {
        exec.cpu.regs.set_hl(hl.wrapping_add(1));
    } else {
        exec.cpu.regs.set_hl(hl.wrapping_sub(1));
    }
    let bc = exec.cpu.regs.bc().wrapping_sub(1);
    exec.cpu.regs.set_bc(bc);

    let n = if half_borrow { result.wrapping_sub(1) } else { result };
    let mut f = Flags::N;
    f.set_sz_from(result);
    f.set_cond(Flags::H, half_borrow);
    f.set_cond(Flags::Y, n & 0x02 != 0);
    f.set_cond(Flags::X, n & 0x08 != 0);
    f.set_cond(Flags::PV, bc != 0);
    f.set_cond(Flags::C, exec.cpu.regs.f.contains(Flags::C));
    exec.cpu.regs.f = f;

    if repeat && bc != 0 && result != 0 {
        exec.spend(5);
        rewind_to_prefix(exec);
    }
}

fn block_in<B: Bus>(exec: &mut Exec<B>, increment: bool, repeat: bool) {
    let port = exec.cpu.regs.bc();
    let value = exec.bus.read_io(port, exec.io_ts());
    exec.spend(5);
    let hl = exec.cpu.regs.hl();
    exec.bus.write_mem(hl, value);
    exec.spend(3);
    if increment {
        exec.cpu.regs.set_hl(hl.wrapping_add(1));
    } else {
        exec.cpu.regs.set_hl(hl.wrapping_sub(1));
    }
    let b = exec.cpu.regs.b.wrapping_sub(1);
    exec.cpu.regs.b = b;

    let mut f = exec.cpu.regs.f;
    f.set_sz_from(b);
    f.insert(Flags::N);
    f.set_cond(Flags::PV, b != 0);
    exec.cpu.regs.f = f;

    if repeat && b != 0 {
        exec.spend(5);
        rewind_to_prefix(exec);
    }
}

fn block_out<B: Bus>(exec: &mut Exec<B>, increment: bool, repeat: bool) {
    let hl = exec.cpu.regs.hl();
    let value = exec.bus.read_mem(hl);
    exec.spend(3);
    let b = exec.cpu.regs.b.wrapping_sub(1);
    exec.cpu.regs.b = b;
    let port = exec.cpu.regs.bc();
    exec.bus.write_io(port, value, exec.io_ts());
    exec.spend(5);
    if increment {
        exec.cpu.regs.set_hl(hl.wrapping_add(1));
    } else {
        exec.cpu.regs.set_hl(hl.wrapping_sub(1));
    }

    let mut f = exec.cpu.regs.f;
    f.set_sz_from(b);
    f.insert(Flags::N);
    f.set_cond(Flags::PV, b != 0);
    exec.cpu.regs.f = f;

    if repeat && b != 0 {
        exec.spend(5);
        rewind_to_prefix(exec);
    }
}
