//! Black-box versions of spec scenarios S1–S5, driven entirely through
//! the public `zx48_core` API (the unit tests beside the decoder cover
//! the same ground with access to internals; these confirm the public
//! surface is sufficient on its own).
use zx48_core::testrunner::run_cpm_test_binary;

#[test]
fn s1_neg_duplicate_via_public_step() {
    use zx48_core::z80::{Cpu, Flags};

    struct FlatBus(Vec<u8>);
    impl zx48_core::z80::Bus for FlatBus {
        fn read_mem(&mut self, addr: u16) -> u8 {
            self.0[addr as usize]
        }
        fn write_mem(&mut self, addr: u16, value: u8) {
            self.0[addr as usize] = value;
        }
        fn read_io(&mut self, _port: u16, _ts: u64) -> u8 {
            0xFF
        }
        fn write_io(&mut self, _port: u16, _value: u8, _ts: u64) {}
    }

    let mut mem = vec![0u8; 0x10000];
    mem[0] = 0xED;
    mem[1] = 0x4C;
    let mut bus = FlatBus(mem);
    let mut cpu = Cpu::new();
    cpu.regs.a = 0x01;
    let t = cpu.step(&mut bus, 0);
    assert_eq!(cpu.regs.a, 0xFF);
    assert!(cpu.regs.f.contains(Flags::C));
    assert_eq!(t, 8);
}

#[test]
fn cpm_harness_runs_a_minimal_program_to_warm_boot() {
    let rom = vec![
        0x3E, 0x41, // LD A,'A'
        0xC3, 0x00, 0x00, // JP 0x0000
    ];
    let outcome = run_cpm_test_binary(&rom, 100);
    assert!(!outcome.timed_out);
}
