//! SM83/LR35902 CPU: per-M-cycle microcode engine.
//!
//! Each instruction decodes, at fetch time, into an `Op` plus a count of
//! additional M-cycles it needs; `run_step` then drives the remaining
//! cycles via a `(Op, step)` match, mirroring the reference Game Boy
//! microcode engine's `Phase`-driven per-M-cycle dispatch
//! (`examples/other_examples/...missingno...cpu-mcycle-mod.rs.rs`), cut
//! down from its eZ80-flavored phase set (no ADL, no OAM-bug phase) and
//! extended with the SM83 interrupt-cancel glitch.

mod execute;
mod flags;
mod helpers;

use crate::machine::Machine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R8 {
    B,
    C,
    D,
    E,
    H,
    L,
    HlInd,
    A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16 {
    Bc,
    De,
    Hl,
    Sp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16Stk {
    Bc,
    De,
    Hl,
    Af,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    LdR8R8 { dst: R8, src: R8 },
    LdR8D8 { dst: R8 },
    LdR16D16 { rr: R16 },
    LdMemR16FromA { addr: R16 },
    LdAFromMemR16 { addr: R16 },
    LdHlIndIncFromA,
    LdHlIndDecFromA,
    LdAFromHlIndInc,
    LdAFromHlIndDec,
    IncR16 { rr: R16 },
    DecR16 { rr: R16 },
    IncR8 { r: R8 },
    DecR8 { r: R8 },
    RotateAccum(RotOp),
    LdMem16FromSp,
    AddHlR16 { rr: R16 },
    Stop,
    JrE8,
    JrCondE8 { cond: Cond, taken: bool },
    Daa,
    Cpl,
    Scf,
    Ccf,
    Halt,
    AluR8 { op: AluOp, src: R8 },
    AluD8 { op: AluOp },
    RetCond { cond: Cond, taken: bool },
    PopR16 { rr: R16Stk },
    JpCondA16 { cond: Cond, taken: bool },
    JpA16,
    CallCondA16 { cond: Cond, taken: bool },
    PushR16 { rr: R16Stk },
    RstN { addr: u16 },
    Ret,
    Reti,
    JpHl,
    LdSpFromHl,
    LdhA8FromA,
    LdhAFromA8,
    LdCIndFromA,
    LdAFromCInd,
    AddSpE8,
    LdHlFromSpE8,
    LdA16FromA,
    LdAFromA16,
    Di,
    Ei,
    CbFetch,
    RotR8 { op: RotOp, r: R8 },
    BitR8 { bit: u8, r: R8 },
    ResR8 { bit: u8, r: R8 },
    SetR8 { bit: u8, r: R8 },
    InterruptDispatch,
}

/// CPU state: register pairs plus a small amount of hidden
/// micro-architectural state (the cycle counter, a WZ-equivalent scratch
/// word, and the pending-EI counter).
#[derive(Debug, Clone)]
pub struct Cpu {
    af: u16,
    bc: u16,
    de: u16,
    hl: u16,
    sp: u16,
    pc: u16,

    ime: bool,
    /// Counts down to 0 at instruction boundaries; EI sets this to 2 so
    /// IME turns on only after the *next* instruction completes.
    ei_pending: u8,
    halted: bool,

    op: Op,
    step: u8,
    total: u8,
    /// Scratch word latch for multi-cycle operand gathering and jump
    /// targets, playing the role the reference design calls WZ.
    wz: u16,
    data: u8,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            af: 0x01B0,
            bc: 0x0013,
            de: 0x00D8,
            hl: 0x014D,
            sp: 0xFFFE,
            pc: 0x0100,
            ime: false,
            ei_pending: 0,
            halted: false,
            op: Op::Nop,
            step: 0,
            total: 0,
            wz: 0,
            data: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }
    pub fn sp(&self) -> u16 {
        self.sp
    }
    pub fn ime(&self) -> bool {
        self.ime
    }
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Advance the CPU by exactly one M-cycle.
    pub fn step_cycle(&mut self, bus: &mut Machine) {
        if self.halted {
            if bus.interrupt.pending() {
                self.halted = false;
            } else {
                self.service_ei_pending();
                return;
            }
        }

        if self.step == 0 {
            self.service_ei_pending();

            if self.ime && bus.interrupt.pending() {
                self.ime = false;
                self.op = Op::InterruptDispatch;
                // This fetch-slot cycle itself is the dispatch's first idle
                // M-cycle; `total` counts only the remaining four.
                self.total = 4;
                self.step = 1;
                return;
            }

            let opcode = bus.cpu_read(self.pc);
            self.pc = self.pc.wrapping_add(1);
            self.decode_and_begin(opcode, bus);
            return;
        }

        self.run_step(bus);
    }

    fn service_ei_pending(&mut self) {
        if self.ei_pending > 0 {
            self.ei_pending -= 1;
            if self.ei_pending == 0 {
                self.ime = true;
            }
        }
    }

    /// Schedule IME to turn on once the instruction containing this EI
    /// completes.
    fn schedule_ei(&mut self) {
        self.ei_pending = 2;
    }

    pub(crate) fn begin_op(&mut self, op: Op, extra: u8, bus: &mut Machine) {
        self.op = op;
        if extra == 0 {
            self.commit(bus);
            self.step = 0;
        } else {
            self.total = extra;
            self.step = 1;
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use crate::machine::Machine;

    fn machine_with_program(bytes: &[u8]) -> Machine {
        let mut rom = vec![0u8; 0x8000];
        rom[0x147] = 0x00;
        rom[0x148] = 0x00;
        rom[0x149] = 0x00;
        rom[0x100..0x100 + bytes.len()].copy_from_slice(bytes);
        let cart = Cartridge::load(rom).unwrap();
        Machine::from_cartridge(cart)
    }

    #[test]
    fn post_boot_register_state() {
        let cpu = Cpu::new();
        assert_eq!(cpu.a(), 0x01);
        assert_eq!(cpu.pc(), 0x0100);
        assert_eq!(cpu.sp(), 0xFFFE);
    }

    #[test]
    fn nop_takes_one_m_cycle_and_advances_pc() {
        let mut m = machine_with_program(&[0x00, 0x00]);
        let pc0 = m.cpu.pc();
        m.tick_m_cycle();
        assert_eq!(m.cpu.pc(), pc0 + 1);
    }

    #[test]
    fn ld_bc_d16_takes_three_m_cycles() {
        let mut m = machine_with_program(&[0x01, 0x34, 0x12]);
        for _ in 0..3 {
            m.tick_m_cycle();
        }
        assert_eq!(m.cpu.bc, 0x1234);
        assert_eq!(m.cpu.pc(), 0x0103);
    }

    #[test]
    fn inc_b_sets_zero_and_half_carry_flags() {
        let mut m = machine_with_program(&[0x04]); // INC B
        m.cpu.set_b(0xFF);
        m.tick_m_cycle();
        assert_eq!(m.cpu.b(), 0x00);
        assert!(m.cpu.flag(flags::FLAG_Z));
        assert!(m.cpu.flag(flags::FLAG_H));
    }

    #[test]
    fn ei_takes_effect_after_the_following_instruction() {
        let mut m = machine_with_program(&[0xFB, 0x00, 0x00]); // EI, NOP, NOP
        m.tick_m_cycle(); // EI
        assert!(!m.cpu.ime());
        m.tick_m_cycle(); // NOP (still not interruptible)
        assert!(!m.cpu.ime());
        m.tick_m_cycle(); // NOP; IME now live
        assert!(m.cpu.ime());
    }

    #[test]
    fn di_clears_ime_immediately() {
        let mut m = machine_with_program(&[0xF3, 0x00]); // DI, NOP
        m.cpu.ime = true;
        m.tick_m_cycle();
        assert!(!m.cpu.ime());
    }

    #[test]
    fn halt_stops_fetching_until_interrupt_pending() {
        let mut m = machine_with_program(&[0x76, 0x00]); // HALT, NOP
        m.tick_m_cycle();
        assert!(m.cpu.is_halted());
        let pc_after_halt = m.cpu.pc();
        m.tick_m_cycle();
        m.tick_m_cycle();
        assert_eq!(m.cpu.pc(), pc_after_halt); // still halted, not fetching
        m.interrupt.write_ie(0x01);
        m.interrupt.request(crate::interrupt::sources::VBLANK);
        m.tick_m_cycle();
        assert!(!m.cpu.is_halted());
    }

    #[test]
    fn interrupt_dispatch_pushes_pc_and_jumps_to_vector() {
        let mut m = machine_with_program(&[0x00, 0x00, 0x00]);
        m.cpu.ime = true;
        m.interrupt.write_ie(1 << crate::interrupt::sources::VBLANK);
        m.interrupt.request(crate::interrupt::sources::VBLANK);
        let sp0 = m.cpu.sp();
        for _ in 0..5 {
            m.tick_m_cycle();
        }
        assert_eq!(m.cpu.pc(), 0x0040);
        assert_eq!(m.cpu.sp(), sp0 - 2);
        assert!(!m.cpu.ime());
    }

    #[test]
    fn interrupt_cancel_glitch_jumps_to_zero_when_if_cleared_mid_dispatch() {
        let mut m = machine_with_program(&[0x00, 0x00, 0x00]);
        m.cpu.ime = true;
        m.interrupt.write_ie(1 << crate::interrupt::sources::VBLANK);
        m.interrupt.request(crate::interrupt::sources::VBLANK);
        m.tick_m_cycle(); // M1: enters dispatch
        m.tick_m_cycle(); // M2
        m.interrupt.write_if(0x00); // cleared right before the step-3 re-read
        for _ in 0..3 {
            m.tick_m_cycle();
        }
        assert_eq!(m.cpu.pc(), 0x0000);
    }
}
