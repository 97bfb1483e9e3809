//! Memory map and I/O register dispatch for `Machine::cpu_read`/`cpu_write`.
//!
//! Grounded on the reference bus's single address-decode match arm per
//! access (`AccessType`/`MemoryRegion` dispatch), trimmed from the eZ80
//! flash/port layout down to the DMG map, and extended with the PPU
//! mode-gated VRAM/OAM blocking and DMA sub-bus contamination the eZ80
//! bus had no equivalent of.

use crate::dma::SubBus;
use crate::machine::Machine;
use crate::ppu::Mode;

impl Machine {
    pub(crate) fn cpu_read(&mut self, addr: u16) -> u8 {
        if self.dma_blocks(addr) {
            return self.dma.last_byte();
        }

        match addr {
            0x0000..=0x7FFF => self.cartridge.read(addr),
            0x8000..=0x9FFF => {
                if self.ppu.mode() == Mode::Draw {
                    0xFF
                } else {
                    self.ppu.vram_read(addr)
                }
            }
            0xA000..=0xBFFF => self.cartridge.read(addr),
            0xC000..=0xDFFF => self.wram_read(addr),
            0xE000..=0xFDFF => self.wram_read((addr & !0xE000) | 0xC000),
            0xFE00..=0xFE9F => {
                if matches!(self.ppu.mode(), Mode::OamScan | Mode::Draw) {
                    0xFF
                } else {
                    self.ppu.oam_read(addr)
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.io_read(addr),
            0xFF80..=0xFFFE => self.hram_read(addr),
            0xFFFF => self.interrupt.read_ie(),
        }
    }

    pub(crate) fn cpu_write(&mut self, addr: u16, val: u8) {
        if self.dma_blocks(addr) {
            return;
        }

        match addr {
            0x0000..=0x7FFF => self.cartridge.write(addr, val),
            0x8000..=0x9FFF => {
                if self.ppu.mode() != Mode::Draw {
                    self.ppu.vram_write(addr, val);
                }
            }
            0xA000..=0xBFFF => self.cartridge.write(addr, val),
            0xC000..=0xDFFF => self.wram_write(addr, val),
            0xE000..=0xFDFF => self.wram_write((addr & !0xE000) | 0xC000, val),
            0xFE00..=0xFE9F => {
                if !matches!(self.ppu.mode(), Mode::OamScan | Mode::Draw) {
                    self.ppu.oam_write(addr, val);
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.io_write(addr, val),
            0xFF80..=0xFFFE => self.hram_write(addr, val),
            0xFFFF => self.interrupt.write_ie(val),
        }
    }

    /// While an OAM DMA transfer is active, the CPU can only reach HRAM and
    /// IE cleanly; any other address on the same sub-bus the DMA is reading
    /// from (or OAM itself) reads back the DMA's own last-fetched byte.
    fn dma_blocks(&self, addr: u16) -> bool {
        if !self.dma.is_active() || addr == 0xFFFF || (0xFF80..=0xFFFE).contains(&addr) {
            return false;
        }
        let requested_sub_bus = SubBus::classify((addr >> 8) as u8);
        requested_sub_bus == self.dma.sub_bus() || (0xFE00..=0xFE9F).contains(&addr)
    }

    fn io_read(&mut self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF04 => self.timer.read_div(),
            0xFF05 => self.timer.read_tima(),
            0xFF06 => self.timer.read_tma(),
            0xFF07 => self.timer.read_tac(),
            0xFF0F => self.interrupt.read_if(),
            0xFF40 => self.ppu.read_lcdc(),
            0xFF41 => self.ppu.read_stat(),
            0xFF42 => self.ppu.read_scy(),
            0xFF43 => self.ppu.read_scx(),
            0xFF44 => self.ppu.read_ly(),
            0xFF45 => self.ppu.read_lyc(),
            0xFF46 => self.dma.read_reg(),
            0xFF47 => self.ppu.read_bgp(),
            0xFF48 => self.ppu.read_obp0(),
            0xFF49 => self.ppu.read_obp1(),
            0xFF4A => self.ppu.read_wy(),
            0xFF4B => self.ppu.read_wx(),
            _ => 0xFF,
        }
    }

    fn io_write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.joypad.write(val, &mut self.interrupt),
            0xFF04 => self.timer.write_div(&mut self.interrupt),
            0xFF05 => self.timer.write_tima(val),
            0xFF06 => self.timer.write_tma(val),
            0xFF07 => self.timer.write_tac(val, &mut self.interrupt),
            0xFF0F => self.interrupt.write_if(val),
            0xFF40 => self.ppu.write_lcdc(val),
            0xFF41 => self.ppu.write_stat(val),
            0xFF42 => self.ppu.write_scy(val),
            0xFF43 => self.ppu.write_scx(val),
            0xFF44 => self.ppu.write_ly(val),
            0xFF45 => self.ppu.write_lyc(val),
            0xFF46 => self.dma.write_reg(val),
            0xFF47 => self.ppu.write_bgp(val),
            0xFF48 => self.ppu.write_obp0(val),
            0xFF49 => self.ppu.write_obp1(val),
            0xFF4A => self.ppu.write_wy(val),
            0xFF4B => self.ppu.write_wx(val),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;

    fn machine_with_rom(rom: Vec<u8>) -> Machine {
        Machine::from_cartridge(Cartridge::load(rom).unwrap())
    }

    fn blank_rom() -> Vec<u8> {
        vec![0u8; 1 << 15]
    }

    #[test]
    fn unused_region_reads_as_ff_and_drops_writes() {
        let mut m = machine_with_rom(blank_rom());
        m.cpu_write(0xFEA5, 0x42);
        assert_eq!(m.cpu_read(0xFEA5), 0xFF);
    }

    #[test]
    fn ie_register_is_mapped_above_hram() {
        let mut m = machine_with_rom(blank_rom());
        m.cpu_write(0xFFFF, 0x1F);
        assert_eq!(m.cpu_read(0xFFFF), 0x1F);
    }

    #[test]
    fn unmapped_io_register_reads_as_ff() {
        let mut m = machine_with_rom(blank_rom());
        assert_eq!(m.cpu_read(0xFF4F), 0xFF); // VBK, GBC-only, not wired up
    }

    #[test]
    fn vram_write_is_unaffected_before_dma_start_delay_elapses() {
        let mut m = machine_with_rom(blank_rom());
        m.cpu_write(0x9000, 0x55);
        assert_eq!(m.cpu_read(0x9000), 0x55);
    }
}
