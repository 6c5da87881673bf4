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

    machine.rs

    The host machine: chip RAM, boot ROM, custom chipset and floppy
    controller bound together behind the bus-handler contract. A CPU core
    holds a reference to the machine and performs its bus cycles through it;
    each cycle's peripheral side effects are fully applied before the call
    returns, and the aggregated interrupt level is re-sampled after every
    cycle for the core to poll.

*/

use crate::{
    bus::{BusCycle, BusHandler, CYCLE_INT_ACK, CYCLE_NEW_ADDRESS, CYCLE_RESET, CYCLE_SELECT_WORD, OPEN_BUS_WORD},
    clock::HalfCycles,
    devices::{
        chipset::{Changes, Chipset, INTB_PORTS},
        floppy_drive::{ImageDrive, SectorImage},
        wd177x::FloppyController,
    },
    machine_config::MachineTarget,
};

use thiserror::Error;

// Memory map.
pub const CHIP_RAM_REGION_TOP: u32 = 0x20_0000;
pub const FDC_BASE: u32 = 0xBF_D000;
pub const FDC_TOP: u32 = 0xBF_DFFF;
pub const CHIP_REG_BASE: u32 = 0xDF_F000;
pub const CHIP_REG_TOP: u32 = 0xDF_F1BE;
pub const ROM_BASE: u32 = 0xFC_0000;
pub const ROM_TOP: u32 = 0x100_0000;

/// Failures that abort machine construction.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("missing required ROM: {0}")]
    MissingRom(String),
    #[error("ROM image {0} has unsupported size {1}")]
    InvalidRom(String, usize),
    #[error("unsupported chip RAM size: {0}K")]
    InvalidChipRam(u32),
}

pub struct Machine {
    chip_ram: Vec<u16>,
    rom: Vec<u16>,
    chipset: Chipset,
    fdc: FloppyController,
    fdc_half_accum: i64,
    interrupt_level: u8,
}

impl Machine {
    /// Build a machine from a target descriptor, fetching the required boot
    /// ROM through `rom_fetcher`. A missing or malformed ROM is fatal.
    pub fn new(
        target: &MachineTarget,
        rom_fetcher: impl FnOnce(&str) -> Option<Vec<u8>>,
    ) -> Result<Machine, MachineError> {
        if !matches!(target.chip_ram_kb, 256 | 512 | 1024) {
            return Err(MachineError::InvalidChipRam(target.chip_ram_kb));
        }

        let rom_bytes = rom_fetcher(&target.rom).ok_or_else(|| MachineError::MissingRom(target.rom.clone()))?;
        if !matches!(rom_bytes.len(), 0x4_0000 | 0x8_0000) {
            return Err(MachineError::InvalidRom(target.rom.clone(), rom_bytes.len()));
        }

        let mut drive = ImageDrive::new();
        drive.set_write_protected(target.floppy_write_protect);

        Ok(Machine {
            chip_ram: vec![0; target.chip_ram_kb as usize * 1024 / 2],
            rom: pack_big_endian16(&rom_bytes),
            chipset: Chipset::new(),
            fdc: FloppyController::new(Box::new(drive)),
            fdc_half_accum: 0,
            interrupt_level: 0,
        })
    }

    /// Hand a loaded disk image to the drive.
    pub fn insert_disk(&mut self, image: SectorImage) -> anyhow::Result<()> {
        self.fdc.drive_mut().insert_media(image)
    }

    #[inline]
    pub fn chipset(&self) -> &Chipset {
        &self.chipset
    }

    #[inline]
    pub fn fdc_mut(&mut self) -> &mut FloppyController {
        &mut self.fdc
    }

    /// Headless advance with no CPU core attached: drives the chipset and
    /// the floppy controller by their derived clocks.
    pub fn run_for(&mut self, duration: HalfCycles) -> Changes {
        let changes = self.chipset.run_for(duration, &mut self.chip_ram);
        self.advance_fdc(duration);
        self.interrupt_level = self.chipset.get_interrupt_level();
        changes
    }

    /// The floppy controller shares the CPU clock; one controller input
    /// cycle per two half-cycles.
    fn advance_fdc(&mut self, duration: HalfCycles) {
        self.fdc_half_accum += duration.0;
        let cycles = self.fdc_half_accum / 2;
        self.fdc_half_accum %= 2;
        if cycles > 0 {
            self.fdc.run_for_cycles(cycles as u32);
        }
        if self.fdc.interrupt_request() {
            self.chipset.request_interrupt(INTB_PORTS);
        }
    }

    fn access_chip_ram(&mut self, cycle: &mut BusCycle, address: u32) {
        let index = (address >> 1) as usize;
        if index >= self.chip_ram.len() {
            // Chip RAM smaller than its region: the remainder is open bus.
            if cycle.is_read() {
                cycle.set_value16(OPEN_BUS_WORD);
            }
            return;
        }

        if cycle.is_read() {
            let word = self.chip_ram[index];
            if cycle.operation & CYCLE_SELECT_WORD != 0 {
                cycle.set_value16(word);
            }
            else {
                cycle.set_value8(lane_byte(word, address));
            }
        }
        else if cycle.operation & CYCLE_SELECT_WORD != 0 {
            self.chip_ram[index] = cycle.value16();
        }
        else {
            self.chip_ram[index] = merge_lane_byte(self.chip_ram[index], address, cycle.value8());
        }
    }

    fn access_rom(&mut self, cycle: &mut BusCycle, address: u32) {
        if !cycle.is_read() {
            log::debug!("write to ROM at {:06X} dropped", address);
            return;
        }
        // The ROM mirrors through its region.
        let index = ((address - ROM_BASE) >> 1) as usize % self.rom.len();
        let word = self.rom[index];
        if cycle.operation & CYCLE_SELECT_WORD != 0 {
            cycle.set_value16(word);
        }
        else {
            cycle.set_value8(lane_byte(word, address));
        }
    }

    fn access_fdc(&mut self, cycle: &mut BusCycle, address: u32) {
        // The controller sits on the low data lane; registers on word
        // boundaries.
        let register = (address >> 1) & 3;
        if cycle.is_read() {
            let value = self.fdc.get_register(register);
            cycle.set_value8(value);
        }
        else {
            self.fdc.set_register(register, cycle.value8());
        }
        if self.fdc.interrupt_request() {
            self.chipset.request_interrupt(INTB_PORTS);
        }
    }
}

impl BusHandler for Machine {
    fn perform_cycle(&mut self, cycle: &mut BusCycle) -> HalfCycles {
        // A chip RAM access under a new address first waits for a bus slot
        // the DMA schedule leaves free; that wait is the access delay the
        // CPU core must absorb.
        let mut access_delay = HalfCycles::ZERO;
        if cycle.operation & CYCLE_NEW_ADDRESS != 0 {
            if let Some(address) = cycle.address {
                if address & 0xFF_FFFF < CHIP_RAM_REGION_TOP {
                    access_delay = self.chipset.run_until_cpu_slot(&mut self.chip_ram).duration;
                }
            }
        }

        // Advance the machine through the cycle itself; the delay portion
        // has already been covered by the slot wait above.
        self.chipset.run_for(cycle.length, &mut self.chip_ram);
        self.advance_fdc(cycle.length + access_delay);
        self.interrupt_level = self.chipset.get_interrupt_level();

        if cycle.operation & CYCLE_RESET != 0 {
            log::debug!("reset asserted on bus");
            self.chipset.reset();
            self.fdc.reset();
        }

        // Autovectored interrupts: no vector is driven onto the bus.
        if cycle.operation & CYCLE_INT_ACK != 0 {
            return access_delay;
        }

        if !cycle.address_exposed() || !cycle.data_exposed() {
            return access_delay;
        }

        let address = cycle.address.unwrap_or(0) & 0xFF_FFFF;

        if address < CHIP_RAM_REGION_TOP {
            self.access_chip_ram(cycle, address);
        }
        else if (FDC_BASE..=FDC_TOP).contains(&address) {
            self.access_fdc(cycle, address);
        }
        else if (CHIP_REG_BASE..=CHIP_REG_TOP).contains(&address) {
            self.chipset.perform(cycle);
        }
        else if (ROM_BASE..ROM_TOP).contains(&address) {
            self.access_rom(cycle, address);
        }
        else {
            // Open bus: reads float to all-ones, writes vanish.
            if cycle.is_read() {
                cycle.set_value16(OPEN_BUS_WORD);
                log::debug!("unmapped read from {:06X}", address);
            }
            else {
                log::debug!("unmapped write to {:06X} of {:04X}", address, cycle.value16());
            }
        }

        self.interrupt_level = self.chipset.get_interrupt_level();
        access_delay
    }

    fn interrupt_level(&self) -> u8 {
        self.interrupt_level
    }
}

/// Pack a big-endian byte image into bus words.
fn pack_big_endian16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| ((pair[0] as u16) << 8) | pair[1] as u16)
        .collect()
}

/// The byte on the lane selected by the address: even addresses ride the
/// high half of the bus word.
#[inline]
fn lane_byte(word: u16, address: u32) -> u8 {
    if address & 1 == 0 {
        (word >> 8) as u8
    }
    else {
        word as u8
    }
}

#[inline]
fn merge_lane_byte(word: u16, address: u32, value: u8) -> u16 {
    if address & 1 == 0 {
        (word & 0x00FF) | ((value as u16) << 8)
    }
    else {
        (word & 0xFF00) | value as u16
    }
}
