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

    devices::chipset::mod.rs

    Implements the custom chipset: beam counters, DMA slot allocation,
    sprite fetch, interrupt aggregation, and the memory-mapped chip register
    file. Owns the blitter sub-engine.

    Time advances in color clocks (one color clock = four half-cycles of the
    CPU clock). Within each scanline, fixed slots belong to memory refresh
    and active sprites, the data-fetch window belongs to bitplane DMA, and
    the remainder are free slots arbitrated between the blitter and the CPU.

*/

pub mod blitter;

use crate::{
    bus::{BusCycle, OPEN_BUS_WORD},
    clock::HalfCycles,
    devices::chipset::blitter::{Blitter, BlitterSlot},
};

/// PAL line and frame geometry.
pub const CCKS_PER_LINE: u32 = 227;
pub const LINES_PER_FRAME: u32 = 312;

/// One color clock in half-cycles of the CPU clock.
pub const HALF_CYCLES_PER_CCK: i64 = 4;

// Scanline slot map. Slots not claimed below are free.
const REFRESH_SLOTS: [u32; 4] = [0x01, 0x02, 0x03, 0x1B];
const SPRITE_SLOT_BASE: u32 = 0x0B;
const SPRITE_SLOT_END: u32 = 0x1A;
const FETCH_REGION_START: u32 = 0x1C;
const FETCH_REGION_END: u32 = 0xE2;

/// Maps position within an 8-CCK fetch group to the bitplane fetched there;
/// None marks the two slots per group left free for other bus masters.
const FETCH_GROUP_PLANE: [Option<u8>; 8] = [
    None,
    Some(3),
    Some(5),
    Some(1),
    None,
    Some(2),
    Some(4),
    Some(0),
];

/// Consecutive free slots a non-priority blitter may take before yielding
/// one to the CPU.
const BLITTER_YIELD_RUN: u8 = 3;

// DMA control register bits.
pub const DMACON_SET_CLR: u16 = 0x8000;
pub const DMACON_BLTPRI: u16 = 0x0400;
pub const DMACON_DMAEN: u16 = 0x0200;
pub const DMACON_BPLEN: u16 = 0x0100;
pub const DMACON_BLTEN: u16 = 0x0040;
pub const DMACON_SPREN: u16 = 0x0020;

// Interrupt request/enable bits.
pub const INT_SET_CLR: u16 = 0x8000;
pub const INTB_INTEN: u16 = 0x4000;
pub const INTB_EXTER: u16 = 0x2000;
pub const INTB_DSKSYN: u16 = 0x1000;
pub const INTB_RBF: u16 = 0x0800;
pub const INTB_BLIT: u16 = 0x0040;
pub const INTB_VERTB: u16 = 0x0020;
pub const INTB_COPER: u16 = 0x0010;
pub const INTB_PORTS: u16 = 0x0008;
pub const INTB_SOFT: u16 = 0x0004;
pub const INTB_DSKBLK: u16 = 0x0002;
pub const INTB_TBE: u16 = 0x0001;

// Chip register offsets.
const REG_DMACONR: u32 = 0x002;
const REG_VPOSR: u32 = 0x004;
const REG_VHPOSR: u32 = 0x006;
const REG_INTENAR: u32 = 0x01C;
const REG_INTREQR: u32 = 0x01E;
const REG_DIWSTRT: u32 = 0x08E;
const REG_DIWSTOP: u32 = 0x090;
const REG_DDFSTRT: u32 = 0x092;
const REG_DDFSTOP: u32 = 0x094;
const REG_DMACON: u32 = 0x096;
const REG_INTENA: u32 = 0x09A;
const REG_INTREQ: u32 = 0x09C;
const REG_SPRITE_PTR_BASE: u32 = 0x120;
const REG_SPRITE_PTR_END: u32 = 0x13E;
const REG_SPRITE_BASE: u32 = 0x140;
const REG_SPRITE_END: u32 = 0x17E;
const REG_BLITTER_BASE: u32 = 0x040;
const REG_BLITTER_END: u32 = 0x074;

/// Edge events crossed by an advance, plus the time actually covered and the
/// aggregated interrupt level at its end.
#[derive(Copy, Clone, Debug, Default)]
pub struct Changes {
    pub duration: HalfCycles,
    pub hsyncs: u32,
    pub vsyncs: u32,
    pub interrupt_level: u8,
}

/// Who owns a given color-clock slot on the shared bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotOwner {
    Refresh,
    Sprite(u8),
    Bitplane(u8),
    Free,
}

/// One of the eight hardware sprites.
#[derive(Copy, Clone, Debug, Default)]
pub struct Sprite {
    pub pointer: u32,
    pub h_start: u16,
    pub v_start: u16,
    pub v_stop: u16,
    pub attached: bool,
    pub data: [u16; 2],
}

impl Sprite {
    /// Load one half of the DMA pointer; `shift` is 16 for the high word.
    pub fn set_pointer(&mut self, shift: u32, value: u16) {
        if shift == 16 {
            self.pointer = (self.pointer & 0x0000_FFFF) | (((value & 0x001F) as u32) << 16);
        }
        else {
            self.pointer = (self.pointer & 0xFFFF_0000) | (value & 0xFFFE) as u32;
        }
    }

    pub fn set_start_position(&mut self, value: u16) {
        self.v_start = (self.v_start & 0x100) | (value >> 8);
        self.h_start = (self.h_start & 0x001) | ((value & 0xFF) << 1);
    }

    pub fn set_stop_and_control(&mut self, value: u16) {
        self.v_stop = ((value >> 8) & 0xFF) | ((value & 0x02) as u16) << 7;
        self.v_start = (self.v_start & 0xFF) | (((value & 0x04) as u16) << 6);
        self.h_start = (self.h_start & !1) | (value & 0x01);
        self.attached = value & 0x80 != 0;
    }

    pub fn set_image_data(&mut self, slot: usize, value: u16) {
        self.data[slot & 1] = value;
    }

    #[inline]
    pub fn active_on_line(&self, y: u32) -> bool {
        (self.v_start as u32) <= y && y < (self.v_stop as u32)
    }
}

pub struct Chipset {
    // Interrupts.
    interrupt_enable: u16,
    interrupt_requests: u16,
    interrupt_level: u8,

    // DMA control and the owned blitter.
    dma_control: u16,
    blitter: Blitter,
    blit_slot_run: u8,

    // Sprites.
    sprites: [Sprite; 8],

    // Raster.
    x: u32,
    y: u32,
    time_accum: i64,

    // Display and fetch window boundaries.
    display_window_start: u16,
    display_window_stop: u16,
    fetch_window_start: u16,
    fetch_window_stop: u16,
}

impl Chipset {
    pub fn new() -> Self {
        Self {
            interrupt_enable: 0,
            interrupt_requests: 0,
            interrupt_level: 0,
            dma_control: 0,
            blitter: Blitter::new(),
            blit_slot_run: 0,
            sprites: [Sprite::default(); 8],
            x: 0,
            y: 0,
            time_accum: 0,
            display_window_start: 0,
            display_window_stop: 0,
            fetch_window_start: 0,
            fetch_window_stop: 0,
        }
    }

    pub fn reset(&mut self) {
        let sprites = self.sprites;
        *self = Self::new();
        // Sprite pointers survive a CPU-initiated reset line pulse; their
        // contents are software-owned.
        self.sprites = sprites;
    }

    #[inline]
    pub fn get_interrupt_level(&self) -> u8 {
        self.interrupt_level
    }

    #[inline]
    pub fn beam_position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    #[inline]
    pub fn sprite(&self, index: usize) -> &Sprite {
        &self.sprites[index & 7]
    }

    #[inline]
    pub fn blitter_busy(&self) -> bool {
        self.blitter.busy()
    }

    /// Raise interrupt request bits on behalf of an external source (e.g.
    /// the peripheral-ports line). Software clears them through INTREQ.
    pub fn request_interrupt(&mut self, bits: u16) {
        self.interrupt_requests |= bits & 0x3FFF;
        self.update_interrupts();
    }

    #[inline]
    fn dma_enabled(&self, bit: u16) -> bool {
        (self.dma_control & DMACON_DMAEN != 0) && (self.dma_control & bit != 0)
    }

    fn blitter_nasty(&self) -> bool {
        self.blitter.busy() && self.dma_enabled(DMACON_BLTEN) && (self.dma_control & DMACON_BLTPRI != 0)
    }

    /// True when `y` falls inside the vertical display window.
    fn display_line(&self, y: u32) -> bool {
        let v_start = (self.display_window_start >> 8) as u32;
        let v_stop_raw = (self.display_window_stop >> 8) as u32;
        // The stop register's bit 8 is the complement of its bit 7.
        let v_stop = if v_stop_raw & 0x80 == 0 { v_stop_raw | 0x100 } else { v_stop_raw };
        v_start <= y && y < v_stop
    }

    /// Decode ownership of the slot at beam position (x, y).
    fn slot_owner(&self, x: u32, y: u32) -> SlotOwner {
        if REFRESH_SLOTS.contains(&x) {
            return SlotOwner::Refresh;
        }

        if (SPRITE_SLOT_BASE..=SPRITE_SLOT_END).contains(&x) && self.dma_enabled(DMACON_SPREN) {
            let index = x - SPRITE_SLOT_BASE;
            let sprite = (index / 2) as u8;
            if self.sprites[sprite as usize].active_on_line(y) {
                return SlotOwner::Sprite(sprite);
            }
            return SlotOwner::Free;
        }

        if (FETCH_REGION_START..=FETCH_REGION_END).contains(&x)
            && self.dma_enabled(DMACON_BPLEN)
            && self.display_line(y)
        {
            let start = self.fetch_window_start as u32;
            let stop = self.fetch_window_stop as u32;
            if x >= start && x <= stop + 7 {
                if let Some(plane) = FETCH_GROUP_PLANE[((x - start) & 7) as usize] {
                    return SlotOwner::Bitplane(plane);
                }
            }
        }

        SlotOwner::Free
    }

    /// Whether the CPU may claim the slot at (x, y) for a chip memory access.
    fn cpu_slot_available(&self, x: u32, y: u32) -> bool {
        matches!(self.slot_owner(x, y), SlotOwner::Free) && !self.blitter_nasty()
    }

    /// The duration from now until the beginning of the next slot at which
    /// the shared bus is available to the CPU.
    pub fn time_until_cpu_slot(&self) -> HalfCycles {
        let mut x = self.x;
        let mut y = self.y;
        let mut delay: i64 = 0;

        // Mid-slot time must drain before the next slot boundary.
        if self.time_accum > 0 {
            delay = HALF_CYCLES_PER_CCK - self.time_accum;
            advance_beam(&mut x, &mut y);
        }

        // Free slots recur every line; two lines bounds the search even
        // through a fetch window. A priority blitter blocks the CPU for the
        // scan horizon, which models the stall it really causes.
        for _ in 0..(CCKS_PER_LINE * 2) {
            if self.cpu_slot_available(x, y) {
                return HalfCycles(delay);
            }
            delay += HALF_CYCLES_PER_CCK;
            advance_beam(&mut x, &mut y);
        }
        HalfCycles(delay)
    }

    /// Advance to the next CPU-available slot, returning the changes crossed
    /// on the way; `duration` carries the delay the CPU must absorb.
    pub fn run_until_cpu_slot(&mut self, ram: &mut [u16]) -> Changes {
        let delay = self.time_until_cpu_slot();
        self.run_for(delay, ram)
    }

    /// Advance the chipset by exactly `duration`.
    pub fn run_for(&mut self, duration: HalfCycles, ram: &mut [u16]) -> Changes {
        let mut changes = Changes {
            duration,
            ..Changes::default()
        };

        self.time_accum += duration.0;
        while self.time_accum >= HALF_CYCLES_PER_CCK {
            self.time_accum -= HALF_CYCLES_PER_CCK;
            self.tick_cck(ram, &mut changes);
        }

        changes.interrupt_level = self.interrupt_level;
        changes
    }

    fn tick_cck(&mut self, ram: &mut [u16], changes: &mut Changes) {
        match self.slot_owner(self.x, self.y) {
            SlotOwner::Sprite(n) => {
                // Fetch one image word into the sprite's data registers and
                // advance its pointer.
                let sprite = &mut self.sprites[n as usize];
                let word = ((self.x - SPRITE_SLOT_BASE) & 1) as usize;
                let index = (sprite.pointer >> 1) as usize;
                if index < ram.len() {
                    sprite.data[word] = ram[index];
                }
                sprite.pointer = sprite.pointer.wrapping_add(2);
            }
            SlotOwner::Free => {
                self.arbitrate_free_slot(ram);
            }
            // Refresh and bitplane slots only consume bus time here; the
            // pixel pipeline is an external sink.
            SlotOwner::Refresh | SlotOwner::Bitplane(_) => {}
        }

        self.x += 1;
        if self.x == CCKS_PER_LINE {
            self.x = 0;
            self.y += 1;
            changes.hsyncs += 1;
            if self.y == LINES_PER_FRAME {
                self.y = 0;
                changes.vsyncs += 1;
                self.interrupt_requests |= INTB_VERTB;
                self.update_interrupts();
            }
        }
    }

    /// Free-slot arbitration between the blitter and the CPU. A priority
    /// blitter takes every free slot; otherwise it yields one slot to the
    /// CPU after each run of three.
    fn arbitrate_free_slot(&mut self, ram: &mut [u16]) {
        if !(self.blitter.busy() && self.dma_enabled(DMACON_BLTEN)) {
            self.blit_slot_run = 0;
            return;
        }

        if self.dma_control & DMACON_BLTPRI == 0 && self.blit_slot_run >= BLITTER_YIELD_RUN {
            self.blit_slot_run = 0;
            return;
        }

        self.blit_slot_run += 1;
        if self.blitter.advance_slot(ram) == BlitterSlot::Finished {
            self.interrupt_requests |= INTB_BLIT;
            self.update_interrupts();
        }
    }

    /// Perform a memory-mapped register access. The caller guarantees the
    /// cycle targets the chip register block; the low nine address bits
    /// select the register.
    pub fn perform(&mut self, cycle: &mut BusCycle) {
        let offset = (cycle.address.unwrap_or(0) & 0x1FF) & !1;

        if cycle.is_read() {
            let value = match offset {
                REG_DMACONR => self.dma_control & 0x3FFF | ((self.blitter.busy() as u16) << 14),
                REG_VPOSR => ((self.y >> 8) & 0x7) as u16,
                REG_VHPOSR => (((self.y & 0xFF) << 8) | (self.x & 0xFF)) as u16,
                REG_INTENAR => self.interrupt_enable & 0x7FFF,
                REG_INTREQR => self.interrupt_requests & 0x7FFF,
                _ => {
                    log::debug!("read from unreadable chip register {:03X}", offset);
                    OPEN_BUS_WORD
                }
            };
            cycle.set_value16(value);
            return;
        }

        let value = cycle.value16();
        match offset {
            REG_BLITTER_BASE..=REG_BLITTER_END => self.blitter.set_register(offset, value),
            REG_DIWSTRT => self.display_window_start = value,
            REG_DIWSTOP => self.display_window_stop = value,
            REG_DDFSTRT => self.fetch_window_start = value & 0x00FC,
            REG_DDFSTOP => self.fetch_window_stop = value & 0x00FC,
            REG_DMACON => {
                self.dma_control = apply_set_clr(self.dma_control, value);
            }
            REG_INTENA => {
                self.interrupt_enable = apply_set_clr(self.interrupt_enable, value);
                self.update_interrupts();
            }
            REG_INTREQ => {
                self.interrupt_requests = apply_set_clr(self.interrupt_requests, value);
                self.update_interrupts();
            }
            REG_SPRITE_PTR_BASE..=REG_SPRITE_PTR_END => {
                let index = ((offset - REG_SPRITE_PTR_BASE) >> 2) as usize;
                let shift = if offset & 2 == 0 { 16 } else { 0 };
                self.sprites[index].set_pointer(shift, value);
            }
            REG_SPRITE_BASE..=REG_SPRITE_END => {
                let index = ((offset - REG_SPRITE_BASE) >> 3) as usize;
                match (offset - REG_SPRITE_BASE) & 6 {
                    0 => self.sprites[index].set_start_position(value),
                    2 => self.sprites[index].set_stop_and_control(value),
                    4 => self.sprites[index].set_image_data(0, value),
                    _ => self.sprites[index].set_image_data(1, value),
                }
            }
            _ => {
                log::debug!("write to unknown chip register {:03X} of {:04X}", offset, value);
            }
        }
    }

    /// Recompute the aggregated interrupt level; the level is always a pure
    /// function of the enable and request masks.
    fn update_interrupts(&mut self) {
        self.interrupt_level = 0;

        if self.interrupt_enable & INTB_INTEN == 0 {
            return;
        }
        let masked = self.interrupt_enable & self.interrupt_requests & 0x3FFF;
        if masked == 0 {
            return;
        }

        let top = 15 - masked.leading_zeros();
        self.interrupt_level = match top {
            0..=2 => 1,
            3 => 2,
            4..=6 => 3,
            7..=10 => 4,
            11 | 12 => 5,
            _ => 6,
        };
    }
}

/// Standard set/clear register semantics: bit 15 selects whether the
/// remaining bits set or clear their targets.
#[inline]
fn apply_set_clr(current: u16, value: u16) -> u16 {
    if value & 0x8000 != 0 {
        current | (value & 0x7FFF)
    }
    else {
        current & !(value & 0x7FFF)
    }
}

#[inline]
fn advance_beam(x: &mut u32, y: &mut u32) {
    *x += 1;
    if *x == CCKS_PER_LINE {
        *x = 0;
        *y += 1;
        if *y == LINES_PER_FRAME {
            *y = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::chipset::blitter::{
        REG_BLTAPTL,
        REG_BLTAPTH,
        REG_BLTCON0,
        REG_BLTDPTL,
        REG_BLTDPTH,
        REG_BLTSIZE,
    };

    fn write_reg(chipset: &mut Chipset, offset: u32, value: u16) {
        let mut cycle = BusCycle::write_word(0xDFF000 + offset, value);
        chipset.perform(&mut cycle);
    }

    fn read_reg(chipset: &mut Chipset, offset: u32) -> u16 {
        let mut cycle = BusCycle::read_word(0xDFF000 + offset);
        chipset.perform(&mut cycle);
        cycle.value16()
    }

    fn line() -> HalfCycles {
        HalfCycles(CCKS_PER_LINE as i64 * HALF_CYCLES_PER_CCK)
    }

    fn frame() -> HalfCycles {
        HalfCycles((CCKS_PER_LINE * LINES_PER_FRAME) as i64 * HALF_CYCLES_PER_CCK)
    }

    #[test]
    fn interrupt_level_is_pure_function_of_masks() {
        let mut chipset = Chipset::new();
        assert_eq!(chipset.get_interrupt_level(), 0);

        // Request without enable: level stays 0.
        write_reg(&mut chipset, 0x09C, INT_SET_CLR | INTB_VERTB);
        assert_eq!(chipset.get_interrupt_level(), 0);

        // Enabling the master and the bit recomputes immediately.
        write_reg(&mut chipset, 0x09A, INT_SET_CLR | INTB_INTEN | INTB_VERTB);
        assert_eq!(chipset.get_interrupt_level(), 3);

        // A higher-priority request overrides.
        write_reg(&mut chipset, 0x09A, INT_SET_CLR | INTB_EXTER);
        write_reg(&mut chipset, 0x09C, INT_SET_CLR | INTB_EXTER);
        assert_eq!(chipset.get_interrupt_level(), 6);

        // Clearing the request drops back.
        write_reg(&mut chipset, 0x09C, INTB_EXTER);
        assert_eq!(chipset.get_interrupt_level(), 3);

        // Master disable forces level 0 with requests still pending.
        write_reg(&mut chipset, 0x09A, INTB_INTEN);
        assert_eq!(chipset.get_interrupt_level(), 0);
    }

    #[test]
    fn priority_encoder_mapping() {
        let mut chipset = Chipset::new();
        write_reg(&mut chipset, 0x09A, INT_SET_CLR | INTB_INTEN | 0x3FFF);

        for (bits, level) in [
            (INTB_TBE, 1),
            (INTB_SOFT, 1),
            (INTB_PORTS, 2),
            (INTB_COPER, 3),
            (INTB_BLIT, 3),
            (INTB_RBF, 5),
            (INTB_EXTER, 6),
        ] {
            write_reg(&mut chipset, 0x09C, 0x7FFF); // clear all requests
            write_reg(&mut chipset, 0x09C, INT_SET_CLR | bits);
            assert_eq!(chipset.get_interrupt_level(), level, "bits {:04X}", bits);
        }
    }

    #[test]
    fn run_for_counts_syncs_and_raises_vertical_blank() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0u16; 0x1000];

        let changes = chipset.run_for(line(), &mut ram);
        assert_eq!(changes.hsyncs, 1);
        assert_eq!(changes.vsyncs, 0);

        let changes = chipset.run_for(frame(), &mut ram);
        assert_eq!(changes.hsyncs, LINES_PER_FRAME);
        assert_eq!(changes.vsyncs, 1);
        assert_ne!(read_reg(&mut chipset, 0x01E) & INTB_VERTB, 0);
    }

    #[test]
    fn raster_position_registers_track_the_beam() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0u16; 16];

        chipset.run_for(HalfCycles(10 * HALF_CYCLES_PER_CCK), &mut ram);
        let vhposr = read_reg(&mut chipset, 0x006);
        assert_eq!(vhposr & 0xFF, 10);
        assert_eq!(vhposr >> 8, 0);

        chipset.run_for(line(), &mut ram);
        let vhposr = read_reg(&mut chipset, 0x006);
        assert_eq!(vhposr & 0xFF, 10);
        assert_eq!(vhposr >> 8, 1);
    }

    #[test]
    fn unknown_register_is_open_bus() {
        let mut chipset = Chipset::new();

        // An unassigned offset reads all-ones and absorbs writes.
        assert_eq!(read_reg(&mut chipset, 0x1BE), OPEN_BUS_WORD);
        write_reg(&mut chipset, 0x1BE, 0x1234);
        assert_eq!(read_reg(&mut chipset, 0x1BE), OPEN_BUS_WORD);
    }

    fn arm_copy_blit(chipset: &mut Chipset) {
        write_reg(chipset, REG_BLTCON0, 0x0100 | 0x0800 | 0x00F0); // A->D
        write_reg(chipset, REG_BLTAPTH, 0);
        write_reg(chipset, REG_BLTAPTL, 0x00);
        write_reg(chipset, REG_BLTDPTH, 0);
        write_reg(chipset, REG_BLTDPTL, 0x40);
        write_reg(chipset, REG_BLTSIZE, (1 << 6) | 4); // 1 row x 4 words
    }

    #[test]
    fn blitter_enable_gates_progress_within_one_call() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0x5A5Au16; 0x100];
        for word in ram[0x20..0x24].iter_mut() {
            *word = 0;
        }

        // Armed, but blitter DMA disabled: no progress, no completion.
        arm_copy_blit(&mut chipset);
        chipset.run_for(frame(), &mut ram);
        assert!(chipset.blitter_busy());
        assert_eq!(read_reg(&mut chipset, 0x01E) & INTB_BLIT, 0);
        assert_eq!(ram[0x20], 0);

        // Enabling blitter DMA lets the pass finish on the next advance and
        // raises the blitter-done request.
        write_reg(&mut chipset, 0x096, DMACON_SET_CLR | DMACON_DMAEN | DMACON_BLTEN);
        chipset.run_for(line(), &mut ram);
        assert!(!chipset.blitter_busy());
        assert_ne!(read_reg(&mut chipset, 0x01E) & INTB_BLIT, 0);
        assert_eq!(ram[0x20], 0x5A5A);
        assert_eq!(ram[0x23], 0x5A5A);
    }

    #[test]
    fn blitter_disable_stops_within_the_same_call() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0u16; 0x2000];

        write_reg(&mut chipset, 0x096, DMACON_SET_CLR | DMACON_DMAEN | DMACON_BLTEN);
        // A long blit, then disable before it can have finished.
        write_reg(&mut chipset, REG_BLTCON0, 0x0100 | 0x00F0);
        write_reg(&mut chipset, REG_BLTDPTH, 0);
        write_reg(&mut chipset, REG_BLTDPTL, 0);
        write_reg(&mut chipset, REG_BLTSIZE, (64 << 6) | 16);

        chipset.run_for(HalfCycles(8 * HALF_CYCLES_PER_CCK), &mut ram);
        write_reg(&mut chipset, 0x096, DMACON_BLTEN); // clear enable
        chipset.run_for(frame(), &mut ram);

        assert!(chipset.blitter_busy(), "blit must halt, not finish, once disabled");
        assert_eq!(read_reg(&mut chipset, 0x01E) & INTB_BLIT, 0);
    }

    #[test]
    fn dmaconr_reflects_blitter_busy() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0u16; 0x100];

        assert_eq!(read_reg(&mut chipset, 0x002) & 0x4000, 0);
        arm_copy_blit(&mut chipset);
        assert_ne!(read_reg(&mut chipset, 0x002) & 0x4000, 0);

        write_reg(&mut chipset, 0x096, DMACON_SET_CLR | DMACON_DMAEN | DMACON_BLTEN);
        chipset.run_for(line(), &mut ram);
        assert_eq!(read_reg(&mut chipset, 0x002) & 0x4000, 0);
    }

    #[test]
    fn sprite_registers_decode_per_sprite() {
        let mut chipset = Chipset::new();

        // Sprite 3 pointer: 0x120 + 3*4 = 0x12C/0x12E.
        write_reg(&mut chipset, 0x12C, 0x0001);
        write_reg(&mut chipset, 0x12E, 0x2340);
        assert_eq!(chipset.sprite(3).pointer, 0x0001_2340);

        // Sprite 5 position/control: 0x140 + 5*8 = 0x168.
        write_reg(&mut chipset, 0x168, 0x50_40); // vstart 0x50, hstart half 0x40
        write_reg(&mut chipset, 0x16A, 0x60_00); // vstop 0x60
        assert_eq!(chipset.sprite(5).v_start, 0x50);
        assert_eq!(chipset.sprite(5).v_stop, 0x60);
        assert_eq!(chipset.sprite(5).h_start, 0x80);

        write_reg(&mut chipset, 0x16C, 0xAAAA);
        write_reg(&mut chipset, 0x16E, 0x5555);
        assert_eq!(chipset.sprite(5).data, [0xAAAA, 0x5555]);
    }

    #[test]
    fn active_sprite_fetches_image_words_from_ram() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0u16; 0x100];
        ram[0x10] = 0xDEAD;
        ram[0x11] = 0xBEEF;

        write_reg(&mut chipset, 0x096, DMACON_SET_CLR | DMACON_DMAEN | DMACON_SPREN);
        write_reg(&mut chipset, 0x120, 0); // sprite 0 pointer high
        write_reg(&mut chipset, 0x122, 0x20); // sprite 0 pointer low: word 0x10
        write_reg(&mut chipset, 0x140, 0x0000); // vstart 0
        write_reg(&mut chipset, 0x142, 0x0100); // vstop 1: active on line 0 only

        chipset.run_for(line(), &mut ram);
        assert_eq!(chipset.sprite(0).data, [0xDEAD, 0xBEEF]);
        assert_eq!(chipset.sprite(0).pointer, 0x24);
    }

    #[test]
    fn time_until_cpu_slot_skips_owned_slots() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0u16; 16];

        // Beam at x=0: a free slot, available immediately.
        assert_eq!(chipset.time_until_cpu_slot(), HalfCycles::ZERO);

        // Advance into the refresh slots at x=1..=3; the next free slot is
        // x=4, three color clocks away.
        chipset.run_for(HalfCycles(HALF_CYCLES_PER_CCK), &mut ram);
        assert_eq!(chipset.time_until_cpu_slot(), HalfCycles(3 * HALF_CYCLES_PER_CCK));

        // Mid-slot time drains first.
        chipset.run_for(HalfCycles(1), &mut ram);
        assert_eq!(chipset.time_until_cpu_slot(), HalfCycles(3 + 2 * HALF_CYCLES_PER_CCK));
    }

    #[test]
    fn priority_blitter_stalls_cpu_slots() {
        let mut chipset = Chipset::new();

        write_reg(
            &mut chipset,
            0x096,
            DMACON_SET_CLR | DMACON_DMAEN | DMACON_BLTEN | DMACON_BLTPRI,
        );
        write_reg(&mut chipset, REG_BLTCON0, 0x0100 | 0x00F0);
        write_reg(&mut chipset, REG_BLTDPTH, 0);
        write_reg(&mut chipset, REG_BLTDPTL, 0);
        write_reg(&mut chipset, REG_BLTSIZE, (0x3FF << 6) as u16); // large blit

        assert!(chipset.time_until_cpu_slot() > HalfCycles::ZERO);

        // Without priority the CPU still gets slots.
        write_reg(&mut chipset, 0x096, DMACON_BLTPRI);
        assert_eq!(chipset.time_until_cpu_slot(), HalfCycles::ZERO);
    }

    #[test]
    fn run_until_cpu_slot_advances_exactly_to_the_slot() {
        let mut chipset = Chipset::new();
        let mut ram = vec![0u16; 16];

        chipset.run_for(HalfCycles(HALF_CYCLES_PER_CCK), &mut ram);
        let expected = chipset.time_until_cpu_slot();
        let changes = chipset.run_until_cpu_slot(&mut ram);
        assert_eq!(changes.duration, expected);
        assert_eq!(chipset.time_until_cpu_slot(), HalfCycles::ZERO);
    }

    #[test]
    fn fetch_window_consumes_slots_on_display_lines() {
        let mut chipset = Chipset::new();

        write_reg(&mut chipset, 0x096, DMACON_SET_CLR | DMACON_DMAEN | DMACON_BPLEN);
        write_reg(&mut chipset, 0x08E, 0x2C81); // display window vstart 0x2C
        write_reg(&mut chipset, 0x090, 0xF4C1); // vstop 0xF4 (bit 8 set by rule)
        write_reg(&mut chipset, 0x092, 0x0038); // fetch start
        write_reg(&mut chipset, 0x094, 0x00D0); // fetch stop

        // Inside the window on a display line: the second slot of the group
        // fetches a bitplane.
        assert_eq!(chipset.slot_owner(0x39, 0x50), SlotOwner::Bitplane(3));
        // Group slots 0 and 4 stay free.
        assert_eq!(chipset.slot_owner(0x38, 0x50), SlotOwner::Free);
        assert_eq!(chipset.slot_owner(0x3C, 0x50), SlotOwner::Free);
        // Off display lines the window is inert.
        assert_eq!(chipset.slot_owner(0x39, 0x10), SlotOwner::Free);
    }
}
