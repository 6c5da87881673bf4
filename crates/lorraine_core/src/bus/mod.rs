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

    bus::mod.rs

    Module for modelling the processor bus.

    A bus cycle is the unit of interaction between a CPU core and the rest of
    the machine: one timed, typed transaction on the address/data/control
    lines. The CPU core decomposes execution into bus cycles and hands each
    one to a host-supplied BusHandler, which dispatches it to memory or a
    peripheral and reports any extra delay the access incurred.

*/

use crate::clock::HalfCycles;

/// The word read from an address no device responds to.
pub const OPEN_BUS_WORD: u16 = 0xFFFF;
/// The byte read from an unattached data lane.
pub const OPEN_BUS_BYTE: u8 = 0xFF;

// Bus cycle operation bits. A cycle's operation is a combination of these.
//
// A cycle that asserts SELECT_BYTE or SELECT_WORD without READ is a write;
// the data field then carries the value being driven by the bus master.
pub const CYCLE_NEW_ADDRESS: u16 = 0b0000_0001; // address lines newly asserted
pub const CYCLE_SAME_ADDRESS: u16 = 0b0000_0010; // address lines held from the previous cycle
pub const CYCLE_SELECT_WORD: u16 = 0b0000_0100; // both data strobes asserted
pub const CYCLE_SELECT_BYTE: u16 = 0b0000_1000; // a single data strobe asserted
pub const CYCLE_READ: u16 = 0b0001_0000; // transfer is device-to-master
pub const CYCLE_RESET: u16 = 0b0010_0000; // reset output asserted
pub const CYCLE_INT_ACK: u16 = 0b0100_0000; // interrupt acknowledge cycle

/// The default length of a simple bus transaction: four clock cycles.
pub const CYCLE_STANDARD_LENGTH: HalfCycles = HalfCycles(8);

/// A single timed transaction on the processor bus.
///
/// Address and data are each optional; they are populated only when the
/// operation bits indicate that the corresponding signal group is exposed.
/// For read cycles the handler fills in the data field in place.
#[derive(Clone, Debug)]
pub struct BusCycle {
    pub operation: u16,
    pub address: Option<u32>,
    pub data: Option<u16>,
    pub length: HalfCycles,
}

impl BusCycle {
    /// A full word read from `address`.
    pub fn read_word(address: u32) -> Self {
        Self {
            operation: CYCLE_NEW_ADDRESS | CYCLE_SELECT_WORD | CYCLE_READ,
            address: Some(address),
            data: None,
            length: CYCLE_STANDARD_LENGTH,
        }
    }

    /// A full word write of `value` to `address`.
    pub fn write_word(address: u32, value: u16) -> Self {
        Self {
            operation: CYCLE_NEW_ADDRESS | CYCLE_SELECT_WORD,
            address: Some(address),
            data: Some(value),
            length: CYCLE_STANDARD_LENGTH,
        }
    }

    /// A single byte read from `address`. The low bit of the address selects
    /// the active data lane.
    pub fn read_byte(address: u32) -> Self {
        Self {
            operation: CYCLE_NEW_ADDRESS | CYCLE_SELECT_BYTE | CYCLE_READ,
            address: Some(address),
            data: None,
            length: CYCLE_STANDARD_LENGTH,
        }
    }

    /// A single byte write of `value` to `address`.
    pub fn write_byte(address: u32, value: u8) -> Self {
        Self {
            operation: CYCLE_NEW_ADDRESS | CYCLE_SELECT_BYTE,
            address: Some(address),
            data: Some(value as u16),
            length: CYCLE_STANDARD_LENGTH,
        }
    }

    /// An interrupt acknowledge cycle for the given level. No address or data
    /// is exposed; a handler that does not supply a vector leaves the data
    /// field empty and the core autovectors.
    pub fn interrupt_ack(level: u8) -> Self {
        Self {
            operation: CYCLE_INT_ACK | CYCLE_NEW_ADDRESS,
            address: Some(0xFFFF_FFF0 | ((level as u32) << 1)),
            data: None,
            length: CYCLE_STANDARD_LENGTH,
        }
    }

    /// A cycle with the reset output asserted.
    pub fn reset() -> Self {
        Self {
            operation: CYCLE_RESET,
            address: None,
            data: None,
            length: CYCLE_STANDARD_LENGTH,
        }
    }

    /// An idle (internal) cycle of the given length. Nothing is exposed on
    /// the bus; handlers still advance peripheral time by the cycle length.
    pub fn idle(length: HalfCycles) -> Self {
        Self {
            operation: 0,
            address: None,
            data: None,
            length,
        }
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        self.operation & CYCLE_READ != 0
    }

    /// True when this cycle drives data master-to-device.
    #[inline]
    pub fn is_write(&self) -> bool {
        (self.operation & (CYCLE_SELECT_BYTE | CYCLE_SELECT_WORD) != 0) && !self.is_read()
    }

    /// True when the address lines carry a valid address this cycle.
    #[inline]
    pub fn address_exposed(&self) -> bool {
        self.operation & (CYCLE_NEW_ADDRESS | CYCLE_SAME_ADDRESS) != 0
    }

    /// True when the data lines are active this cycle.
    #[inline]
    pub fn data_exposed(&self) -> bool {
        self.operation & (CYCLE_SELECT_BYTE | CYCLE_SELECT_WORD) != 0
    }

    /// The value currently on the data lines; open bus if nothing has been
    /// driven onto them.
    #[inline]
    pub fn value16(&self) -> u16 {
        self.data.unwrap_or(OPEN_BUS_WORD)
    }

    /// The byte on the active lane of a byte-select cycle.
    #[inline]
    pub fn value8(&self) -> u8 {
        (self.data.unwrap_or(OPEN_BUS_WORD as u16) & 0xFF) as u8
    }

    /// Drive a word onto the data lines. Ignored if the operation exposes no
    /// data, preserving the invariant that data is absent on such cycles.
    #[inline]
    pub fn set_value16(&mut self, value: u16) {
        if self.data_exposed() {
            self.data = Some(value);
        }
    }

    /// Drive a byte onto the active lane of a byte-select cycle.
    #[inline]
    pub fn set_value8(&mut self, value: u8) {
        if self.data_exposed() {
            self.data = Some((OPEN_BUS_WORD & 0xFF00) | value as u16);
        }
    }

    /// The word-aligned address for word-organized targets.
    #[inline]
    pub fn word_address(&self) -> u32 {
        self.address.unwrap_or(0) >> 1
    }
}

/// The capability a host machine supplies to a CPU core: perform one bus
/// cycle, returning the extra delay (wait states) the access incurred. The
/// core must add the returned delay to its own timing before proceeding.
///
/// The handler may mutate the cycle's data field in place to complete a read,
/// and may raise its reported interrupt level as a side effect; the core's
/// run loop samples `interrupt_level` after each cycle.
pub trait BusHandler {
    fn perform_cycle(&mut self, cycle: &mut BusCycle) -> HalfCycles;

    /// The aggregated interrupt level currently asserted to the CPU core.
    /// Polled, not pushed: the core samples this after each bus cycle.
    fn interrupt_level(&self) -> u8 {
        0
    }
}
