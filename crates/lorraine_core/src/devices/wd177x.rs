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

    devices::wd177x.rs

    Implements a WD1770-class floppy disk controller.

    The controller advances in fixed quanta of the 8 MHz input clock; one
    internal micro-step per eight input cycles. Each micro-step also clocks
    the attached drive by one drive cycle while the motor is on, which keeps
    controller cadence decoupled from the raw input clock rate.

    Command dispatch and the Type 1 seek/step state sequence follow the
    command encoding table:

        +------+----------+-------------------------+
        !      !          !          BITS           !
        ! TYPE ! COMMAND  !  7  6  5  4  3  2  1  0 !
        +------+----------+-------------------------+
        !  1   ! Restore  !  0  0  0  0  h  v r1 r0 !
        !  1   ! Seek     !  0  0  0  1  h  v r1 r0 !
        !  1   ! Step     !  0  0  1  u  h  v r1 r0 !
        !  1   ! Step-in  !  0  1  0  u  h  v r1 r0 !
        !  1   ! Step-out !  0  1  1  u  h  v r1 r0 !
        !  2   ! Rd sectr !  1  0  0  m  h  E  0  0 !
        !  2   ! Wt sectr !  1  0  1  m  h  E  P a0 !
        !  3   ! Rd addr  !  1  1  0  0  h  E  0  0 !
        !  3   ! Rd track !  1  1  1  0  h  E  0  0 !
        !  3   ! Wt track !  1  1  1  1  h  E  P  0 !
        !  4   ! Forc int !  1  1  0  1 i3 i2 i1 i0 !
        +------+----------+-------------------------+

*/

use crate::devices::floppy_drive::{DiskDrive, StepDirection};

use modular_bitfield::prelude::*;

/// Input clock cycles per internal micro-step.
pub const CYCLES_PER_QUANTUM: u32 = 8;

/// Index pulses counted during motor spin-up.
pub const SPIN_UP_INDEX_PULSES: u32 = 6;
/// Index pulses allowed for a sector search before record-not-found.
pub const LOCATE_TIMEOUT_PULSES: u32 = 5;
/// Head settle delay applied when a command's E bit is set, in quanta.
pub const HEAD_SETTLE_QUANTA: u32 = 30;
/// Inter-byte pacing of a sector transfer, in quanta.
pub const BYTE_CELL_QUANTA: u32 = 4;

// Status register bits. Bits 2, 4 and 5 are overloaded between the Type 1
// and Type 2/3 presentations, as on the hardware.
pub const STATUS_BUSY: u8 = 0b0000_0001;
pub const STATUS_DATA_REQUEST: u8 = 0b0000_0010;
pub const STATUS_TRACK_ZERO: u8 = 0b0000_0100; // Type 1
pub const STATUS_LOST_DATA: u8 = 0b0000_0100; // Type 2/3
pub const STATUS_CRC_ERROR: u8 = 0b0000_1000;
pub const STATUS_RECORD_NOT_FOUND: u8 = 0b0001_0000;
pub const STATUS_SPIN_UP: u8 = 0b0010_0000; // Type 1
pub const STATUS_WRITE_PROTECT: u8 = 0b0100_0000;
pub const STATUS_MOTOR_ON: u8 = 0b1000_0000;

/// Type 1 command byte fields.
#[bitfield]
#[derive(Copy, Clone)]
pub struct Type1Command {
    pub step_rate: B2,
    pub verify: bool,
    pub h: bool,
    pub update: bool,
    pub opcode: B3,
}

/// Type 2 command byte fields.
#[bitfield]
#[derive(Copy, Clone)]
pub struct Type2Command {
    pub a0: bool,
    pub precompensate: bool,
    pub settle: bool,
    pub h: bool,
    pub multiple: bool,
    pub opcode: B3,
}

/// Micro-states of the controller sequencer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum ControllerState {
    Waiting,
    WaitForSixIndexPulses,
    BeginType1,
    BeginType1PostSpin,
    TestTrack,
    TestDirection,
    TestHead,
    StepDelay,
    TestVerify,
    VerifyTrack,
    BeginType2,
    TestPause,
    HeadSettle,
    TestWrite,
    LocateSector,
    ReadSectorByte,
    WriteSectorByte,
    BeginType3,
    ReadAddress,
    ReadTrack,
    WriteTrack,
}

/// A WD1770-class controller bound to a single drive.
pub struct FloppyController {
    state: ControllerState,
    status: u8,
    command: u8,
    has_command: bool,

    track: u8,
    sector: u8,
    data: u8,
    data_shift_register: u8,

    is_step_in: bool,
    step_delay_count: u32,
    settle_count: u32,

    index_pulse_count: u32,
    wait_six_next_state: ControllerState,

    cycle_accum: u32,
    interrupt_request: bool,

    // One-shot diagnostic for unhandled sequencer states; rearmed by reset.
    invalid_state_logged: bool,

    transfer_buf: Vec<u8>,
    transfer_pos: usize,
    transfer_len: usize,
    byte_delay: u32,
    locate_pulse_deadline: u32,

    drive: Box<dyn DiskDrive>,
}

impl FloppyController {
    pub fn new(drive: Box<dyn DiskDrive>) -> Self {
        Self {
            state: ControllerState::Waiting,
            status: 0,
            command: 0,
            has_command: false,
            track: 0,
            sector: 0,
            data: 0,
            data_shift_register: 0,
            is_step_in: false,
            step_delay_count: 0,
            settle_count: 0,
            index_pulse_count: 0,
            wait_six_next_state: ControllerState::Waiting,
            cycle_accum: 0,
            interrupt_request: false,
            invalid_state_logged: false,
            transfer_buf: Vec::new(),
            transfer_pos: 0,
            transfer_len: 0,
            byte_delay: 0,
            locate_pulse_deadline: 0,
            drive,
        }
    }

    pub fn reset(&mut self) {
        self.state = ControllerState::Waiting;
        self.status = 0;
        self.command = 0;
        self.has_command = false;
        self.track = 0;
        self.sector = 0;
        self.data = 0;
        self.interrupt_request = false;
        self.invalid_state_logged = false;
        self.cycle_accum = 0;
        self.index_pulse_count = 0;
        self.transfer_buf.clear();
        self.transfer_pos = 0;
        self.transfer_len = 0;
        self.drive.set_motor(false);
    }

    /// Register write. Register 0 latches a pending command; a force
    /// interrupt command takes effect immediately, even mid-command.
    pub fn set_register(&mut self, address: u32, value: u8) {
        match address & 3 {
            0 => {
                if value & 0xF0 == 0xD0 {
                    self.force_interrupt(value);
                }
                else {
                    self.command = value;
                    self.has_command = true;
                    self.interrupt_request = false;
                }
            }
            1 => self.track = value,
            2 => self.sector = value,
            3 => {
                self.data = value;
                self.status &= !STATUS_DATA_REQUEST;
            }
            _ => unreachable!(),
        }
    }

    /// Register read. Reading the status register clears the interrupt
    /// output; reading the data register services a pending data request.
    pub fn get_register(&mut self, address: u32) -> u8 {
        match address & 3 {
            1 => self.track,
            2 => self.sector,
            3 => {
                self.status &= !STATUS_DATA_REQUEST;
                self.data
            }
            _ => {
                self.interrupt_request = false;
                self.status
            }
        }
    }

    #[inline]
    pub fn interrupt_request(&self) -> bool {
        self.interrupt_request
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[inline]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// The attached drive, for media management by the host.
    pub fn drive_mut(&mut self) -> &mut dyn DiskDrive {
        self.drive.as_mut()
    }

    /// Raw flux transition input from a bit-level drive. Decoded-byte drives
    /// never call this; the sector data path below serves whole bytes.
    pub fn process_input_bit(&mut self, _value: u8, _cycles_since_index_hole: u32) {}

    /// Index-hole notification from the drive. The counter advances
    /// unconditionally; only the spin-up wait state consumes it.
    pub fn process_index_hole(&mut self) {
        self.index_pulse_count += 1;

        if self.state == ControllerState::WaitForSixIndexPulses
            && self.index_pulse_count == SPIN_UP_INDEX_PULSES
        {
            if self.command & 0x80 == 0 {
                self.status |= STATUS_SPIN_UP;
            }
            self.state = self.wait_six_next_state;
        }
    }

    /// Advance the controller by `cycles` input clock cycles.
    pub fn run_for_cycles(&mut self, cycles: u32) {
        use ControllerState::*;

        self.cycle_accum += cycles;
        while self.cycle_accum >= CYCLES_PER_QUANTUM {
            self.cycle_accum -= CYCLES_PER_QUANTUM;

            if self.status & STATUS_MOTOR_ON != 0 {
                let events = self.drive.run_for_cycles(1);
                for _ in 0..events.index_holes {
                    self.process_index_hole();
                }
            }

            match self.state {
                Waiting => {
                    if self.has_command {
                        self.has_command = false;
                        self.state = if self.command & 0x80 != 0 {
                            if self.command & 0x40 != 0 {
                                BeginType3
                            }
                            else {
                                BeginType2
                            }
                        }
                        else {
                            BeginType1
                        };
                    }
                }

                WaitForSixIndexPulses => {
                    self.status |= STATUS_MOTOR_ON;
                    self.drive.set_motor(true);
                    // Deliberately empty otherwise; the transition lives in
                    // process_index_hole.
                }

                // Type 1: restore/seek/step family.
                BeginType1 => {
                    self.status |= STATUS_BUSY | STATUS_MOTOR_ON;
                    self.status &= !(STATUS_DATA_REQUEST | STATUS_CRC_ERROR);
                    self.drive.set_motor(true);
                    self.interrupt_request = false;
                    self.state = BeginType1PostSpin;
                    if Type1Command::from_bytes([self.command]).h() {
                        self.wait_six_next_state = self.state;
                        self.index_pulse_count = 0;
                        self.state = WaitForSixIndexPulses;
                    }
                }

                BeginType1PostSpin => {
                    match self.command >> 4 {
                        0 => {
                            // Restore: target track 0 from a forced 0xff.
                            self.track = 0xFF;
                            self.data = 0x00;
                        }
                        1 => {} // Seek: target already in the data register.
                        2 | 3 => {} // Step: repeat the last direction.
                        4 | 5 => self.is_step_in = true,
                        6 | 7 => self.is_step_in = false,
                        _ => unreachable!(),
                    }

                    if self.command >> 5 == 0 {
                        self.state = TestTrack;
                    }
                    else {
                        self.state = if self.command & 0x10 != 0 { TestDirection } else { TestHead };
                    }
                }

                TestTrack => {
                    self.data_shift_register = self.data;
                    if self.track == self.data_shift_register {
                        self.state = TestVerify;
                    }
                    else {
                        self.is_step_in = self.data_shift_register > self.track;
                        self.state = TestDirection;
                    }
                }

                TestDirection => {
                    self.track = if self.is_step_in {
                        self.track.wrapping_add(1)
                    }
                    else {
                        self.track.wrapping_sub(1)
                    };
                    self.state = TestHead;
                }

                TestHead => {
                    if self.drive.is_track_zero() && !self.is_step_in {
                        self.track = 0;
                        self.state = TestVerify;
                    }
                    else {
                        self.drive.step(if self.is_step_in {
                            StepDirection::In
                        }
                        else {
                            StepDirection::Out
                        });
                        self.state = StepDelay;
                        self.step_delay_count = 0;
                    }
                }

                StepDelay => {
                    if self.step_delay_count == Type1Command::from_bytes([self.command]).step_rate() as u32 {
                        self.state = if self.command >> 5 != 0 { TestVerify } else { TestTrack };
                    }
                    self.step_delay_count += 1;
                }

                TestVerify => {
                    if Type1Command::from_bytes([self.command]).verify() {
                        self.state = VerifyTrack;
                    }
                    else {
                        self.complete_type1();
                    }
                }

                VerifyTrack => {
                    // Re-read the head position against the track register.
                    if self.drive.media_present() && self.drive.current_track() == self.track {
                        self.status &= !STATUS_CRC_ERROR;
                    }
                    else {
                        self.status |= STATUS_RECORD_NOT_FOUND;
                    }
                    self.complete_type1();
                }

                // Type 2: sector read/write family.
                BeginType2 => {
                    self.status |= STATUS_BUSY | STATUS_MOTOR_ON;
                    self.status &= !(STATUS_DATA_REQUEST
                        | STATUS_LOST_DATA
                        | STATUS_RECORD_NOT_FOUND
                        | STATUS_CRC_ERROR
                        | STATUS_WRITE_PROTECT);
                    self.drive.set_motor(true);
                    self.interrupt_request = false;
                    self.state = TestPause;
                    if !Type2Command::from_bytes([self.command]).h() {
                        self.wait_six_next_state = self.state;
                        self.index_pulse_count = 0;
                        self.state = WaitForSixIndexPulses;
                    }
                }

                TestPause => {
                    if Type2Command::from_bytes([self.command]).settle() {
                        self.settle_count = HEAD_SETTLE_QUANTA;
                        self.state = HeadSettle;
                    }
                    else {
                        self.state = TestWrite;
                    }
                }

                HeadSettle => {
                    if self.settle_count == 0 {
                        self.state = TestWrite;
                    }
                    else {
                        self.settle_count -= 1;
                    }
                }

                TestWrite => {
                    if self.command & 0x20 != 0 {
                        if self.drive.is_write_protected() {
                            self.status |= STATUS_WRITE_PROTECT;
                            self.complete_type2();
                        }
                        else {
                            self.transfer_buf.clear();
                            self.transfer_len = self.drive.sector_size();
                            self.status |= STATUS_DATA_REQUEST;
                            self.byte_delay = BYTE_CELL_QUANTA;
                            self.state = WriteSectorByte;
                        }
                    }
                    else {
                        self.locate_pulse_deadline = self.index_pulse_count + LOCATE_TIMEOUT_PULSES;
                        self.state = LocateSector;
                    }
                }

                LocateSector => {
                    if let Some(buf) = self.drive.read_sector(self.track, self.sector) {
                        self.transfer_buf = buf;
                        self.transfer_pos = 0;
                        self.byte_delay = BYTE_CELL_QUANTA;
                        self.state = ReadSectorByte;
                    }
                    else if self.index_pulse_count >= self.locate_pulse_deadline {
                        self.status |= STATUS_RECORD_NOT_FOUND;
                        self.complete_type2();
                    }
                }

                ReadSectorByte => {
                    if self.byte_delay > 0 {
                        self.byte_delay -= 1;
                        continue;
                    }
                    if self.status & STATUS_DATA_REQUEST != 0 {
                        // The previous byte was never collected. The shifter
                        // keeps going regardless.
                        self.status |= STATUS_LOST_DATA;
                    }
                    self.data = self.transfer_buf[self.transfer_pos];
                    self.transfer_pos += 1;
                    self.status |= STATUS_DATA_REQUEST;

                    if self.transfer_pos == self.transfer_buf.len() {
                        if self.command & 0x80 != 0 && Type2Command::from_bytes([self.command]).multiple() {
                            // Multiple-sector read: advance and search again.
                            // Running off the end of the track terminates
                            // record-not-found, as on hardware.
                            self.sector = self.sector.wrapping_add(1);
                            self.locate_pulse_deadline = self.index_pulse_count + LOCATE_TIMEOUT_PULSES;
                            self.state = LocateSector;
                        }
                        else {
                            self.complete_type2();
                        }
                    }
                    else {
                        self.byte_delay = BYTE_CELL_QUANTA;
                    }
                }

                WriteSectorByte => {
                    if self.byte_delay > 0 {
                        self.byte_delay -= 1;
                        continue;
                    }
                    if self.status & STATUS_DATA_REQUEST != 0 {
                        // Host missed the byte cell.
                        self.status |= STATUS_LOST_DATA;
                        self.complete_type2();
                        continue;
                    }
                    self.transfer_buf.push(self.data);
                    if self.transfer_buf.len() == self.transfer_len {
                        let buf = std::mem::take(&mut self.transfer_buf);
                        if let Err(e) = self.drive.write_sector(self.track, self.sector, &buf) {
                            log::warn!("sector write failed: {}", e);
                            self.status |= STATUS_RECORD_NOT_FOUND;
                        }
                        self.complete_type2();
                    }
                    else {
                        self.status |= STATUS_DATA_REQUEST;
                        self.byte_delay = BYTE_CELL_QUANTA;
                    }
                }

                // Type 3: track-level commands.
                BeginType3 => {
                    self.status |= STATUS_BUSY | STATUS_MOTOR_ON;
                    self.status &= !(STATUS_DATA_REQUEST
                        | STATUS_LOST_DATA
                        | STATUS_RECORD_NOT_FOUND
                        | STATUS_CRC_ERROR);
                    self.drive.set_motor(true);
                    self.interrupt_request = false;

                    self.state = match self.command >> 4 {
                        0b1100 => ReadAddress,
                        0b1110 => ReadTrack,
                        _ => WriteTrack,
                    };
                    if self.command & 0x08 == 0 {
                        self.wait_six_next_state = self.state;
                        self.index_pulse_count = 0;
                        self.state = WaitForSixIndexPulses;
                    }
                }

                ReadAddress => {
                    if let Some((track, side, sector, size_code)) = self.drive.current_id() {
                        // Six ID bytes delivered through the data register;
                        // the CRC bytes of a decoded-byte source are inert.
                        self.transfer_buf = vec![track, side, sector, size_code, 0x00, 0x00];
                        self.transfer_pos = 0;
                        self.byte_delay = BYTE_CELL_QUANTA;
                        self.state = ReadSectorByte;
                    }
                    else {
                        self.status |= STATUS_RECORD_NOT_FOUND;
                        self.complete_type2();
                    }
                }

                ReadTrack | WriteTrack => {
                    // Not modeled in this controller revision. Flag the gap
                    // once, then stop making progress this tick.
                    if !self.invalid_state_logged {
                        log::error!("unhandled controller state: {}", self.state);
                        self.invalid_state_logged = true;
                    }
                    return;
                }
            }
        }
    }

    fn complete_type1(&mut self) {
        if self.drive.is_track_zero() {
            self.status |= STATUS_TRACK_ZERO;
        }
        else {
            self.status &= !STATUS_TRACK_ZERO;
        }
        self.status &= !STATUS_BUSY;
        self.interrupt_request = true;
        self.state = ControllerState::Waiting;
    }

    fn complete_type2(&mut self) {
        self.status &= !STATUS_BUSY;
        self.interrupt_request = true;
        self.state = ControllerState::Waiting;
    }

    /// Force interrupt: terminate any command in progress. Only the
    /// immediate-interrupt condition bit is honored by this revision; the
    /// index/ready conditions are ignored.
    fn force_interrupt(&mut self, value: u8) {
        self.state = ControllerState::Waiting;
        self.has_command = false;
        self.status &= !STATUS_BUSY;
        if value & 0x08 != 0 {
            self.interrupt_request = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::floppy_drive::{
        ImageDrive,
        SectorImage,
        DEFAULT_SECTORS_PER_TRACK,
        DEFAULT_SECTOR_SIZE,
        DRIVE_TRACK_CT,
    };

    fn blank_image() -> SectorImage {
        let size = DRIVE_TRACK_CT as usize * DEFAULT_SECTORS_PER_TRACK as usize * DEFAULT_SECTOR_SIZE;
        SectorImage::from_bytes(
            vec![0u8; size],
            DRIVE_TRACK_CT,
            DEFAULT_SECTORS_PER_TRACK,
            DEFAULT_SECTOR_SIZE,
        )
        .unwrap()
    }

    fn controller_with_media() -> FloppyController {
        FloppyController::new(Box::new(ImageDrive::with_image(blank_image())))
    }

    fn controller_with_head_at(track: u8) -> FloppyController {
        let mut drive = ImageDrive::with_image(blank_image());
        for _ in 0..track {
            drive.step(StepDirection::In);
        }
        FloppyController::new(Box::new(drive))
    }

    // Enough input cycles for any seek to finish: generous but bounded.
    const PLENTY: u32 = CYCLES_PER_QUANTUM * 8192;

    #[test]
    fn restore_returns_head_and_track_to_zero() {
        let mut fdc = controller_with_head_at(5);
        fdc.set_register(1, 5); // track register agrees with the head

        fdc.set_register(0, 0x00); // restore, no spin-up wait, no verify
        fdc.run_for_cycles(PLENTY);

        assert_eq!(fdc.state(), ControllerState::Waiting);
        assert_eq!(fdc.get_register(1), 0);
        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert_ne!(fdc.status() & STATUS_TRACK_ZERO, 0);
        assert!(fdc.interrupt_request());
    }

    #[test]
    fn restore_is_bounded_by_step_delay() {
        let mut fdc = controller_with_head_at(3);
        fdc.set_register(1, 3);
        fdc.set_register(0, 0x00);

        // Three steps at rate 0 plus sequencer overhead; a couple hundred
        // quanta is far more than enough, and far less than a full seek.
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 256);
        assert_eq!(fdc.state(), ControllerState::Waiting);
        assert_eq!(fdc.get_register(1), 0);
    }

    #[test]
    fn seek_to_current_track_takes_equality_path() {
        // Seek with target == track register: TestTrack sees equality and
        // completes without moving the head.
        let mut fdc = controller_with_head_at(5);
        fdc.set_register(1, 5);
        fdc.set_register(3, 5);

        fdc.set_register(0, 0x13); // seek, no spin-up wait, no verify, rate 3
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 64);

        assert_eq!(fdc.state(), ControllerState::Waiting);
        assert_eq!(fdc.get_register(1), 5);
        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert!(fdc.interrupt_request());
    }

    #[test]
    fn seek_walks_track_register_to_target() {
        let mut fdc = controller_with_head_at(2);
        fdc.set_register(1, 2);
        fdc.set_register(3, 9);

        fdc.set_register(0, 0x10); // seek
        fdc.run_for_cycles(PLENTY);

        assert_eq!(fdc.get_register(1), 9);
        assert_eq!(fdc.status() & STATUS_BUSY, 0);
    }

    #[test]
    fn six_index_pulses_release_spin_up_wait() {
        let mut fdc = controller_with_media();

        // Type 1 with the spin-up bit set parks in the wait state.
        fdc.set_register(0, 0x08);
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 4);
        assert_eq!(fdc.state(), ControllerState::WaitForSixIndexPulses);
        assert_ne!(fdc.status() & STATUS_MOTOR_ON, 0);

        for _ in 0..5 {
            fdc.process_index_hole();
        }
        assert_eq!(fdc.state(), ControllerState::WaitForSixIndexPulses);

        fdc.process_index_hole();
        assert_ne!(fdc.state(), ControllerState::WaitForSixIndexPulses);
        assert_ne!(fdc.status() & STATUS_SPIN_UP, 0);
    }

    #[test]
    fn index_pulse_counter_inert_outside_wait_state() {
        let mut fdc = controller_with_media();
        for _ in 0..20 {
            fdc.process_index_hole();
        }
        assert_eq!(fdc.state(), ControllerState::Waiting);
        assert_eq!(fdc.status(), 0);
    }

    #[test]
    fn read_sector_delivers_bytes_with_data_requests() {
        let mut image = blank_image();
        let payload: Vec<u8> = (0..DEFAULT_SECTOR_SIZE).map(|i| (i & 0xFF) as u8).collect();
        image.write_sector(0, 2, &payload).unwrap();

        let mut fdc = FloppyController::new(Box::new(ImageDrive::with_image(image)));
        fdc.set_register(2, 2); // sector register
        fdc.set_register(0, 0x88); // read sector, no spin-up wait

        let mut read_back = Vec::new();
        let mut guard = 0;
        while read_back.len() < DEFAULT_SECTOR_SIZE && guard < 1_000_000 {
            fdc.run_for_cycles(CYCLES_PER_QUANTUM);
            if fdc.get_register(0) & STATUS_DATA_REQUEST != 0 {
                read_back.push(fdc.get_register(3));
            }
            guard += 1;
        }

        assert_eq!(read_back, payload);
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 4);
        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert_eq!(fdc.status() & STATUS_LOST_DATA, 0);
    }

    #[test]
    fn unserviced_data_request_sets_lost_data() {
        let mut fdc = controller_with_media();
        fdc.set_register(2, 1);
        fdc.set_register(0, 0x88);

        // Never read the data register; the shifter runs to completion
        // anyway, flagging lost data.
        fdc.run_for_cycles(PLENTY);
        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert_ne!(fdc.status() & STATUS_LOST_DATA, 0);
    }

    #[test]
    fn read_missing_sector_terminates_record_not_found() {
        let mut fdc = FloppyController::new(Box::new(ImageDrive::new()));
        fdc.set_register(2, 1);
        fdc.set_register(0, 0x88);

        // No media: the search times out after five index pulses, which
        // takes five revolutions of drive rotation.
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 1_100_000);
        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert_ne!(fdc.status() & STATUS_RECORD_NOT_FOUND, 0);
        assert!(fdc.interrupt_request());
    }

    #[test]
    fn write_sector_commits_host_bytes() {
        let mut fdc = controller_with_media();
        fdc.set_register(2, 3);
        fdc.set_register(0, 0xA8); // write sector, no spin-up wait

        let mut written = 0usize;
        let mut guard = 0;
        while written < DEFAULT_SECTOR_SIZE && guard < 1_000_000 {
            fdc.run_for_cycles(CYCLES_PER_QUANTUM);
            if fdc.get_register(0) & STATUS_DATA_REQUEST != 0 {
                fdc.set_register(3, 0x5A);
                written += 1;
            }
            guard += 1;
        }
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 8);

        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert_eq!(fdc.status() & STATUS_LOST_DATA, 0);

        // The committed sector reads back through a read command.
        fdc.set_register(0, 0x88);
        let mut read_back = Vec::new();
        let mut guard = 0;
        while read_back.len() < DEFAULT_SECTOR_SIZE && guard < 1_000_000 {
            fdc.run_for_cycles(CYCLES_PER_QUANTUM);
            if fdc.get_register(0) & STATUS_DATA_REQUEST != 0 {
                read_back.push(fdc.get_register(3));
            }
            guard += 1;
        }
        assert!(read_back.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn write_protected_media_aborts_write() {
        let mut drive = ImageDrive::with_image(blank_image());
        drive.set_write_protected(true);
        let mut fdc = FloppyController::new(Box::new(drive));

        fdc.set_register(2, 1);
        fdc.set_register(0, 0xA8);
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 16);

        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert_ne!(fdc.status() & STATUS_WRITE_PROTECT, 0);
    }

    #[test]
    fn force_interrupt_terminates_command() {
        let mut fdc = controller_with_head_at(10);
        fdc.set_register(1, 10);
        fdc.set_register(3, 70);
        fdc.set_register(0, 0x10); // long seek
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 8);
        assert_ne!(fdc.get_register(0) & STATUS_BUSY, 0);

        fdc.set_register(0, 0xD8); // force interrupt, immediate
        assert_eq!(fdc.status() & STATUS_BUSY, 0);
        assert_eq!(fdc.state(), ControllerState::Waiting);
        assert!(fdc.interrupt_request());
    }

    #[test]
    fn status_read_clears_interrupt() {
        let mut fdc = controller_with_head_at(1);
        fdc.set_register(1, 1);
        fdc.set_register(0, 0x00);
        fdc.run_for_cycles(PLENTY);
        assert!(fdc.interrupt_request());

        fdc.get_register(0);
        assert!(!fdc.interrupt_request());
    }

    #[test]
    fn unhandled_state_logs_once_and_halts_tick() {
        let mut fdc = controller_with_media();
        fdc.set_register(0, 0xE8); // read track: unmodeled state
        fdc.run_for_cycles(PLENTY);

        // Busy remains; the sequencer is wedged by design until reset or
        // force interrupt, and the diagnostic latch is set.
        assert_ne!(fdc.status() & STATUS_BUSY, 0);
        assert!(fdc.invalid_state_logged);
        assert_eq!(fdc.state(), ControllerState::ReadTrack);

        fdc.reset();
        assert!(!fdc.invalid_state_logged);
        assert_eq!(fdc.state(), ControllerState::Waiting);
    }

    #[test]
    fn step_commands_move_one_track() {
        let mut fdc = controller_with_head_at(4);
        fdc.set_register(1, 4);

        fdc.set_register(0, 0x50); // step-in, update track register
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 64);
        assert_eq!(fdc.get_register(1), 5);
        assert_eq!(fdc.status() & STATUS_BUSY, 0);

        fdc.set_register(0, 0x70); // step-out, update track register
        fdc.run_for_cycles(CYCLES_PER_QUANTUM * 64);
        assert_eq!(fdc.get_register(1), 4);
    }
}
