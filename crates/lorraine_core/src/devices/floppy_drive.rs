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

    devices::floppy_drive.rs

    Implements the physical floppy drive mechanism: head stepping against the
    track-zero stop, spindle rotation with an index pulse per revolution, and
    a decoded-byte sector store loaded from a flat image.

    The drive is clocked at the controller's reference rate; one drive cycle
    here is one cycle of that 1 MHz clock.

*/

use anyhow::{anyhow, Result};

/// Drive reference clock, in Hz.
pub const DRIVE_CLOCK_HZ: u32 = 1_000_000;
/// 300 RPM against the reference clock.
pub const CYCLES_PER_REVOLUTION: u32 = DRIVE_CLOCK_HZ * 60 / 300;

pub const DRIVE_TRACK_CT: u8 = 80;

pub const DEFAULT_SECTOR_SIZE: usize = 512;
pub const DEFAULT_SECTORS_PER_TRACK: u8 = 9;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepDirection {
    /// Toward the spindle; higher track numbers.
    In,
    /// Toward the edge; lower track numbers, ending at the track-zero stop.
    Out,
}

/// Events produced by a slice of drive rotation.
#[derive(Copy, Clone, Debug, Default)]
pub struct DriveEvents {
    /// Index holes that passed the sensor during the slice.
    pub index_holes: u32,
}

/// The abstract drive a disk controller is wired to.
///
/// Decoded-byte drives serve whole sectors; a flux-level drive would instead
/// feed the controller's bit input, which this interface leaves to the
/// controller's `process_input_bit` entry point.
pub trait DiskDrive {
    fn step(&mut self, direction: StepDirection);
    fn is_track_zero(&self) -> bool;
    fn current_track(&self) -> u8;

    fn set_motor(&mut self, on: bool);

    /// Advance the spindle by `cycles` drive cycles. No rotation occurs while
    /// the motor is off.
    fn run_for_cycles(&mut self, cycles: u32) -> DriveEvents;

    fn media_present(&self) -> bool;
    fn is_write_protected(&self) -> bool;

    /// The ID field of the sector currently passing the head, as
    /// (track, side, sector, size code).
    fn current_id(&self) -> Option<(u8, u8, u8, u8)>;

    /// Fetch the decoded contents of the addressed sector, or None if no
    /// such sector exists on the current physical track.
    fn read_sector(&mut self, track: u8, sector: u8) -> Option<Vec<u8>>;

    /// Commit `data` to the addressed sector.
    fn write_sector(&mut self, track: u8, sector: u8, data: &[u8]) -> Result<()>;

    fn sector_size(&self) -> usize;

    /// Attach a loaded image to the drive, replacing any current media.
    fn insert_media(&mut self, image: SectorImage) -> Result<()>;
}

/// A flat decoded-byte disk image: sectors stored in ascending track then
/// sector order, fixed geometry.
#[derive(Clone, Debug)]
pub struct SectorImage {
    pub sectors_per_track: u8,
    pub sector_size: usize,
    pub tracks: u8,
    data: Vec<u8>,
}

impl SectorImage {
    /// Build an image from raw bytes with the given geometry. The byte count
    /// must match the geometry exactly.
    pub fn from_bytes(data: Vec<u8>, tracks: u8, sectors_per_track: u8, sector_size: usize) -> Result<Self> {
        let expected = tracks as usize * sectors_per_track as usize * sector_size;
        if data.len() != expected {
            return Err(anyhow!(
                "image size {} does not match geometry ({} tracks x {} sectors x {} bytes)",
                data.len(),
                tracks,
                sectors_per_track,
                sector_size
            ));
        }
        Ok(Self {
            sectors_per_track,
            sector_size,
            tracks,
            data,
        })
    }

    /// Byte offset of a sector within the image. Sector IDs are 1-based on
    /// the media.
    fn sector_offset(&self, track: u8, sector: u8) -> Option<usize> {
        if track >= self.tracks || sector == 0 || sector > self.sectors_per_track {
            return None;
        }
        Some((track as usize * self.sectors_per_track as usize + (sector as usize - 1)) * self.sector_size)
    }

    pub fn read_sector(&self, track: u8, sector: u8) -> Option<&[u8]> {
        let offset = self.sector_offset(track, sector)?;
        Some(&self.data[offset..offset + self.sector_size])
    }

    pub fn write_sector(&mut self, track: u8, sector: u8, data: &[u8]) -> Result<()> {
        let size = self.sector_size;
        let offset = self
            .sector_offset(track, sector)
            .ok_or_else(|| anyhow!("sector {}/{} outside image geometry", track, sector))?;
        if data.len() != size {
            return Err(anyhow!("sector data length {} != sector size {}", data.len(), size));
        }
        self.data[offset..offset + size].copy_from_slice(data);
        Ok(())
    }
}

/// A concrete 80-track, single-head drive over a [SectorImage].
pub struct ImageDrive {
    track: u8,
    motor_on: bool,
    write_protected: bool,
    rotation_accum: u32,
    /// Sector rotating past the head; advanced once per revolution slice so
    /// that current_id varies the way a spinning disk's does.
    rotation_sector: u8,
    image: Option<SectorImage>,
}

impl Default for ImageDrive {
    fn default() -> Self {
        Self {
            track: 0,
            motor_on: false,
            write_protected: false,
            rotation_accum: 0,
            rotation_sector: 1,
            image: None,
        }
    }
}

impl ImageDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: SectorImage) -> Self {
        Self {
            image: Some(image),
            ..Self::default()
        }
    }

    pub fn set_write_protected(&mut self, write_protected: bool) {
        self.write_protected = write_protected;
    }
}

impl DiskDrive for ImageDrive {
    fn step(&mut self, direction: StepDirection) {
        match direction {
            StepDirection::In => {
                if self.track < DRIVE_TRACK_CT - 1 {
                    self.track += 1;
                }
            }
            StepDirection::Out => {
                self.track = self.track.saturating_sub(1);
            }
        }
    }

    fn is_track_zero(&self) -> bool {
        self.track == 0
    }

    fn current_track(&self) -> u8 {
        self.track
    }

    fn set_motor(&mut self, on: bool) {
        if on && !self.motor_on {
            log::trace!("drive motor on");
        }
        self.motor_on = on;
    }

    fn run_for_cycles(&mut self, cycles: u32) -> DriveEvents {
        if !self.motor_on {
            return DriveEvents::default();
        }

        let mut events = DriveEvents::default();
        self.rotation_accum += cycles;
        while self.rotation_accum >= CYCLES_PER_REVOLUTION {
            self.rotation_accum -= CYCLES_PER_REVOLUTION;
            events.index_holes += 1;
        }

        // Coarse angular position: which sector's ID field is at the head.
        if let Some(image) = &self.image {
            let spt = image.sectors_per_track.max(1) as u32;
            let sector_arc = CYCLES_PER_REVOLUTION / spt;
            self.rotation_sector = (self.rotation_accum / sector_arc.max(1)).min(spt - 1) as u8 + 1;
        }

        events
    }

    fn media_present(&self) -> bool {
        self.image.is_some()
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    fn current_id(&self) -> Option<(u8, u8, u8, u8)> {
        let image = self.image.as_ref()?;
        if self.track >= image.tracks {
            return None;
        }
        // Size code per the standard 128 << n encoding.
        let size_code = (image.sector_size.trailing_zeros().saturating_sub(7)) as u8;
        Some((self.track, 0, self.rotation_sector, size_code))
    }

    fn read_sector(&mut self, track: u8, sector: u8) -> Option<Vec<u8>> {
        // The controller addresses by its track register; the media only
        // yields data when the physical head is on that track.
        if track != self.track {
            return None;
        }
        self.image.as_ref()?.read_sector(track, sector).map(|s| s.to_vec())
    }

    fn write_sector(&mut self, track: u8, sector: u8, data: &[u8]) -> Result<()> {
        if track != self.track {
            return Err(anyhow!("head on track {}, write addressed to {}", self.track, track));
        }
        self.image
            .as_mut()
            .ok_or_else(|| anyhow!("no media present"))?
            .write_sector(track, sector, data)
    }

    fn sector_size(&self) -> usize {
        self.image.as_ref().map_or(DEFAULT_SECTOR_SIZE, |i| i.sector_size)
    }

    fn insert_media(&mut self, image: SectorImage) -> Result<()> {
        self.image = Some(image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn image_geometry_validated() {
        assert!(SectorImage::from_bytes(vec![0u8; 100], 80, 9, 512).is_err());
        assert!(blank_image().read_sector(0, 1).is_some());
        assert!(blank_image().read_sector(0, 0).is_none());
        assert!(blank_image().read_sector(0, DEFAULT_SECTORS_PER_TRACK + 1).is_none());
        assert!(blank_image().read_sector(DRIVE_TRACK_CT, 1).is_none());
    }

    #[test]
    fn head_stops_at_track_zero() {
        let mut drive = ImageDrive::new();
        assert!(drive.is_track_zero());
        drive.step(StepDirection::Out);
        assert!(drive.is_track_zero());
        drive.step(StepDirection::In);
        drive.step(StepDirection::In);
        assert_eq!(drive.current_track(), 2);
        drive.step(StepDirection::Out);
        assert_eq!(drive.current_track(), 1);
    }

    #[test]
    fn no_rotation_with_motor_off() {
        let mut drive = ImageDrive::with_image(blank_image());
        let events = drive.run_for_cycles(CYCLES_PER_REVOLUTION * 2);
        assert_eq!(events.index_holes, 0);

        drive.set_motor(true);
        let events = drive.run_for_cycles(CYCLES_PER_REVOLUTION * 2);
        assert_eq!(events.index_holes, 2);
    }

    #[test]
    fn index_pulse_accumulates_across_slices() {
        let mut drive = ImageDrive::with_image(blank_image());
        drive.set_motor(true);

        let mut holes = 0;
        for _ in 0..4 {
            holes += drive.run_for_cycles(CYCLES_PER_REVOLUTION / 2).index_holes;
        }
        assert_eq!(holes, 2);
    }

    #[test]
    fn sector_roundtrip_on_current_track_only() {
        let mut drive = ImageDrive::with_image(blank_image());
        let payload = vec![0xA5u8; DEFAULT_SECTOR_SIZE];

        drive.write_sector(0, 3, &payload).unwrap();
        assert_eq!(drive.read_sector(0, 3).unwrap(), payload);

        // Head is on track 0; track 5 is not under it.
        assert!(drive.read_sector(5, 1).is_none());
        assert!(drive.write_sector(5, 1, &payload).is_err());
    }

    #[test]
    fn write_protect_flag() {
        let mut drive = ImageDrive::new();
        assert!(!drive.is_write_protected());
        drive.set_write_protected(true);
        assert!(drive.is_write_protected());
    }
}
