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

    machine_config.rs

    Machine configuration and the target descriptor consumed by machine
    construction. The host's media-classification layer produces a target;
    hosts may also deserialize one from a TOML configuration fragment.

*/

use anyhow::{Context, Result};
use serde_derive::Deserialize;

fn default_chip_ram_kb() -> u32 {
    512
}

#[derive(Clone, Debug, Deserialize)]
pub struct MachineConfig {
    pub machine: MachineSection,
    #[serde(default)]
    pub floppy: FloppySection,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MachineSection {
    /// Name of the boot ROM to request from the ROM fetcher.
    pub rom: String,
    /// Chip RAM size in kilobytes.
    #[serde(default = "default_chip_ram_kb")]
    pub chip_ram: u32,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FloppySection {
    #[serde(default)]
    pub write_protect: bool,
}

impl MachineConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("parsing machine configuration")
    }

    pub fn to_target(&self) -> MachineTarget {
        MachineTarget {
            rom: self.machine.rom.clone(),
            chip_ram_kb: self.machine.chip_ram,
            floppy_write_protect: self.floppy.write_protect,
        }
    }
}

/// What to build: the resolved descriptor handed to `Machine::new`.
#[derive(Clone, Debug)]
pub struct MachineTarget {
    pub rom: String,
    pub chip_ram_kb: u32,
    pub floppy_write_protect: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_roundtrip_with_defaults() {
        let config = MachineConfig::from_toml_str(
            r#"
            [machine]
            rom = "kick13"
            "#,
        )
        .unwrap();

        let target = config.to_target();
        assert_eq!(target.rom, "kick13");
        assert_eq!(target.chip_ram_kb, 512);
        assert!(!target.floppy_write_protect);
    }

    #[test]
    fn toml_explicit_fields() {
        let config = MachineConfig::from_toml_str(
            r#"
            [machine]
            rom = "kick12"
            chip_ram = 1024

            [floppy]
            write_protect = true
            "#,
        )
        .unwrap();

        let target = config.to_target();
        assert_eq!(target.chip_ram_kb, 1024);
        assert!(target.floppy_write_protect);
    }

    #[test]
    fn toml_missing_rom_is_an_error() {
        assert!(MachineConfig::from_toml_str("[machine]\n").is_err());
    }
}
