//! Machine configuration and user preferences.

use serde::{Deserialize, Serialize};

use crate::lowmem::ROM_BASE;
use crate::Result;

/// The two preferences this layer consumes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Prefs {
    /// Enable the decoded-instruction cache.
    #[serde(default)]
    pub jit: bool,
    /// Skip (instead of dying on) unknown guest memory faults from Mac
    /// code.
    #[serde(default)]
    pub ignoresegv: bool,
}

/// ROM flavour; selects the nanokernel interrupt entry point.
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RomType {
    NewWorld,
    OldWorld,
}

impl RomType {
    /// ROM address of the nanokernel interrupt routine.
    pub fn interrupt_entry(self) -> u32 {
        match self {
            RomType::NewWorld => ROM_BASE + 0x312b1c,
            RomType::OldWorld => ROM_BASE + 0x312a3c,
        }
    }
}

fn default_rom_type() -> RomType {
    RomType::NewWorld
}

fn default_ram_base() -> u32 {
    0x2000_0000
}

fn default_ram_size() -> u32 {
    0x0400_0000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub prefs: Prefs,
    #[serde(default = "default_rom_type")]
    pub rom_type: RomType,
    /// Run interrupts on a dedicated second engine.
    #[serde(default)]
    pub multicore: bool,
    #[serde(default = "default_ram_base")]
    pub ram_base: u32,
    #[serde(default = "default_ram_size")]
    pub ram_size: u32,
    /// Base of the alternate stack used while inside the nanokernel
    /// interrupt routine; 0 picks a default near the top of RAM.
    #[serde(default)]
    pub alt_stack_base: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            prefs: Prefs::default(),
            rom_type: default_rom_type(),
            multicore: false,
            ram_base: default_ram_base(),
            ram_size: default_ram_size(),
            alt_stack_base: 0,
        }
    }
}

impl MachineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn alt_stack(&self) -> u32 {
        if self.alt_stack_base != 0 {
            self.alt_stack_base
        } else {
            self.ram_base + self.ram_size - 0x4000
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_defaults() {
        let config =
            MachineConfig::from_json(r#"{"prefs": {"jit": true}, "rom_type": "old-world"}"#)
                .unwrap();
        assert!(config.prefs.jit);
        assert!(!config.prefs.ignoresegv);
        assert_eq!(config.rom_type, RomType::OldWorld);
        assert_eq!(config.ram_base, 0x2000_0000);
    }

    #[test]
    fn interrupt_entry_depends_on_rom_type() {
        assert_eq!(RomType::NewWorld.interrupt_entry(), ROM_BASE + 0x312b1c);
        assert_eq!(RomType::OldWorld.interrupt_entry(), ROM_BASE + 0x312a3c);
    }
}
