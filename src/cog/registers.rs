//! Cog special-register file.
//!
//! Every cog sees a 32-long register window at the top of cog address
//! space (0x1E0–0x1FF). The hardware registers live at 0x1F0 and up; the
//! lower half is reserved, and two reserved slots are used as scratch for
//! cog identity and the interpreter init-frame cursor. `CNT`, `INA` and
//! `INB` always read live through the hub.

use crate::hub::Hub;

/// First cog address covered by the register window.
pub const REGISTER_BASE: u32 = 0x1E0;

/// Number of longs in the window.
pub const REGISTER_COUNT: usize = 32;

/// Base of the 16 hardware registers reachable through the SPR opcodes.
pub const SPR_BASE: u32 = 0x1F0;

/// Cog identity scratch register (reserved window).
pub const COGID: u32 = 0x1E9;
/// Interpreter init-frame cursor recorded at boot (reserved window).
pub const INITCOGID: u32 = 0x1EF;

/// Boot parameter.
pub const PAR: u32 = 0x1F0;
/// System counter; reads live through the hub.
pub const CNT: u32 = 0x1F1;
/// Pin bus A input; reads live through the hub.
pub const INA: u32 = 0x1F2;
/// Pin bus B input; reads live through the hub.
pub const INB: u32 = 0x1F3;
pub const OUTA: u32 = 0x1F4;
pub const OUTB: u32 = 0x1F5;
pub const DIRA: u32 = 0x1F6;
pub const DIRB: u32 = 0x1F7;
pub const CTRA: u32 = 0x1F8;
pub const CTRB: u32 = 0x1F9;
pub const FRQA: u32 = 0x1FA;
pub const FRQB: u32 = 0x1FB;
pub const PHSA: u32 = 0x1FC;
pub const PHSB: u32 = 0x1FD;
pub const VCFG: u32 = 0x1FE;
pub const VSCL: u32 = 0x1FF;

/// Register window storage.
#[derive(Debug, Clone, Default)]
pub struct CogRegisters {
    values: [u32; REGISTER_COUNT],
}

impl CogRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn index(address: u32) -> Option<usize> {
        if (REGISTER_BASE..REGISTER_BASE + REGISTER_COUNT as u32).contains(&address) {
            Some((address - REGISTER_BASE) as usize)
        } else {
            None
        }
    }

    /// Read a register. `CNT`/`INA`/`INB` come from the hub; everything
    /// else returns the stored value. Out-of-window addresses read 0.
    pub fn read<H: Hub>(&self, hub: &H, address: u32) -> u32 {
        match address {
            CNT => hub.counter() as u32,
            INA => hub.ina(),
            INB => hub.inb(),
            _ => Self::index(address)
                .map(|i| self.values[i])
                .unwrap_or(0),
        }
    }

    /// Write a register. Out-of-window addresses are ignored.
    pub fn write(&mut self, address: u32, value: u32) {
        if let Some(i) = Self::index(address) {
            self.values[i] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::SystemHub;

    #[test]
    fn test_stored_registers() {
        let hub = SystemHub::new();
        let mut regs = CogRegisters::new();
        regs.write(PAR, 0x7F00);
        regs.write(OUTA, 0x1234_5678);
        assert_eq!(regs.read(&hub, PAR), 0x7F00);
        assert_eq!(regs.read(&hub, OUTA), 0x1234_5678);
    }

    #[test]
    fn test_live_registers_read_hub() {
        let mut hub = SystemHub::new();
        hub.set_ina(0xAB);
        hub.set_inb(0xCD);
        hub.set_counter(0x1_0000_0005);
        let regs = CogRegisters::new();
        assert_eq!(regs.read(&hub, INA), 0xAB);
        assert_eq!(regs.read(&hub, INB), 0xCD);
        // CNT is the low 32 bits of the 64-bit counter.
        assert_eq!(regs.read(&hub, CNT), 5);
    }

    #[test]
    fn test_out_of_window_access() {
        let hub = SystemHub::new();
        let mut regs = CogRegisters::new();
        regs.write(0x100, 0xFFFF_FFFF);
        assert_eq!(regs.read(&hub, 0x100), 0);
        assert_eq!(regs.read(&hub, REGISTER_BASE - 1), 0);
    }

    #[test]
    fn test_window_bounds() {
        let hub = SystemHub::new();
        let mut regs = CogRegisters::new();
        regs.write(REGISTER_BASE, 0x11);
        regs.write(VSCL, 0x22);
        assert_eq!(regs.read(&hub, REGISTER_BASE), 0x11);
        assert_eq!(regs.read(&hub, VSCL), 0x22);
    }
}
