//! Memory operation families.
//!
//! Three opcode families move values between the stack and memory:
//!
//! - the masked family `0x80–0xDF`, laid out `1 ss i bb qq` (size, index
//!   flag, base selector, action);
//! - the quick family `0x40–0x7F`, laid out `01 b vvv qq`, which reaches
//!   the first eight longs of the variable or local frame;
//! - the cog-register family behind prefix opcodes 0x3D/0x3E/0x3F, which
//!   applies a bit mask and shift around the accesses.
//!
//! All three share the same four actions: push (read), pop (write),
//! using (read-modify-write through the in-place sub-operator), and
//! reference (push the effective address).

use crate::cog::registers::REGISTER_BASE;
use crate::cog::SpinCog;
use crate::hub::Hub;

impl SpinCog {
    /// Masked memory operation, opcodes 0x80–0xDF.
    pub(crate) fn execute_memory_op<H: Hub>(&mut self, hub: &mut H, op: u8) {
        let size = (op >> 5) & 0x3;
        let indexed = op & 0x10 != 0;
        let action = op & 0x3;

        let address = match (op >> 2) & 0x3 {
            // Main memory: the address comes off the stack; an index pops
            // first and scales by the access size.
            0 => {
                let first = self.pop_long(hub);
                if indexed {
                    self.pop_long(hub).wrapping_add(first << size)
                } else {
                    first
                }
            }
            base => {
                let frame = match base {
                    1 => self.object_frame,
                    2 => self.variable_frame,
                    _ => self.local_frame,
                };
                let mut address = frame.wrapping_add(self.read_packed_unsigned(hub));
                if indexed {
                    address = address.wrapping_add(self.pop_long(hub) << size);
                }
                address
            }
        };

        self.memory_action(hub, address, size, action);
    }

    /// Quick frame access, opcodes 0x40–0x7F. Always long-sized, reaching
    /// slot `vvv` of the variable (`b` = 0) or local (`b` = 1) frame.
    pub(crate) fn execute_quick_frame_op<H: Hub>(&mut self, hub: &mut H, op: u8) {
        let frame = if op & 0x20 != 0 {
            self.local_frame
        } else {
            self.variable_frame
        };
        let address = frame.wrapping_add((((op >> 2) & 0x7) * 4) as u32);
        self.memory_action(hub, address, 2, op & 0x3);
    }

    /// Perform one of the four actions at `address` with the given size
    /// log2 (0 byte, 1 word, 2 long).
    fn memory_action<H: Hub>(&mut self, hub: &mut H, address: u32, size: u8, action: u8) {
        match action {
            0 => {
                let value = self.read_sized(hub, address, size);
                self.push_long(hub, value);
            }
            1 => {
                let value = self.pop_long(hub);
                self.write_sized(hub, address, size, value);
            }
            2 => {
                let original = self.read_sized(hub, address, size);
                let stored = self.inplace_using_op(hub, original);
                self.write_sized(hub, address, size, stored);
            }
            _ => self.push_long(hub, address),
        }
    }

    pub(crate) fn read_sized<H: Hub>(&self, hub: &H, address: u32, size: u8) -> u32 {
        match size {
            0 => hub.read_byte(address) as u32,
            1 => hub.read_word(address) as u32,
            _ => hub.read_long(address),
        }
    }

    pub(crate) fn write_sized<H: Hub>(&self, hub: &mut H, address: u32, size: u8, value: u32) {
        match size {
            0 => hub.write_byte(address, value as u8),
            1 => hub.write_word(address, value as u16),
            _ => hub.write_long(address, value),
        }
    }

    /// Cog-register operation behind prefix opcodes 0x3D/0x3E/0x3F.
    ///
    /// The sub-byte selects the register (low five bits, relative to the
    /// window base) and the action (top three bits). 0x3D pops a single
    /// bit number, 0x3E a bit range, and 0x3F covers the whole register.
    pub(crate) fn execute_register_op<H: Hub>(&mut self, hub: &mut H, op: u8) {
        let sub = self.read_code_byte(hub);
        let action = sub >> 5;
        let register = REGISTER_BASE + (sub & 0x1F) as u32;

        let (mask, shift) = match op {
            0x3D => {
                let bit = self.pop_long(hub) & 0x1F;
                (1u32 << bit, bit)
            }
            0x3E => {
                let a = self.pop_long(hub) & 0x1F;
                let b = self.pop_long(hub) & 0x1F;
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                let width = high - low + 1;
                let mask = if width >= 32 {
                    u32::MAX
                } else {
                    ((1u32 << width) - 1) << low
                };
                (mask, low)
            }
            _ => (u32::MAX, 0),
        };

        match action {
            0x4 => {
                let value = (self.registers.read(hub, register) & mask) >> shift;
                self.push_long(hub, value);
            }
            0x5 => {
                let value = self.pop_long(hub);
                let current = self.registers.read(hub, register);
                self.registers
                    .write(register, (current & !mask) | ((value << shift) & mask));
            }
            0x6 => {
                let current = self.registers.read(hub, register);
                let field = (current & mask) >> shift;
                let stored = self.inplace_using_op(hub, field);
                self.registers
                    .write(register, (current & !mask) | ((stored << shift) & mask));
            }
            other => {
                log::warn!(
                    "cog {}: unknown register action {other} at 0x{:04X}",
                    self.id,
                    self.pc
                );
            }
        }
    }
}
