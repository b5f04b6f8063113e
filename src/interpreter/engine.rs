//! Top-level opcode classification.
//!
//! The dispatch is hybrid: a range match on the top bits picks the
//! family, and the family decoders slice the remaining bits. This keeps
//! the dense 0x80–0xDF table auditable instead of flattening all 256
//! entries into one list.

use crate::cog::SpinCog;
use crate::hub::Hub;

impl SpinCog {
    /// Fetch and execute one bytecode instruction.
    pub(crate) fn execute_instruction<H: Hub>(&mut self, hub: &mut H) {
        let op = self.read_code_byte(hub);
        log::trace!(
            "cog {} pc=0x{:04X} op=0x{op:02X}",
            self.id,
            self.pc.wrapping_sub(1)
        );
        match op {
            0x00..=0x3F => self.execute_special(hub, op),
            0x40..=0x7F => self.execute_quick_frame_op(hub, op),
            0x80..=0xDF => self.execute_memory_op(hub, op),
            _ => {
                let initial = self.pop_long(hub);
                let result = self.math_op(hub, op & 0x1F, true, initial);
                self.push_long(hub, result);
            }
        }
    }
}
