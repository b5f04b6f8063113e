//! Special operations, opcodes 0x00–0x3F.
//!
//! This family carries everything that is not a plain memory or math
//! operation: call-frame preparation and the three call forms, branches,
//! the CASE and LOOKUP ladders, string and block intrinsics, the wait
//! primitives, hub operations (COGINIT and the lock family), and the
//! return/abort unwinding.
//!
//! # Call records
//!
//! Frame preparation (0x00–0x03) lays down a call record on the hub
//! stack: the caller's object/variable/local frame words, a word slot for
//! the return cursor, and a zeroed default return long. The side call
//! stack holds two entries per call: the return-type mask from the prep
//! opcode, and the address of the saved-cursor slot, which the call
//! opcode consumes when it links the new local frame.

use crate::cog::registers::SPR_BASE;
use crate::cog::{RunState, SpinCog};
use crate::hub::{self, Hub};

impl SpinCog {
    /// Execute one special opcode.
    pub(crate) fn execute_special<H: Hub>(&mut self, hub: &mut H, op: u8) {
        match op {
            // Frame preparation for a coming call.
            0x00..=0x03 => {
                self.call_stack.push((op & 0x3) as u32);
                self.push_word(hub, self.object_frame as u16);
                self.push_word(hub, self.variable_frame as u16);
                self.push_word(hub, self.local_frame as u16);
                self.call_stack.push(self.stack_frame);
                self.push_word(hub, self.pc as u16);
                self.push_long(hub, 0);
            }

            // Unconditional jump.
            0x04 => {
                let offset = self.read_packed_signed(hub);
                self.branch(offset);
            }

            0x05..=0x07 => self.execute_call(hub, op),

            // Loop start: a non-positive count skips the body.
            0x08 => {
                let value = self.pop_long(hub);
                let offset = self.read_packed_signed(hub);
                if value as i32 <= 0 {
                    self.branch(offset);
                } else {
                    self.push_long(hub, value);
                }
            }

            // Loop continue: decrement and branch while positive.
            0x09 => {
                let value = self.pop_long(hub).wrapping_sub(1);
                let offset = self.read_packed_signed(hub);
                if value as i32 > 0 {
                    self.branch(offset);
                    self.push_long(hub, value);
                }
            }

            // Jump if zero / not zero.
            0x0A => {
                let value = self.pop_long(hub);
                let offset = self.read_packed_signed(hub);
                if value == 0 {
                    self.branch(offset);
                }
            }
            0x0B => {
                let value = self.pop_long(hub);
                let offset = self.read_packed_signed(hub);
                if value != 0 {
                    self.branch(offset);
                }
            }

            // Case done: drop the selector, jump to the landing offset.
            0x0C => {
                self.pop_long(hub);
                let target = self.pop_long(hub);
                self.pc = self.object_frame.wrapping_add(target);
            }

            // Case match against a single value.
            0x0D => {
                let equal = self.pop_long(hub);
                let value = self.pop_long(hub);
                let offset = self.read_packed_signed(hub);
                if equal == value {
                    self.branch(offset);
                }
                self.push_long(hub, value);
            }

            // Case match against an inclusive range.
            0x0E => {
                let max = self.pop_long(hub);
                let min = self.pop_long(hub);
                let value = self.pop_long(hub);
                let offset = self.read_packed_signed(hub);
                let (low, high) = if (min as i32) <= (max as i32) {
                    (min, max)
                } else {
                    (max, min)
                };
                if (value as i32) >= (low as i32) && (value as i32) <= (high as i32) {
                    self.branch(offset);
                }
                self.push_long(hub, value);
            }

            // Lookup fell off the table: drop its state, push not-found.
            0x0F => {
                self.pop_long(hub);
                self.pop_long(hub);
                self.pop_long(hub);
                self.push_long(hub, u32::MAX);
            }

            0x10..=0x13 => self.execute_lookup(hub, op),

            0x14 => {
                log::warn!(
                    "cog {}: undefined opcode 0x14 at 0x{:04X}",
                    self.id,
                    self.pc.wrapping_sub(1)
                );
            }

            // Mark the next COGINIT as an interpreter launch.
            0x15 => self.interpreter_flag = true,

            0x16 => {
                let mut address = self.pop_long(hub);
                let mut length = 0u32;
                while address <= hub::MAX_ADDRESS && hub.read_byte(address) != 0 {
                    length = length.wrapping_add(1);
                    address = address.wrapping_add(1);
                }
                self.push_long(hub, length);
            }

            0x17 => {
                let mut b = self.pop_long(hub);
                let mut a = self.pop_long(hub);
                let equal = loop {
                    let ca = hub.read_byte(a);
                    let cb = hub.read_byte(b);
                    if ca != cb {
                        break 0;
                    }
                    if ca == 0 {
                        break u32::MAX;
                    }
                    a = a.wrapping_add(1);
                    b = b.wrapping_add(1);
                };
                self.push_long(hub, equal);
            }

            0x18..=0x1A => self.execute_fill(hub, op - 0x18),

            // Wait for masked pins to match (or differ from) a target.
            0x1B | 0x1F => {
                self.wait_port = self.pop_long(hub);
                self.mask_value = self.pop_long(hub);
                self.target_value = self.pop_long(hub);
                self.state = if op == 0x1B {
                    RunState::WaitPinsEqual
                } else {
                    RunState::WaitPinsNotEqual
                };
            }

            0x1C..=0x1E => self.execute_move(hub, op - 0x1C),

            // Clock set: frequency long at 0, mode byte at 4.
            0x20 => {
                let frequency = self.pop_long(hub);
                hub.write_long(0, frequency);
                let mode = self.pop_long(hub) as u8;
                hub.write_byte(4, mode);
                hub.set_clock_mode(mode);
            }

            0x21 => {
                let cog = self.pop_long(hub) & 0x7;
                hub.stop_cog(cog);
                if cog == self.id {
                    self.state = RunState::Stopped;
                }
            }

            0x22 => {
                let id = self.pop_long(hub);
                hub.lock_return(id);
            }

            0x23 => {
                self.target_value = self.pop_long(hub);
                self.state = RunState::WaitCount;
            }

            0x24..=0x26 => self.execute_spr(hub, op),

            0x27 => {
                self.pixels_value = self.pop_long(hub);
                self.colors_value = self.pop_long(hub);
                self.state = RunState::WaitVideo;
            }

            0x28..=0x2F => {
                let result = match op & 0x3 {
                    0 => self.execute_coginit(hub),
                    1 => hub.new_lock(),
                    2 => {
                        let id = self.pop_long(hub);
                        bool_value(hub.lock_set(id, true))
                    }
                    _ => {
                        let id = self.pop_long(hub);
                        bool_value(hub.lock_set(id, false))
                    }
                };
                if op & 0x4 == 0 {
                    self.push_long(hub, result);
                }
            }

            // Abort: unwind to the nearest trapping frame.
            0x30 => {
                let value = hub.read_long(self.local_frame);
                self.return_from_sub(hub, value, true);
            }
            0x31 => {
                let value = self.pop_long(hub);
                self.return_from_sub(hub, value, true);
            }

            // Return from the current call.
            0x32 => {
                let value = hub.read_long(self.local_frame);
                self.return_from_sub(hub, value, false);
            }
            0x33 => {
                let value = self.pop_long(hub);
                self.return_from_sub(hub, value, false);
            }

            // Short literals.
            0x34 => self.push_long(hub, u32::MAX),
            0x35 => self.push_long(hub, 0),
            0x36 => self.push_long(hub, 1),

            // Packed literal: rotate 2, then optional decrement and
            // complement selected by bits 5 and 6.
            0x37 => {
                let form = self.read_code_byte(hub) as u32;
                let mut value = 2u32.rotate_left(form & 0x1F);
                if form & 0x20 != 0 {
                    value = value.wrapping_sub(1);
                }
                if form & 0x40 != 0 {
                    value = !value;
                }
                self.push_long(hub, value);
            }

            // Big-endian constants of one to four bytes.
            0x38..=0x3B => {
                let mut value = 0u32;
                for _ in 0..(op - 0x37) {
                    value = (value << 8) | self.read_code_byte(hub) as u32;
                }
                self.push_long(hub, value);
            }

            0x3C => {
                log::warn!(
                    "cog {}: undefined opcode 0x3C at 0x{:04X}",
                    self.id,
                    self.pc.wrapping_sub(1)
                );
            }

            _ => self.execute_register_op(hub, op),
        }
    }

    /// The three call forms. 0x06 re-bases the object and variable frames
    /// through an object-table entry first; 0x07 additionally scales in a
    /// popped table index.
    fn execute_call<H: Hub>(&mut self, hub: &mut H, op: u8) {
        if op >= 0x06 {
            let mut entry = self
                .object_frame
                .wrapping_add(self.read_code_byte(hub) as u32 * 4);
            if op == 0x07 {
                entry = entry.wrapping_add(self.pop_long(hub).wrapping_mul(4));
            }
            self.object_frame = self.object_frame.wrapping_add(hub.read_word(entry) as u32);
            self.variable_frame = self
                .variable_frame
                .wrapping_add(hub.read_word(entry.wrapping_add(2)) as u32);
        }

        let function = self
            .object_frame
            .wrapping_add(self.read_code_byte(hub) as u32 * 4);
        let cursor_slot = match self.call_stack.pop() {
            Some(slot) => slot,
            None => {
                log::warn!("cog {}: call without frame preparation", self.id);
                self.terminate(hub);
                return;
            }
        };
        self.local_frame = cursor_slot.wrapping_add(2);
        hub.write_word(cursor_slot, self.pc as u16);
        self.pc = self
            .object_frame
            .wrapping_add(hub.read_word(function) as u32);
        self.stack_frame = self
            .stack_frame
            .wrapping_add(hub.read_word(function.wrapping_add(2)) as u32);
    }

    /// LOOKUP/LOOKDOWN ladders, single-value and range forms.
    ///
    /// The running state on the stack is (counter, landing offset, key);
    /// each table entry either resolves the search and jumps, or advances
    /// the counter and pushes the state back.
    fn execute_lookup<H: Hub>(&mut self, hub: &mut H, op: u8) {
        let (entry_low, entry_high) = if op >= 0x12 {
            let top = self.pop_long(hub);
            let bottom = self.pop_long(hub);
            (bottom, top)
        } else {
            let value = self.pop_long(hub);
            (value, value)
        };
        let key = self.pop_long(hub);
        let landing = self.pop_long(hub);
        let counter = self.pop_long(hub);

        let span = (entry_high as i32).wrapping_sub(entry_low as i32).unsigned_abs();
        let range = span.wrapping_add(1);

        let found = if op & 0x1 == 0 {
            // Lookup: the key is an index into the running count.
            let offset = key.wrapping_sub(counter);
            if offset < range {
                let value = if (entry_low as i32) <= (entry_high as i32) {
                    entry_low.wrapping_add(offset)
                } else {
                    entry_low.wrapping_sub(offset)
                };
                Some(value)
            } else {
                None
            }
        } else {
            // Lookdown: the key is a value; resolve its position.
            let (low, high) = if (entry_low as i32) <= (entry_high as i32) {
                (entry_low, entry_high)
            } else {
                (entry_high, entry_low)
            };
            if (key as i32) >= (low as i32) && (key as i32) <= (high as i32) {
                let offset = (key as i32).wrapping_sub(entry_low as i32).unsigned_abs();
                Some(counter.wrapping_add(offset))
            } else {
                None
            }
        };

        match found {
            Some(result) => {
                self.pc = self.object_frame.wrapping_add(landing);
                self.push_long(hub, result);
            }
            None => {
                self.push_long(hub, counter.wrapping_add(range));
                self.push_long(hub, landing);
                self.push_long(hub, key);
            }
        }
    }

    /// BYTE/WORD/LONG FILL.
    fn execute_fill<H: Hub>(&mut self, hub: &mut H, size: u8) {
        let count = self.pop_long(hub) as i32;
        let value = self.pop_long(hub);
        let mut dest = self.pop_long(hub);
        let step = 1u32 << size;
        for _ in 0..count.max(0) {
            self.write_sized(hub, dest, size, value);
            dest = dest.wrapping_add(step);
        }
    }

    /// BYTE/WORD/LONG MOVE.
    fn execute_move<H: Hub>(&mut self, hub: &mut H, size: u8) {
        let count = self.pop_long(hub) as i32;
        let mut src = self.pop_long(hub);
        let mut dest = self.pop_long(hub);
        let step = 1u32 << size;
        for _ in 0..count.max(0) {
            let value = self.read_sized(hub, src, size);
            self.write_sized(hub, dest, size, value);
            src = src.wrapping_add(step);
            dest = dest.wrapping_add(step);
        }
    }

    /// SPR read/write/using. Out-of-range addresses consume the address
    /// operand and leave anything else on the stack.
    fn execute_spr<H: Hub>(&mut self, hub: &mut H, op: u8) {
        let index = self.pop_long(hub);
        if index >= 16 {
            return;
        }
        let register = SPR_BASE + index;
        match op {
            0x24 => {
                let value = self.registers.read(hub, register);
                self.push_long(hub, value);
            }
            0x25 => {
                let value = self.pop_long(hub);
                self.registers.write(register, value);
            }
            _ => {
                let original = self.registers.read(hub, register);
                let stored = self.inplace_using_op(hub, original);
                self.registers.write(register, stored);
            }
        }
    }

    /// COGINIT. With the interpreter flag latched, lay down an init block
    /// and argument area for a new bytecode cog below the popped stack
    /// pointer; otherwise pass a native entry point through. Both forms
    /// delegate the actual start to the hub.
    fn execute_coginit<H: Hub>(&mut self, hub: &mut H) -> u32 {
        let code;
        let target;
        if self.interpreter_flag {
            self.interpreter_flag = false;

            // Skip the header words the host reserves below the pointer,
            // then long-align.
            let stack_top = self.pop_long(hub).wrapping_add(8);
            let descriptor = self.pop_long(hub);
            target = self.pop_long(hub);
            let stack_top = stack_top.wrapping_add(3) & !3;

            let function = descriptor & 0xFF;
            let arg_count = descriptor >> 8;
            let entry = self.object_frame.wrapping_add(function * 4);
            let offset = hub.read_word(entry) as u32;
            let arg_top = stack_top.wrapping_add(arg_count * 4).wrapping_sub(4);
            let funct_stack = (hub.read_word(entry.wrapping_add(2)) as u32).wrapping_add(arg_top);

            hub.write_word(stack_top.wrapping_sub(8), self.object_frame as u16);
            hub.write_word(stack_top.wrapping_sub(6), self.variable_frame as u16);
            hub.write_word(
                stack_top.wrapping_sub(4),
                self.object_frame.wrapping_add(offset) as u16,
            );
            hub.write_word(
                stack_top.wrapping_sub(2),
                funct_stack.wrapping_add(4) as u16,
            );

            // Arguments come off the stack last-first; writing from the
            // top of the area down restores their order.
            for i in 0..arg_count {
                let value = self.pop_long(hub);
                hub.write_long(arg_top.wrapping_sub(i * 4), value);
            }

            code = hub::pack_coginit(hub::INTERPRETER_ENTRY, stack_top, target);
        } else {
            let param = self.pop_long(hub);
            let entry = self.pop_long(hub);
            target = self.pop_long(hub);
            code = hub::pack_coginit(entry, param, target);
        }

        hub.hub_op(self.id, hub::HUBOP_COGINIT, code).value
    }

    /// Unwind one or more call records.
    ///
    /// Each round restores the stack to the local frame, pops the
    /// return-type mask from the side stack, and pulls the four saved
    /// words back out of the call record. An abort keeps unwinding until
    /// a frame whose mask has the trap bit set; running out of frames
    /// stops the cog.
    pub(crate) fn return_from_sub<H: Hub>(&mut self, hub: &mut H, value: u32, abort: bool) {
        loop {
            self.stack_frame = self.local_frame;
            let mask = match self.call_stack.pop() {
                Some(mask) => mask,
                None => {
                    self.terminate(hub);
                    return;
                }
            };
            let trap_abort = mask & 0x2 != 0;
            let want_return = mask & 0x1 == 0;

            self.pc = self.pop_word(hub) as u32;
            self.local_frame = self.pop_word(hub) as u32;
            self.variable_frame = self.pop_word(hub) as u32;
            self.object_frame = self.pop_word(hub) as u32;

            if !(abort && !trap_abort) {
                if want_return {
                    self.push_long(hub, value);
                }
                return;
            }
        }
    }
}

#[inline]
fn bool_value(condition: bool) -> u32 {
    if condition {
        u32::MAX
    } else {
        0
    }
}
