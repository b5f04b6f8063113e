//! Whole-machine driver: the hub plus eight cog slots.
//!
//! The machine advances everything in lockstep. Each [`tick`](Machine::tick)
//! bumps the system counter, steps every running cog exactly once, and
//! then applies the cog-control requests the hub queued during the tick
//! (COGINIT starts, stop requests). Cogs therefore never observe another
//! cog appearing or vanishing mid-tick.

use crate::cog::SpinCog;
use crate::hub::system::{CogControl, COG_COUNT};
use crate::hub::{SystemHub, INTERPRETER_ENTRY};
use crate::image::SpinImage;

/// A breakpoint cursor match reported by a cog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHit {
    /// Cog that reached its breakpoint.
    pub cog: u32,
    /// The matched bytecode cursor.
    pub pc: u32,
}

/// Result of a bounded run.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// Ticks actually consumed.
    pub ticks: u64,
    /// Breakpoint that ended the run, if any.
    pub breakpoint: Option<BreakpointHit>,
}

/// An eight-cog system around a [`SystemHub`].
pub struct Machine {
    /// Shared substrate; exposed for host-side pin/counter control.
    pub hub: SystemHub,
    cogs: [Option<SpinCog>; COG_COUNT],
    total_ticks: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Create a machine with no running cogs.
    pub fn new() -> Self {
        Self {
            hub: SystemHub::new(),
            cogs: std::array::from_fn(|_| None),
            total_ticks: 0,
        }
    }

    /// Install a program image and start cog 0 on it.
    ///
    /// The image is copied to address 0, the interpreter init frame is
    /// laid down below the stack base, and cog 0 boots with the stack
    /// base as its parameter.
    pub fn load_image(&mut self, image: &SpinImage) {
        use crate::hub::Hub;

        self.hub.load_ram(0, &image.data);
        let base = image.stack_base as u32;
        self.hub.write_word(base.wrapping_sub(8), image.object_base);
        self.hub
            .write_word(base.wrapping_sub(6), image.variable_base);
        self.hub.write_word(base.wrapping_sub(4), image.entry_pc);
        self.hub.write_word(base.wrapping_sub(2), image.stack_cursor);
        self.start_cog(0, base);
    }

    /// Boot an interpreter cog in a slot.
    pub fn start_cog(&mut self, id: u32, par: u32) {
        if (id as usize) >= COG_COUNT {
            return;
        }
        log::info!("machine: starting cog {id} par=0x{par:04X}");
        self.hub.set_active(id, true);
        self.cogs[id as usize] = Some(SpinCog::new(id, par));
    }

    /// Borrow a cog slot.
    pub fn cog(&self, id: u32) -> Option<&SpinCog> {
        self.cogs.get(id as usize).and_then(|slot| slot.as_ref())
    }

    /// Mutably borrow a cog slot (breakpoints, video delivery).
    pub fn cog_mut(&mut self, id: u32) -> Option<&mut SpinCog> {
        self.cogs.get_mut(id as usize).and_then(|slot| slot.as_mut())
    }

    /// Number of occupied cog slots.
    pub fn running_cogs(&self) -> usize {
        self.cogs.iter().filter(|slot| slot.is_some()).count()
    }

    /// Total ticks since construction.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Advance the whole system by one tick.
    ///
    /// Returns the first breakpoint hit reported by a cog, if any.
    pub fn tick(&mut self) -> Option<BreakpointHit> {
        self.hub.advance_counter();
        self.total_ticks += 1;

        let mut hit = None;
        for slot in self.cogs.iter_mut() {
            if let Some(cog) = slot {
                if !cog.step(&mut self.hub) && hit.is_none() {
                    hit = Some(BreakpointHit {
                        cog: cog.id(),
                        pc: cog.pc(),
                    });
                }
            }
        }

        self.apply_cog_control();
        hit
    }

    /// Run for up to `max_ticks`, stopping early at a breakpoint or when
    /// every cog has stopped.
    pub fn run(&mut self, max_ticks: u64) -> RunOutcome {
        for elapsed in 0..max_ticks {
            if let Some(hit) = self.tick() {
                log::info!(
                    "machine: breakpoint on cog {} at 0x{:04X}",
                    hit.cog,
                    hit.pc
                );
                return RunOutcome {
                    ticks: elapsed + 1,
                    breakpoint: Some(hit),
                };
            }
            if self.cogs.iter().all(|slot| slot.is_none()) {
                log::info!("machine: all cogs stopped after {} ticks", elapsed + 1);
                return RunOutcome {
                    ticks: elapsed + 1,
                    breakpoint: None,
                };
            }
        }
        RunOutcome {
            ticks: max_ticks,
            breakpoint: None,
        }
    }

    /// Apply queued starts and stops.
    fn apply_cog_control(&mut self) {
        for request in self.hub.take_cog_control() {
            match request {
                CogControl::Start { cog, entry, param } => {
                    if entry == INTERPRETER_ENTRY {
                        self.start_cog(cog, param);
                    } else {
                        // Native-code cogs are outside this core.
                        log::warn!(
                            "machine: ignoring native start for cog {cog} (entry 0x{entry:04X})"
                        );
                        self.hub.set_active(cog, false);
                    }
                }
                CogControl::Stop { cog } => {
                    log::info!("machine: stopping cog {cog}");
                    self.hub.set_active(cog, false);
                    if let Some(slot) = self.cogs.get_mut(cog as usize) {
                        *slot = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cog::{RunState, BOOT_TICKS, INSTRUCTION_TICKS};
    use crate::hub::Hub;

    /// Minimal image: a few opcodes at the entry point, frames laid out
    /// in low memory.
    fn tiny_image(code: &[u8]) -> SpinImage {
        let mut data = vec![0u8; 0x900];
        data[0x20..0x20 + code.len()].copy_from_slice(code);
        SpinImage {
            clock_frequency: 80_000_000,
            clock_mode: 0x6F,
            checksum: 0,
            object_base: 0x0010,
            variable_base: 0x0400,
            stack_base: 0x0800,
            entry_pc: 0x0020,
            stack_cursor: 0x0804,
            data,
        }
    }

    fn ticks_for_instructions(n: u64) -> u64 {
        // Boot tick + boot delay, then one instruction per paced window.
        1 + BOOT_TICKS as u64 + n * (INSTRUCTION_TICKS as u64 + 1)
    }

    #[test]
    fn test_load_image_boots_cog_zero() {
        let mut machine = Machine::new();
        machine.load_image(&tiny_image(&[0x35]));
        assert_eq!(machine.running_cogs(), 1);
        assert!(machine.hub.is_active(0));

        machine.tick();
        let cog = machine.cog(0).expect("cog 0 running");
        assert_eq!(cog.pc(), 0x0020);
        assert_eq!(cog.run_state(), RunState::Wait);
    }

    #[test]
    fn test_counter_advances_per_tick() {
        let mut machine = Machine::new();
        machine.load_image(&tiny_image(&[0x35]));
        machine.run(10);
        assert_eq!(machine.hub.counter(), 10);
        assert_eq!(machine.total_ticks(), 10);
    }

    #[test]
    fn test_breakpoint_ends_run() {
        // Entry pushes a literal, then jumps to itself.
        let mut machine = Machine::new();
        machine.load_image(&tiny_image(&[0x35, 0x04, 0x7D]));
        machine
            .cog_mut(0)
            .expect("cog 0")
            .set_breakpoint(Some(0x0021));

        let outcome = machine.run(10_000);
        let hit = outcome.breakpoint.expect("breakpoint reached");
        assert_eq!(hit.cog, 0);
        assert_eq!(hit.pc, 0x0021);
        assert!(outcome.ticks < 10_000);
    }

    #[test]
    fn test_cogstop_empties_machine() {
        // push 0, COGSTOP: the only cog stops itself.
        let mut machine = Machine::new();
        machine.load_image(&tiny_image(&[0x35, 0x21]));

        let outcome = machine.run(ticks_for_instructions(3));
        assert!(outcome.breakpoint.is_none());
        assert_eq!(machine.running_cogs(), 0);
        assert!(!machine.hub.is_active(0));
        // The run ended as soon as the stop was applied.
        assert!(outcome.ticks <= ticks_for_instructions(2) + 1);
    }

    #[test]
    fn test_coginit_spawns_second_cog() {
        // Function table entry 1 at object base: offset 0x40, stack 4.
        // Code: MARK-INTERPRETED, push arg 5, push target 1, push
        // descriptor (one arg, function 1), push stack pointer, COGINIT
        // (no push), then stop self.
        let code = [
            0x15, // mark interpreted
            0x38, 0x05, // arg
            0x36, // target cog 1
            0x39, 0x01, 0x01, // descriptor: one arg, function 1
            0x39, 0x06, 0xF8, // stack pointer 0x06F8 (header below 0x700)
            0x2C, // COGINIT, no push
            0x35, 0x21, // push 0, COGSTOP
        ];
        let mut machine = Machine::new();
        let mut image = tiny_image(&code);
        // Function table entry 1 lives at object base + 4.
        image.data[0x14] = 0x40;
        image.data[0x15] = 0x00;
        image.data[0x16] = 0x04;
        image.data[0x17] = 0x00;
        machine.load_image(&image);

        // Enough ticks for the COGINIT (sixth instruction) plus the
        // spawned cog's boot.
        machine.run(ticks_for_instructions(6));
        let spawned = machine.cog(1).expect("spawned cog");
        assert_eq!(spawned.id(), 1);
        assert!(machine.hub.is_active(1));
        // The spawned cog booted from the laid-down init block.
        assert_eq!(spawned.pc(), 0x0010 + 0x40);
        // The argument landed at the new stack top.
        assert_eq!(machine.hub.read_long(0x0700), 5);

        // Let cog 0 reach its COGSTOP.
        machine.run(3 * (INSTRUCTION_TICKS as u64 + 1));
        assert!(machine.cog(0).is_none());
        assert!(machine.cog(1).is_some());
    }
}
