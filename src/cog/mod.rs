//! Interpreted cog: run-state machine and cycle pacing.
//!
//! A cog advances in lockstep with the rest of the system: the host calls
//! [`SpinCog::step`] exactly once per tick, and the cog either consumes a
//! pacing tick (boot delay, inter-instruction delay, wait conditions) or
//! fetches and executes one bytecode instruction. The instruction logic
//! itself lives in [`crate::interpreter`].
//!
//! Timing is deliberately coarse: boot costs a fixed 48 ticks and every
//! instruction a fixed 32, which keeps all eight cogs paced against the
//! shared counter without modeling the silicon pipeline.

pub mod registers;

use crate::hub::{Hub, MAX_ADDRESS};
use registers::CogRegisters;

/// Paced ticks consumed by interpreter boot.
pub const BOOT_TICKS: u32 = 48;

/// Paced ticks between bytecode instructions.
pub const INSTRUCTION_TICKS: u32 = 32;

/// Execution state of a cog. One state action runs per host tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Interpreter boot: load the init frame, then pace.
    #[default]
    Boot,
    /// Counting down the paced delay before the next instruction.
    Wait,
    /// Fetch and execute one bytecode instruction.
    Exec,
    /// Waiting for masked pins to equal the target.
    WaitPinsEqual,
    /// Waiting for masked pins to differ from the target.
    WaitPinsNotEqual,
    /// Waiting for the system counter to hit the target exactly.
    WaitCount,
    /// Waiting for the host to deliver a video frame slot.
    WaitVideo,
    /// Passed through as a no-op.
    Stopped,
}

/// Video frame accounting for the most recent delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFlag {
    /// No delivery since the flag was last cleared.
    #[default]
    None,
    /// A frame arrived while the cog was waiting for one.
    Hit,
    /// A frame arrived while the cog was not waiting.
    Miss,
}

/// One interpreted execution unit.
///
/// Owns the bytecode cursor, the four frame registers, the side
/// call-return stack, the special-register window, and the wait latches.
/// All hub memory access goes through the [`Hub`] handle passed to
/// [`step`](Self::step).
pub struct SpinCog {
    pub(crate) id: u32,
    pub(crate) state: RunState,
    pub(crate) state_ticks: u32,

    /// Bytecode cursor (hub byte address).
    pub(crate) pc: u32,
    /// Next free hub-stack slot; grows upward.
    pub(crate) stack_frame: u32,
    pub(crate) local_frame: u32,
    pub(crate) object_frame: u32,
    pub(crate) variable_frame: u32,

    /// Side stack holding one return-type mask and one saved-PC slot
    /// address per frame-prepared call.
    pub(crate) call_stack: Vec<u32>,

    pub(crate) registers: CogRegisters,

    // Wait latches.
    pub(crate) target_value: u32,
    pub(crate) mask_value: u32,
    pub(crate) wait_port: u32,
    pub(crate) pixels_value: u32,
    pub(crate) colors_value: u32,

    pub(crate) frame_flag: FrameFlag,
    /// One-shot set by MARK-INTERPRETED; consumed by the next COGINIT.
    pub(crate) interpreter_flag: bool,

    pub(crate) breakpoint: Option<u32>,
    pub(crate) instructions: u64,
}

impl SpinCog {
    /// Create a cog in the boot state with the given id and boot
    /// parameter (interpreter init-frame pointer).
    pub fn new(id: u32, par: u32) -> Self {
        let mut registers = CogRegisters::new();
        registers.write(registers::PAR, par);
        registers.write(registers::COGID, id);
        Self {
            id,
            state: RunState::Boot,
            state_ticks: 0,
            pc: 0,
            stack_frame: 0,
            local_frame: 0,
            object_frame: 0,
            variable_frame: 0,
            call_stack: Vec::new(),
            registers,
            target_value: 0,
            mask_value: 0,
            wait_port: 0,
            pixels_value: 0,
            colors_value: 0,
            frame_flag: FrameFlag::None,
            interpreter_flag: false,
            breakpoint: None,
            instructions: 0,
        }
    }

    /// Cog slot number.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current bytecode cursor.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.state
    }

    /// Whether the cog has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.state == RunState::Stopped
    }

    /// Instructions executed since boot.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Video accounting from the most recent frame delivery.
    pub fn frame_flag(&self) -> FrameFlag {
        self.frame_flag
    }

    /// Set or clear the breakpoint cursor.
    pub fn set_breakpoint(&mut self, pc: Option<u32>) {
        self.breakpoint = pc;
    }

    /// Borrow the special-register window.
    pub fn registers(&self) -> &CogRegisters {
        &self.registers
    }

    /// Advance one host tick.
    ///
    /// Returns `false` when the bytecode cursor sits on the breakpoint
    /// address, `true` otherwise.
    pub fn step<H: Hub>(&mut self, hub: &mut H) -> bool {
        match self.state {
            RunState::Boot => self.boot(hub),
            RunState::Wait => {
                self.state_ticks -= 1;
                if self.state_ticks == 0 {
                    self.state = RunState::Exec;
                }
            }
            RunState::Exec => {
                // Pace first: wait opcodes override the state during
                // execution and must not be clobbered afterwards.
                self.state = RunState::Wait;
                self.state_ticks = INSTRUCTION_TICKS;
                self.execute_instruction(hub);
                self.instructions = self.instructions.wrapping_add(1);
            }
            RunState::WaitPinsEqual => {
                if self.pins(hub) & self.mask_value == self.target_value {
                    self.state = RunState::Exec;
                }
            }
            RunState::WaitPinsNotEqual => {
                if self.pins(hub) & self.mask_value != self.target_value {
                    self.state = RunState::Exec;
                }
            }
            RunState::WaitCount => {
                if hub.counter() as u32 == self.target_value {
                    self.state = RunState::Exec;
                }
            }
            RunState::WaitVideo | RunState::Stopped => {}
        }
        match self.breakpoint {
            Some(cursor) => self.pc != cursor,
            None => true,
        }
    }

    /// Deliver a video frame slot from the host.
    ///
    /// When the cog is waiting for video this hands back the latched
    /// colors/pixels pair and resumes execution; in any other state it
    /// only records the miss and returns zeros.
    pub fn take_video_data(&mut self) -> (u32, u32) {
        if self.state == RunState::WaitVideo {
            self.state = RunState::Exec;
            self.frame_flag = FrameFlag::Hit;
            (self.colors_value, self.pixels_value)
        } else {
            self.frame_flag = FrameFlag::Miss;
            (0, 0)
        }
    }

    /// Selected wait pin bus.
    fn pins<H: Hub>(&self, hub: &H) -> u32 {
        if self.wait_port == 0 {
            hub.ina()
        } else {
            hub.inb()
        }
    }

    /// Load the interpreter context from the init frame addressed by PAR.
    ///
    /// The frame holds four words below the pointer: object base,
    /// variable base, entry PC, and the initial stack cursor. The first
    /// long is overwritten with an all-ones sentinel and the second
    /// cleared once consumed.
    fn boot<H: Hub>(&mut self, hub: &mut H) {
        self.state = RunState::Wait;
        self.state_ticks = BOOT_TICKS;

        let init_frame = self.registers.read(hub, registers::PAR) & MAX_ADDRESS;
        self.object_frame = hub.read_word(init_frame.wrapping_sub(8)) as u32;
        self.variable_frame = hub.read_word(init_frame.wrapping_sub(6)) as u32;
        self.pc = hub.read_word(init_frame.wrapping_sub(4)) as u32;
        self.stack_frame = (hub.read_word(init_frame.wrapping_sub(2)) as u32).wrapping_sub(4);
        self.local_frame = init_frame.wrapping_sub(4);
        self.registers
            .write(registers::INITCOGID, init_frame.wrapping_sub(4));
        hub.write_long(init_frame.wrapping_sub(8), u32::MAX);
        hub.write_long(init_frame.wrapping_sub(4), 0);

        log::debug!(
            "cog {}: boot obj=0x{:04X} var=0x{:04X} pc=0x{:04X} stack=0x{:04X}",
            self.id,
            self.object_frame,
            self.variable_frame,
            self.pc,
            self.stack_frame
        );
    }

    /// Stop this cog and tell the hub.
    pub(crate) fn terminate<H: Hub>(&mut self, hub: &mut H) {
        log::debug!("cog {}: terminated", self.id);
        self.state = RunState::Stopped;
        hub.stop_cog(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::SystemHub;

    fn hub_with_init_frame(par: u32) -> SystemHub {
        let mut hub = SystemHub::new();
        hub.write_word(par - 8, 0x0010); // object base
        hub.write_word(par - 6, 0x0400); // variable base
        hub.write_word(par - 4, 0x0020); // entry pc
        hub.write_word(par - 2, 0x0804); // initial stack cursor
        hub
    }

    #[test]
    fn test_boot_loads_init_frame() {
        let mut hub = hub_with_init_frame(0x800);
        let mut cog = SpinCog::new(0, 0x800);

        cog.step(&mut hub);

        assert_eq!(cog.object_frame, 0x0010);
        assert_eq!(cog.variable_frame, 0x0400);
        assert_eq!(cog.pc(), 0x0020);
        assert_eq!(cog.stack_frame, 0x0800);
        assert_eq!(cog.local_frame, 0x07FC);
        assert_eq!(cog.run_state(), RunState::Wait);

        // Consumed frame words are overwritten.
        assert_eq!(hub.read_long(0x7F8), u32::MAX);
        assert_eq!(hub.read_long(0x7FC), 0);
        assert_eq!(cog.registers().read(&hub, registers::INITCOGID), 0x7FC);
    }

    #[test]
    fn test_boot_pacing() {
        let mut hub = hub_with_init_frame(0x800);
        // Entry bytecode: push 0 (0x35).
        hub.write_byte(0x20, 0x35);
        let mut cog = SpinCog::new(0, 0x800);

        // Boot tick plus the 48-tick delay; no instruction yet.
        for _ in 0..=BOOT_TICKS {
            cog.step(&mut hub);
        }
        assert_eq!(cog.instructions(), 0);
        assert_eq!(cog.run_state(), RunState::Exec);

        cog.step(&mut hub);
        assert_eq!(cog.instructions(), 1);
        assert_eq!(cog.run_state(), RunState::Wait);
        assert_eq!(cog.state_ticks, INSTRUCTION_TICKS);
    }

    #[test]
    fn test_video_delivery_hit_and_miss() {
        let mut cog = SpinCog::new(0, 0x800);
        cog.state = RunState::WaitVideo;
        cog.colors_value = 0x11223344;
        cog.pixels_value = 0x55667788;

        assert_eq!(cog.take_video_data(), (0x11223344, 0x55667788));
        assert_eq!(cog.frame_flag(), FrameFlag::Hit);
        assert_eq!(cog.run_state(), RunState::Exec);

        assert_eq!(cog.take_video_data(), (0, 0));
        assert_eq!(cog.frame_flag(), FrameFlag::Miss);
    }

    #[test]
    fn test_wait_count_is_edge_sensitive() {
        let mut hub = SystemHub::new();
        let mut cog = SpinCog::new(0, 0x800);
        cog.state = RunState::WaitCount;
        cog.target_value = 3;

        hub.set_counter(2);
        cog.step(&mut hub);
        assert_eq!(cog.run_state(), RunState::WaitCount);

        hub.set_counter(3);
        cog.step(&mut hub);
        assert_eq!(cog.run_state(), RunState::Exec);
    }

    #[test]
    fn test_wait_pins_levels() {
        let mut hub = SystemHub::new();
        let mut cog = SpinCog::new(0, 0x800);
        cog.state = RunState::WaitPinsEqual;
        cog.mask_value = 0xF;
        cog.target_value = 0xA;
        cog.wait_port = 0;

        hub.set_ina(0x1B);
        cog.step(&mut hub);
        assert_eq!(cog.run_state(), RunState::WaitPinsEqual);

        hub.set_ina(0x2A);
        cog.step(&mut hub);
        assert_eq!(cog.run_state(), RunState::Exec);
    }

    #[test]
    fn test_stopped_is_inert() {
        let mut hub = SystemHub::new();
        let mut cog = SpinCog::new(0, 0x800);
        cog.state = RunState::Stopped;
        assert!(cog.step(&mut hub));
        assert_eq!(cog.instructions(), 0);
    }

    #[test]
    fn test_breakpoint_reported() {
        let mut hub = hub_with_init_frame(0x800);
        let mut cog = SpinCog::new(0, 0x800);
        cog.set_breakpoint(Some(0x20));

        // Boot leaves the cursor at the entry point, which is the
        // breakpoint address.
        assert!(!cog.step(&mut hub));
    }
}
