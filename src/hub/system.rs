//! Reference hub implementation.
//!
//! `SystemHub` backs the [`Hub`](super::Hub) trait with plain state:
//! a 64 KiB RAM image, host-settable pin buses, the tick counter, the
//! eight-lock pool, and a queue of pending cog-control requests.
//!
//! Cog control is queued rather than applied in place because a cog asks
//! for COGINIT or a stop while the machine is mid-step; the driver drains
//! the queue between ticks (see [`crate::machine`]).

use super::{
    coginit_entry, coginit_param, coginit_target, Hub, HubOpResult, HUBOP_COGINIT,
    RAM_SIZE,
};
#[cfg(test)]
use super::MAX_ADDRESS;

/// Number of cogs in the system.
pub const COG_COUNT: usize = 8;

/// Number of hardware locks.
pub const LOCK_COUNT: usize = 8;

/// A deferred cog-control request raised through the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CogControl {
    /// Boot a cog at `entry` with boot parameter `param`.
    Start { cog: u32, entry: u32, param: u32 },
    /// Stop a running cog.
    Stop { cog: u32 },
}

/// Shared system substrate: RAM, pins, counter, locks, cog bookkeeping.
pub struct SystemHub {
    ram: Box<[u8]>,
    ina: u32,
    inb: u32,
    counter: i64,
    clock_mode: u8,
    lock_state: [bool; LOCK_COUNT],
    lock_allocated: [bool; LOCK_COUNT],
    active: [bool; COG_COUNT],
    pending: Vec<CogControl>,
}

impl Default for SystemHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHub {
    /// Create a hub with zeroed RAM and no running cogs.
    pub fn new() -> Self {
        Self {
            ram: vec![0u8; RAM_SIZE].into_boxed_slice(),
            ina: 0,
            inb: 0,
            counter: 0,
            clock_mode: 0,
            lock_state: [false; LOCK_COUNT],
            lock_allocated: [false; LOCK_COUNT],
            active: [false; COG_COUNT],
            pending: Vec::new(),
        }
    }

    #[inline]
    fn index(address: u32) -> usize {
        (address as usize) & (RAM_SIZE - 1)
    }

    /// Copy a blob into RAM at `start`, truncating at the top of memory.
    pub fn load_ram(&mut self, start: usize, data: &[u8]) {
        if start >= self.ram.len() {
            return;
        }
        let end = (start + data.len()).min(self.ram.len());
        self.ram[start..end].copy_from_slice(&data[..end - start]);
    }

    /// Borrow the raw RAM image.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Drive pin bus A from the host side.
    pub fn set_ina(&mut self, value: u32) {
        self.ina = value;
    }

    /// Drive pin bus B from the host side.
    pub fn set_inb(&mut self, value: u32) {
        self.inb = value;
    }

    /// Advance the system counter by one tick.
    pub fn advance_counter(&mut self) {
        self.counter = self.counter.wrapping_add(1);
    }

    /// Force the counter to a specific value.
    pub fn set_counter(&mut self, value: i64) {
        self.counter = value;
    }

    /// Most recently latched clock mode.
    pub fn clock_mode(&self) -> u8 {
        self.clock_mode
    }

    /// Mark a cog slot as running or idle.
    pub fn set_active(&mut self, cog: u32, running: bool) {
        if (cog as usize) < COG_COUNT {
            self.active[cog as usize] = running;
        }
    }

    /// Whether a cog slot is currently marked running.
    pub fn is_active(&self, cog: u32) -> bool {
        (cog as usize) < COG_COUNT && self.active[cog as usize]
    }

    /// Lowest idle cog slot, if any.
    pub fn first_free_cog(&self) -> Option<u32> {
        self.active.iter().position(|running| !running).map(|i| i as u32)
    }

    /// Drain the pending cog-control queue.
    pub fn take_cog_control(&mut self) -> Vec<CogControl> {
        std::mem::take(&mut self.pending)
    }
}

impl Hub for SystemHub {
    fn read_byte(&self, address: u32) -> u8 {
        self.ram[Self::index(address)]
    }

    fn read_word(&self, address: u32) -> u16 {
        let low = self.read_byte(address) as u16;
        let high = self.read_byte(address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    fn read_long(&self, address: u32) -> u32 {
        let low = self.read_word(address) as u32;
        let high = self.read_word(address.wrapping_add(2)) as u32;
        (high << 16) | low
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        self.ram[Self::index(address)] = value;
    }

    fn write_word(&mut self, address: u32, value: u16) {
        self.write_byte(address, value as u8);
        self.write_byte(address.wrapping_add(1), (value >> 8) as u8);
    }

    fn write_long(&mut self, address: u32, value: u32) {
        self.write_word(address, value as u16);
        self.write_word(address.wrapping_add(2), (value >> 16) as u16);
    }

    fn ina(&self) -> u32 {
        self.ina
    }

    fn inb(&self) -> u32 {
        self.inb
    }

    fn counter(&self) -> i64 {
        self.counter
    }

    fn stop_cog(&mut self, cog: u32) {
        let cog = cog & 0x7;
        log::debug!("hub: stop request for cog {cog}");
        self.pending.push(CogControl::Stop { cog });
    }

    fn hub_op(&mut self, caller: u32, op: u32, code: u32) -> HubOpResult {
        match op {
            HUBOP_COGINIT => {
                let target = match coginit_target(code) {
                    Some(id) => id,
                    None => match self.first_free_cog() {
                        Some(id) => id,
                        None => {
                            log::warn!("hub: COGINIT from cog {caller} with no free slot");
                            return HubOpResult::failed();
                        }
                    },
                };
                let entry = coginit_entry(code);
                let param = coginit_param(code);
                log::debug!(
                    "hub: COGINIT cog {target} entry=0x{entry:04X} param=0x{param:04X} (from cog {caller})"
                );
                self.active[target as usize] = true;
                self.pending.push(CogControl::Start {
                    cog: target,
                    entry,
                    param,
                });
                HubOpResult::ok(target)
            }
            other => {
                log::warn!("hub: unhandled hub op {other} from cog {caller}");
                HubOpResult::default()
            }
        }
    }

    fn new_lock(&mut self) -> u32 {
        match self.lock_allocated.iter().position(|taken| !taken) {
            Some(id) => {
                self.lock_allocated[id] = true;
                id as u32
            }
            None => u32::MAX,
        }
    }

    fn lock_return(&mut self, id: u32) {
        let id = (id as usize) & (LOCK_COUNT - 1);
        self.lock_allocated[id] = false;
    }

    fn lock_set(&mut self, id: u32, on: bool) -> bool {
        let id = (id as usize) & (LOCK_COUNT - 1);
        let previous = self.lock_state[id];
        self.lock_state[id] = on;
        previous
    }

    fn set_clock_mode(&mut self, mode: u8) {
        log::debug!("hub: clock mode set to 0x{mode:02X}");
        self.clock_mode = mode;
    }
}
