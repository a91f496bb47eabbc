//! The target adapter: the capability set the RSP server stub calls
//! into to advance and inspect the simulated program.
//!
//! The real IR interpreter is out of scope for this crate (see the
//! spec's Non-goals) — [`LinearTarget`] is a minimal stand-in used by
//! tests and the demo binary, playing the role the LLVM-IR simulator
//! plays in the system this crate is modeled on.

use thiserror::Error;

/// GDB stop-signal numbers used by this bridge.
pub mod signal {
    pub const INT: u8 = 2;
    pub const TRAP: u8 = 5;
    pub const KILL: u8 = 9;
}

/// Hardware vs. software vs. watchpoint breakpoint kinds, as used on
/// the `z`/`Z` packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Software,
    Hardware,
    WriteWatchpoint,
    ReadWatchpoint,
    AccessWatchpoint,
}

impl BreakpointKind {
    pub fn from_digit(d: u8) -> Option<Self> {
        match d {
            0 => Some(Self::Software),
            1 => Some(Self::Hardware),
            2 => Some(Self::WriteWatchpoint),
            3 => Some(Self::ReadWatchpoint),
            4 => Some(Self::AccessWatchpoint),
            _ => None,
        }
    }
}

/// Outcome of one call into [`Target::run_current_instr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The successor instruction's address is a breakpoint; execution
    /// has not resumed past it.
    Breakpoint(u64),
    /// `cycle_budget` was zero on entry; nothing was executed.
    CycleBudgetExhausted,
    /// One instruction retired and its successor is not a breakpoint.
    Retired,
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("register index {0} out of range")]
    RegisterOutOfRange(u64),
    #[error("breakpoint at address {0:#x} not found")]
    NoSuchBreakpoint(u64),
    #[error("the target trapped")]
    Trapped,
}

/// Static metadata for one register, as reported by `qRegisterInfo`.
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    pub name: String,
    pub bitsize: u32,
    pub offset: u32,
    pub set: &'static str,
    pub generic: Option<&'static str>,
}

impl RegisterInfo {
    /// Render as the `name:...;bitsize:...;...;` descriptor string
    /// `qRegisterInfo` replies with.
    pub fn to_descriptor(&self) -> String {
        let mut s = format!(
            "name:{};bitsize:{};offset:{};encoding:uint;format:hex;set:{};",
            self.name, self.bitsize, self.offset, self.set
        );
        if let Some(g) = self.generic {
            s.push_str(&format!("generic:{};", g));
        }
        s
    }
}

/// The capability set a conforming target exposes to the server stub.
///
/// Default methods reply "unsupported" (by way of a `TargetError` the
/// server maps to the empty packet) for anything a minimal target
/// need not implement, mirroring the teacher's base-handler pattern.
pub trait Target {
    /// Number of registers, including the synthetic PC at index 0.
    fn register_count(&self) -> usize;

    /// Static descriptor for register `index`.
    fn register_info(&self, index: usize) -> Option<RegisterInfo>;

    /// Concatenated little-endian bytes of every register, PC first.
    fn read_all_registers(&self) -> Vec<u8>;

    /// Little-endian bytes of register `index`.
    fn read_register(&self, index: usize) -> Result<Vec<u8>, TargetError>;

    /// Write all registers from a concatenated little-endian dump.
    /// The default implementation reports unsupported.
    fn write_all_registers(&mut self, _data: &[u8]) -> Result<(), TargetError> {
        Err(TargetError::Trapped)
    }

    /// Why execution is currently halted.
    fn halt_reason(&self) -> u8 {
        signal::TRAP
    }

    /// Arm a single-step: advance one instruction then stop.
    fn step(&mut self, _addr: Option<u64>);

    /// Arm a continue: advance until a breakpoint or interruption.
    fn cont(&mut self, _addr: Option<u64>);

    /// Add a breakpoint at a byte address.
    fn add_breakpoint(&mut self, kind: BreakpointKind, addr: u64, len: u8);

    /// Remove a breakpoint at a byte address.
    fn remove_breakpoint(&mut self, kind: BreakpointKind, addr: u64) -> Result<(), TargetError>;

    /// Advance the simulator by exactly one instruction. See the
    /// spec's component design for the precise entry/exit semantics.
    fn run_current_instr(&mut self) -> StepOutcome;

    /// `qHostInfo` descriptor string.
    fn host_info(&self) -> String {
        "triple:7838365f36342d756e6b6e6f776e2d67656e2d756e75;endian:little;ptrsize:8;".to_string()
    }

    /// `qMemoryRegionInfo` descriptor string for `addr`.
    fn memory_region_info(&self, _addr: u64) -> String {
        "start:0;size:100000;permissions:rwx;".to_string()
    }
}

/// A fixed sequence of synthetic registers that retire strictly in
/// index order with no branches — just enough to exercise the
/// protocol core end to end.
pub struct LinearTarget {
    /// Width in bytes of each non-PC register.
    widths: Vec<u32>,
    names: Vec<String>,
    values: Vec<u64>,
    /// Index of the next instruction to execute (0-based), or
    /// `values.len()` once the program has run off the end.
    next: usize,
    /// Ever executed anything yet?
    started: bool,
    cycle_budget: u64,
    breakpoints: std::collections::BTreeSet<u64>,
    codeline_offset: u64,
}

impl LinearTarget {
    /// Build a target with `count` registers of `bits` width each,
    /// named `r0`, `r1`, ... Instructions occupy consecutive codelines
    /// starting at `codeline_offset`.
    pub fn new(count: usize, bits: u32, codeline_offset: u64) -> Self {
        LinearTarget {
            widths: vec![(bits as usize).div_ceil(8) as u32; count],
            names: (0..count).map(|i| format!("r{i}")).collect(),
            values: vec![0; count],
            next: 0,
            started: false,
            cycle_budget: 0,
            breakpoints: Default::default(),
            codeline_offset,
        }
    }

    /// Codeline of the next instruction to execute.
    pub fn next_codeline(&self) -> u64 {
        self.codeline_offset + self.next as u64
    }

    fn pc(&self) -> u64 {
        self.next_codeline() * 8
    }

    fn byte_offset(&self, index: usize) -> u32 {
        let mut offset = 8u32;
        for w in &self.widths[..index] {
            offset += w;
        }
        offset
    }
}

impl Target for LinearTarget {
    fn register_count(&self) -> usize {
        self.widths.len() + 1
    }

    fn register_info(&self, index: usize) -> Option<RegisterInfo> {
        if index == 0 {
            return Some(RegisterInfo {
                name: "pc".to_string(),
                bitsize: 64,
                offset: 0,
                set: "Program Counter",
                generic: Some("pc"),
            });
        }
        let i = index - 1;
        let width = *self.widths.get(i)?;
        Some(RegisterInfo {
            name: self.names[i].clone(),
            bitsize: width * 8,
            offset: self.byte_offset(i),
            set: "IR reg",
            generic: None,
        })
    }

    fn read_all_registers(&self) -> Vec<u8> {
        let mut out = self.pc().to_le_bytes().to_vec();
        for (i, w) in self.widths.iter().enumerate() {
            out.extend_from_slice(&self.values[i].to_le_bytes()[..*w as usize]);
        }
        out
    }

    fn read_register(&self, index: usize) -> Result<Vec<u8>, TargetError> {
        if index == 0 {
            return Ok(self.pc().to_le_bytes().to_vec());
        }
        let i = index - 1;
        let w = *self
            .widths
            .get(i)
            .ok_or(TargetError::RegisterOutOfRange(index as u64))? as usize;
        Ok(self.values[i].to_le_bytes()[..w].to_vec())
    }

    fn step(&mut self, _addr: Option<u64>) {
        self.cycle_budget = 1;
    }

    fn cont(&mut self, _addr: Option<u64>) {
        self.cycle_budget = u64::MAX;
    }

    fn add_breakpoint(&mut self, _kind: BreakpointKind, addr: u64, _len: u8) {
        self.breakpoints.insert(addr);
    }

    fn remove_breakpoint(&mut self, _kind: BreakpointKind, addr: u64) -> Result<(), TargetError> {
        if self.breakpoints.remove(&addr) {
            Ok(())
        } else {
            Err(TargetError::NoSuchBreakpoint(addr))
        }
    }

    fn run_current_instr(&mut self) -> StepOutcome {
        if self.cycle_budget == 0 {
            return StepOutcome::CycleBudgetExhausted;
        }
        self.cycle_budget -= 1;

        if !self.started {
            self.started = true;
            if self.breakpoints.contains(&self.pc()) {
                return StepOutcome::Breakpoint(self.pc());
            }
        }

        if self.next < self.values.len() {
            self.values[self.next] = self.next as u64;
            self.next += 1;
        }
        if self.breakpoints.contains(&self.pc()) {
            StepOutcome::Breakpoint(self.pc())
        } else {
            StepOutcome::Retired
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pc_starts_at_codeline_offset() {
        let t = LinearTarget::new(3, 32, 6);
        assert_eq!(t.read_register(0).unwrap(), 48u64.to_le_bytes());
    }

    #[test]
    fn step_advances_pc_by_one_codeline() {
        let mut t = LinearTarget::new(3, 32, 6);
        let before = u64::from_le_bytes(t.read_register(0).unwrap().try_into().unwrap());
        t.step(None);
        t.run_current_instr();
        let after = u64::from_le_bytes(t.read_register(0).unwrap().try_into().unwrap());
        assert_eq!(after, before + 8);
    }

    #[test]
    fn breakpoint_is_reported_on_arrival() {
        let mut t = LinearTarget::new(3, 32, 6);
        t.add_breakpoint(BreakpointKind::Hardware, 8 * 8, 0);
        t.cont(None);
        assert_eq!(t.run_current_instr(), StepOutcome::Retired);
        assert_eq!(t.run_current_instr(), StepOutcome::Breakpoint(8 * 8));
    }

    #[test]
    fn zero_cycle_budget_executes_nothing() {
        let mut t = LinearTarget::new(1, 32, 6);
        assert_eq!(t.run_current_instr(), StepOutcome::CycleBudgetExhausted);
    }

    #[test]
    fn add_then_remove_breakpoint_round_trips() {
        let mut t = LinearTarget::new(1, 32, 6);
        t.add_breakpoint(BreakpointKind::Hardware, 0x38, 0);
        assert!(t.breakpoints.contains(&0x38));
        t.remove_breakpoint(BreakpointKind::Hardware, 0x38).unwrap();
        assert!(!t.breakpoints.contains(&0x38));
    }
}
