// src/host.rs
//
// Seam between this crate and the host binary-analysis environment. The
// embedder (plugin shim, test harness) implements these traits; nothing in
// here talks to the network.

use crate::remote::request::Endianness;

/// Start/end addresses of one basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBlockRange {
    pub start: u64,
    pub end: u64,
}

/// The slice of function metadata a function-range job needs.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub start: u64,
    pub blocks: Vec<BasicBlockRange>,
}

impl FunctionInfo {
    /// Highest end address across the function's basic blocks. A function
    /// with no blocks spans nothing beyond its start.
    pub fn max_block_end(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| b.end)
            .max()
            .unwrap_or(self.start)
    }
}

/// Read-only view of the analyzed binary as the host database exposes it.
pub trait AnalysisView: Send + Sync {
    /// Free-form architecture name, e.g. "x86", "armv7", "powerpc_le".
    fn arch_name(&self) -> String;

    fn endianness(&self) -> Endianness;

    /// Declared container format tag, e.g. "elf", "pe", "raw".
    fn file_format(&self) -> String;

    /// Path of the backing file on disk.
    fn file_name(&self) -> String;

    /// Read up to `len` bytes at `addr`; short reads are allowed and signal
    /// the edge of mapped memory.
    fn read(&self, addr: u64, len: usize) -> Vec<u8>;

    fn is_valid_offset(&self, addr: u64) -> bool;

    fn is_offset_readable(&self, addr: u64) -> bool;

    /// Human-assigned symbol name bound to `addr`, if any.
    fn symbol_at(&self, addr: u64) -> Option<String>;
}

/// Host UI primitives: progress lines, the single final report per job, and
/// the first-run credential prompt.
pub trait HostUi: Send + Sync {
    fn progress(&self, message: &str);

    fn show_report(&self, title: &str, body: &str);

    /// One-line text input; `None` means the user dismissed the prompt.
    fn prompt_line(&self, prompt: &str) -> Option<String>;
}
