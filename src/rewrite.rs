// src/rewrite.rs
//
// Post-processing of remote decompiler output: placeholder tokens
// (sub_/data_/unknown_ names, bare hex literals) are resolved against the
// host symbol table, falling back to recovering printable string literals
// through a pointer dereference. Line structure is preserved exactly and the
// rewriter never fails; anything unresolvable is simply left alone.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::host::AnalysisView;

/// Placeholder the remote decompiler emits for the job's entry point.
const ENTRY_POINT_TOKEN: &str = "entry_point";

// The service emits lowercase hex only.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"unknown_[0-9a-f]+|data_[0-9a-f]+|sub_[0-9a-f]+|0x[0-9a-f]+")
        .expect("token pattern is valid")
});

/// What the rewriter needs from the host symbol database.
pub trait SymbolSource {
    fn symbol_name_at(&self, addr: u64) -> Option<String>;

    /// `None` unless all `len` bytes at `addr` are readable.
    fn read_bytes(&self, addr: u64, len: usize) -> Option<Vec<u8>>;

    fn is_readable_address(&self, addr: u64) -> bool;

    /// Reads forward one byte at a time until a non-printable byte, escaping
    /// `\n` `\t` `\v` `\f` as two-character sequences. `None` when the very
    /// first byte is already non-printable; zero-length strings are never
    /// produced.
    fn read_printable_string_at(&self, addr: u64) -> Option<String> {
        let mut out = String::new();
        let mut cur = addr;
        loop {
            let byte = match self.read_bytes(cur, 1) {
                Some(b) if !b.is_empty() => b[0],
                _ => break,
            };
            if !is_printable(byte) {
                break;
            }
            match byte {
                b'\n' => out.push_str("\\n"),
                b'\t' => out.push_str("\\t"),
                0x0b => out.push_str("\\v"),
                0x0c => out.push_str("\\f"),
                _ => out.push(byte as char),
            }
            cur += 1;
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

impl<V: AnalysisView + ?Sized> SymbolSource for V {
    fn symbol_name_at(&self, addr: u64) -> Option<String> {
        self.symbol_at(addr)
    }

    fn read_bytes(&self, addr: u64, len: usize) -> Option<Vec<u8>> {
        let bytes = self.read(addr, len);
        if bytes.len() == len {
            Some(bytes)
        } else {
            None
        }
    }

    fn is_readable_address(&self, addr: u64) -> bool {
        self.is_offset_readable(addr)
    }
}

/// Rewrites pseudocode using host symbols. `entry_point` is the raw-mode
/// anchor address; whole-file jobs have none and skip the entry-point
/// substitution.
pub struct PseudocodeRewriter<'a, S: SymbolSource + ?Sized> {
    symbols: &'a S,
    entry_point: Option<u64>,
}

impl<'a, S: SymbolSource + ?Sized> PseudocodeRewriter<'a, S> {
    pub fn new(symbols: &'a S, entry_point: Option<u64>) -> Self {
        Self {
            symbols,
            entry_point,
        }
    }

    /// Same line count and order as the input, trailing newline included.
    pub fn rewrite(&self, code: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        for line in code.lines() {
            out.push(self.rewrite_line(line));
        }
        let mut text = out.join("\n");
        if code.ends_with('\n') {
            text.push('\n');
        }
        text
    }

    fn rewrite_line(&self, line: &str) -> String {
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") || trimmed.starts_with('#') {
            return line.to_string();
        }

        debug!("analyzing line '{}'", line);
        let line = match self.entry_point {
            Some(addr) if line.contains(ENTRY_POINT_TOKEN) => {
                match self.symbols.symbol_name_at(addr) {
                    Some(name) => line.replace(ENTRY_POINT_TOKEN, &name),
                    None => line.to_string(),
                }
            }
            _ => line.to_string(),
        };

        // Matches come from the original line; replacements land in a
        // separate buffer, so a replacement can never alias a later match.
        // Identical token text resolves once per line.
        let mut resolved: HashMap<String, Option<String>> = HashMap::new();
        let mut out = String::with_capacity(line.len());
        let mut last = 0;
        for m in TOKEN_RE.find_iter(&line) {
            out.push_str(&line[last..m.start()]);
            let replacement = resolved
                .entry(m.as_str().to_string())
                .or_insert_with(|| self.resolve_token(m.as_str()));
            match replacement {
                Some(r) => out.push_str(r),
                None => out.push_str(m.as_str()),
            }
            last = m.end();
        }
        out.push_str(&line[last..]);
        out
    }

    /// Symbol name, else quoted string recovered through a 4-byte
    /// little-endian dereference. `None` leaves the token as-is; malformed
    /// hex and unreadable memory degrade silently.
    fn resolve_token(&self, token: &str) -> Option<String> {
        let addr = parse_token_address(token)?;
        debug!("trying to find symbol at {:#x}", addr);
        if let Some(name) = self.symbols.symbol_name_at(addr) {
            return Some(name);
        }

        let bytes = self.symbols.read_bytes(addr, 4)?;
        let target = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;
        if !self.symbols.is_readable_address(target) {
            return None;
        }
        debug!("trying to read string at {:#x}", target);
        let s = self.symbols.read_printable_string_at(target)?;
        Some(format!("\"{}\"", s))
    }
}

/// Hex address embedded in a token: everything after the last `_` for
/// prefixed tokens, the digits after `0x` for bare literals.
fn parse_token_address(token: &str) -> Option<u64> {
    let hex = match token.rfind('_') {
        Some(i) => &token[i + 1..],
        None => token.strip_prefix("0x")?,
    };
    u64::from_str_radix(hex, 16).ok()
}

fn is_printable(byte: u8) -> bool {
    byte.is_ascii_graphic() || matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}
