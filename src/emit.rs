//! Assembly emitter: the output-side component that writes Onramp assembly
//! tokens, labels, and literals to the output file.
//!
//! Generic over `Write` so the CLI can target a real file while tests target
//! an in-memory `Vec<u8>`.

use std::io::{self, Write};

use crate::error::Result;

/// Registers 0..15, in emission order.
const REGISTER_NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "ra", "rb", "rsp", "rfp", "rpp",
    "rip",
];

/// Label sigil: definition, address-reference, jump-target, or local
/// (intra-function) definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    /// `@name` — a global definition.
    Define,
    /// `^name` — a reference to a global's address.
    Address,
    /// `&name` — a forward/backward jump target operand.
    Jump,
    /// `:name` — a local label definition.
    Local,
}

impl Sigil {
    fn ch(self) -> char {
        match self {
            Sigil::Define => '@',
            Sigil::Address => '^',
            Sigil::Jump => '&',
            Sigil::Local => ':',
        }
    }
}

pub struct Emitter<W: Write> {
    out: W,
    first_token_on_line: bool,
    enabled: bool,
}

impl<W: Write> Emitter<W> {
    pub fn new(mut out: W) -> Result<Self> {
        out.write_all(b"#line manual\n")?;
        Ok(Emitter {
            out,
            first_token_on_line: true,
            enabled: true,
        })
    }

    /// Disables/enables normal emission. Used exclusively to implement
    /// `sizeof`: the operand is parsed with emission disabled so any
    /// side-effecting sub-expressions produce no code.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn raw(&mut self, s: &str) -> Result<()> {
        if self.enabled {
            self.out.write_all(s.as_bytes())?;
        }
        Ok(())
    }

    fn raw_byte(&mut self, b: u8) -> Result<()> {
        if self.enabled {
            self.out.write_all(&[b])?;
        }
        Ok(())
    }

    /// Writes a bare token, preceded by a two-space indent if it is the
    /// first token on the line, otherwise by a single space.
    pub fn term(&mut self, token: &str) -> Result<()> {
        if self.first_token_on_line {
            self.raw("  ")?;
            self.first_token_on_line = false;
        } else {
            self.raw(" ")?;
        }
        self.raw(token)
    }

    pub fn register(&mut self, index: usize) -> Result<()> {
        let name = REGISTER_NAMES
            .get(index)
            .unwrap_or_else(|| panic!("register index out of range: {index}"));
        self.term(name)
    }

    pub fn int(&mut self, value: i32) -> Result<()> {
        if (-160..=254).contains(&value) {
            self.term(&value.to_string())
        } else {
            self.term(&format!("0x{:08x}", value as u32))
        }
    }

    /// Writes `<sigil><name>` as a standalone token.
    pub fn label(&mut self, sigil: Sigil, name: &str) -> Result<()> {
        self.term(&format!("{}{}", sigil.ch(), name))
    }

    /// Writes `<sigil><prefix><name>`.
    pub fn prefixed_label(&mut self, sigil: Sigil, prefix: &str, name: &str) -> Result<()> {
        self.term(&format!("{}{}{}", sigil.ch(), prefix, name))
    }

    /// Writes `<sigil><prefix><index, hex>` — used for synthetic jump and
    /// string labels.
    pub fn computed_label(&mut self, sigil: Sigil, prefix: &str, index: usize) -> Result<()> {
        self.term(&format!("{}{}{:x}", sigil.ch(), prefix, index))
    }

    pub fn char_literal(&mut self, c: u8) -> Result<()> {
        if self.first_token_on_line {
            self.raw("  ")?;
            self.first_token_on_line = false;
        } else {
            self.raw(" ")?;
        }
        self.raw(&format!("'{c:02x}"))
    }

    pub fn quoted_byte(&mut self, b: u8) -> Result<()> {
        self.raw(&format!("'{b:02x}"))
    }

    pub fn char_byte(&mut self, b: u8) -> Result<()> {
        self.raw_byte(b)
    }

    /// Writes a C string as an assembly string literal: runs of printable,
    /// non-quote, non-backslash bytes become `"..."`, everything else is
    /// split out as `'HH`. Always null-terminated.
    pub fn string_literal(&mut self, bytes: &[u8]) -> Result<()> {
        if self.first_token_on_line {
            self.raw("  ")?;
            self.first_token_on_line = false;
        } else {
            self.raw(" ")?;
        }
        let mut in_quotes = false;
        for &b in bytes {
            let printable = (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\';
            if printable {
                if !in_quotes {
                    self.raw("\"")?;
                    in_quotes = true;
                }
                self.raw_byte(b)?;
            } else {
                if in_quotes {
                    self.raw("\"")?;
                    in_quotes = false;
                }
                self.raw(" ")?;
                self.quoted_byte(b)?;
            }
        }
        if in_quotes {
            self.raw("\"")?;
        }
        Ok(())
    }

    /// Reserves `n` zeroed bytes of static storage, for a global with no
    /// initializer.
    pub fn directive_zero(&mut self, n: i32) -> Result<()> {
        self.term("zero")?;
        self.int(n)?;
        self.newline()
    }

    pub fn newline(&mut self) -> Result<()> {
        self.raw("\n")?;
        self.first_token_on_line = true;
        Ok(())
    }

    /// Three blank lines between top-level declarations, for readability.
    pub fn global_divider(&mut self) -> Result<()> {
        self.raw("\n\n\n")?;
        self.first_token_on_line = true;
        Ok(())
    }

    /// Propagates a `#line` directive. Bypasses the enable bit: line
    /// tracking must survive even inside a disabled (`sizeof`) region.
    pub fn line_directive(&mut self, line: u32, file: &str) -> io::Result<()> {
        write!(self.out, "#line {line} \"{file}\"\n")?;
        self.first_token_on_line = true;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Consumes the emitter, returning the underlying writer. Used by
    /// callers that target an in-memory buffer and want the bytes back.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_to_string<F: FnOnce(&mut Emitter<Vec<u8>>) -> Result<()>>(f: F) -> String {
        let mut e = Emitter::new(Vec::new()).unwrap();
        f(&mut e).unwrap();
        e.flush().unwrap();
        String::from_utf8(e.out).unwrap()
    }

    #[test]
    fn indents_first_token_on_line() {
        let s = emit_to_string(|e| {
            e.term("enter")?;
            e.newline()?;
            e.term("add")?;
            e.register(0)?;
            e.register(13)?;
            e.int(4)?;
            e.newline()
        });
        assert_eq!(s, "#line manual\n  enter\n  add r0 rfp 4\n");
    }

    #[test]
    fn small_immediates_are_decimal_large_are_hex() {
        let s = emit_to_string(|e| {
            e.int(100)?;
            e.int(-9999)
        });
        assert_eq!(s, "#line manual\n  100 0xffffd8f1");
    }

    #[test]
    fn disabled_emitter_is_a_no_op() {
        let s = emit_to_string(|e| {
            e.set_enabled(false);
            e.term("imw")?;
            e.register(0)?;
            e.int(4)?;
            e.set_enabled(true);
            e.term("ret")
        });
        assert_eq!(s, "#line manual\n  ret");
    }

    #[test]
    fn string_literal_splits_unprintables() {
        let s = emit_to_string(|e| e.string_literal(b"hi\n"));
        assert_eq!(s, "#line manual\n  \"hi\" '0a");
    }

    #[test]
    fn labels_use_correct_sigils() {
        let s = emit_to_string(|e| {
            e.label(Sigil::Define, "main")?;
            e.newline()?;
            e.computed_label(Sigil::Jump, "_Lx", 10)
        });
        assert_eq!(s, "#line manual\n  @main\n  &_Lxa");
    }
}
