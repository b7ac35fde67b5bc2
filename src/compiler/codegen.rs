//! Codegen primitives. `decl`, `expr`, and `stmt` describe *what* needs to
//! happen in terms of types and values; every method here is the handful of
//! assembly lines that make it happen. Nothing above this layer emits a raw
//! mnemonic directly.
//!
//! Invariant maintained throughout expression codegen: by the time a value
//! is actually used at some type, `r0` holds a correctly sign- or
//! zero-extended 32-bit representation of it. A load only zero-extends
//! (`ldb`/`lds`/`ldw` are the only load instructions); it is `compile_cast`,
//! not the load, that sign-extends a signed char/short the first time it's
//! used at a wider type.

use std::io::Write;

use crate::emit::Sigil;
use crate::error::{CompileError, Result};
use crate::types::{BaseKind, Type};

use super::{reg, Compiler, JUMP_LABEL_PREFIX, STRING_LABEL_PREFIX};

impl<W: Write> Compiler<W> {
    // ---------------------------------------------------------------- regs

    fn emit3(&mut self, op: &str, dst: usize, a: usize, b: usize) -> Result<()> {
        self.emitter.term(op)?;
        self.emitter.register(dst)?;
        self.emitter.register(a)?;
        self.emitter.register(b)?;
        self.emitter.newline()
    }

    fn emit_reg_imm(&mut self, op: &str, dst: usize, a: usize, imm: i32) -> Result<()> {
        self.emitter.term(op)?;
        self.emitter.register(dst)?;
        self.emitter.register(a)?;
        self.emitter.int(imm)?;
        self.emitter.newline()
    }

    fn emit2(&mut self, op: &str, dst: usize, src: usize) -> Result<()> {
        self.emitter.term(op)?;
        self.emitter.register(dst)?;
        self.emitter.register(src)?;
        self.emitter.newline()
    }

    pub(crate) fn compile_mov(&mut self, dst: usize, src: usize) -> Result<()> {
        if dst == src {
            return Ok(());
        }
        self.emit_reg_imm("add", dst, src, 0)
    }

    pub(crate) fn compile_load_immediate(&mut self, dst: usize, value: i32) -> Result<()> {
        self.emitter.term("imw")?;
        self.emitter.register(dst)?;
        self.emitter.int(value)?;
        self.emitter.newline()
    }

    // --------------------------------------------------------------- stack

    pub(crate) fn push(&mut self, src: usize) -> Result<()> {
        self.emit_reg_imm("sub", reg::RSP, reg::RSP, 4)?;
        self.emitter.term("stw")?;
        self.emitter.register(src)?;
        self.emitter.register(reg::RSP)?;
        self.emitter.int(0)?;
        self.emitter.newline()
    }

    pub(crate) fn pop(&mut self, dst: usize) -> Result<()> {
        self.emitter.term("ldw")?;
        self.emitter.register(dst)?;
        self.emitter.register(reg::RSP)?;
        self.emitter.int(0)?;
        self.emitter.newline()?;
        self.emit_reg_imm("add", reg::RSP, reg::RSP, 4)
    }

    pub(crate) fn drop_stack(&mut self, bytes: i32) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        self.emit_reg_imm("add", reg::RSP, reg::RSP, bytes)
    }

    // -------------------------------------------------------------- labels

    pub(crate) fn new_label(&mut self) -> usize {
        self.generate_label()
    }

    pub(crate) fn define_label(&mut self, label: usize) -> Result<()> {
        self.emitter
            .computed_label(Sigil::Local, JUMP_LABEL_PREFIX, label)?;
        self.emitter.newline()
    }

    pub(crate) fn jump(&mut self, label: usize) -> Result<()> {
        self.emitter.term("jmp")?;
        self.emitter
            .computed_label(Sigil::Jump, JUMP_LABEL_PREFIX, label)?;
        self.emitter.newline()
    }

    pub(crate) fn jump_if_zero(&mut self, src: usize, label: usize) -> Result<()> {
        self.emitter.term("jz")?;
        self.emitter.register(src)?;
        self.emitter
            .computed_label(Sigil::Jump, JUMP_LABEL_PREFIX, label)?;
        self.emitter.newline()
    }

    pub(crate) fn jump_if_not_zero(&mut self, src: usize, label: usize) -> Result<()> {
        self.emitter.term("jnz")?;
        self.emitter.register(src)?;
        self.emitter
            .computed_label(Sigil::Jump, JUMP_LABEL_PREFIX, label)?;
        self.emitter.newline()
    }

    pub(crate) fn jump_to_user_label(&mut self, label: &str) -> Result<()> {
        self.emitter.term("jmp")?;
        self.emitter
            .prefixed_label(Sigil::Jump, super::USER_LABEL_PREFIX, label)?;
        self.emitter.newline()
    }

    pub(crate) fn define_user_label(&mut self, label: &str) -> Result<()> {
        self.emitter
            .prefixed_label(Sigil::Local, super::USER_LABEL_PREFIX, label)?;
        self.emitter.newline()
    }

    /// Normalizes `src` to exactly 0 or 1 based on whether it is currently
    /// non-zero — a boolean cast.
    pub(crate) fn compile_truthy(&mut self, src: usize, dst: usize) -> Result<()> {
        self.emit2("bool", dst, src)
    }

    pub(crate) fn compile_logical_not(&mut self) -> Result<()> {
        self.emit2("isz", reg::R0, reg::R0)
    }

    // --------------------------------------------------------- arithmetic

    pub(crate) fn compile_binary_arith(&mut self, op: &str, signed: bool) -> Result<()> {
        let mnemonic = match op {
            "+" => "add",
            "-" => "sub",
            "*" => "mul",
            "/" => {
                if signed {
                    "divs"
                } else {
                    "divu"
                }
            }
            "%" => {
                if signed {
                    "mods"
                } else {
                    "modu"
                }
            }
            "&" => "and",
            "|" => "or",
            "^" => "xor",
            "<<" => "shl",
            ">>" => {
                if signed {
                    "shrs"
                } else {
                    "shru"
                }
            }
            _ => {
                return Err(CompileError::fatal(
                    "Internal error: unrecognized binary operator.",
                ))
            }
        };
        // convention: lhs was pushed and is popped into r1, rhs is already in r0.
        self.emit3(mnemonic, reg::R0, reg::R1, reg::R0)
    }

    pub(crate) fn compile_negate(&mut self) -> Result<()> {
        self.emitter.term("sub")?;
        self.emitter.register(reg::R0)?;
        self.emitter.int(0)?;
        self.emitter.register(reg::R0)?;
        self.emitter.newline()
    }

    pub(crate) fn compile_bitwise_not(&mut self) -> Result<()> {
        self.emit_reg_imm("xor", reg::R0, reg::R0, -1)
    }

    /// `dst = src + imm` — member offsets and pointer-plus-constant
    /// arithmetic.
    pub(crate) fn compile_add_immediate(&mut self, dst: usize, src: usize, imm: i32) -> Result<()> {
        self.emit_reg_imm("add", dst, src, imm)
    }

    /// `dst = a + b`, all plain registers.
    pub(crate) fn compile_add_registers(&mut self, dst: usize, a: usize, b: usize) -> Result<()> {
        self.emit3("add", dst, a, b)
    }

    /// Divides `target` by `size` in place, skipped when `size == 1`. Used
    /// for pointer-difference results (byte distance -> element count).
    pub(crate) fn compile_div_immediate(&mut self, target: usize, size: i32) -> Result<()> {
        if size == 1 {
            return Ok(());
        }
        self.emitter.term("divs")?;
        self.emitter.register(target)?;
        self.emitter.register(target)?;
        self.emitter.int(size)?;
        self.emitter.newline()
    }

    /// Reads the word at `[rsp + offset]` into `dst` without moving `rsp` —
    /// used to recover an indirect call's callee address out from under the
    /// argument block that was pushed after it.
    pub(crate) fn compile_peek(&mut self, dst: usize, offset: i32) -> Result<()> {
        self.emit_reg_imm("ldw", dst, reg::RSP, offset)
    }

    /// Scales the register holding a pointer difference/offset by `size`,
    /// skipped entirely when `size == 1` (byte pointers).
    pub(crate) fn compile_scale(&mut self, target: usize, size: i32) -> Result<()> {
        if size == 1 {
            return Ok(());
        }
        self.emitter.term("mul")?;
        self.emitter.register(target)?;
        self.emitter.register(target)?;
        self.emitter.int(size)?;
        self.emitter.newline()
    }

    /// Three-way-compares `a` against `b` into `dst`: -1/0/1 for
    /// less/equal/greater. Pointers compare unsigned.
    fn compile_compare(&mut self, dst: usize, a: usize, b: usize, signed: bool) -> Result<()> {
        self.emit3(if signed { "cmps" } else { "cmpu" }, dst, a, b)
    }

    /// Three-way-compares the value in `target` against the immediate
    /// `term`, replacing it with another -1/0/1 result.
    fn compile_compare_against(&mut self, target: usize, term: i32) -> Result<()> {
        self.emit_reg_imm("cmpu", target, target, term)
    }

    /// `dst = 1` if `src == 0`, else `dst = 0`.
    fn compile_is_zero(&mut self, dst: usize, src: usize) -> Result<()> {
        self.emit2("isz", dst, src)
    }

    /// `dst = 1` if `src != 0`, else `dst = 0` — a boolean cast.
    fn compile_is_nonzero(&mut self, dst: usize, src: usize) -> Result<()> {
        self.emit2("bool", dst, src)
    }

    /// One entry of a switch's dispatch chain: with the controlling value
    /// already loaded into `r0`, jumps to `label` if it equals `value`.
    /// Leaves `r0` unchanged either way, so the chain can test it against
    /// every case in turn — the three-way compare result is computed into
    /// the scratch register instead.
    pub(crate) fn compile_case_test(&mut self, value: i32, label: usize) -> Result<()> {
        self.compile_load_immediate(reg::R1, value)?;
        self.compile_compare(reg::SCRATCH, reg::R0, reg::R1, true)?;
        self.compile_is_zero(reg::SCRATCH, reg::SCRATCH)?;
        self.jump_if_not_zero(reg::SCRATCH, label)
    }

    /// Compiles a relational/equality operator: the left operand was popped
    /// into `r1`, the right is already in `r0`. Leaves a 0/1 result in `r0`.
    /// Equality is always unsigned (sign does not affect bit-pattern
    /// equality); ordered comparisons are signed only when both operands
    /// are signed.
    pub(crate) fn compile_relational(&mut self, op: &str, signed: bool) -> Result<()> {
        match op {
            "==" => {
                self.compile_compare(reg::R0, reg::R1, reg::R0, false)?;
                self.compile_is_zero(reg::R0, reg::R0)
            }
            "!=" => {
                self.compile_compare(reg::R0, reg::R1, reg::R0, false)?;
                self.compile_is_nonzero(reg::R0, reg::R0)
            }
            "<" => {
                self.compile_compare(reg::R0, reg::R1, reg::R0, signed)?;
                self.compile_compare_against(reg::R0, -1)?;
                self.compile_is_zero(reg::R0, reg::R0)
            }
            ">" => {
                self.compile_compare(reg::R0, reg::R1, reg::R0, signed)?;
                self.compile_compare_against(reg::R0, 1)?;
                self.compile_is_zero(reg::R0, reg::R0)
            }
            "<=" => {
                self.compile_compare(reg::R0, reg::R1, reg::R0, signed)?;
                self.compile_compare_against(reg::R0, 1)?;
                self.compile_is_nonzero(reg::R0, reg::R0)
            }
            ">=" => {
                self.compile_compare(reg::R0, reg::R1, reg::R0, signed)?;
                self.compile_compare_against(reg::R0, -1)?;
                self.compile_is_nonzero(reg::R0, reg::R0)
            }
            _ => Err(CompileError::fatal(
                "Internal error: unrecognized relational operator.",
            )),
        }
    }

    // -------------------------------------------------------------- casts

    /// The base a type is cast as, for the purpose of picking an
    /// extension/truncation sequence: a pointer is just an unsigned int.
    fn cast_base(ty: &Type) -> BaseKind {
        if ty.indirections() > 0 {
            BaseKind::UnsignedInt
        } else {
            ty.base
        }
    }

    /// Converts a value already in `r0` from `from` to `to`. Loads never
    /// sign-extend (only zero-extend, by virtue of `ldb`/`lds` loading into
    /// an otherwise-zeroed register) — so it falls to the cast to
    /// sign-extend a signed char/short before it's used at a wider type.
    /// Same-base casts emit nothing; everything else dispatches on the
    /// (current, desired) base pair, same as the bootstrap compiler this is
    /// derived from.
    pub(crate) fn compile_cast(&mut self, from: Type, to: Type) -> Result<()> {
        if from.base == BaseKind::Record || to.base == BaseKind::Record {
            // A record's "value" is already just its address; nothing to
            // convert.
            return Ok(());
        }
        let current = Self::cast_base(&from);
        let desired = Self::cast_base(&to);
        if current == desired {
            return Ok(());
        }
        use BaseKind::*;
        match desired {
            Void => Ok(()),
            SignedChar => self.emit2("sxb", reg::R0, reg::R0),
            UnsignedChar => self.emit2("trb", reg::R0, reg::R0),
            SignedShort => match current {
                SignedChar => self.emit2("sxb", reg::R0, reg::R0),
                UnsignedChar => Ok(()),
                _ => self.emit2("sxs", reg::R0, reg::R0),
            },
            UnsignedShort => match current {
                SignedChar => {
                    self.emit2("sxb", reg::R0, reg::R0)?;
                    self.emit2("trs", reg::R0, reg::R0)
                }
                UnsignedChar | UnsignedShort => Ok(()),
                _ => self.emit2("trs", reg::R0, reg::R0),
            },
            SignedInt | UnsignedInt => match current {
                SignedChar => self.emit2("sxb", reg::R0, reg::R0),
                SignedShort => self.emit2("sxs", reg::R0, reg::R0),
                _ => Ok(()),
            },
            Record => unreachable!("checked above"),
        }
    }

    /// Applies C's integer promotion to a value already sitting in `r0`:
    /// pointers, records, and already-`int`-width integers pass through
    /// unchanged; a narrower integer base is cast up to `int` (or `unsigned
    /// int`, if it was unsigned). Mirrors the original's `compile_promote`,
    /// which every binary operator and condition runs its operands through
    /// before combining them.
    pub(crate) fn compile_promote(&mut self, ty: Type) -> Result<Type> {
        if !ty.is_integer() {
            return Ok(ty);
        }
        let target = Type::new_base(crate::types::promoted_base(ty.base));
        self.compile_cast(ty, target)?;
        Ok(target)
    }

    // ------------------------------------------------------------ memory

    /// Loads never sign-extend: `ldb`/`lds`/`ldw` are the only load
    /// instructions, chosen purely by size.
    fn load_opcode(ty: &Type) -> &'static str {
        if ty.indirections() > 0 {
            return "ldw";
        }
        match ty.base {
            BaseKind::SignedChar | BaseKind::UnsignedChar | BaseKind::Void => "ldb",
            BaseKind::SignedShort | BaseKind::UnsignedShort => "lds",
            BaseKind::SignedInt | BaseKind::UnsignedInt => "ldw",
            BaseKind::Record => unreachable!("records are loaded member-by-member"),
        }
    }

    fn store_opcode(ty: &Type) -> &'static str {
        if ty.indirections() > 0 {
            return "stw";
        }
        match ty.base {
            BaseKind::SignedChar | BaseKind::UnsignedChar | BaseKind::Void => "stb",
            BaseKind::SignedShort | BaseKind::UnsignedShort => "sts",
            BaseKind::SignedInt | BaseKind::UnsignedInt => "stw",
            BaseKind::Record => unreachable!("records are stored member-by-member"),
        }
    }

    /// Loads the value addressed by `addr_reg` into `r0`, sized per `ty`.
    /// Never sign-extends; a subsequent `compile_cast` does that if needed.
    pub(crate) fn compile_load_value(&mut self, ty: &Type, addr_reg: usize) -> Result<()> {
        self.emitter.term(Self::load_opcode(ty))?;
        self.emitter.register(reg::R0)?;
        self.emitter.register(addr_reg)?;
        self.emitter.int(0)?;
        self.emitter.newline()
    }

    /// Stores `r0` to the address in `addr_reg`, truncated per `ty`.
    pub(crate) fn compile_store_value(&mut self, ty: &Type, addr_reg: usize) -> Result<()> {
        self.emitter.term(Self::store_opcode(ty))?;
        self.emitter.register(reg::R0)?;
        self.emitter.register(addr_reg)?;
        self.emitter.int(0)?;
        self.emitter.newline()
    }

    /// Copies a whole record, word by word, from the address in `src` to the
    /// address in `dst`. `size` must be a multiple of 4 (records always are,
    /// per `RecordTable::install_members`).
    pub(crate) fn compile_copy_record(&mut self, dst: usize, src: usize, size: i32) -> Result<()> {
        let mut offset = 0;
        while offset < size {
            self.emit_reg_imm("ldw", reg::SCRATCH, src, offset)?;
            self.emitter.term("stw")?;
            self.emitter.register(reg::SCRATCH)?;
            self.emitter.register(dst)?;
            self.emitter.int(offset)?;
            self.emitter.newline()?;
            offset += 4;
        }
        Ok(())
    }

    /// Computes the address of a local at `offset` (relative to `rfp`) into
    /// `dst`.
    pub(crate) fn compile_local_address_into(&mut self, dst: usize, offset: i32) -> Result<()> {
        self.emit_reg_imm("add", dst, reg::RFP, offset)
    }

    /// Computes the address of a local at `offset` (relative to `rfp`) into
    /// `r0`.
    pub(crate) fn compile_local_address(&mut self, offset: i32) -> Result<()> {
        self.compile_local_address_into(reg::R0, offset)
    }

    /// Computes the address of a global named `name` into `r0`.
    pub(crate) fn compile_global_address(&mut self, name: &str) -> Result<()> {
        self.emitter.term("imw")?;
        self.emitter.register(reg::R0)?;
        self.emitter.label(Sigil::Address, name)?;
        self.emitter.newline()
    }

    // ------------------------------------------------------------ globals

    /// Emits a global variable: its label, followed by either a constant
    /// initializer or `size` zeroed bytes.
    pub(crate) fn compile_global_variable(
        &mut self,
        name: &str,
        size: i32,
        initializer: Option<i32>,
    ) -> Result<()> {
        self.emitter.label(Sigil::Define, name)?;
        self.emitter.newline()?;
        match initializer {
            Some(value) => {
                self.emitter.int(value)?;
                self.emitter.newline()?;
            }
            None => self.emitter.directive_zero(size)?,
        }
        self.emitter.global_divider()
    }

    /// Emits all strings queued by the function currently being compiled,
    /// as `@_Sx<id>: "..."` data, and clears the queue.
    pub(crate) fn flush_pending_strings(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_strings);
        for (id, bytes) in pending {
            self.emitter
                .computed_label(Sigil::Define, STRING_LABEL_PREFIX, id)?;
            self.emitter.newline()?;
            self.emitter.string_literal(&bytes)?;
            self.emitter.newline()?;
        }
        Ok(())
    }

    /// Queues a string literal for emission at the end of the current
    /// function and returns the label id used to reference it.
    pub(crate) fn queue_string(&mut self, bytes: Vec<u8>) -> usize {
        let id = self.next_string_id;
        self.next_string_id += 1;
        self.pending_strings.push((id, bytes));
        id
    }

    pub(crate) fn compile_string_address(&mut self, id: usize) -> Result<()> {
        self.emitter.term("imw")?;
        self.emitter.register(reg::R0)?;
        self.emitter
            .computed_label(Sigil::Address, STRING_LABEL_PREFIX, id)?;
        self.emitter.newline()
    }

    // ------------------------------------------------------------ frames

    /// Emits the function's public label and prologue. `enter` pushes the
    /// old frame pointer and sets `rfp = rsp`, so locals can be addressed
    /// `rfp`-relative from a fixed base for the rest of the function: each
    /// local simply lowers `rsp` by its own size as it's declared, with no
    /// need to know the total frame size up front.
    pub(crate) fn compile_function_prologue(&mut self, name: &str) -> Result<()> {
        self.emitter.label(Sigil::Define, name)?;
        self.emitter.newline()?;
        self.emitter.term("enter")?;
        self.emitter.newline()
    }

    /// Lowers `rsp` by `size` bytes to carve out space for a newly declared
    /// local.
    pub(crate) fn compile_reserve_local(&mut self, size: i32) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        self.emit_reg_imm("sub", reg::RSP, reg::RSP, size)
    }

    /// `leave; ret` — emitted once per `return` statement and once more for
    /// an implicit fall-off-the-end return. Does not flush the string queue
    /// or emit the inter-declaration divider; `finish_function` does that
    /// exactly once, after the whole body has been parsed.
    pub(crate) fn compile_function_epilogue(&mut self) -> Result<()> {
        self.emitter.term("leave")?;
        self.emitter.newline()?;
        self.emitter.term("ret")?;
        self.emitter.newline()
    }

    pub(crate) fn finish_function(&mut self) -> Result<()> {
        self.flush_pending_strings()?;
        self.emitter.global_divider()
    }

    // ---------------------------------------------------------- arguments
    //
    // Every argument, named or variadic, travels on the stack: the caller
    // evaluates each in source order and `push`es it immediately (so arg 0
    // ends up deepest, the last argument shallowest). Calling a variadic
    // function additionally pushes the argument count as one more,
    // shallower word. After `call` pushes the return address and `enter`
    // pushes the old frame pointer, the deepest argument (arg 0) sits at a
    // fixed, call-site-independent offset counted from the *far* end of the
    // argument block — which is why the callee needs a pointer to that far
    // end (`compile_compute_deep_end_ptr`) before it can address anything
    // beyond a fixed-arity function's own declared parameters.

    /// For a non-variadic callee, or for the named parameters of a variadic
    /// one, the total argument count equals `param_count` at every call
    /// site, so the far end of the block is a compile-time-constant offset
    /// from `rfp` and argument `index` needs no runtime arithmetic at all.
    pub(crate) fn compile_receive_fixed_argument(
        &mut self,
        index: usize,
        param_count: usize,
        offset: i32,
    ) -> Result<()> {
        let arg_offset = 8 + ((param_count - 1 - index) as i32) * 4;
        self.emit_reg_imm("ldw", reg::SCRATCH, reg::RFP, arg_offset)?;
        self.compile_local_address_into(reg::R1, offset)?;
        self.emitter.term("stw")?;
        self.emitter.register(reg::SCRATCH)?;
        self.emitter.register(reg::R1)?;
        self.emitter.int(0)?;
        self.emitter.newline()
    }

    /// Computes, into `dst`, the address of the deepest (first) argument of
    /// a variadic call: `rfp + 12 + (count - 1) * 4`, where `count` (the
    /// actual number of arguments passed at this call site) was pushed by
    /// the caller as the shallowest word, at `rfp + 8`. `dst` must not be
    /// `r0`, `r1`, or the scratch register — those are used to compute it.
    pub(crate) fn compile_compute_deep_end_ptr(&mut self, dst: usize) -> Result<()> {
        self.emit_reg_imm("ldw", reg::SCRATCH, reg::RFP, 8)?;
        self.emit_reg_imm("sub", reg::SCRATCH, reg::SCRATCH, 1)?;
        self.emitter.term("mul")?;
        self.emitter.register(reg::SCRATCH)?;
        self.emitter.register(reg::SCRATCH)?;
        self.emitter.int(4)?;
        self.emitter.newline()?;
        self.emit_reg_imm("add", dst, reg::RFP, 12)?;
        self.emit3("add", dst, dst, reg::SCRATCH)
    }

    /// Receives named parameter `index` of a variadic function, whose
    /// address is `deep_end_reg - index * 4`. `deep_end_reg` (as computed by
    /// `compile_compute_deep_end_ptr`) is read, never written.
    pub(crate) fn compile_receive_variadic_named_argument(
        &mut self,
        deep_end_reg: usize,
        index: usize,
        offset: i32,
    ) -> Result<()> {
        if index == 0 {
            self.emit_reg_imm("ldw", reg::SCRATCH, deep_end_reg, 0)?;
        } else {
            self.emit_reg_imm("sub", reg::R2, deep_end_reg, (index * 4) as i32)?;
            self.emit_reg_imm("ldw", reg::SCRATCH, reg::R2, 0)?;
        }
        self.compile_local_address_into(reg::R2, offset)?;
        self.emitter.term("stw")?;
        self.emitter.register(reg::SCRATCH)?;
        self.emitter.register(reg::R2)?;
        self.emitter.int(0)?;
        self.emitter.newline()
    }

    /// Stores the address one past the last named parameter —
    /// `deep_end_reg - named_count * 4` — into the frame slot at `offset`,
    /// the initial value later copied into a user `va_list` by
    /// `__builtin_va_start`.
    pub(crate) fn compile_init_variadic_base(
        &mut self,
        deep_end_reg: usize,
        named_count: usize,
        offset: i32,
    ) -> Result<()> {
        self.emit_reg_imm("sub", reg::R2, deep_end_reg, (named_count * 4) as i32)?;
        self.compile_local_address_into(reg::SCRATCH, offset)?;
        self.emitter.term("stw")?;
        self.emitter.register(reg::R2)?;
        self.emitter.register(reg::SCRATCH)?;
        self.emitter.int(0)?;
        self.emitter.newline()
    }

    /// Pushes one outgoing argument, already evaluated into `r0`.
    pub(crate) fn compile_push_argument(&mut self) -> Result<()> {
        self.push(reg::R0)
    }

    /// Pushes the literal argument count ahead of a call to a variadic
    /// function, as the shallowest word of the argument block.
    pub(crate) fn compile_push_argument_count(&mut self, count: usize) -> Result<()> {
        self.compile_load_immediate(reg::SCRATCH, count as i32)?;
        self.push(reg::SCRATCH)
    }

    pub(crate) fn compile_call(&mut self, name: &str) -> Result<()> {
        self.emitter.term("call")?;
        self.emitter.label(Sigil::Jump, name)?;
        self.emitter.newline()
    }

    pub(crate) fn compile_call_indirect(&mut self, addr_reg: usize) -> Result<()> {
        self.emitter.term("call")?;
        self.emitter.register(addr_reg)?;
        self.emitter.newline()
    }

    /// Loads the value pointed to by the `va_list` cursor stored at
    /// `cursor_addr_reg` into `r0` per `ty`, then retreats the cursor by one
    /// slot (arguments are laid out so each successive vararg sits at a
    /// *lower* address than the last).
    pub(crate) fn compile_va_arg(&mut self, cursor_addr_reg: usize, ty: &Type) -> Result<()> {
        self.emit_reg_imm("ldw", reg::R1, cursor_addr_reg, 0)?;
        self.compile_load_value(ty, reg::R1)?;
        self.push(reg::R0)?;
        self.emit_reg_imm("sub", reg::SCRATCH, reg::R1, 4)?;
        self.emitter.term("stw")?;
        self.emitter.register(reg::SCRATCH)?;
        self.emitter.register(cursor_addr_reg)?;
        self.emitter.int(0)?;
        self.emitter.newline()?;
        self.pop(reg::R0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(c: Compiler<Vec<u8>>) -> String {
        String::from_utf8(c.into_output()).unwrap()
    }

    #[test]
    fn cast_narrowing_signed_int_to_char_truncates() {
        let mut c = Compiler::new("", "<test>", Vec::<u8>::new()).unwrap();
        c.compile_cast(
            Type::new_base(BaseKind::SignedInt),
            Type::new_base(BaseKind::SignedChar),
        )
        .unwrap();
        c.emitter.flush().unwrap();
        assert!(emitted(c).contains("sxb"));
    }

    #[test]
    fn cast_widening_signed_char_to_int_sign_extends() {
        let mut c = Compiler::new("", "<test>", Vec::new()).unwrap();
        c.compile_cast(
            Type::new_base(BaseKind::SignedChar),
            Type::new_base(BaseKind::SignedInt),
        )
        .unwrap();
        c.emitter.flush().unwrap();
        assert!(emitted(c).contains("sxb"));
    }

    #[test]
    fn cast_widening_unsigned_char_to_int_is_a_no_op() {
        let mut c = Compiler::new("", "<test>", Vec::new()).unwrap();
        c.compile_cast(
            Type::new_base(BaseKind::UnsignedChar),
            Type::new_base(BaseKind::SignedInt),
        )
        .unwrap();
        c.emitter.flush().unwrap();
        assert!(emitted(c).trim().is_empty());
    }

    #[test]
    fn pointer_reinterpretation_is_a_no_op() {
        let mut c = Compiler::new("", "<test>", Vec::new()).unwrap();
        let p1 = Type::new_base(BaseKind::SignedChar).increment_pointers();
        let p2 = Type::new_base(BaseKind::SignedInt).increment_pointers();
        c.compile_cast(p1, p2).unwrap();
        c.emitter.flush().unwrap();
        assert!(emitted(c).trim().is_empty());
    }

    #[test]
    fn load_opcode_never_sign_extends() {
        assert_eq!(
            Compiler::<Vec<u8>>::load_opcode(&Type::new_base(BaseKind::SignedChar)),
            "ldb"
        );
        assert_eq!(
            Compiler::<Vec<u8>>::load_opcode(&Type::new_base(BaseKind::SignedShort)),
            "lds"
        );
    }

    #[test]
    fn case_test_leaves_control_value_untouched() {
        let mut c = Compiler::new("", "<test>", Vec::new()).unwrap();
        let label = c.new_label();
        c.compile_case_test(7, label).unwrap();
        c.emitter.flush().unwrap();
        let text = emitted(c);
        assert!(text.contains("cmps r9"), "compare must target the scratch register, not r0: {text}");
    }
}
