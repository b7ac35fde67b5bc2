//! Expression parsing and codegen: the precedence chain from the comma
//! operator down to primary expressions, all folded into one recursive
//! descent over the token stream with no intermediate tree — every
//! production emits its own instructions as it goes.
//!
//! Lvalues are carried, not auto-loaded: a production that yields an lvalue
//! leaves its *address* in `r0` and returns a `Type` with `is_lvalue` set.
//! `to_rvalue` is the only place that turns an address into a value (or, for
//! arrays and records, just strips the lvalue flag — their "value" already
//! is the address). This lets assignment and `&`/`++`/`--` recover the
//! address without re-deriving it.

use std::io::Write;

use crate::error::{CompileError, Result};
use crate::lexer::TokenType;
use crate::types::{promoted_base, BaseKind, Type};

use super::{reg, Compiler};

impl<W: Write> Compiler<W> {
    // ------------------------------------------------------------- helpers

    /// Turns an lvalue into a value: scalars are loaded through the address
    /// in `r0`; arrays decay (the address already *is* the decayed
    /// pointer's value); records stay addressed (a struct's "value" is
    /// always its address).
    pub(crate) fn to_rvalue(&mut self, ty: Type) -> Result<Type> {
        if !ty.is_lvalue {
            return Ok(ty);
        }
        if ty.is_array() {
            return Ok(ty.decay_array().set_lvalue(false));
        }
        if ty.is_record() {
            return Ok(ty.set_lvalue(false));
        }
        self.compile_load_value(&ty, reg::R0)?;
        Ok(ty.set_lvalue(false))
    }

    fn record_size_fn(&self) -> impl Fn(crate::record::RecordId) -> Result<i32> + '_ {
        |id| self.records.size(id)
    }

    fn common_integer_type(a: Type, b: Type) -> Type {
        if a.is_unsigned() || b.is_unsigned() {
            Type::new_base(BaseKind::UnsignedInt)
        } else {
            Type::new_base(BaseKind::SignedInt)
        }
    }

    fn comparison_is_signed(a: Type, b: Type) -> bool {
        !(a.is_pointer() || b.is_pointer() || a.is_unsigned() || b.is_unsigned())
    }

    /// Parses a type name for a cast, `sizeof(type)`, or
    /// `__builtin_va_arg`'s second argument: declaration specifiers followed
    /// by zero or more `*`. Abstract array declarators are not supported
    /// here; write the pointer form instead.
    pub(crate) fn parse_type_name(&mut self) -> Result<Type> {
        let (mut ty, _) = self
            .parse_declaration_specifiers()?
            .ok_or_else(|| CompileError::fatal("Expected a type name."))?;
        while self.lexer.accept("*")? {
            ty = ty.increment_pointers();
        }
        Ok(ty)
    }

    fn parse_numeric_literal(token: &str) -> Result<(i32, bool)> {
        let mut end = token.len();
        let bytes = token.as_bytes();
        let mut unsigned = false;
        while end > 0 && matches!(bytes[end - 1], b'u' | b'U' | b'l' | b'L') {
            if matches!(bytes[end - 1], b'u' | b'U') {
                unsigned = true;
            }
            end -= 1;
        }
        let digits = &token[..end];
        let value: i64 = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
                .map_err(|_| CompileError::fatal(format!("Malformed hex literal `{token}`.")))?
        } else if digits.len() > 1 && digits.starts_with('0') {
            i64::from_str_radix(&digits[1..], 8)
                .map_err(|_| CompileError::fatal(format!("Malformed octal literal `{token}`.")))?
        } else {
            digits
                .parse::<i64>()
                .map_err(|_| CompileError::fatal(format!("Malformed integer literal `{token}`.")))?
        };
        Ok((value as i32, unsigned))
    }

    // -------------------------------------------------------- entry points

    /// The comma operator: evaluates and discards every operand but the
    /// last.
    pub(crate) fn parse_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_assignment_expression()?;
        while self.lexer.accept(",")? {
            ty = self.parse_assignment_expression()?;
        }
        Ok(ty)
    }

    pub(crate) fn parse_assignment_expression(&mut self) -> Result<Type> {
        let lhs_ty = self.parse_conditional_expression()?;

        if self.lexer.is("=") {
            if !lhs_ty.is_lvalue {
                return Err(CompileError::fatal(
                    "The left operand of `=` must be an lvalue.",
                ));
            }
            self.lexer.consume()?;
            self.push(reg::R0)?; // address
            let rhs_ty = self.parse_assignment_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;

            if lhs_ty.is_record() {
                if !rhs_ty.is_record() {
                    return Err(CompileError::fatal(
                        "Cannot assign a non-struct value to a struct.",
                    ));
                }
                self.pop(reg::R1)?;
                let size = lhs_ty.size(self.record_size_fn())?;
                self.compile_copy_record(reg::R1, reg::R0, size)?;
                self.compile_mov(reg::R0, reg::R1)?;
                return Ok(lhs_ty.set_lvalue(false));
            }

            self.compile_cast(rhs_ty, lhs_ty)?;
            self.pop(reg::R1)?;
            self.compile_store_value(&lhs_ty, reg::R1)?;
            return Ok(lhs_ty.set_lvalue(false));
        }

        const COMPOUND: &[(&str, &str)] = &[
            ("+=", "+"),
            ("-=", "-"),
            ("*=", "*"),
            ("/=", "/"),
            ("%=", "%"),
            ("&=", "&"),
            ("|=", "|"),
            ("^=", "^"),
            ("<<=", "<<"),
            (">>=", ">>"),
        ];
        for (token, op) in COMPOUND {
            if self.lexer.is(token) {
                if !lhs_ty.is_lvalue {
                    return Err(CompileError::fatal(format!(
                        "The left operand of `{token}` must be an lvalue."
                    )));
                }
                self.lexer.consume()?;
                self.push(reg::R0)?; // address, kept safe on the stack
                self.compile_load_value(&lhs_ty, reg::R0)?; // old value
                let old_ty = self.compile_promote(lhs_ty)?;
                self.push(reg::R0)?;
                let rhs_ty = self.parse_assignment_expression()?;
                let rhs_ty = self.to_rvalue(rhs_ty)?;
                let rhs_ty = self.compile_promote(rhs_ty)?;
                if (*op == "+" || *op == "-") && lhs_ty.is_pointer() {
                    let elem = lhs_ty.decrement_indirection()?;
                    let size = elem.size(self.record_size_fn())?;
                    self.compile_scale(reg::R0, size)?;
                }
                self.pop(reg::R1)?; // old value
                let signed = !(old_ty.is_unsigned() || rhs_ty.is_unsigned());
                self.compile_binary_arith(op, signed)?;
                self.compile_cast(old_ty, lhs_ty)?;
                self.pop(reg::R1)?; // address
                self.compile_store_value(&lhs_ty, reg::R1)?;
                return Ok(lhs_ty.set_lvalue(false));
            }
        }

        Ok(lhs_ty)
    }

    fn parse_conditional_expression(&mut self) -> Result<Type> {
        let cond_ty = self.parse_logical_or_expression()?;
        if !self.lexer.accept("?")? {
            return Ok(cond_ty);
        }
        let cond_ty = self.to_rvalue(cond_ty)?;
        let _ = cond_ty;
        let false_label = self.new_label();
        let end_label = self.new_label();
        self.jump_if_zero(reg::R0, false_label)?;
        let then_ty = self.parse_expression()?;
        let then_ty = self.to_rvalue(then_ty)?;
        let then_ty = self.compile_promote(then_ty)?;
        self.jump(end_label)?;
        self.define_label(false_label)?;
        self.lexer.expect(":", "Expected `:` in conditional expression.")?;
        let else_ty = self.parse_conditional_expression()?;
        let else_ty = self.to_rvalue(else_ty)?;
        let else_ty = self.compile_promote(else_ty)?;
        self.define_label(end_label)?;

        let result_ty = if then_ty.is_record() {
            then_ty
        } else if then_ty.is_pointer() {
            then_ty
        } else if else_ty.is_pointer() {
            else_ty
        } else {
            Self::common_integer_type(then_ty, else_ty)
        };
        Ok(result_ty)
    }

    fn parse_logical_or_expression(&mut self) -> Result<Type> {
        let lhs_ty = self.parse_logical_and_expression()?;
        if !self.lexer.is("||") {
            return Ok(lhs_ty);
        }
        self.to_rvalue(lhs_ty)?;
        let true_label = self.new_label();
        let end_label = self.new_label();
        self.jump_if_not_zero(reg::R0, true_label)?;
        while self.lexer.accept("||")? {
            let rhs_ty = self.parse_logical_and_expression()?;
            self.to_rvalue(rhs_ty)?;
            self.jump_if_not_zero(reg::R0, true_label)?;
        }
        self.compile_load_immediate(reg::R0, 0)?;
        self.jump(end_label)?;
        self.define_label(true_label)?;
        self.compile_load_immediate(reg::R0, 1)?;
        self.define_label(end_label)?;
        Ok(Type::new_base(BaseKind::SignedInt))
    }

    fn parse_logical_and_expression(&mut self) -> Result<Type> {
        let lhs_ty = self.parse_bitwise_or_expression()?;
        if !self.lexer.is("&&") {
            return Ok(lhs_ty);
        }
        self.to_rvalue(lhs_ty)?;
        let false_label = self.new_label();
        let end_label = self.new_label();
        self.jump_if_zero(reg::R0, false_label)?;
        while self.lexer.accept("&&")? {
            let rhs_ty = self.parse_bitwise_or_expression()?;
            self.to_rvalue(rhs_ty)?;
            self.jump_if_zero(reg::R0, false_label)?;
        }
        self.compile_load_immediate(reg::R0, 1)?;
        self.jump(end_label)?;
        self.define_label(false_label)?;
        self.compile_load_immediate(reg::R0, 0)?;
        self.define_label(end_label)?;
        Ok(Type::new_base(BaseKind::SignedInt))
    }

    fn parse_bitwise_or_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_bitwise_xor_expression()?;
        while self.lexer.is("|") {
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_bitwise_xor_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            let rhs_ty = self.compile_promote(rhs_ty)?;
            self.pop(reg::R1)?;
            self.compile_binary_arith("|", false)?;
            ty = Self::common_integer_type(lhs_ty, rhs_ty);
        }
        Ok(ty)
    }

    fn parse_bitwise_xor_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_bitwise_and_expression()?;
        while self.lexer.is("^") {
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_bitwise_and_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            let rhs_ty = self.compile_promote(rhs_ty)?;
            self.pop(reg::R1)?;
            self.compile_binary_arith("^", false)?;
            ty = Self::common_integer_type(lhs_ty, rhs_ty);
        }
        Ok(ty)
    }

    fn parse_bitwise_and_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_equality_expression()?;
        while self.lexer.is("&") {
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_equality_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            let rhs_ty = self.compile_promote(rhs_ty)?;
            self.pop(reg::R1)?;
            self.compile_binary_arith("&", false)?;
            ty = Self::common_integer_type(lhs_ty, rhs_ty);
        }
        Ok(ty)
    }

    fn parse_equality_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_relational_expression()?;
        loop {
            let op = if self.lexer.is("==") {
                "=="
            } else if self.lexer.is("!=") {
                "!="
            } else {
                break;
            };
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_relational_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            let rhs_ty = self.compile_promote(rhs_ty)?;
            self.pop(reg::R1)?;
            self.compile_relational(op, Self::comparison_is_signed(lhs_ty, rhs_ty))?;
            ty = Type::new_base(BaseKind::SignedInt);
        }
        Ok(ty)
    }

    fn parse_relational_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_shift_expression()?;
        loop {
            let op = if self.lexer.is("<") {
                "<"
            } else if self.lexer.is("<=") {
                "<="
            } else if self.lexer.is(">") {
                ">"
            } else if self.lexer.is(">=") {
                ">="
            } else {
                break;
            };
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_shift_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            let rhs_ty = self.compile_promote(rhs_ty)?;
            self.pop(reg::R1)?;
            self.compile_relational(op, Self::comparison_is_signed(lhs_ty, rhs_ty))?;
            ty = Type::new_base(BaseKind::SignedInt);
        }
        Ok(ty)
    }

    fn parse_shift_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_additive_expression()?;
        loop {
            let op = if self.lexer.is("<<") {
                "<<"
            } else if self.lexer.is(">>") {
                ">>"
            } else {
                break;
            };
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_additive_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            self.compile_promote(rhs_ty)?;
            self.pop(reg::R1)?;
            self.compile_binary_arith(op, lhs_ty.is_signed())?;
            ty = Type::new_base(promoted_base(lhs_ty.base));
        }
        Ok(ty)
    }

    fn parse_additive_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_multiplicative_expression()?;
        loop {
            let op = if self.lexer.is("+") {
                "+"
            } else if self.lexer.is("-") {
                "-"
            } else {
                break;
            };
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_multiplicative_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            let rhs_ty = self.compile_promote(rhs_ty)?;

            if lhs_ty.is_pointer() && rhs_ty.is_pointer() && op == "-" {
                let elem = lhs_ty.decrement_indirection()?;
                let size = elem.size(self.record_size_fn())?;
                self.pop(reg::R1)?;
                self.compile_binary_arith("-", false)?;
                self.compile_div_immediate(reg::R0, size)?;
                ty = Type::new_base(BaseKind::SignedInt);
            } else if lhs_ty.is_pointer() && rhs_ty.is_integer() {
                let elem = lhs_ty.decrement_indirection()?;
                let size = elem.size(self.record_size_fn())?;
                self.compile_scale(reg::R0, size)?;
                self.pop(reg::R1)?;
                self.compile_binary_arith(op, true)?;
                ty = lhs_ty;
            } else if op == "+" && rhs_ty.is_pointer() && lhs_ty.is_integer() {
                let elem = rhs_ty.decrement_indirection()?;
                let size = elem.size(self.record_size_fn())?;
                self.pop(reg::R1)?; // lhs int
                self.compile_scale(reg::R1, size)?;
                self.compile_binary_arith("+", true)?;
                ty = rhs_ty;
            } else {
                self.pop(reg::R1)?;
                let signed = !(lhs_ty.is_unsigned() || rhs_ty.is_unsigned());
                self.compile_binary_arith(op, signed)?;
                ty = Self::common_integer_type(lhs_ty, rhs_ty);
            }
        }
        Ok(ty)
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_cast_expression()?;
        loop {
            let op = if self.lexer.is("*") {
                "*"
            } else if self.lexer.is("/") {
                "/"
            } else if self.lexer.is("%") {
                "%"
            } else {
                break;
            };
            let lhs_ty = self.to_rvalue(ty)?;
            let lhs_ty = self.compile_promote(lhs_ty)?;
            self.push(reg::R0)?;
            self.lexer.consume()?;
            let rhs_ty = self.parse_cast_expression()?;
            let rhs_ty = self.to_rvalue(rhs_ty)?;
            let rhs_ty = self.compile_promote(rhs_ty)?;
            self.pop(reg::R1)?;
            let signed = !(lhs_ty.is_unsigned() || rhs_ty.is_unsigned());
            self.compile_binary_arith(op, signed)?;
            ty = Self::common_integer_type(lhs_ty, rhs_ty);
        }
        Ok(ty)
    }

    fn parse_cast_expression(&mut self) -> Result<Type> {
        if self.lexer.is("(") {
            let snapshot = self.lexer.clone();
            self.lexer.consume()?;
            if self.at_declaration_start() {
                let ty = self.parse_type_name()?;
                self.lexer.expect(")", "Expected `)` after cast type.")?;
                let inner_ty = self.parse_cast_expression()?;
                let inner_ty = self.to_rvalue(inner_ty)?;
                self.compile_cast(inner_ty, ty)?;
                return Ok(ty);
            }
            self.lexer = snapshot;
        }
        self.parse_unary_expression()
    }

    fn compile_step(&mut self, ty: Type, delta: i32, postfix: bool) -> Result<Type> {
        if !ty.is_lvalue {
            return Err(CompileError::fatal(
                "The operand of `++`/`--` must be an lvalue.",
            ));
        }
        let step_size = if ty.is_pointer() {
            let elem = ty.decrement_indirection()?;
            elem.size(self.record_size_fn())?
        } else {
            1
        };
        self.compile_mov(reg::R1, reg::R0)?; // save address
        self.compile_load_value(&ty, reg::R1)?; // r0 = current value
        let result_ty = ty.set_lvalue(false);
        if postfix {
            self.push(reg::R0)?; // save old value as the expression's result
        }
        self.compile_add_immediate(reg::R0, reg::R0, step_size * delta)?;
        self.compile_store_value(&ty, reg::R1)?;
        if postfix {
            self.pop(reg::R0)?;
        }
        Ok(result_ty)
    }

    fn parse_unary_expression(&mut self) -> Result<Type> {
        if self.lexer.is("sizeof") {
            self.lexer.consume()?;
            self.emitter.set_enabled(false);
            // `sizeof` never applies array-to-pointer decay: it reports the
            // operand's own type, not its rvalue-converted type.
            let ty = if self.lexer.is("(") {
                let snapshot = self.lexer.clone();
                self.lexer.consume()?;
                if self.at_declaration_start() {
                    let t = self.parse_type_name()?;
                    self.lexer.expect(")", "Expected `)` after sizeof type.")?;
                    t
                } else {
                    self.lexer = snapshot;
                    self.parse_unary_expression()?.set_lvalue(false)
                }
            } else {
                self.parse_unary_expression()?.set_lvalue(false)
            };
            self.emitter.set_enabled(true);
            let size = ty.size(self.record_size_fn())?;
            self.compile_load_immediate(reg::R0, size)?;
            return Ok(Type::new_base(BaseKind::UnsignedInt));
        }
        if self.lexer.accept("++")? {
            let ty = self.parse_unary_expression()?;
            return self.compile_step(ty, 1, false);
        }
        if self.lexer.accept("--")? {
            let ty = self.parse_unary_expression()?;
            return self.compile_step(ty, -1, false);
        }
        if self.lexer.accept("&")? {
            let ty = self.parse_cast_expression()?;
            if !ty.is_lvalue {
                return Err(CompileError::fatal(
                    "Cannot take the address of a non-lvalue.",
                ));
            }
            return Ok(ty.decay_array().increment_pointers().set_lvalue(false));
        }
        if self.lexer.accept("*")? {
            let ty = self.parse_cast_expression()?;
            let ty = self.to_rvalue(ty)?;
            let pointee = ty.decrement_indirection()?;
            return Ok(pointee.set_lvalue(true));
        }
        if self.lexer.accept("+")? {
            let ty = self.parse_cast_expression()?;
            return self.to_rvalue(ty);
        }
        if self.lexer.accept("-")? {
            let ty = self.parse_cast_expression()?;
            let ty = self.to_rvalue(ty)?;
            let ty = self.compile_promote(ty)?;
            self.compile_negate()?;
            return Ok(ty);
        }
        if self.lexer.accept("~")? {
            let ty = self.parse_cast_expression()?;
            let ty = self.to_rvalue(ty)?;
            let ty = self.compile_promote(ty)?;
            self.compile_bitwise_not()?;
            return Ok(ty);
        }
        if self.lexer.accept("!")? {
            let ty = self.parse_cast_expression()?;
            self.to_rvalue(ty)?;
            self.compile_logical_not()?;
            return Ok(Type::new_base(BaseKind::SignedInt));
        }
        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> Result<Type> {
        let mut ty = self.parse_primary_expression()?;
        let mut first = true;
        loop {
            if self.lexer.is("(") {
                let direct = if first { self.pending_call_target.take() } else { None };
                ty = self.parse_call(ty, direct)?;
            } else if self.lexer.accept("[")? {
                self.pending_call_target = None;
                let base_ty = self.to_rvalue(ty)?;
                self.push(reg::R0)?;
                let index_ty = self.parse_expression()?;
                self.to_rvalue(index_ty)?;
                let elem = base_ty.decrement_indirection()?;
                let size = elem.size(self.record_size_fn())?;
                self.compile_scale(reg::R0, size)?;
                self.pop(reg::R1)?;
                self.compile_add_registers(reg::R0, reg::R1, reg::R0)?;
                self.lexer.expect("]", "Expected `]` after array subscript.")?;
                ty = elem.set_lvalue(true);
            } else if self.lexer.accept(".")? {
                self.pending_call_target = None;
                if !ty.is_record() {
                    return Err(CompileError::fatal(
                        "The left operand of `.` must be a struct or union.",
                    ));
                }
                let name = self.expect_identifier()?;
                let record_id = ty.record.expect("record type always carries a RecordId");
                let member = self
                    .records
                    .find_member(record_id, &name)
                    .ok_or_else(|| CompileError::fatal(format!("No member named `{name}`.")))?;
                self.compile_add_immediate(reg::R0, reg::R0, member.offset)?;
                ty = member.ty.set_lvalue(true);
            } else if self.lexer.accept("->")? {
                self.pending_call_target = None;
                let base_ty = self.to_rvalue(ty)?;
                let pointee = base_ty.decrement_indirection()?;
                if !pointee.is_record() {
                    return Err(CompileError::fatal(
                        "The left operand of `->` must be a pointer to a struct or union.",
                    ));
                }
                let name = self.expect_identifier()?;
                let record_id = pointee.record.expect("record type always carries a RecordId");
                let member = self
                    .records
                    .find_member(record_id, &name)
                    .ok_or_else(|| CompileError::fatal(format!("No member named `{name}`.")))?;
                self.compile_add_immediate(reg::R0, reg::R0, member.offset)?;
                ty = member.ty.set_lvalue(true);
            } else if self.lexer.is("++") {
                self.pending_call_target = None;
                self.lexer.consume()?;
                ty = self.compile_step(ty, 1, true)?;
            } else if self.lexer.is("--") {
                self.pending_call_target = None;
                self.lexer.consume()?;
                ty = self.compile_step(ty, -1, true)?;
            } else {
                break;
            }
            first = false;
        }
        self.pending_call_target = None;
        Ok(ty)
    }

    fn parse_call(&mut self, callee_ty: Type, direct: Option<String>) -> Result<Type> {
        self.lexer.consume()?; // '('

        if direct.is_none() {
            let callee_ty = self.to_rvalue(callee_ty)?;
            if !callee_ty.is_pointer() {
                return Err(CompileError::fatal("Called object is not a function."));
            }
            self.push(reg::R0)?; // callee address, deepest on the stack
        }

        let (return_type, variadic) = match &direct {
            Some(name) => match self.globals.find(name) {
                Some(crate::symtab::Global::Function {
                    return_type,
                    variadic,
                    ..
                }) => (*return_type, *variadic),
                _ => return Err(CompileError::fatal(format!("`{name}` is not a function."))),
            },
            None => (Type::new_base(BaseKind::SignedInt), false),
        };

        let mut count = 0usize;
        if !self.lexer.is(")") {
            loop {
                let arg_ty = self.parse_assignment_expression()?;
                let arg_ty = self.to_rvalue(arg_ty)?;
                self.compile_promote(arg_ty)?;
                self.compile_push_argument()?;
                count += 1;
                if !self.lexer.accept(",")? {
                    break;
                }
            }
        }
        self.lexer.expect(")", "Expected `)` after call arguments.")?;

        if variadic {
            self.compile_push_argument_count(count)?;
        }
        let args_bytes = ((count + usize::from(variadic)) * 4) as i32;

        match direct {
            Some(name) => {
                self.compile_call(&name)?;
                self.drop_stack(args_bytes)?;
            }
            None => {
                self.compile_peek(reg::SCRATCH, args_bytes)?;
                self.compile_call_indirect(reg::SCRATCH)?;
                self.drop_stack(args_bytes + 4)?;
            }
        }
        Ok(return_type)
    }

    // ------------------------------------------------------------ builtins

    fn parse_va_start(&mut self) -> Result<Type> {
        self.lexer.consume()?; // "__builtin_va_start"
        self.lexer.expect("(", "Expected `(` after `__builtin_va_start`.")?;
        let ap_name = self.expect_identifier()?;
        let (_, ap_offset) = self
            .locals
            .find(&ap_name)
            .ok_or_else(|| CompileError::fatal(format!("Undeclared identifier `{ap_name}`.")))?;
        self.lexer.expect(",", "Expected `,` in `__builtin_va_start`.")?;
        // The standard's second argument (the last named parameter) only
        // matters for a diagnostic we don't perform; parse and discard it.
        self.parse_assignment_expression()?;
        self.lexer.expect(")", "Expected `)` after `__builtin_va_start`.")?;

        let (_, base_offset) = self.locals.find("__va_base").ok_or_else(|| {
            CompileError::fatal("`__builtin_va_start` used outside a variadic function.")
        })?;
        let ptr_ty = Type::new_base(BaseKind::SignedInt).increment_pointers();
        self.compile_local_address(base_offset)?;
        self.compile_load_value(&ptr_ty, reg::R0)?;
        self.compile_local_address_into(reg::R1, ap_offset)?;
        self.compile_store_value(&ptr_ty, reg::R1)?;
        Ok(Type::new_base(BaseKind::Void))
    }

    fn parse_va_end(&mut self) -> Result<Type> {
        self.lexer.consume()?; // "__builtin_va_end"
        self.lexer.expect("(", "Expected `(` after `__builtin_va_end`.")?;
        self.parse_assignment_expression()?;
        self.lexer.expect(")", "Expected `)` after `__builtin_va_end`.")?;
        Ok(Type::new_base(BaseKind::Void))
    }

    fn parse_va_arg(&mut self) -> Result<Type> {
        self.lexer.consume()?; // "__builtin_va_arg"
        self.lexer.expect("(", "Expected `(` after `__builtin_va_arg`.")?;
        let ap_name = self.expect_identifier()?;
        let (_, ap_offset) = self
            .locals
            .find(&ap_name)
            .ok_or_else(|| CompileError::fatal(format!("Undeclared identifier `{ap_name}`.")))?;
        self.lexer.expect(",", "Expected `,` in `__builtin_va_arg`.")?;
        let ty = self.parse_type_name()?;
        self.lexer.expect(")", "Expected `)` after `__builtin_va_arg`.")?;
        self.compile_local_address(ap_offset)?;
        self.compile_va_arg(reg::R0, &ty)?;
        Ok(ty)
    }

    // ----------------------------------------------------------- primary

    fn parse_primary_expression(&mut self) -> Result<Type> {
        match self.lexer.token_type {
            TokenType::Number => {
                let (value, unsigned) = Self::parse_numeric_literal(&self.lexer.token)?;
                self.lexer.consume()?;
                self.compile_load_immediate(reg::R0, value)?;
                Ok(Type::new_base(if unsigned {
                    BaseKind::UnsignedInt
                } else {
                    BaseKind::SignedInt
                }))
            }
            TokenType::Character => {
                let byte = self.lexer.token.as_bytes()[0];
                self.lexer.consume()?;
                self.compile_load_immediate(reg::R0, byte as i8 as i32)?;
                Ok(Type::new_base(BaseKind::SignedInt))
            }
            TokenType::String => {
                let bytes: Vec<u8> = self.lexer.token.chars().map(|c| c as u8).collect();
                self.lexer.consume()?;
                let id = self.queue_string(bytes);
                self.compile_string_address(id)?;
                Ok(Type::new_base(BaseKind::SignedChar).increment_pointers())
            }
            TokenType::Alphanumeric => match self.lexer.token.as_str() {
                "__builtin_va_start" => self.parse_va_start(),
                "__builtin_va_end" => self.parse_va_end(),
                "__builtin_va_arg" => self.parse_va_arg(),
                _ => {
                    let name = self.lexer.take()?;
                    if let Some((ty, offset)) = self.locals.find(&name) {
                        self.compile_local_address(offset)?;
                        return Ok(ty.set_lvalue(true));
                    }
                    match self.globals.find(&name).cloned() {
                        Some(crate::symtab::Global::Variable { ty }) => {
                            self.compile_global_address(&name)?;
                            Ok(ty.set_lvalue(true))
                        }
                        Some(crate::symtab::Global::Function { return_type, .. }) => {
                            self.pending_call_target = Some(name);
                            Ok(return_type)
                        }
                        None => Err(CompileError::fatal(format!(
                            "Undeclared identifier `{name}`."
                        ))),
                    }
                }
            },
            TokenType::Punctuation if self.lexer.is("(") => {
                self.lexer.consume()?;
                let ty = self.parse_expression()?;
                self.lexer.expect(")", "Expected `)` after expression.")?;
                Ok(ty)
            }
            _ => Err(CompileError::fatal(format!(
                "Unexpected token `{}` in expression.",
                self.lexer.token
            ))),
        }
    }

    // ------------------------------------------------------ constant exprs

    /// A compile-time-only evaluator for array lengths, global
    /// initializers, and `case` labels: literals, `sizeof(type)`, and the
    /// usual arithmetic/bitwise/logical/relational operators over them.
    /// There are no named compile-time constants in this language (no
    /// `enum`, no macro expansion survives preprocessing) and `sizeof` of a
    /// non-type expression is rejected, since evaluating it would require
    /// the full type-checking parser below rather than pure folding.
    pub(crate) fn parse_constant_expression(&mut self) -> Result<i32> {
        self.parse_const_conditional()
    }

    fn parse_const_conditional(&mut self) -> Result<i32> {
        let cond = self.parse_const_binary(1)?;
        if !self.lexer.accept("?")? {
            return Ok(cond);
        }
        let then_v = self.parse_const_conditional()?;
        self.lexer.expect(":", "Expected `:` in constant expression.")?;
        let else_v = self.parse_const_conditional()?;
        Ok(if cond != 0 { then_v } else { else_v })
    }

    fn const_binop_precedence(op: &str) -> Option<u8> {
        Some(match op {
            "||" => 1,
            "&&" => 2,
            "|" => 3,
            "^" => 4,
            "&" => 5,
            "==" | "!=" => 6,
            "<" | ">" | "<=" | ">=" => 7,
            "<<" | ">>" => 8,
            "+" | "-" => 9,
            "*" | "/" | "%" => 10,
            _ => return None,
        })
    }

    fn parse_const_binary(&mut self, min_prec: u8) -> Result<i32> {
        let mut lhs = self.parse_const_unary()?;
        loop {
            let op = self.lexer.token.clone();
            let Some(prec) = Self::const_binop_precedence(&op) else {
                break;
            };
            if self.lexer.token_type != TokenType::Punctuation || prec < min_prec {
                break;
            }
            self.lexer.consume()?;
            let rhs = self.parse_const_binary(prec + 1)?;
            lhs = Self::apply_const_binop(&op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn apply_const_binop(op: &str, a: i32, b: i32) -> Result<i32> {
        Ok(match op {
            "||" => i32::from(a != 0 || b != 0),
            "&&" => i32::from(a != 0 && b != 0),
            "|" => a | b,
            "^" => a ^ b,
            "&" => a & b,
            "==" => i32::from(a == b),
            "!=" => i32::from(a != b),
            "<" => i32::from(a < b),
            ">" => i32::from(a > b),
            "<=" => i32::from(a <= b),
            ">=" => i32::from(a >= b),
            "<<" => a.wrapping_shl(b as u32),
            ">>" => a.wrapping_shr(b as u32),
            "+" => a.wrapping_add(b),
            "-" => a.wrapping_sub(b),
            "*" => a.wrapping_mul(b),
            "/" => {
                if b == 0 {
                    return Err(CompileError::fatal("Division by zero in constant expression."));
                }
                a.wrapping_div(b)
            }
            "%" => {
                if b == 0 {
                    return Err(CompileError::fatal("Division by zero in constant expression."));
                }
                a.wrapping_rem(b)
            }
            _ => unreachable!("unrecognized constant-expression operator"),
        })
    }

    fn parse_const_unary(&mut self) -> Result<i32> {
        if self.lexer.accept("-")? {
            return Ok(self.parse_const_unary()?.wrapping_neg());
        }
        if self.lexer.accept("+")? {
            return self.parse_const_unary();
        }
        if self.lexer.accept("~")? {
            return Ok(!self.parse_const_unary()?);
        }
        if self.lexer.accept("!")? {
            return Ok(i32::from(self.parse_const_unary()? == 0));
        }
        if self.lexer.is("sizeof") {
            self.lexer.consume()?;
            if self.lexer.is("(") {
                let snapshot = self.lexer.clone();
                self.lexer.consume()?;
                if self.at_declaration_start() {
                    let ty = self.parse_type_name()?;
                    self.lexer.expect(")", "Expected `)` after sizeof type.")?;
                    return ty.size(self.record_size_fn());
                }
                self.lexer = snapshot;
            }
            return Err(CompileError::fatal(
                "`sizeof` of a non-type expression is not supported in a constant expression.",
            ));
        }
        self.parse_const_primary()
    }

    fn parse_const_primary(&mut self) -> Result<i32> {
        match self.lexer.token_type {
            TokenType::Number => {
                let (value, _) = Self::parse_numeric_literal(&self.lexer.token)?;
                self.lexer.consume()?;
                Ok(value)
            }
            TokenType::Character => {
                let byte = self.lexer.token.as_bytes()[0];
                self.lexer.consume()?;
                Ok(byte as i8 as i32)
            }
            _ if self.lexer.is("(") => {
                self.lexer.consume()?;
                let v = self.parse_constant_expression()?;
                self.lexer.expect(")", "Expected `)` in constant expression.")?;
                Ok(v)
            }
            _ => Err(CompileError::fatal(format!(
                "Expected a constant, found `{}`.",
                self.lexer.token
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(src: &str) {
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        compiler.compile().unwrap();
    }

    fn compile_err(src: &str) {
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        assert!(compiler.compile().is_err());
    }

    #[test]
    fn pointer_arithmetic_and_array_subscript_agree() {
        compile_ok(
            "int main(void) { int a[4]; a[0]=10; a[1]=20; int *p=a; return (*(p+1)==20 && a[1]==20) ? 0 : 1; }",
        );
    }

    #[test]
    fn struct_member_access_through_pointer_and_dot() {
        compile_ok(
            "struct P { int x; int y; }; int main(void) { struct P p; p.x=3; p.y=4; struct P *q=&p; return (q->x+q->y)==7 ? 0 : 1; }",
        );
    }

    #[test]
    fn ternary_and_short_circuit_logical_operators() {
        compile_ok(
            "int main(void) { int a=1,b=0; int r = (a && !b) ? 1 : 0; return r==1 ? 0 : 1; }",
        );
    }

    #[test]
    fn compound_assignment_on_pointer_scales_by_element_size() {
        compile_ok(
            "int main(void) { int a[3]; int *p=a; p+=2; return (p-a)==2 ? 0 : 1; }",
        );
    }

    #[test]
    fn postfix_and_prefix_increment_differ() {
        compile_ok(
            "int main(void) { int x=5; int a=x++; int b=++x; return (a==5 && b==7) ? 0 : 1; }",
        );
    }

    #[test]
    fn calling_a_non_function_is_fatal() {
        compile_err("int x; int main(void) { return x(); }");
    }

    #[test]
    fn constant_expression_drives_array_length() {
        compile_ok("int a[2+2]; int main(void) { return sizeof(a)==16 ? 0 : 1; }");
    }
}
