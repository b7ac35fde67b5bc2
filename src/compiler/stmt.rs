//! Statement parsing and codegen: compound statements, declarations at
//! block scope, the control-flow forms, and the handful of single-word
//! jumps (`break`, `continue`, `goto`, `return`).
//!
//! Loops and `switch` save/restore `loop_ctx` around their body the same
//! way the lexer save/restore trick works in `expr.rs`: ordinary recursive
//! descent already gives nesting for free, so a loop inside a loop just
//! nests two save/restore pairs instead of needing an explicit stack.

use std::io::Write;

use crate::error::{CompileError, Result};
use crate::lexer::TokenType;
use crate::types::{BaseKind, Type};

use super::{reg, Compiler, LoopContext};

impl<W: Write> Compiler<W> {
    /// A `{`-delimited sequence of declarations and statements. Consumes
    /// both braces. Locals declared inside are released the moment the
    /// block closes, regardless of how it was entered.
    pub(crate) fn parse_compound_statement(&mut self) -> Result<()> {
        self.lexer.expect("{", "Expected `{`.")?;
        let depth = self.locals.depth();
        while !self.lexer.accept("}")? {
            self.parse_statement()?;
        }
        self.locals.pop(depth);
        Ok(())
    }

    fn parse_statement(&mut self) -> Result<()> {
        self.emit_pending_line_directive()?;
        if self.lexer.is("{") {
            return self.parse_compound_statement();
        }
        if self.at_declaration_start() {
            return self.parse_local_declaration();
        }
        if self.lexer.token_type == TokenType::Alphanumeric {
            match self.lexer.token.as_str() {
                "if" => return self.parse_if_statement(),
                "while" => return self.parse_while_statement(),
                "do" => return self.parse_do_statement(),
                "for" => return self.parse_for_statement(),
                "switch" => return self.parse_switch_statement(),
                "case" => return self.parse_case_statement(),
                "default" => return self.parse_default_statement(),
                "break" => return self.parse_break_statement(),
                "continue" => return self.parse_continue_statement(),
                "goto" => return self.parse_goto_statement(),
                "return" => return self.parse_return_statement(),
                _ => {}
            }
            // Not a control keyword: it may still be a label name — peek
            // one token ahead for the `:` that would confirm it, since an
            // ordinary expression statement can also start with an
            // identifier (a call, an assignment, ...).
            let snapshot = self.lexer.clone();
            let name = self.lexer.take()?;
            if self.lexer.accept(":")? {
                self.define_user_label(&name)?;
                return self.parse_statement();
            }
            self.lexer = snapshot;
        }
        if self.lexer.accept(";")? {
            return Ok(());
        }
        self.parse_expression()?;
        self.lexer.expect(";", "Expected `;` after expression statement.")
    }

    // -------------------------------------------------------- declarations

    fn parse_local_declaration(&mut self) -> Result<()> {
        let (base, is_typedef) = self
            .parse_declaration_specifiers()?
            .expect("caller already checked at_declaration_start");

        if is_typedef {
            loop {
                let declarator = self.parse_declarator(base)?;
                self.typenames.add_typedef(declarator.name, declarator.ty);
                if !self.lexer.accept(",")? {
                    break;
                }
            }
            self.lexer.expect(";", "Expected `;` after typedef.")?;
            return Ok(());
        }

        loop {
            let declarator = self.parse_declarator(base)?;
            if declarator.params.is_some() {
                return Err(CompileError::fatal(
                    "A local function declarator is not supported; declare it at file scope.",
                ));
            }
            let (offset, rounded) =
                self.locals
                    .add(declarator.name, declarator.ty, |id| self.records.size(id))?;
            self.compile_reserve_local(rounded)?;

            if self.lexer.accept("=")? {
                self.compile_local_initializer(declarator.ty, offset)?;
            }

            if !self.lexer.accept(",")? {
                break;
            }
        }
        self.lexer.expect(";", "Expected `;` after local declaration.")
    }

    fn compile_local_initializer(&mut self, ty: Type, offset: i32) -> Result<()> {
        if ty.is_array() {
            return Err(CompileError::fatal(
                "Array initializers are not supported; assign elements individually.",
            ));
        }
        let value_ty = self.parse_assignment_expression()?;
        let value_ty = self.to_rvalue(value_ty)?;
        if ty.is_record() {
            if !value_ty.is_record() {
                return Err(CompileError::fatal(
                    "Cannot initialize a struct from a non-struct value.",
                ));
            }
            self.compile_mov(reg::R1, reg::R0)?;
            self.compile_local_address(offset)?;
            let size = ty.size(|id| self.records.size(id))?;
            self.compile_copy_record(reg::R0, reg::R1, size)?;
            return Ok(());
        }
        self.compile_cast(value_ty, ty)?;
        self.compile_local_address_into(reg::R1, offset)?;
        self.compile_store_value(&ty, reg::R1)
    }

    // ---------------------------------------------------------- branching

    fn parse_if_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "if"
        self.lexer.expect("(", "Expected `(` after `if`.")?;
        let cond_ty = self.parse_expression()?;
        self.to_rvalue(cond_ty)?;
        self.lexer.expect(")", "Expected `)` after if condition.")?;

        let else_label = self.new_label();
        self.jump_if_zero(reg::R0, else_label)?;
        self.parse_statement()?;

        if self.lexer.accept("else")? {
            let end_label = self.new_label();
            self.jump(end_label)?;
            self.define_label(else_label)?;
            self.parse_statement()?;
            self.define_label(end_label)
        } else {
            self.define_label(else_label)
        }
    }

    fn parse_while_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "while"
        self.lexer.expect("(", "Expected `(` after `while`.")?;
        let top = self.new_label();
        let end = self.new_label();
        self.define_label(top)?;
        let cond_ty = self.parse_expression()?;
        self.to_rvalue(cond_ty)?;
        self.jump_if_zero(reg::R0, end)?;
        self.lexer.expect(")", "Expected `)` after while condition.")?;

        let saved = self.loop_ctx;
        self.loop_ctx = LoopContext {
            continue_label: Some(top),
            break_label: Some(end),
            ..Default::default()
        };
        self.parse_statement()?;
        self.loop_ctx = saved;

        self.jump(top)?;
        self.define_label(end)
    }

    fn parse_do_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "do"
        let body = self.new_label();
        let continue_label = self.new_label();
        let end = self.new_label();
        self.define_label(body)?;

        let saved = self.loop_ctx;
        self.loop_ctx = LoopContext {
            continue_label: Some(continue_label),
            break_label: Some(end),
            ..Default::default()
        };
        self.parse_statement()?;
        self.loop_ctx = saved;

        self.lexer.expect("while", "Expected `while` after `do` body.")?;
        self.lexer.expect("(", "Expected `(` after `while`.")?;
        self.define_label(continue_label)?;
        let cond_ty = self.parse_expression()?;
        self.to_rvalue(cond_ty)?;
        self.jump_if_not_zero(reg::R0, body)?;
        self.lexer.expect(")", "Expected `)` after do-while condition.")?;
        self.lexer.expect(";", "Expected `;` after do-while statement.")?;
        self.define_label(end)
    }

    fn parse_for_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "for"
        self.lexer.expect("(", "Expected `(` after `for`.")?;

        let depth = self.locals.depth();
        if self.at_declaration_start() {
            self.parse_local_declaration()?;
        } else if !self.lexer.accept(";")? {
            self.parse_expression()?;
            self.lexer.expect(";", "Expected `;` after for-loop initializer.")?;
        }

        let cond_label = self.new_label();
        let body_label = self.new_label();
        let continue_label = self.new_label();
        let end_label = self.new_label();

        self.define_label(cond_label)?;
        if !self.lexer.is(";") {
            let cond_ty = self.parse_expression()?;
            self.to_rvalue(cond_ty)?;
            self.jump_if_zero(reg::R0, end_label)?;
        }
        self.lexer.expect(";", "Expected `;` after for-loop condition.")?;
        self.jump(body_label)?;

        self.define_label(continue_label)?;
        if !self.lexer.is(")") {
            self.parse_expression()?;
        }
        self.lexer.expect(")", "Expected `)` after for-loop clauses.")?;
        self.jump(cond_label)?;

        self.define_label(body_label)?;
        let saved = self.loop_ctx;
        self.loop_ctx = LoopContext {
            continue_label: Some(continue_label),
            break_label: Some(end_label),
            ..Default::default()
        };
        self.parse_statement()?;
        self.loop_ctx = saved;
        self.jump(continue_label)?;

        self.define_label(end_label)?;
        self.locals.pop(depth);
        Ok(())
    }

    // ------------------------------------------------------------- switch
    //
    // The body is compiled as one straight-line run, `case`/`default` just
    // defining a label at whatever point they occur — so fallthrough (a
    // case with no `break`) is simply the machine falling into the next
    // instruction, exactly as it would with no switch involved at all. What
    // makes it a switch is the dispatch chain emitted once the whole body
    // has been seen (and so every case's label and value are known): an
    // unconditional jump before the body sends control straight there, it
    // loads the switch's value from a hidden frame slot (it must survive
    // arbitrary statements between evaluation and comparison) and tests it
    // against each recorded case in turn, falling back to `default` or the
    // end of the switch if none match. A `jump break_label` right after the
    // body keeps a body that runs off its own end from falling into the
    // dispatch chain a second time.

    fn parse_switch_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "switch"
        self.lexer.expect("(", "Expected `(` after `switch`.")?;
        let ctrl_ty = self.parse_expression()?;
        let ctrl_ty = self.to_rvalue(ctrl_ty)?;
        self.lexer.expect(")", "Expected `)` after switch condition.")?;

        let int_ty = Type::new_base(BaseKind::SignedInt);
        self.compile_cast(ctrl_ty, int_ty)?;

        let depth = self.locals.depth();
        let (offset, rounded) =
            self.locals
                .add("__switch_value".to_string(), int_ty, |id| self.records.size(id))?;
        self.compile_reserve_local(rounded)?;
        self.compile_local_address_into(reg::R1, offset)?;
        self.compile_store_value(&int_ty, reg::R1)?;

        let dispatch_label = self.new_label();
        let break_label = self.new_label();
        self.jump(dispatch_label)?;

        self.switch_cases.push(Vec::new());
        let saved = self.loop_ctx;
        self.loop_ctx = LoopContext {
            continue_label: saved.continue_label,
            break_label: Some(break_label),
            default_label: None,
            default_used: false,
            switch_offset: offset,
            in_switch: true,
        };
        self.parse_statement()?;
        self.jump(break_label)?;
        let cases = self.switch_cases.pop().expect("pushed just above");
        let default_label = self.loop_ctx.default_label;
        self.loop_ctx = saved;

        self.define_label(dispatch_label)?;
        self.compile_local_address(offset)?;
        self.compile_load_value(&int_ty, reg::R0)?;
        for (value, label) in cases {
            self.compile_case_test(value, label)?;
        }
        if let Some(label) = default_label {
            self.jump(label)?;
        }
        self.define_label(break_label)?;

        self.locals.pop(depth);
        Ok(())
    }

    fn parse_case_statement(&mut self) -> Result<()> {
        if !self.loop_ctx.in_switch {
            return Err(CompileError::fatal("`case` outside a `switch` statement."));
        }
        self.lexer.consume()?; // "case"
        let value = self.parse_constant_expression()?;
        self.lexer.expect(":", "Expected `:` after `case` label.")?;

        let label = self.new_label();
        self.define_label(label)?;
        self.switch_cases
            .last_mut()
            .expect("in_switch implies an open case list")
            .push((value, label));
        Ok(())
    }

    fn parse_default_statement(&mut self) -> Result<()> {
        if !self.loop_ctx.in_switch {
            return Err(CompileError::fatal("`default` outside a `switch` statement."));
        }
        if self.loop_ctx.default_used {
            return Err(CompileError::fatal("Multiple `default` labels in one `switch`."));
        }
        self.lexer.consume()?; // "default"
        self.lexer.expect(":", "Expected `:` after `default`.")?;

        let label = self.new_label();
        self.define_label(label)?;
        self.loop_ctx.default_label = Some(label);
        self.loop_ctx.default_used = true;
        Ok(())
    }

    // --------------------------------------------------------- jumps

    fn parse_break_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "break"
        self.lexer.expect(";", "Expected `;` after `break`.")?;
        let label = self
            .loop_ctx
            .break_label
            .ok_or_else(|| CompileError::fatal("`break` outside a loop or switch."))?;
        self.jump(label)
    }

    fn parse_continue_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "continue"
        self.lexer.expect(";", "Expected `;` after `continue`.")?;
        let label = self
            .loop_ctx
            .continue_label
            .ok_or_else(|| CompileError::fatal("`continue` outside a loop."))?;
        self.jump(label)
    }

    fn parse_goto_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "goto"
        let name = self.expect_identifier()?;
        self.lexer.expect(";", "Expected `;` after `goto` label.")?;
        self.jump_to_user_label(&name)
    }

    fn parse_return_statement(&mut self) -> Result<()> {
        self.lexer.consume()?; // "return"
        let return_type = self
            .current_function
            .as_ref()
            .map(|f| f.return_type)
            .ok_or_else(|| CompileError::fatal("`return` outside a function."))?;

        if self.lexer.accept(";")? {
            return self.compile_function_epilogue();
        }
        let expr_ty = self.parse_expression()?;
        let expr_ty = self.to_rvalue(expr_ty)?;
        if !expr_ty.is_record() {
            self.compile_cast(expr_ty, return_type)?;
        }
        self.lexer.expect(";", "Expected `;` after return value.")?;
        self.compile_function_epilogue()
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
    fn while_loop_sums_to_ten() {
        compile_ok(
            "int main(void) { int i=0, s=0; while (i<5) { s += i; i++; } return s==10 ? 0 : 1; }",
        );
    }

    #[test]
    fn do_while_runs_body_at_least_once() {
        compile_ok(
            "int main(void) { int i=0, n=0; do { n++; i++; } while (i<0); return n==1 ? 0 : 1; }",
        );
    }

    #[test]
    fn for_loop_with_break_and_continue() {
        compile_ok(
            "int main(void) { int i, s=0; for (i=0;i<10;i++) { if (i==5) break; if (i%2==0) continue; s+=i; } return s==4 ? 0 : 1; }",
        );
    }

    #[test]
    fn goto_skips_over_a_statement() {
        compile_ok(
            "int main(void) { int x=0; goto skip; x=1; skip: return x==0 ? 0 : 1; }",
        );
    }

    #[test]
    fn nested_switch_default_in_the_middle_still_requires_no_match() {
        compile_ok(
            "int main(void) { int x=0; switch(5){case 1:x=1;break;default:x=9;break;case 2:x=2;break;} return x==9 ? 0 : 1; }",
        );
    }

    #[test]
    fn case_outside_switch_is_fatal() {
        compile_err("int main(void) { case 1: return 0; }");
    }

    #[test]
    fn continue_outside_loop_is_fatal() {
        compile_err("int main(void) { continue; return 0; }");
    }

    #[test]
    fn block_scoped_locals_do_not_leak_past_their_braces() {
        compile_err("int main(void) { { int x = 1; } return x; }");
    }
}
