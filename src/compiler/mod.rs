//! The compiler context: bundles the emitter, lexer, and symbol tables that
//! the original implementation kept as process-global state into one value
//! threaded through every parse function. This is what makes the parser
//! testable on small string inputs instead of only on whole files.

mod codegen;
mod decl;
mod expr;
mod stmt;

use std::io::Write;

use crate::emit::Emitter;
use crate::error::Result;
use crate::lexer::Lexer;
use crate::record::RecordTable;
use crate::symtab::{GlobalTable, LocalStack, TypeNameRegistry};
use crate::types::Type;

/// Register indices, matching the order `Emitter` renders them in.
pub mod reg {
    pub const R0: usize = 0;
    pub const R1: usize = 1;
    pub const R2: usize = 2;
    pub const SCRATCH: usize = 9;
    pub const RSP: usize = 12;
    pub const RFP: usize = 13;
    pub const RPP: usize = 14;
}

pub(crate) const JUMP_LABEL_PREFIX: &str = "_Lx";
pub(crate) const STRING_LABEL_PREFIX: &str = "_Sx";
pub(crate) const USER_LABEL_PREFIX: &str = "_Ux";

/// The label stack entry saved/restored around loops and switches.
#[derive(Default, Clone, Copy)]
struct LoopContext {
    continue_label: Option<usize>,
    break_label: Option<usize>,
    default_label: Option<usize>,
    default_used: bool,
    switch_offset: i32,
    in_switch: bool,
}

pub(crate) struct CurrentFunction {
    pub name: String,
    pub return_type: Type,
}

pub struct Compiler<W: Write> {
    pub(crate) emitter: Emitter<W>,
    pub(crate) lexer: Lexer,
    pub(crate) globals: GlobalTable,
    pub(crate) locals: LocalStack,
    pub(crate) typenames: TypeNameRegistry,
    pub(crate) records: RecordTable,

    last_label: usize,
    loop_ctx: LoopContext,
    current_function: Option<CurrentFunction>,
    function_frame_size: i32,

    /// Strings queued in the current function, in order of first use,
    /// paired with the synthetic id assigned when they were first seen.
    pending_strings: Vec<(usize, Vec<u8>)>,
    next_string_id: usize,

    /// Set by `parse_primary_expression` when an identifier names a
    /// function, so that a `(` immediately following can be compiled as a
    /// direct call instead of loading the function's address and calling
    /// through it. Consumed (and always cleared) by the first postfix
    /// operator parsed afterward.
    pending_call_target: Option<String>,

    /// One entry per currently-open `switch`: the `(value, label)` pairs
    /// recorded as `case` labels are encountered while compiling the body,
    /// consumed by the dispatch chain emitted once the whole body (and
    /// therefore every case in it) has been seen.
    switch_cases: Vec<Vec<(i32, usize)>>,
}

impl<W: Write> Compiler<W> {
    pub fn new(source: &str, filename: &str, output: W) -> Result<Self> {
        Ok(Compiler {
            emitter: Emitter::new(output)?,
            lexer: Lexer::new(source, filename)?,
            globals: GlobalTable::new(),
            locals: LocalStack::new(),
            typenames: TypeNameRegistry::new(),
            records: RecordTable::new(),
            last_label: 0,
            loop_ctx: LoopContext::default(),
            current_function: None,
            function_frame_size: 0,
            pending_strings: Vec::new(),
            next_string_id: 0,
            pending_call_target: None,
            switch_cases: Vec::new(),
        })
    }

    /// Compiles the whole translation unit: every top-level declaration in
    /// sequence, until the lexer reaches end-of-input.
    pub fn compile(&mut self) -> Result<()> {
        while self.lexer.token_type != crate::lexer::TokenType::End {
            self.emit_pending_line_directive()?;
            self.parse_global()?;
        }
        self.emitter.flush()
    }

    /// Re-emits the most recent explicit `#line` directive the lexer has
    /// seen since the last call, if any. The lexer has no reference to the
    /// emitter (it needs to stay plain `Clone` for backtracking), so this is
    /// the hand-off point: called at every natural checkpoint between
    /// grammar productions.
    pub(crate) fn emit_pending_line_directive(&mut self) -> Result<()> {
        if let Some((line, file)) = self.lexer.take_pending_line_directive() {
            self.emitter.line_directive(line, &file)?;
        }
        Ok(())
    }

    fn generate_label(&mut self) -> usize {
        let label = self.last_label;
        self.last_label += 1;
        label
    }

    /// Resolves a record's size through the table, for use as the
    /// `record_size` callback `Type::size`/`alignment` need.
    pub(crate) fn record_size(&self, id: crate::record::RecordId) -> Result<i32> {
        self.records.size(id)
    }

    /// Consumes the compiler, returning the underlying writer's contents.
    /// Meant for callers that compiled into an in-memory buffer.
    pub fn into_output(self) -> W {
        self.emitter.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_integer_arithmetic_and_comparison() {
        let src = "int main(void) { if ((7 / 3) != 2) return 1; if ((-600 / -20) != 30) return 2; return 0; }";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        compiler.compile().unwrap();
    }

    #[test]
    fn scenario_3_struct_with_flexible_array() {
        let src = "struct S{int a;char b;short c[];};int main(void){return sizeof(struct S)==8?0:1;}";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        compiler.compile().unwrap();
    }

    #[test]
    fn scenario_4_switch_fallthrough_and_default() {
        let src = "int main(void){int x=0;switch('b'){case 'a':return 9;case 'b':x+=1;case 'c':x+=1;default:x+=1;}return x==3?0:1;}";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        compiler.compile().unwrap();
    }

    #[test]
    fn scenario_5_variadic_sum() {
        let src = "int sum(int n,...){__builtin_va_list a;__builtin_va_start(a,n);int s=0;while(n--)s+=__builtin_va_arg(a,int);__builtin_va_end(a);return s;}\nint main(void){return sum(4,1,2,3,4)==10?0:1;}";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        compiler.compile().unwrap();
    }

    #[test]
    fn redeclaring_a_function_with_a_different_signature_is_fatal() {
        let src = "int f(int x); char f(int x) { return 0; }";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        assert!(compiler.compile().is_err());
    }

    #[test]
    fn undeclared_identifier_is_fatal() {
        let src = "int main(void) { return undeclared_name; }";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        assert!(compiler.compile().is_err());
    }

    #[test]
    fn break_outside_loop_is_fatal() {
        let src = "int main(void) { break; return 0; }";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        assert!(compiler.compile().is_err());
    }

    #[test]
    fn long_long_is_rejected() {
        let src = "long long int main(void) { return 0; }";
        let mut compiler = Compiler::new(src, "<test>", Vec::<u8>::new()).unwrap();
        assert!(compiler.compile().is_err());
    }
}
