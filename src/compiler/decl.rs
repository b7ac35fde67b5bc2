//! Declaration parsing: specifiers, declarators, records, and the top-level
//! driver that dispatches each global to either a prototype, a variable, or
//! a function definition.

use std::io::Write;

use crate::error::{CompileError, Result};
use crate::lexer::TokenType;
use crate::record::Member;
use crate::symtab::{slot_size, Global, TagKind};
use crate::types::{BaseKind, Type, ARRAY_INDETERMINATE};

use super::{reg, Compiler, CurrentFunction};

/// A parsed declarator: name, full type (pointers/array applied), and —
/// for function declarators — its parameter list and variadic flag.
pub(crate) struct Declarator {
    pub name: String,
    pub ty: Type,
    pub params: Option<Vec<(String, Type)>>,
    pub variadic: bool,
}

impl<W: Write> Compiler<W> {
    fn is_type_keyword(word: &str) -> bool {
        matches!(
            word,
            "void"
                | "char"
                | "short"
                | "int"
                | "long"
                | "signed"
                | "unsigned"
                | "struct"
                | "union"
                | "enum"
                | "typedef"
                | "static"
                | "extern"
                | "const"
                | "volatile"
                | "register"
                | "inline"
        )
    }

    /// True if the current token could start a declaration: a type keyword
    /// or a name already registered as a typedef.
    pub(crate) fn at_declaration_start(&self) -> bool {
        if self.lexer.token_type != TokenType::Alphanumeric {
            return false;
        }
        Self::is_type_keyword(&self.lexer.token) || self.typenames.find_typedef(&self.lexer.token).is_some()
    }

    /// Parses a run of declaration specifiers (storage class, qualifiers,
    /// base type) and returns the resulting base `Type` plus whether
    /// `typedef` was seen. Returns `Ok(None)` if the current token does not
    /// start a declaration at all.
    pub(crate) fn parse_declaration_specifiers(&mut self) -> Result<Option<(Type, bool)>> {
        if !self.at_declaration_start() {
            return Ok(None);
        }

        let mut is_typedef = false;
        let mut signedness: Option<bool> = None;
        let mut width: Option<&'static str> = None;
        let mut base_kw: Option<&'static str> = None;
        let mut record_type: Option<Type> = None;
        let mut saw_long = false;
        let mut saw_any = false;

        loop {
            if self.lexer.token_type != TokenType::Alphanumeric {
                break;
            }
            match self.lexer.token.as_str() {
                "typedef" => {
                    is_typedef = true;
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "static" | "extern" | "const" | "volatile" | "register" | "inline" => {
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "void" => {
                    base_kw = Some("void");
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "char" => {
                    base_kw = Some("char");
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "short" => {
                    width = Some("short");
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "int" => {
                    base_kw = Some("int");
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "long" => {
                    if saw_long {
                        return Err(CompileError::fatal(
                            "`long long` is not a supported type.",
                        ));
                    }
                    saw_long = true;
                    width = Some("long");
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "signed" => {
                    signedness = Some(true);
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "unsigned" => {
                    signedness = Some(false);
                    saw_any = true;
                    self.lexer.consume()?;
                }
                "struct" => {
                    record_type = Some(self.parse_record(true)?);
                    saw_any = true;
                }
                "union" => {
                    record_type = Some(self.parse_record(false)?);
                    saw_any = true;
                }
                "enum" => {
                    record_type = Some(self.parse_enum()?);
                    saw_any = true;
                }
                name => {
                    if !saw_any {
                        if let Some(ty) = self.typenames.find_typedef(name) {
                            record_type = Some(ty);
                            saw_any = true;
                            self.lexer.consume()?;
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        let base = if let Some(ty) = record_type {
            ty
        } else {
            let kind = match (base_kw, width, signedness) {
                (Some("void"), ..) => BaseKind::Void,
                (_, Some("short"), Some(false)) => BaseKind::UnsignedShort,
                (_, Some("short"), _) => BaseKind::SignedShort,
                (_, Some("long"), Some(false)) => BaseKind::UnsignedInt,
                (_, Some("long"), _) => BaseKind::SignedInt,
                (Some("char"), _, Some(false)) => BaseKind::UnsignedChar,
                (Some("char"), ..) => BaseKind::SignedChar,
                (_, _, Some(false)) => BaseKind::UnsignedInt,
                _ => BaseKind::SignedInt,
            };
            Type::new_base(kind)
        };
        Ok(Some((base, is_typedef)))
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String> {
        if self.lexer.token_type != TokenType::Alphanumeric {
            return Err(CompileError::fatal("Expected an identifier."));
        }
        self.lexer.take()
    }

    /// Parses `struct`/`union` tag and optional member-list body, returning
    /// the record's `Type`. Shared by declaration specifiers and by casts.
    pub(crate) fn parse_record(&mut self, is_struct: bool) -> Result<Type> {
        self.lexer.consume()?; // "struct" / "union"
        let tag = if self.lexer.token_type == TokenType::Alphanumeric {
            self.lexer.take()?
        } else {
            String::new()
        };
        let kind = if is_struct {
            TagKind::Struct
        } else {
            TagKind::Union
        };

        let id = if !tag.is_empty() {
            if let Some(existing) = self.typenames.find_record(&tag, kind) {
                existing
            } else {
                let id = self.records.declare(&tag, is_struct);
                self.typenames.add_record(tag.clone(), kind, id);
                id
            }
        } else {
            self.records.declare("", is_struct)
        };

        if self.lexer.accept("{")? {
            let members = self.parse_member_list()?;
            self.records.install_members(id, members)?;
            self.lexer
                .expect("}", "Expected `}` after struct/union members.")?;
        }
        Ok(Type::new_record(id))
    }

    /// Parses `enum <tag> [{ NAME [= constant-expr], ... }]`. The tag is
    /// mandatory but never tracked anywhere — every enum is just `int`, and a
    /// bare `enum foo;`-style reference with no body is a forward reference
    /// to that same `int`, not a distinct type. A body installs each
    /// enumerator as an ordinary global `int` variable, auto-incrementing
    /// from 0 unless overridden by `= constant-expr`.
    fn parse_enum(&mut self) -> Result<Type> {
        self.lexer.consume()?; // "enum"
        let _tag = self.expect_identifier()?;
        let int_ty = Type::new_base(BaseKind::SignedInt);

        if !self.lexer.accept("{")? {
            return Ok(int_ty);
        }

        let mut value = 0i32;
        loop {
            if self.lexer.is("}") {
                break;
            }
            let name = self.expect_identifier()?;
            if self.lexer.accept("=")? {
                value = self.parse_constant_expression()?;
            }
            self.globals
                .add(name.clone(), Global::Variable { ty: int_ty })?;
            self.compile_global_variable(&name, 4, Some(value))?;
            value += 1;
            if !self.lexer.accept(",")? {
                break;
            }
        }
        self.lexer.expect("}", "Expected `}` after enum members.")?;
        Ok(int_ty)
    }

    fn parse_member_list(&mut self) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        while !self.lexer.is("}") {
            let (base, _) = self
                .parse_declaration_specifiers()?
                .ok_or_else(|| CompileError::fatal("Expected a member type."))?;
            loop {
                let declarator = self.parse_declarator(base)?;
                if declarator.params.is_some() {
                    return Err(CompileError::fatal(
                        "A struct/union member cannot be a function.",
                    ));
                }
                members.push(Member {
                    name: declarator.name,
                    ty: declarator.ty,
                    offset: 0,
                });
                if !self.lexer.accept(",")? {
                    break;
                }
            }
            self.lexer.expect(";", "Expected `;` after struct member.")?;
        }
        Ok(members)
    }

    /// Parses one declarator: leading `*`s, a name, and an optional array
    /// suffix or function parameter list.
    pub(crate) fn parse_declarator(&mut self, base: Type) -> Result<Declarator> {
        let mut ty = base;
        while self.lexer.accept("*")? {
            ty = ty.increment_pointers();
        }
        let name = self.expect_identifier()?;
        let mut params = None;
        let mut variadic = false;
        if self.lexer.accept("(")? {
            let (p, v) = self.parse_parameter_list()?;
            params = Some(p);
            variadic = v;
            self.lexer
                .expect(")", "Expected `)` after parameter list.")?;
        } else if self.lexer.accept("[")? {
            let length = if self.lexer.is("]") {
                ARRAY_INDETERMINATE
            } else {
                self.parse_constant_expression()?
            };
            self.lexer.expect("]", "Expected `]` after array length.")?;
            ty = ty.set_array_length(length);
        }
        Ok(Declarator {
            name,
            ty,
            params,
            variadic,
        })
    }

    fn parse_parameter_after_base(&mut self, base: Type) -> Result<(Type, String)> {
        let mut ty = base;
        while self.lexer.accept("*")? {
            ty = ty.increment_pointers();
        }
        let name = if self.lexer.token_type == TokenType::Alphanumeric
            && !Self::is_type_keyword(&self.lexer.token)
        {
            self.lexer.take()?
        } else {
            String::new()
        };
        if self.lexer.accept("[")? {
            if !self.lexer.is("]") {
                self.parse_constant_expression()?;
            }
            self.lexer.expect("]", "Expected `]` after array bound.")?;
            ty = ty.increment_pointers();
        }
        Ok((ty, name))
    }

    fn parse_parameter_list(&mut self) -> Result<(Vec<(String, Type)>, bool)> {
        let mut params = Vec::new();
        if self.lexer.is(")") {
            return Ok((params, false));
        }
        if self.lexer.is("void") {
            self.lexer.consume()?;
            if self.lexer.is(")") {
                return Ok((params, false));
            }
            let (ty, name) = self.parse_parameter_after_base(Type::new_base(BaseKind::Void))?;
            params.push((name, ty));
        } else {
            if self.lexer.is("...") {
                return Err(CompileError::fatal(
                    "A function must have at least one named parameter before `...`.",
                ));
            }
            let (base, _) = self
                .parse_declaration_specifiers()?
                .ok_or_else(|| CompileError::fatal("Expected a parameter type."))?;
            let (ty, name) = self.parse_parameter_after_base(base)?;
            params.push((name, ty));
        }
        let mut variadic = false;
        while self.lexer.accept(",")? {
            if self.lexer.accept("...")? {
                variadic = true;
                break;
            }
            let (base, _) = self
                .parse_declaration_specifiers()?
                .ok_or_else(|| CompileError::fatal("Expected a parameter type."))?;
            let (ty, name) = self.parse_parameter_after_base(base)?;
            params.push((name, ty));
        }
        Ok((params, variadic))
    }

    /// Parses one top-level declaration: a typedef, a record-only
    /// declaration (`struct Foo { ... };`), one or more global variables, a
    /// function prototype, or a function definition.
    pub(crate) fn parse_global(&mut self) -> Result<()> {
        let Some((base, is_typedef)) = self.parse_declaration_specifiers()? else {
            return Err(CompileError::fatal(format!(
                "Expected a declaration, found `{}`.",
                self.lexer.token
            )));
        };

        if self.lexer.accept(";")? {
            // A bare `struct Foo { ... };` with no declarator — the record
            // itself is already registered; nothing further to do.
            return Ok(());
        }

        let declarator = self.parse_declarator(base)?;

        if is_typedef {
            self.typenames.add_typedef(declarator.name, declarator.ty);
            self.lexer.expect(";", "Expected `;` after typedef.")?;
            return Ok(());
        }

        if let Some(params) = declarator.params {
            let param_types: Vec<Type> = params.iter().map(|(_, t)| *t).collect();
            self.globals.add(
                declarator.name.clone(),
                Global::Function {
                    return_type: declarator.ty,
                    params: param_types,
                    variadic: declarator.variadic,
                },
            )?;
            if declarator.variadic {
                self.globals.set_variadic(&declarator.name, true);
            }

            if self.lexer.is("{") {
                self.compile_function_definition(declarator.name, declarator.ty, params, declarator.variadic)?;
            } else {
                self.lexer
                    .expect(";", "Expected `;` after function prototype.")?;
            }
            return Ok(());
        }

        self.compile_global_declarator(declarator.name, declarator.ty)?;
        while self.lexer.accept(",")? {
            let next = self.parse_declarator(base)?;
            if next.params.is_some() {
                return Err(CompileError::fatal(
                    "Multiple declarators with `,` cannot define a function.",
                ));
            }
            self.compile_global_declarator(next.name, next.ty)?;
        }
        self.lexer
            .expect(";", "Expected `;` after global declaration.")?;
        Ok(())
    }

    fn compile_global_declarator(&mut self, name: String, ty: Type) -> Result<()> {
        let initializer = if self.lexer.accept("=")? {
            Some(self.parse_constant_expression()?)
        } else {
            None
        };
        self.globals
            .add(name.clone(), Global::Variable { ty })?;
        let size = ty.size(|id| self.records.size(id))?;
        self.compile_global_variable(&name, size, initializer)
    }

    fn compile_function_definition(
        &mut self,
        name: String,
        return_type: Type,
        params: Vec<(String, Type)>,
        variadic: bool,
    ) -> Result<()> {
        self.current_function = Some(CurrentFunction {
            name: name.clone(),
            return_type,
        });
        self.next_string_id = 0;

        self.compile_function_prologue(&name)?;

        let depth = self.locals.depth();
        // A function *definition* always names every parameter; an empty
        // name can only arise from a prototype, which never reaches here.
        let named_count = params.len();

        if variadic {
            // The actual argument count varies per call site, so the
            // address of even a *named* parameter needs a register
            // computed at runtime from it.
            self.compile_compute_deep_end_ptr(reg::R1)?;
            let mut index = 0;
            for (pname, ty) in params.iter() {
                if pname.is_empty() {
                    index += 1;
                    continue;
                }
                let (offset, rounded) = self
                    .locals
                    .add(pname.clone(), *ty, |id| self.records.size(id))?;
                self.compile_reserve_local(rounded)?;
                self.compile_receive_variadic_named_argument(reg::R1, index, offset)?;
                index += 1;
            }
            // The hidden base pointer copied into a user `va_list` by
            // `__builtin_va_start`: the address one past the last named
            // parameter, i.e. the first variadic argument.
            let (offset, rounded) = self.locals.add(
                "__va_base".to_string(),
                Type::new_base(BaseKind::SignedInt).increment_pointers(),
                |id| self.records.size(id),
            )?;
            self.compile_reserve_local(rounded)?;
            self.compile_init_variadic_base(reg::R1, named_count, offset)?;
        } else {
            for (index, (pname, ty)) in params.iter().enumerate() {
                if pname.is_empty() {
                    continue;
                }
                let (offset, rounded) = self
                    .locals
                    .add(pname.clone(), *ty, |id| self.records.size(id))?;
                self.compile_reserve_local(rounded)?;
                self.compile_receive_fixed_argument(index, named_count, offset)?;
            }
        }

        self.parse_compound_statement()?;

        // Implicit `return;` at the end of a function body that falls off
        // the end without one.
        self.compile_function_epilogue()?;
        self.finish_function()?;
        self.locals.pop(depth);
        self.current_function = None;
        Ok(())
    }
}
