//! Recursive-descent parser and semantic analyzer.
//!
//! The parser owns the type and variable arenas plus the scope stacks and
//! walks the token stream once, front to back. Statements are typed as soon
//! as they are produced, so everything downstream sees fully annotated
//! trees.

mod eval;
mod expr;
mod init;
mod scope;
mod stmt;

use anyhow::Result;
use num_enum::TryFromPrimitive;

use crate::ast::{Function, Node, NodeKind, Program, Var, VarId, Vars};
use crate::lexer::{Token, TokenKind};
use crate::ty::{Member, TypeId, TypeKind, Types};
use crate::SourceFile;

use scope::{ScopeStack, VarScopeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StorageClass {
    #[default]
    None,
    Typedef,
    Static,
    Extern,
}

// Specifier counter bits. Each builtin keyword occurrence adds its bit
// value; two bits per keyword leave room for the doubled `long`.
const VOID: u32 = 1 << 0;
const BOOL: u32 = 1 << 2;
const CHAR: u32 = 1 << 4;
const SHORT: u32 = 1 << 6;
const INT: u32 = 1 << 8;
const LONG: u32 = 1 << 10;
const OTHER: u32 = 1 << 12;

/// The legal values of the specifier counter.
#[derive(Debug, Clone, Copy, TryFromPrimitive)]
#[repr(u32)]
enum BuiltinSpec {
    Void = VOID,
    Bool = BOOL,
    Char = CHAR,
    Short = SHORT,
    ShortInt = SHORT + INT,
    Int = INT,
    Long = LONG,
    LongInt = LONG + INT,
    LongLong = LONG + LONG,
    LongLongInt = LONG + LONG + INT,
}

impl BuiltinSpec {
    fn type_id(self) -> TypeId {
        match self {
            BuiltinSpec::Void => Types::VOID,
            BuiltinSpec::Bool => Types::BOOL,
            BuiltinSpec::Char => Types::CHAR,
            BuiltinSpec::Short | BuiltinSpec::ShortInt => Types::SHORT,
            BuiltinSpec::Int => Types::INT,
            BuiltinSpec::Long
            | BuiltinSpec::LongInt
            | BuiltinSpec::LongLong
            | BuiltinSpec::LongLongInt => Types::LONG,
        }
    }
}

/// Per-switch context; collects `case` values while the body parses.
#[derive(Debug, Default)]
struct SwitchCtx {
    cases: Vec<i64>,
    has_default: bool,
}

pub struct Parser<'a> {
    src: &'a SourceFile,
    tokens: &'a [Token],
    pos: usize,
    pub(crate) types: Types,
    pub(crate) vars: Vars,
    scopes: ScopeStack,
    locals: Vec<VarId>,
    globals: Vec<VarId>,
    current_switch: Option<SwitchCtx>,
    label_count: u32,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a SourceFile, tokens: &'a [Token]) -> Self {
        Parser {
            src,
            tokens,
            pos: 0,
            types: Types::new(),
            vars: Vars::default(),
            scopes: ScopeStack::default(),
            locals: Vec::new(),
            globals: Vec::new(),
            current_switch: None,
            label_count: 0,
        }
    }

    /// program := (function | global_var)*
    pub fn program(mut self) -> Result<Program> {
        let mut fns = Vec::new();
        while !self.at_eof() {
            if self.is_function()? {
                // A prototype contributes its symbol but no function.
                if let Some(func) = self.function()? {
                    fns.push(func);
                }
            } else {
                self.global_var()?;
            }
        }
        Ok(Program {
            types: self.types,
            vars: self.vars,
            globals: self.globals,
            fns,
        })
    }

    // ------------------------------------------------------------------
    // token cursor

    fn tok(&self) -> &'a Token {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        self.tok().kind == TokenKind::Eof
    }

    fn peek(&self, op: &str) -> bool {
        let tok = self.tok();
        tok.kind == TokenKind::Reserved && tok.text(self.src) == op.as_bytes()
    }

    fn consume(&mut self, op: &str) -> Option<usize> {
        if self.peek(op) {
            let idx = self.pos;
            self.pos += 1;
            Some(idx)
        } else {
            None
        }
    }

    fn expect(&mut self, op: &str) -> Result<usize> {
        self.consume(op)
            .ok_or_else(|| self.err_here(format!("expected \"{op}\"")))
    }

    fn consume_ident(&mut self) -> Option<(String, usize)> {
        let tok = self.tok();
        if tok.kind != TokenKind::Ident {
            return None;
        }
        let name = String::from_utf8_lossy(tok.text(self.src)).into_owned();
        let idx = self.pos;
        self.pos += 1;
        Some((name, idx))
    }

    fn expect_ident(&mut self) -> Result<(String, usize)> {
        self.consume_ident()
            .ok_or_else(|| self.err_here("expected an identifier"))
    }

    /// `}` or `,}`, the two ways an initializer or enum body may end.
    fn consume_end(&mut self) -> bool {
        let save = self.pos;
        if self.consume("}").is_some() {
            return true;
        }
        if self.consume(",").is_some() && self.consume("}").is_some() {
            return true;
        }
        self.pos = save;
        false
    }

    fn peek_end(&mut self) -> bool {
        let save = self.pos;
        let found = self.consume_end();
        self.pos = save;
        found
    }

    fn expect_end(&mut self) -> Result<()> {
        if !self.consume_end() {
            self.expect("}")?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // diagnostics

    pub(crate) fn err_tok(
        &self,
        tok: usize,
        msg: impl std::fmt::Display,
    ) -> anyhow::Error {
        self.src.error_at(self.tokens[tok].pos, msg)
    }

    fn err_here(&self, msg: impl std::fmt::Display) -> anyhow::Error {
        self.err_tok(self.pos, msg)
    }

    fn warn_tok(&self, tok: usize, msg: impl std::fmt::Display) {
        self.src.warn_at(self.tokens[tok].pos, msg);
    }

    // ------------------------------------------------------------------
    // declarations

    /// Looks ahead to decide whether the next declaration is a function.
    /// Side effects on the type arena are harmless; the cursor is restored.
    fn is_function(&mut self) -> Result<bool> {
        let save = self.pos;

        let mut sclass = StorageClass::None;
        let ty = self.basetype(Some(&mut sclass))?;

        let mut is_func = false;
        if self.consume(";").is_none() {
            is_func =
                self.declarator(ty).is_ok() && self.consume("(").is_some();
        }

        self.pos = save;
        Ok(is_func)
    }

    /// basetype := storage_class* (builtin-type | struct-decl | enum-spec |
    /// typedef-name)
    ///
    /// Builtin specifiers may appear in any order; occurrences are counted
    /// into a bitset matched against [`BuiltinSpec`].
    fn basetype(
        &mut self,
        mut sclass: Option<&mut StorageClass>,
    ) -> Result<TypeId> {
        if !self.is_typename() {
            return Err(self.err_here("typename expected"));
        }

        let mut ty = Types::INT;
        let mut counter = 0u32;
        if let Some(sc) = sclass.as_deref_mut() {
            *sc = StorageClass::None;
        }

        while self.is_typename() {
            let tok = self.pos;

            if self.peek("typedef") || self.peek("static") || self.peek("extern")
            {
                let Some(sc) = sclass.as_deref_mut() else {
                    return Err(self.err_tok(
                        tok,
                        "storage class specifier is not allowed",
                    ));
                };
                let class = if self.consume("typedef").is_some() {
                    StorageClass::Typedef
                } else if self.consume("static").is_some() {
                    StorageClass::Static
                } else {
                    self.expect("extern")?;
                    StorageClass::Extern
                };
                if *sc != StorageClass::None {
                    return Err(self.err_tok(
                        tok,
                        "typedef, static and extern may not be used together",
                    ));
                }
                *sc = class;
                continue;
            }

            if !self.peek("void")
                && !self.peek("_Bool")
                && !self.peek("char")
                && !self.peek("short")
                && !self.peek("int")
                && !self.peek("long")
            {
                if counter != 0 {
                    break;
                }
                if self.peek("struct") {
                    ty = self.struct_decl()?;
                } else if self.peek("enum") {
                    ty = self.enum_specifier()?;
                } else {
                    match self.find_typedef_here() {
                        Some(alias) => {
                            ty = alias;
                            self.pos += 1;
                        }
                        None => return Err(self.err_here("typename expected")),
                    }
                }
                counter |= OTHER;
                continue;
            }

            if self.consume("void").is_some() {
                counter += VOID;
            } else if self.consume("_Bool").is_some() {
                counter += BOOL;
            } else if self.consume("char").is_some() {
                counter += CHAR;
            } else if self.consume("short").is_some() {
                counter += SHORT;
            } else if self.consume("int").is_some() {
                counter += INT;
            } else if self.consume("long").is_some() {
                counter += LONG;
            }

            ty = match BuiltinSpec::try_from(counter) {
                Ok(spec) => spec.type_id(),
                Err(_) => return Err(self.err_tok(tok, "invalid type")),
            };
        }

        Ok(ty)
    }

    fn is_typename(&self) -> bool {
        const TYPE_KEYWORDS: &[&str] = &[
            "void", "_Bool", "char", "short", "int", "long", "enum", "struct",
            "typedef", "static", "extern",
        ];
        TYPE_KEYWORDS.iter().any(|kw| self.peek(kw))
            || self.find_typedef_here().is_some()
    }

    fn find_typedef_here(&self) -> Option<TypeId> {
        let tok = self.tok();
        if tok.kind != TokenKind::Ident {
            return None;
        }
        let name = std::str::from_utf8(tok.text(self.src)).ok()?;
        match self.scopes.find_var(name) {
            Some(VarScopeKind::Typedef(ty)) => Some(ty),
            _ => None,
        }
    }

    /// declarator := '*'* ('(' declarator ')' | ident) type-suffix
    ///
    /// The parenthesized inner declarator receives a placeholder type; once
    /// the outer suffix is parsed, the placeholder slot is overwritten with
    /// the completed outer type. That ties the knot for declarations like
    /// `int (*x)[3]`.
    fn declarator(&mut self, mut ty: TypeId) -> Result<(String, usize, TypeId)> {
        while self.consume("*").is_some() {
            ty = self.types.pointer_to(ty);
        }

        if self.consume("(").is_some() {
            let placeholder = self.types.placeholder();
            let inner = self.declarator(placeholder)?;
            self.expect(")")?;
            let outer = self.type_suffix(ty)?;
            self.types.replace(placeholder, outer);
            return Ok(inner);
        }

        let (name, name_tok) = self.expect_ident()?;
        let ty = self.type_suffix(ty)?;
        Ok((name, name_tok, ty))
    }

    fn abstract_declarator(&mut self, mut ty: TypeId) -> Result<TypeId> {
        while self.consume("*").is_some() {
            ty = self.types.pointer_to(ty);
        }

        if self.consume("(").is_some() {
            let placeholder = self.types.placeholder();
            let inner = self.abstract_declarator(placeholder)?;
            self.expect(")")?;
            let outer = self.type_suffix(ty)?;
            self.types.replace(placeholder, outer);
            return Ok(inner);
        }

        self.type_suffix(ty)
    }

    /// type-suffix := ('[' const-expr? ']')*
    fn type_suffix(&mut self, ty: TypeId) -> Result<TypeId> {
        if self.consume("[").is_none() {
            return Ok(ty);
        }

        let mut len = 0;
        let mut incomplete = true;
        if self.consume("]").is_none() {
            len = self.const_expr()? as i32;
            incomplete = false;
            self.expect("]")?;
        }

        let tok = self.pos;
        let ty = self.type_suffix(ty)?;
        if self.types.get(ty).incomplete {
            return Err(self.err_tok(tok, "incomplete element type"));
        }

        let arr = self.types.array_of(ty, len);
        self.types.get_mut(arr).incomplete = incomplete;
        Ok(arr)
    }

    /// type-name := basetype abstract-declarator
    pub(crate) fn type_name(&mut self) -> Result<TypeId> {
        let ty = self.basetype(None)?;
        self.abstract_declarator(ty)
    }

    /// struct-decl := "struct" ident? ('{' struct-member* '}')?
    fn struct_decl(&mut self) -> Result<TypeId> {
        self.expect("struct")?;
        let tag = self.consume_ident();

        if let Some((name, name_tok)) = &tag {
            if !self.peek("{") {
                return match self.scopes.find_tag(name) {
                    None => {
                        let ty = self.types.struct_type();
                        self.scopes.push_tag(name.clone(), ty);
                        Ok(ty)
                    }
                    Some((ty, _))
                        if matches!(
                            self.types.get(ty).kind,
                            TypeKind::Struct { .. }
                        ) =>
                    {
                        Ok(ty)
                    }
                    Some(_) => Err(self.err_tok(*name_tok, "not a struct tag")),
                };
            }
        }

        if self.consume("{").is_none() {
            return Ok(self.types.struct_type());
        }

        // A tag redeclared with a body at the same depth completes the
        // earlier incomplete struct in place; a deeper one shadows it.
        let mut existing = None;
        if let Some((name, name_tok)) = &tag {
            if let Some((found, depth)) = self.scopes.find_tag(name) {
                if depth == self.scopes.depth() {
                    if !matches!(
                        self.types.get(found).kind,
                        TypeKind::Struct { .. }
                    ) {
                        return Err(
                            self.err_tok(*name_tok, "not a struct tag")
                        );
                    }
                    existing = Some(found);
                }
            }
        }
        let ty = match existing {
            Some(ty) => ty,
            None => {
                let fresh = self.types.struct_type();
                if let Some((name, _)) = &tag {
                    self.scopes.push_tag(name.clone(), fresh);
                }
                fresh
            }
        };

        let mut members = Vec::new();
        while self.consume("}").is_none() {
            members.push(self.struct_member()?);
        }
        self.types.complete_struct(ty, members);
        Ok(ty)
    }

    /// enum-spec := "enum" ident? '{' ident ("=" const-expr)? (',' ...)* '}'
    fn enum_specifier(&mut self) -> Result<TypeId> {
        self.expect("enum")?;
        let ty = self.types.enum_type();

        let tag = self.consume_ident();
        if let Some((name, name_tok)) = &tag {
            if !self.peek("{") {
                return match self.scopes.find_tag(name) {
                    None => Err(self.err_tok(*name_tok, "unknown enum type")),
                    Some((found, _))
                        if matches!(
                            self.types.get(found).kind,
                            TypeKind::Enum
                        ) =>
                    {
                        Ok(found)
                    }
                    Some(_) => Err(self.err_tok(*name_tok, "not an enum tag")),
                };
            }
        }

        self.expect("{")?;
        let mut val = 0i64;
        loop {
            let (name, _) = self.expect_ident()?;
            if self.consume("=").is_some() {
                val = self.const_expr()?;
            }
            self.scopes.push_enum_const(name, ty, val);
            val += 1;
            if self.consume_end() {
                break;
            }
            self.expect(",")?;
        }

        if let Some((name, _)) = tag {
            self.scopes.push_tag(name, ty);
        }
        Ok(ty)
    }

    fn struct_member(&mut self) -> Result<Member> {
        let base = self.basetype(None)?;
        let (name, name_tok, ty) = self.declarator(base)?;
        self.expect(";")?;
        Ok(Member {
            name,
            ty,
            offset: 0,
            tok: name_tok,
        })
    }

    fn read_func_param(&mut self) -> Result<VarId> {
        let base = self.basetype(None)?;
        let (name, _, mut ty) = self.declarator(base)?;

        // Array parameters decay to pointer-to-element.
        if let TypeKind::Array { base, .. } = self.types.get(ty).kind {
            ty = self.types.pointer_to(base);
        }

        Ok(self.new_lvar(name, ty))
    }

    fn read_func_params(&mut self) -> Result<Vec<VarId>> {
        if self.consume(")").is_some() {
            return Ok(Vec::new());
        }

        let save = self.pos;
        if self.consume("void").is_some() && self.consume(")").is_some() {
            return Ok(Vec::new());
        }
        self.pos = save;

        let mut params = vec![self.read_func_param()?];
        while self.consume(")").is_none() {
            self.expect(",")?;
            params.push(self.read_func_param()?);
        }
        Ok(params)
    }

    /// function := basetype declarator '(' params (';' | '{' stmt* '}')
    ///
    /// Returns `None` for a prototype.
    fn function(&mut self) -> Result<Option<Function>> {
        self.locals.clear();

        let mut sclass = StorageClass::None;
        let base = self.basetype(Some(&mut sclass))?;
        let (name, _, ret_ty) = self.declarator(base)?;

        // Register the function symbol for call-site resolution.
        let fn_ty = self.types.func_type(ret_ty);
        self.new_gvar(name.clone(), fn_ty, false, false);

        self.expect("(")?;
        let snapshot = self.scopes.enter();
        let params = self.read_func_params()?;

        if self.consume(";").is_some() {
            self.scopes.leave(snapshot);
            return Ok(None);
        }

        let mut body = Vec::new();
        self.expect("{")?;
        while self.consume("}").is_none() {
            body.push(self.stmt()?);
        }
        self.scopes.leave(snapshot);

        Ok(Some(Function {
            name,
            is_static: sclass == StorageClass::Static,
            params,
            locals: std::mem::take(&mut self.locals),
            body,
            stack_size: 0,
        }))
    }

    /// global-var := basetype (';' | declarator ('=' initializer)? ';')
    fn global_var(&mut self) -> Result<()> {
        let mut sclass = StorageClass::None;
        let ty = self.basetype(Some(&mut sclass))?;

        // Bare type declarations like `struct S { ... };`.
        if self.consume(";").is_some() {
            return Ok(());
        }

        let tok = self.pos;
        let (name, _, ty) = self.declarator(ty)?;

        if sclass == StorageClass::Typedef {
            self.expect(";")?;
            self.scopes.push_typedef(name, ty);
            return Ok(());
        }

        let var = self.new_gvar(
            name,
            ty,
            sclass == StorageClass::Static,
            sclass != StorageClass::Extern,
        );

        if sclass == StorageClass::Extern {
            self.expect(";")?;
            return Ok(());
        }

        if self.consume("=").is_some() {
            let image = self.gvar_initializer(ty)?;
            self.vars.get_mut(var).initializer = image;
            self.expect(";")?;
            return Ok(());
        }

        if self.types.get(ty).incomplete {
            return Err(self.err_tok(tok, "incomplete type"));
        }
        self.expect(";")?;
        Ok(())
    }

    /// declaration := basetype (';' | declarator ('=' initializer)? ';')
    ///
    /// Block-scope form. Typedefs bind locally; `static` locals become
    /// anonymous globals reachable under their source name.
    pub(crate) fn declaration(&mut self) -> Result<Node> {
        let tok = self.pos;
        let mut sclass = StorageClass::None;
        let ty = self.basetype(Some(&mut sclass))?;

        if self.consume(";").is_some() {
            return Ok(Node::new(NodeKind::Null, tok));
        }

        let (name, _, ty) = self.declarator(ty)?;

        if sclass == StorageClass::Typedef {
            self.expect(";")?;
            self.scopes.push_typedef(name, ty);
            return Ok(Node::new(NodeKind::Null, tok));
        }

        if matches!(self.types.get(ty).kind, TypeKind::Void) {
            return Err(self.err_tok(tok, "variable declared void"));
        }

        if sclass == StorageClass::Static {
            let label = self.new_label();
            let var = self.new_gvar(label, ty, true, true);
            self.scopes.push_var(name, var);

            if self.consume("=").is_some() {
                let image = self.gvar_initializer(ty)?;
                self.vars.get_mut(var).initializer = image;
            } else if self.types.get(ty).incomplete {
                return Err(self.err_tok(tok, "incomplete type"));
            }
            let _ = self.consume(";");
            return Ok(Node::new(NodeKind::Null, tok));
        }

        let var = self.new_lvar(name, ty);

        if self.consume(";").is_some() {
            if self.types.get(ty).incomplete {
                return Err(self.err_tok(tok, "incomplete type"));
            }
            return Ok(Node::new(NodeKind::Null, tok));
        }

        self.expect("=")?;
        let node = self.lvar_initializer(var, tok)?;
        self.expect(";")?;
        Ok(node)
    }

    // ------------------------------------------------------------------
    // symbols

    fn new_lvar(&mut self, name: String, ty: TypeId) -> VarId {
        let id = self.vars.alloc(Var {
            name: name.clone(),
            ty,
            is_local: true,
            offset: 0,
            is_static: false,
            initializer: Vec::new(),
        });
        self.scopes.push_var(name, id);
        self.locals.push(id);
        id
    }

    fn new_gvar(
        &mut self,
        name: String,
        ty: TypeId,
        is_static: bool,
        emit: bool,
    ) -> VarId {
        let id = self.vars.alloc(Var {
            name: name.clone(),
            ty,
            is_local: false,
            offset: 0,
            is_static,
            initializer: Vec::new(),
        });
        self.scopes.push_var(name, id);
        if emit {
            self.globals.push(id);
        }
        id
    }

    /// A fresh `.L.data.N` label for anonymous globals (string literals,
    /// static locals, compound literals).
    fn new_label(&mut self) -> String {
        let label = format!(".L.data.{}", self.label_count);
        self.label_count += 1;
        label
    }
}
