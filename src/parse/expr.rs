//! Expression parsing: the precedence ladder, postfix forms and primaries.

use anyhow::Result;

use crate::ast::{AssignOp, BinOp, InitFragment, Node, NodeKind};
use crate::lexer::TokenKind;
use crate::ty::{TypeKind, Types};

use super::{Parser, VarScopeKind};

impl Parser<'_> {
    /// expr := assign (',' assign)*
    ///
    /// The left side of a comma is demoted to an effect-only statement.
    pub(crate) fn expr(&mut self) -> Result<Node> {
        let mut node = self.assign()?;
        while let Some(tok) = self.consume(",") {
            let lhs_tok = node.tok;
            let lhs = Node::new(NodeKind::ExprStmt(Box::new(node)), lhs_tok);
            let rhs = self.assign()?;
            node = Node::new(
                NodeKind::Comma {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                tok,
            );
        }
        Ok(node)
    }

    /// assign := conditional (assign-op assign)?
    ///
    /// `+=` and `-=` pick the pointer-flavored node when the left side has a
    /// base type.
    pub(crate) fn assign(&mut self) -> Result<Node> {
        let node = self.conditional()?;

        if let Some(tok) = self.consume("=") {
            let rhs = self.assign()?;
            return Ok(Node::assign(AssignOp::Plain, node, rhs, tok));
        }

        const SIMPLE: &[(&str, AssignOp)] = &[
            ("*=", AssignOp::Mul),
            ("/=", AssignOp::Div),
            ("<<=", AssignOp::Shl),
            (">>=", AssignOp::Shr),
            ("&=", AssignOp::BitAnd),
            ("|=", AssignOp::BitOr),
            ("^=", AssignOp::BitXor),
        ];
        let found = SIMPLE
            .iter()
            .find_map(|&(text, op)| self.consume(text).map(|tok| (op, tok)));
        if let Some((op, tok)) = found {
            let rhs = self.assign()?;
            return Ok(Node::assign(op, node, rhs, tok));
        }

        if let Some(tok) = self.consume("+=") {
            let mut node = node;
            self.add_type(&mut node)?;
            let op = if node.ty.and_then(|t| self.types.base_of(t)).is_some() {
                AssignOp::PtrAdd
            } else {
                AssignOp::Add
            };
            let rhs = self.assign()?;
            return Ok(Node::assign(op, node, rhs, tok));
        }

        if let Some(tok) = self.consume("-=") {
            let mut node = node;
            self.add_type(&mut node)?;
            let op = if node.ty.and_then(|t| self.types.base_of(t)).is_some() {
                AssignOp::PtrSub
            } else {
                AssignOp::Sub
            };
            let rhs = self.assign()?;
            return Ok(Node::assign(op, node, rhs, tok));
        }

        Ok(node)
    }

    /// conditional := logor ('?' expr ':' conditional)?
    pub(crate) fn conditional(&mut self) -> Result<Node> {
        let node = self.logor()?;
        let Some(tok) = self.consume("?") else {
            return Ok(node);
        };
        let then = self.expr()?;
        self.expect(":")?;
        let els = self.conditional()?;
        Ok(Node::new(
            NodeKind::Ternary {
                cond: Box::new(node),
                then: Box::new(then),
                els: Box::new(els),
            },
            tok,
        ))
    }

    fn logor(&mut self) -> Result<Node> {
        let mut node = self.logand()?;
        while let Some(tok) = self.consume("||") {
            let rhs = self.logand()?;
            node = Node::binary(BinOp::LogOr, node, rhs, tok);
        }
        Ok(node)
    }

    fn logand(&mut self) -> Result<Node> {
        let mut node = self.bitor()?;
        while let Some(tok) = self.consume("&&") {
            let rhs = self.bitor()?;
            node = Node::binary(BinOp::LogAnd, node, rhs, tok);
        }
        Ok(node)
    }

    fn bitor(&mut self) -> Result<Node> {
        let mut node = self.bitxor()?;
        while let Some(tok) = self.consume("|") {
            let rhs = self.bitxor()?;
            node = Node::binary(BinOp::BitOr, node, rhs, tok);
        }
        Ok(node)
    }

    fn bitxor(&mut self) -> Result<Node> {
        let mut node = self.bitand()?;
        while let Some(tok) = self.consume("^") {
            let rhs = self.bitand()?;
            node = Node::binary(BinOp::BitXor, node, rhs, tok);
        }
        Ok(node)
    }

    fn bitand(&mut self) -> Result<Node> {
        let mut node = self.equality()?;
        while let Some(tok) = self.consume("&") {
            let rhs = self.equality()?;
            node = Node::binary(BinOp::BitAnd, node, rhs, tok);
        }
        Ok(node)
    }

    fn equality(&mut self) -> Result<Node> {
        let mut node = self.relational()?;
        loop {
            if let Some(tok) = self.consume("==") {
                let rhs = self.relational()?;
                node = Node::binary(BinOp::Eq, node, rhs, tok);
            } else if let Some(tok) = self.consume("!=") {
                let rhs = self.relational()?;
                node = Node::binary(BinOp::Ne, node, rhs, tok);
            } else {
                return Ok(node);
            }
        }
    }

    /// relational := shift (('<' | '<=' | '>' | '>=') shift)*
    ///
    /// Only `Lt`/`Le` exist downstream; `>` and `>=` swap their operands.
    fn relational(&mut self) -> Result<Node> {
        let mut node = self.shift()?;
        loop {
            if let Some(tok) = self.consume("<") {
                let rhs = self.shift()?;
                node = Node::binary(BinOp::Lt, node, rhs, tok);
            } else if let Some(tok) = self.consume("<=") {
                let rhs = self.shift()?;
                node = Node::binary(BinOp::Le, node, rhs, tok);
            } else if let Some(tok) = self.consume(">") {
                let lhs = self.shift()?;
                node = Node::binary(BinOp::Lt, lhs, node, tok);
            } else if let Some(tok) = self.consume(">=") {
                let lhs = self.shift()?;
                node = Node::binary(BinOp::Le, lhs, node, tok);
            } else {
                return Ok(node);
            }
        }
    }

    fn shift(&mut self) -> Result<Node> {
        let mut node = self.add()?;
        loop {
            if let Some(tok) = self.consume("<<") {
                let rhs = self.add()?;
                node = Node::binary(BinOp::Shl, node, rhs, tok);
            } else if let Some(tok) = self.consume(">>") {
                let rhs = self.add()?;
                node = Node::binary(BinOp::Shr, node, rhs, tok);
            } else {
                return Ok(node);
            }
        }
    }

    /// Type-directed `+`: integer addition, or pointer stepping with the
    /// pointer normalized to the left.
    pub(crate) fn new_add(
        &mut self,
        mut lhs: Node,
        mut rhs: Node,
        tok: usize,
    ) -> Result<Node> {
        self.add_type(&mut lhs)?;
        self.add_type(&mut rhs)?;

        let l_int = lhs.ty.is_some_and(|t| self.types.is_integer(t));
        let r_int = rhs.ty.is_some_and(|t| self.types.is_integer(t));
        let l_ptr = lhs.ty.and_then(|t| self.types.base_of(t)).is_some();
        let r_ptr = rhs.ty.and_then(|t| self.types.base_of(t)).is_some();

        if l_int && r_int {
            Ok(Node::binary(BinOp::Add, lhs, rhs, tok))
        } else if l_ptr && r_int {
            Ok(Node::binary(BinOp::PtrAdd, lhs, rhs, tok))
        } else if l_int && r_ptr {
            Ok(Node::binary(BinOp::PtrAdd, rhs, lhs, tok))
        } else {
            Err(self.err_tok(tok, "invalid operands"))
        }
    }

    fn new_sub(&mut self, mut lhs: Node, mut rhs: Node, tok: usize) -> Result<Node> {
        self.add_type(&mut lhs)?;
        self.add_type(&mut rhs)?;

        let l_int = lhs.ty.is_some_and(|t| self.types.is_integer(t));
        let r_int = rhs.ty.is_some_and(|t| self.types.is_integer(t));
        let l_ptr = lhs.ty.and_then(|t| self.types.base_of(t)).is_some();
        let r_ptr = rhs.ty.and_then(|t| self.types.base_of(t)).is_some();

        if l_int && r_int {
            Ok(Node::binary(BinOp::Sub, lhs, rhs, tok))
        } else if l_ptr && r_int {
            Ok(Node::binary(BinOp::PtrSub, lhs, rhs, tok))
        } else if l_ptr && r_ptr {
            Ok(Node::binary(BinOp::PtrDiff, lhs, rhs, tok))
        } else {
            Err(self.err_tok(tok, "invalid operands"))
        }
    }

    fn add(&mut self) -> Result<Node> {
        let mut node = self.mul()?;
        loop {
            if let Some(tok) = self.consume("+") {
                let rhs = self.mul()?;
                node = self.new_add(node, rhs, tok)?;
            } else if let Some(tok) = self.consume("-") {
                let rhs = self.mul()?;
                node = self.new_sub(node, rhs, tok)?;
            } else {
                return Ok(node);
            }
        }
    }

    fn mul(&mut self) -> Result<Node> {
        let mut node = self.cast()?;
        loop {
            if let Some(tok) = self.consume("*") {
                let rhs = self.cast()?;
                node = Node::binary(BinOp::Mul, node, rhs, tok);
            } else if let Some(tok) = self.consume("/") {
                let rhs = self.cast()?;
                node = Node::binary(BinOp::Div, node, rhs, tok);
            } else {
                return Ok(node);
            }
        }
    }

    /// cast := '(' type-name ')' cast | unary
    ///
    /// One-token look-ahead for `{` keeps compound literals out of the cast
    /// production.
    fn cast(&mut self) -> Result<Node> {
        let save = self.pos;
        if let Some(tok) = self.consume("(") {
            if self.is_typename() {
                let ty = self.type_name()?;
                self.expect(")")?;
                if !self.peek("{") {
                    let mut inner = self.cast()?;
                    self.add_type(&mut inner)?;
                    let mut node =
                        Node::new(NodeKind::Cast(Box::new(inner)), tok);
                    node.ty = Some(ty);
                    return Ok(node);
                }
            }
            self.pos = save;
        }
        self.unary()
    }

    /// unary := ('+' | '-' | '&' | '*' | '!' | '~') cast
    ///        | ('++' | '--') unary
    ///        | postfix
    fn unary(&mut self) -> Result<Node> {
        if self.consume("+").is_some() {
            return self.cast();
        }
        if let Some(tok) = self.consume("-") {
            let rhs = self.cast()?;
            return Ok(Node::binary(BinOp::Sub, Node::num(0, tok), rhs, tok));
        }
        if let Some(tok) = self.consume("&") {
            let operand = self.cast()?;
            return Ok(Node::new(NodeKind::Addr(Box::new(operand)), tok));
        }
        if let Some(tok) = self.consume("*") {
            let operand = self.cast()?;
            return Ok(Node::new(NodeKind::Deref(Box::new(operand)), tok));
        }
        if let Some(tok) = self.consume("!") {
            let operand = self.cast()?;
            return Ok(Node::new(NodeKind::Not(Box::new(operand)), tok));
        }
        if let Some(tok) = self.consume("~") {
            let operand = self.cast()?;
            return Ok(Node::new(NodeKind::BitNot(Box::new(operand)), tok));
        }
        if let Some(tok) = self.consume("++") {
            let operand = self.unary()?;
            return Ok(Node::new(NodeKind::PreInc(Box::new(operand)), tok));
        }
        if let Some(tok) = self.consume("--") {
            let operand = self.unary()?;
            return Ok(Node::new(NodeKind::PreDec(Box::new(operand)), tok));
        }
        self.postfix()
    }

    /// postfix := compound-literal
    ///          | primary ('[' expr ']' | '.' ident | '->' ident | '++'
    ///          | '--')*
    fn postfix(&mut self) -> Result<Node> {
        if let Some(node) = self.compound_literal()? {
            return Ok(node);
        }

        let mut node = self.primary()?;
        loop {
            if let Some(tok) = self.consume("[") {
                // a[i] is *(a + i)
                let idx = self.expr()?;
                self.expect("]")?;
                let sum = self.new_add(node, idx, tok)?;
                node = Node::new(NodeKind::Deref(Box::new(sum)), tok);
                continue;
            }

            if self.consume(".").is_some() {
                node = self.struct_ref(node)?;
                continue;
            }

            if let Some(tok) = self.consume("->") {
                // a->m is (*a).m
                node = Node::new(NodeKind::Deref(Box::new(node)), tok);
                node = self.struct_ref(node)?;
                continue;
            }

            if let Some(tok) = self.consume("++") {
                node = Node::new(NodeKind::PostInc(Box::new(node)), tok);
                continue;
            }

            if let Some(tok) = self.consume("--") {
                node = Node::new(NodeKind::PostDec(Box::new(node)), tok);
                continue;
            }

            return Ok(node);
        }
    }

    fn struct_ref(&mut self, mut lhs: Node) -> Result<Node> {
        self.add_type(&mut lhs)?;

        let Some(lty) = lhs.ty.filter(|&t| {
            matches!(self.types.get(t).kind, TypeKind::Struct { .. })
        }) else {
            return Err(self.err_tok(lhs.tok, "not a struct"));
        };

        let (name, name_tok) = self.expect_ident()?;
        let member = match &self.types.get(lty).kind {
            TypeKind::Struct { members } => {
                members.iter().find(|m| m.name == name).cloned()
            }
            _ => None,
        }
        .ok_or_else(|| self.err_tok(name_tok, "no such member"))?;

        Ok(Node::new(
            NodeKind::Member {
                base: Box::new(lhs),
                member,
            },
            name_tok,
        ))
    }

    /// compound-literal := '(' type-name ')' '{' initializer '}'
    ///
    /// At file scope this creates an emitted anonymous global; at block
    /// scope an anonymous local whose initializer block is attached to the
    /// resulting variable reference.
    fn compound_literal(&mut self) -> Result<Option<Node>> {
        let save = self.pos;
        if self.consume("(").is_none() || !self.is_typename() {
            self.pos = save;
            return Ok(None);
        }

        let ty = self.type_name()?;
        self.expect(")")?;
        if !self.peek("{") {
            self.pos = save;
            return Ok(None);
        }

        if self.scopes.depth() == 0 {
            let label = self.new_label();
            let var = self.new_gvar(label, ty, true, true);
            let image = self.gvar_initializer(ty)?;
            self.vars.get_mut(var).initializer = image;
            return Ok(Some(Node::var(var, save)));
        }

        let label = self.new_label();
        let var = self.new_lvar(label, ty);
        let init = self.lvar_initializer(var, save)?;
        let mut node = Node::var(var, save);
        if let NodeKind::Var { init: slot, .. } = &mut node.kind {
            *slot = Some(Box::new(init));
        }
        Ok(Some(node))
    }

    /// GNU statement expression `({ stmt+ })`; the trailing statement must
    /// be an expression statement, which provides the value.
    fn stmt_expr(&mut self, tok: usize) -> Result<Node> {
        let snapshot = self.scopes.enter();

        let mut body = vec![self.stmt()?];
        while self.consume("}").is_none() {
            body.push(self.stmt()?);
        }
        self.expect(")")?;

        self.scopes.leave(snapshot);

        match body.pop() {
            Some(Node {
                kind: NodeKind::ExprStmt(inner),
                ..
            }) => body.push(*inner),
            Some(last) => {
                return Err(self.err_tok(
                    last.tok,
                    "stmt expr returning void is not supported",
                ))
            }
            None => {
                return Err(self.err_tok(
                    tok,
                    "stmt expr returning void is not supported",
                ))
            }
        }
        Ok(Node::new(NodeKind::StmtExpr(body), tok))
    }

    fn func_args(&mut self) -> Result<Vec<Node>> {
        if self.consume(")").is_some() {
            return Ok(Vec::new());
        }
        let mut args = vec![self.assign()?];
        while self.consume(",").is_some() {
            args.push(self.assign()?);
        }
        self.expect(")")?;
        Ok(args)
    }

    /// primary := '(' '{' stmt-expr | '(' expr ')' | "sizeof" ... |
    /// "_Alignof" ... | ident | str | num
    fn primary(&mut self) -> Result<Node> {
        if let Some(tok) = self.consume("(") {
            if self.consume("{").is_some() {
                return self.stmt_expr(tok);
            }
            let node = self.expr()?;
            self.expect(")")?;
            return Ok(node);
        }

        if let Some(tok) = self.consume("sizeof") {
            if self.consume("(").is_some() {
                if self.is_typename() {
                    let ty = self.type_name()?;
                    self.expect(")")?;
                    return Ok(Node::num(self.types.size_of(ty) as i64, tok));
                }
                // Not a type name after all; re-read the parenthesis as the
                // start of the operand.
                self.pos = tok + 1;
            }
            let mut node = self.unary()?;
            self.add_type(&mut node)?;
            let size = node.ty.map(|t| self.types.size_of(t)).unwrap_or(0);
            return Ok(Node::num(size as i64, tok));
        }

        if let Some(tok) = self.consume("_Alignof") {
            self.expect("(")?;
            let ty = self.type_name()?;
            self.expect(")")?;
            return Ok(Node::num(self.types.get(ty).align as i64, tok));
        }

        if let Some((name, tok)) = self.consume_ident() {
            if self.consume("(").is_some() {
                let args = self.func_args()?;
                let mut node = Node::new(
                    NodeKind::Funcall {
                        name: name.clone(),
                        args,
                    },
                    tok,
                );

                match self.scopes.find_var(&name) {
                    Some(VarScopeKind::Var(var)) => {
                        let var_ty = self.vars.get(var).ty;
                        match self.types.get(var_ty).kind {
                            TypeKind::Func { return_ty } => {
                                node.ty = Some(return_ty)
                            }
                            _ => {
                                return Err(
                                    self.err_tok(tok, "not a function")
                                )
                            }
                        }
                    }
                    Some(_) => return Err(self.err_tok(tok, "not a function")),
                    None => {
                        self.warn_tok(
                            tok,
                            "implicit declaration of a function",
                        );
                        node.ty = Some(Types::INT);
                    }
                }
                self.add_type(&mut node)?;
                return Ok(node);
            }

            return match self.scopes.find_var(&name) {
                Some(VarScopeKind::Var(var)) => Ok(Node::var(var, tok)),
                Some(VarScopeKind::EnumConst { val, .. }) => {
                    Ok(Node::num(val, tok))
                }
                _ => Err(self.err_tok(tok, "undefined variable")),
            };
        }

        let tok = self.pos;
        let token = self.tok();

        if token.kind == TokenKind::Str {
            // A string literal is an anonymous char array global.
            let contents = token.contents.clone();
            self.pos += 1;
            let ty = self.types.array_of(Types::CHAR, contents.len() as i32);
            let label = self.new_label();
            let var = self.new_gvar(label, ty, true, true);
            self.vars.get_mut(var).initializer = contents
                .iter()
                .map(|&b| InitFragment::Val {
                    size: 1,
                    val: b as i64,
                })
                .collect();
            return Ok(Node::var(var, tok));
        }

        if token.kind != TokenKind::Num {
            return Err(self.err_tok(tok, "expected expression"));
        }
        let (val, lit_ty) = (token.val, token.ty);
        self.pos += 1;
        let mut node = Node::num(val, tok);
        node.ty = lit_ty;
        Ok(node)
    }
}
