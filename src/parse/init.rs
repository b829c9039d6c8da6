//! Initializer lowering.
//!
//! Globals produce a flat fragment image: raw byte/scalar values plus
//! relocatable label references. Locals lower to a block of explicit
//! element-by-element assignments addressed through a designator chain.

use anyhow::Result;

use crate::ast::{AssignOp, InitFragment, Node, NodeKind, VarId};
use crate::lexer::TokenKind;
use crate::ty::{Member, TypeId, TypeKind};

use super::Parser;

/// Path from the variable under initialization down to the element
/// currently receiving a value. Links borrow up the call stack.
enum Desg<'d> {
    Root,
    Index(&'d Desg<'d>, i32),
    Member(&'d Desg<'d>, Member),
}

impl Parser<'_> {
    fn array_parts(&self, ty: TypeId) -> Option<(TypeId, i32, bool)> {
        let t = self.types.get(ty);
        match t.kind {
            TypeKind::Array { base, len } => Some((base, len, t.incomplete)),
            _ => None,
        }
    }

    /// Complete a previously open array in place.
    fn fix_array_len(&mut self, ty: TypeId, count: i32) {
        let base_size = self
            .array_parts(ty)
            .map(|(base, _, _)| self.types.get(base).size)
            .unwrap_or(0);
        let t = self.types.get_mut(ty);
        t.size = base_size * count;
        if let TypeKind::Array { len, .. } = &mut t.kind {
            *len = count;
        }
        t.incomplete = false;
    }

    // ------------------------------------------------------------------
    // globals

    pub(crate) fn gvar_initializer(
        &mut self,
        ty: TypeId,
    ) -> Result<Vec<InitFragment>> {
        let mut image = Vec::new();
        self.gvar_init(&mut image, ty)?;
        Ok(image)
    }

    fn push_zero_bytes(image: &mut Vec<InitFragment>, n: i32) {
        for _ in 0..n.max(0) {
            image.push(InitFragment::Val { size: 1, val: 0 });
        }
    }

    /// Zero image of a whole object. Scalar slots keep their natural
    /// fragment size; only alignment gaps degrade to single bytes.
    fn push_zero_object(&self, image: &mut Vec<InitFragment>, ty: TypeId) {
        match &self.types.get(ty).kind {
            TypeKind::Array { base, len } => {
                for _ in 0..*len {
                    self.push_zero_object(image, *base);
                }
            }
            TypeKind::Struct { members } => {
                let mut cursor = 0;
                for mem in members {
                    Self::push_zero_bytes(image, mem.offset - cursor);
                    self.push_zero_object(image, mem.ty);
                    cursor = mem.offset + self.types.get(mem.ty).size;
                }
                Self::push_zero_bytes(image, self.types.get(ty).size - cursor);
            }
            _ => image.push(InitFragment::Val {
                size: self.types.get(ty).size,
                val: 0,
            }),
        }
    }

    fn gvar_init(
        &mut self,
        image: &mut Vec<InitFragment>,
        ty: TypeId,
    ) -> Result<()> {
        if let Some((base, len, incomplete)) = self.array_parts(ty) {
            // "..." into a char array
            if matches!(self.types.get(base).kind, TypeKind::Char)
                && self.tok().kind == TokenKind::Str
            {
                let tok = self.pos;
                let contents = self.tokens[tok].contents.clone();
                self.pos += 1;
                let cont_len = contents.len() as i32;

                let arr_len = if incomplete {
                    self.fix_array_len(ty, cont_len);
                    cont_len
                } else {
                    len
                };

                let n = arr_len.min(cont_len);
                for &byte in &contents[..n as usize] {
                    image.push(InitFragment::Val {
                        size: 1,
                        val: byte as i64,
                    });
                }
                Self::push_zero_bytes(image, arr_len - n);
                return Ok(());
            }

            let open = self.consume("{").is_some();
            let mut count = 0;
            let limit = if incomplete { i32::MAX } else { len };

            if !self.peek("}") {
                loop {
                    self.gvar_init(image, base)?;
                    count += 1;
                    if !(count < limit
                        && !self.peek_end()
                        && self.consume(",").is_some())
                    {
                        break;
                    }
                }
            }
            if open && !self.consume_end() {
                self.skip_excess_elements()?;
            }

            for _ in count..len {
                self.push_zero_object(image, base);
            }

            if incomplete {
                self.fix_array_len(ty, count);
            }
            return Ok(());
        }

        if let TypeKind::Struct { members } = &self.types.get(ty).kind {
            let members = members.clone();
            let struct_size = self.types.get(ty).size;
            let open = self.consume("{").is_some();
            let mut idx = 0;

            if !members.is_empty() && !self.peek("}") {
                loop {
                    let mem = &members[idx];
                    self.gvar_init(image, mem.ty)?;

                    // alignment padding up to the next member or the tail
                    let start = mem.offset + self.types.get(mem.ty).size;
                    let end = members
                        .get(idx + 1)
                        .map(|next| next.offset)
                        .unwrap_or(struct_size);
                    Self::push_zero_bytes(image, end - start);

                    idx += 1;
                    if !(idx < members.len()
                        && !self.peek_end()
                        && self.consume(",").is_some())
                    {
                        break;
                    }
                }
            }
            if open && !self.consume_end() {
                self.skip_excess_elements()?;
            }

            // remaining members are zeros, alignment gaps included
            let mut cursor = members
                .get(idx)
                .map(|m| m.offset)
                .unwrap_or(struct_size);
            for mem in &members[idx..] {
                Self::push_zero_bytes(image, mem.offset - cursor);
                self.push_zero_object(image, mem.ty);
                cursor = mem.offset + self.types.get(mem.ty).size;
            }
            Self::push_zero_bytes(image, struct_size - cursor);
            return Ok(());
        }

        // scalar: a constant, optionally the address of a global plus a
        // scaled addend
        let open = self.consume("{").is_some();
        let value = self.conditional()?;
        if open {
            self.expect_end()?;
        }

        let (addend, referenced) = self.eval_addr(&value)?;
        if let Some(var) = referenced {
            let referenced_ty = self.vars.get(var).ty;
            let scale = match self.types.get(referenced_ty).kind {
                TypeKind::Array { base, .. } => self.types.get(base).size,
                _ => self.types.get(referenced_ty).size,
            };
            image.push(InitFragment::Label {
                name: self.vars.get(var).name.clone(),
                addend: addend * scale as i64,
            });
        } else {
            image.push(InitFragment::Val {
                size: self.types.get(ty).size,
                val: addend,
            });
        }
        Ok(())
    }

    fn skip_excess_elements(&mut self) -> Result<()> {
        self.expect(",")?;
        self.warn_tok(self.pos, "excess elements in initializer");
        self.skip_excess_rest()
    }

    fn skip_excess_rest(&mut self) -> Result<()> {
        loop {
            if self.consume("{").is_some() {
                self.skip_excess_rest()?;
            } else {
                self.assign()?;
            }
            if self.consume_end() {
                return Ok(());
            }
            self.expect(",")?;
        }
    }

    // ------------------------------------------------------------------
    // locals

    /// Lower a local initializer to a block of assignment statements, one
    /// per element, missing elements zeroed.
    pub(crate) fn lvar_initializer(
        &mut self,
        var: VarId,
        tok: usize,
    ) -> Result<Node> {
        let ty = self.vars.get(var).ty;
        let mut stmts = Vec::new();
        self.lvar_init(&mut stmts, var, ty, &Desg::Root)?;
        Ok(Node::new(NodeKind::Block(stmts), tok))
    }

    /// Build the lvalue a designator chain describes: `Deref(base + idx)`
    /// for array steps, `Member` for struct steps.
    fn desg_lvalue(
        &mut self,
        var: VarId,
        desg: &Desg,
        tok: usize,
    ) -> Result<Node> {
        match desg {
            Desg::Root => Ok(Node::var(var, tok)),
            Desg::Member(parent, member) => {
                let base = self.desg_lvalue(var, parent, tok)?;
                Ok(Node::new(
                    NodeKind::Member {
                        base: Box::new(base),
                        member: member.clone(),
                    },
                    member.tok,
                ))
            }
            Desg::Index(parent, idx) => {
                let base = self.desg_lvalue(var, parent, tok)?;
                let sum =
                    self.new_add(base, Node::num(*idx as i64, tok), tok)?;
                Ok(Node::new(NodeKind::Deref(Box::new(sum)), tok))
            }
        }
    }

    fn desg_assign(
        &mut self,
        var: VarId,
        desg: &Desg,
        rhs: Node,
    ) -> Result<Node> {
        let tok = rhs.tok;
        let lhs = self.desg_lvalue(var, desg, tok)?;
        let assign = Node::assign(AssignOp::Plain, lhs, rhs, tok);
        Ok(Node::new(NodeKind::ExprStmt(Box::new(assign)), tok))
    }

    fn lvar_init_zero(
        &mut self,
        stmts: &mut Vec<Node>,
        var: VarId,
        ty: TypeId,
        desg: &Desg,
    ) -> Result<()> {
        if let Some((base, len, _)) = self.array_parts(ty) {
            for i in 0..len {
                let elem = Desg::Index(desg, i);
                self.lvar_init_zero(stmts, var, base, &elem)?;
            }
            return Ok(());
        }

        if let TypeKind::Struct { members } = &self.types.get(ty).kind {
            let members = members.clone();
            for mem in members {
                let ty = mem.ty;
                let field = Desg::Member(desg, mem);
                self.lvar_init_zero(stmts, var, ty, &field)?;
            }
            return Ok(());
        }

        let zero = Node::num(0, self.pos);
        let stmt = self.desg_assign(var, desg, zero)?;
        stmts.push(stmt);
        Ok(())
    }

    fn lvar_init(
        &mut self,
        stmts: &mut Vec<Node>,
        var: VarId,
        ty: TypeId,
        desg: &Desg,
    ) -> Result<()> {
        if let Some((base, len, incomplete)) = self.array_parts(ty) {
            // "..." into a char array: one assignment per byte
            if matches!(self.types.get(base).kind, TypeKind::Char)
                && self.tok().kind == TokenKind::Str
            {
                let tok = self.pos;
                let contents = self.tokens[tok].contents.clone();
                self.pos += 1;
                let cont_len = contents.len() as i32;

                let arr_len = if incomplete {
                    self.fix_array_len(ty, cont_len);
                    cont_len
                } else {
                    len
                };

                let n = arr_len.min(cont_len);
                for i in 0..n {
                    let elem = Desg::Index(desg, i);
                    let rhs =
                        Node::num(contents[i as usize] as i64, tok);
                    let stmt = self.desg_assign(var, &elem, rhs)?;
                    stmts.push(stmt);
                }
                for i in n..arr_len {
                    let elem = Desg::Index(desg, i);
                    self.lvar_init_zero(stmts, var, base, &elem)?;
                }
                return Ok(());
            }

            let open = self.consume("{").is_some();
            let mut count = 0;
            let limit = if incomplete { i32::MAX } else { len };

            if !self.peek("}") {
                loop {
                    let elem = Desg::Index(desg, count);
                    self.lvar_init(stmts, var, base, &elem)?;
                    count += 1;
                    if !(count < limit
                        && !self.peek_end()
                        && self.consume(",").is_some())
                    {
                        break;
                    }
                }
            }
            if open && !self.consume_end() {
                self.skip_excess_elements()?;
            }

            for i in count..len {
                let elem = Desg::Index(desg, i);
                self.lvar_init_zero(stmts, var, base, &elem)?;
            }

            if incomplete {
                self.fix_array_len(ty, count);
            }
            return Ok(());
        }

        if let TypeKind::Struct { members } = &self.types.get(ty).kind {
            let members = members.clone();
            let open = self.consume("{").is_some();
            let mut idx = 0;

            if !members.is_empty() && !self.peek("}") {
                loop {
                    let field = Desg::Member(desg, members[idx].clone());
                    self.lvar_init(stmts, var, members[idx].ty, &field)?;
                    idx += 1;
                    if !(idx < members.len()
                        && !self.peek_end()
                        && self.consume(",").is_some())
                    {
                        break;
                    }
                }
            }
            if open && !self.consume_end() {
                self.skip_excess_elements()?;
            }

            for mem in &members[idx..] {
                let field = Desg::Member(desg, mem.clone());
                self.lvar_init_zero(stmts, var, mem.ty, &field)?;
            }
            return Ok(());
        }

        let open = self.consume("{").is_some();
        let rhs = self.assign()?;
        let stmt = self.desg_assign(var, desg, rhs)?;
        stmts.push(stmt);
        if open {
            self.expect_end()?;
        }
        Ok(())
    }
}
