//! Post-order type annotator.
//!
//! Visits children first, then assigns a type to any expression node that
//! does not already carry one. Types set during parsing (casts, number
//! literals, resolved calls) are kept as-is.

use anyhow::Result;

use crate::ast::{BinOp, Node, NodeKind};
use crate::parse::Parser;
use crate::ty::{TypeKind, Types};

impl Parser<'_> {
    pub(crate) fn add_type(&mut self, node: &mut Node) -> Result<()> {
        match &mut node.kind {
            NodeKind::Binary { lhs, rhs, .. }
            | NodeKind::Assign { lhs, rhs, .. }
            | NodeKind::Comma { lhs, rhs } => {
                self.add_type(lhs)?;
                self.add_type(rhs)?;
            }
            NodeKind::Not(operand)
            | NodeKind::BitNot(operand)
            | NodeKind::PreInc(operand)
            | NodeKind::PreDec(operand)
            | NodeKind::PostInc(operand)
            | NodeKind::PostDec(operand)
            | NodeKind::Addr(operand)
            | NodeKind::Deref(operand)
            | NodeKind::Cast(operand)
            | NodeKind::ExprStmt(operand) => self.add_type(operand)?,
            NodeKind::Member { base, .. } => self.add_type(base)?,
            NodeKind::Funcall { args, .. } => {
                for arg in args {
                    self.add_type(arg)?;
                }
            }
            NodeKind::Ternary { cond, then, els } => {
                self.add_type(cond)?;
                self.add_type(then)?;
                self.add_type(els)?;
            }
            NodeKind::StmtExpr(body) | NodeKind::Block(body) => {
                for stmt in body {
                    self.add_type(stmt)?;
                }
            }
            NodeKind::Return(value) => {
                if let Some(value) = value {
                    self.add_type(value)?;
                }
            }
            NodeKind::If { cond, then, els } => {
                self.add_type(cond)?;
                self.add_type(then)?;
                if let Some(els) = els {
                    self.add_type(els)?;
                }
            }
            NodeKind::While { cond, then } => {
                self.add_type(cond)?;
                self.add_type(then)?;
            }
            NodeKind::For {
                init,
                cond,
                inc,
                then,
            } => {
                if let Some(init) = init {
                    self.add_type(init)?;
                }
                if let Some(cond) = cond {
                    self.add_type(cond)?;
                }
                if let Some(inc) = inc {
                    self.add_type(inc)?;
                }
                self.add_type(then)?;
            }
            NodeKind::Switch { cond, then, .. } => {
                self.add_type(cond)?;
                self.add_type(then)?;
            }
            NodeKind::Case { body, .. } | NodeKind::Label { body, .. } => {
                self.add_type(body)?;
            }
            NodeKind::Var { init, .. } => {
                if let Some(init) = init {
                    self.add_type(init)?;
                }
            }
            NodeKind::Num(_)
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Goto(_)
            | NodeKind::Null => {}
        }

        if node.ty.is_some() {
            return Ok(());
        }

        node.ty = match &node.kind {
            NodeKind::Num(_) => Some(Types::INT),
            NodeKind::Var { var, .. } => Some(self.vars.get(*var).ty),
            NodeKind::Binary { op, lhs, rhs } => Some(match op {
                BinOp::Add
                | BinOp::Sub
                | BinOp::Mul
                | BinOp::Div
                | BinOp::BitAnd
                | BinOp::BitOr
                | BinOp::BitXor
                | BinOp::Shl
                | BinOp::Shr => {
                    // 64-bit operands widen the result to long; otherwise
                    // the left operand decides.
                    let wide = [lhs.ty, rhs.ty]
                        .iter()
                        .flatten()
                        .any(|&t| self.types.size_of(t) == 8);
                    if wide {
                        Types::LONG
                    } else {
                        lhs.ty.unwrap_or(Types::INT)
                    }
                }
                BinOp::PtrAdd | BinOp::PtrSub => {
                    lhs.ty.unwrap_or(Types::INT)
                }
                BinOp::PtrDiff
                | BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Le
                | BinOp::LogAnd
                | BinOp::LogOr => Types::INT,
            }),
            NodeKind::Assign { lhs, .. } => lhs.ty,
            NodeKind::Not(_) => Some(Types::INT),
            NodeKind::BitNot(operand)
            | NodeKind::PreInc(operand)
            | NodeKind::PreDec(operand)
            | NodeKind::PostInc(operand)
            | NodeKind::PostDec(operand) => operand.ty,
            NodeKind::Addr(operand) => {
                // The address of an array is a pointer to its element, not
                // to the array.
                let pointee = match operand.ty {
                    Some(t) => match self.types.get(t).kind {
                        TypeKind::Array { base, .. } => base,
                        _ => t,
                    },
                    None => Types::INT,
                };
                Some(self.types.pointer_to(pointee))
            }
            NodeKind::Deref(operand) => {
                let Some(base) =
                    operand.ty.and_then(|t| self.types.base_of(t))
                else {
                    return Err(self
                        .err_tok(node.tok, "invalid pointer dereference"));
                };
                if matches!(self.types.get(base).kind, TypeKind::Void) {
                    return Err(self
                        .err_tok(node.tok, "dereferencing a void pointer"));
                }
                Some(base)
            }
            NodeKind::Member { member, .. } => Some(member.ty),
            NodeKind::Funcall { .. } => Some(Types::INT),
            NodeKind::Comma { rhs, .. } => rhs.ty,
            NodeKind::Ternary { then, .. } => then.ty,
            NodeKind::StmtExpr(body) => {
                match body.last().and_then(|last| last.ty) {
                    Some(ty) => Some(ty),
                    None => {
                        return Err(self.err_tok(
                            node.tok,
                            "stmt expr returning void is not supported",
                        ))
                    }
                }
            }
            NodeKind::Cast(_)
            | NodeKind::ExprStmt(_)
            | NodeKind::Return(_)
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::For { .. }
            | NodeKind::Switch { .. }
            | NodeKind::Case { .. }
            | NodeKind::Block(_)
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Goto(_)
            | NodeKind::Label { .. }
            | NodeKind::Null => None,
        };
        Ok(())
    }
}
