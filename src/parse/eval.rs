//! Constant-expression evaluation.
//!
//! `eval` folds pure integer expressions. `eval_addr` additionally accepts
//! address-of-global and array-valued-global leaves when a global
//! initializer is being evaluated; at most one such leaf may appear.

use anyhow::Result;

use crate::ast::{BinOp, Node, NodeKind, VarId};
use crate::ty::TypeKind;

use super::Parser;

impl Parser<'_> {
    /// const-expr := conditional, folded immediately.
    pub(crate) fn const_expr(&mut self) -> Result<i64> {
        let node = self.conditional()?;
        self.eval(&node)
    }

    pub(crate) fn eval(&self, node: &Node) -> Result<i64> {
        let mut var = None;
        self.eval_full(node, &mut var, false)
    }

    /// Evaluate a global-initializer expression. The result is the integer
    /// component plus, optionally, the one global whose address it is
    /// relative to.
    pub(crate) fn eval_addr(
        &self,
        node: &Node,
    ) -> Result<(i64, Option<VarId>)> {
        let mut var = None;
        let val = self.eval_full(node, &mut var, true)?;
        Ok((val, var))
    }

    fn eval_full(
        &self,
        node: &Node,
        var: &mut Option<VarId>,
        addr_ok: bool,
    ) -> Result<i64> {
        match &node.kind {
            NodeKind::Binary { op, lhs, rhs } => match op {
                BinOp::Add => {
                    Ok(self.eval(lhs)?.wrapping_add(self.eval(rhs)?))
                }
                BinOp::PtrAdd => Ok(self
                    .eval_full(lhs, var, addr_ok)?
                    .wrapping_add(self.eval(rhs)?)),
                BinOp::Sub => {
                    Ok(self.eval(lhs)?.wrapping_sub(self.eval(rhs)?))
                }
                BinOp::PtrSub => Ok(self
                    .eval_full(lhs, var, addr_ok)?
                    .wrapping_sub(self.eval(rhs)?)),
                BinOp::PtrDiff => Ok(self
                    .eval_full(lhs, var, addr_ok)?
                    .wrapping_sub(self.eval_full(rhs, var, addr_ok)?)),
                BinOp::Mul => {
                    Ok(self.eval(lhs)?.wrapping_mul(self.eval(rhs)?))
                }
                BinOp::Div => {
                    let divisor = self.eval(rhs)?;
                    if divisor == 0 {
                        return Err(
                            self.err_tok(node.tok, "division by zero")
                        );
                    }
                    Ok(self.eval(lhs)?.wrapping_div(divisor))
                }
                BinOp::BitAnd => Ok(self.eval(lhs)? & self.eval(rhs)?),
                BinOp::BitOr => Ok(self.eval(lhs)? | self.eval(rhs)?),
                BinOp::BitXor => Ok(self.eval(lhs)? ^ self.eval(rhs)?),
                BinOp::Shl => Ok(self
                    .eval(lhs)?
                    .wrapping_shl(self.eval(rhs)? as u32)),
                BinOp::Shr => Ok(self
                    .eval(lhs)?
                    .wrapping_shr(self.eval(rhs)? as u32)),
                BinOp::Eq => Ok((self.eval(lhs)? == self.eval(rhs)?) as i64),
                BinOp::Ne => Ok((self.eval(lhs)? != self.eval(rhs)?) as i64),
                BinOp::Lt => Ok((self.eval(lhs)? < self.eval(rhs)?) as i64),
                BinOp::Le => Ok((self.eval(lhs)? <= self.eval(rhs)?) as i64),
                BinOp::LogAnd => Ok((self.eval(lhs)? != 0
                    && self.eval(rhs)? != 0)
                    as i64),
                BinOp::LogOr => Ok((self.eval(lhs)? != 0
                    || self.eval(rhs)? != 0)
                    as i64),
            },
            NodeKind::Ternary { cond, then, els } => {
                if self.eval(cond)? != 0 {
                    self.eval(then)
                } else {
                    self.eval(els)
                }
            }
            NodeKind::Comma { rhs, .. } => self.eval(rhs),
            NodeKind::Not(operand) => Ok((self.eval(operand)? == 0) as i64),
            NodeKind::BitNot(operand) => Ok(!self.eval(operand)?),
            NodeKind::Num(val) => Ok(*val),
            NodeKind::Addr(operand) => {
                if addr_ok && var.is_none() {
                    if let NodeKind::Var { var: id, .. } = &operand.kind {
                        if !self.vars.get(*id).is_local {
                            *var = Some(*id);
                            return Ok(0);
                        }
                    }
                }
                Err(self.err_tok(node.tok, "invalid initializer"))
            }
            NodeKind::Var { var: id, .. } => {
                let is_array = matches!(
                    self.types.get(self.vars.get(*id).ty).kind,
                    TypeKind::Array { .. }
                );
                if addr_ok && var.is_none() && is_array {
                    *var = Some(*id);
                    return Ok(0);
                }
                Err(self.err_tok(node.tok, "invalid initializer"))
            }
            _ => Err(self.err_tok(node.tok, "not a constant expression")),
        }
    }
}
