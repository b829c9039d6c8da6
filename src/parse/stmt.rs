//! Statement parsing. Every statement is typed as soon as it is produced.

use anyhow::Result;

use crate::ast::{Node, NodeKind};

use super::{Parser, SwitchCtx};

impl Parser<'_> {
    pub(crate) fn stmt(&mut self) -> Result<Node> {
        let mut node = self.stmt_inner()?;
        self.add_type(&mut node)?;
        Ok(node)
    }

    fn read_expr_stmt(&mut self) -> Result<Node> {
        let tok = self.pos;
        let expr = self.expr()?;
        Ok(Node::new(NodeKind::ExprStmt(Box::new(expr)), tok))
    }

    fn stmt_inner(&mut self) -> Result<Node> {
        if let Some(tok) = self.consume("return") {
            if self.consume(";").is_some() {
                return Ok(Node::new(NodeKind::Return(None), tok));
            }
            let value = self.expr()?;
            self.expect(";")?;
            return Ok(Node::new(
                NodeKind::Return(Some(Box::new(value))),
                tok,
            ));
        }

        if let Some(tok) = self.consume("if") {
            self.expect("(")?;
            let cond = self.expr()?;
            self.expect(")")?;
            let then = self.stmt()?;
            let els = if self.consume("else").is_some() {
                Some(Box::new(self.stmt()?))
            } else {
                None
            };
            return Ok(Node::new(
                NodeKind::If {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    els,
                },
                tok,
            ));
        }

        if let Some(tok) = self.consume("switch") {
            self.expect("(")?;
            let cond = self.expr()?;
            self.expect(")")?;

            let outer = self.current_switch.take();
            self.current_switch = Some(SwitchCtx::default());
            let then = self.stmt()?;
            let ctx = self.current_switch.take().unwrap_or_default();
            self.current_switch = outer;

            return Ok(Node::new(
                NodeKind::Switch {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    cases: ctx.cases,
                    has_default: ctx.has_default,
                },
                tok,
            ));
        }

        if let Some(tok) = self.consume("case") {
            if self.current_switch.is_none() {
                return Err(self.err_tok(tok, "stray case"));
            }
            let value = self.const_expr()?;
            self.expect(":")?;
            if let Some(ctx) = self.current_switch.as_mut() {
                ctx.cases.push(value);
            }
            let body = self.stmt()?;
            return Ok(Node::new(
                NodeKind::Case {
                    value: Some(value),
                    body: Box::new(body),
                },
                tok,
            ));
        }

        if let Some(tok) = self.consume("default") {
            let Some(ctx) = self.current_switch.as_mut() else {
                return Err(self.err_tok(tok, "stray default"));
            };
            ctx.has_default = true;
            self.expect(":")?;
            let body = self.stmt()?;
            return Ok(Node::new(
                NodeKind::Case {
                    value: None,
                    body: Box::new(body),
                },
                tok,
            ));
        }

        if let Some(tok) = self.consume("while") {
            self.expect("(")?;
            let cond = self.expr()?;
            self.expect(")")?;
            let then = self.stmt()?;
            return Ok(Node::new(
                NodeKind::While {
                    cond: Box::new(cond),
                    then: Box::new(then),
                },
                tok,
            ));
        }

        if let Some(tok) = self.consume("for") {
            self.expect("(")?;
            // The scope opened here covers a declaration in the
            // initializer clause for the whole loop.
            let snapshot = self.scopes.enter();

            let mut init = None;
            let mut cond = None;
            let mut inc = None;

            if self.consume(";").is_none() {
                if self.is_typename() {
                    init = Some(Box::new(self.declaration()?));
                } else {
                    init = Some(Box::new(self.read_expr_stmt()?));
                    self.expect(";")?;
                }
            }
            if self.consume(";").is_none() {
                cond = Some(Box::new(self.expr()?));
                self.expect(";")?;
            }
            if self.consume(")").is_none() {
                inc = Some(Box::new(self.read_expr_stmt()?));
                self.expect(")")?;
            }
            let then = self.stmt()?;

            self.scopes.leave(snapshot);
            return Ok(Node::new(
                NodeKind::For {
                    init,
                    cond,
                    inc,
                    then: Box::new(then),
                },
                tok,
            ));
        }

        if let Some(tok) = self.consume("{") {
            let snapshot = self.scopes.enter();
            let mut body = Vec::new();
            while self.consume("}").is_none() {
                body.push(self.stmt()?);
            }
            self.scopes.leave(snapshot);
            return Ok(Node::new(NodeKind::Block(body), tok));
        }

        if let Some(tok) = self.consume("break") {
            self.expect(";")?;
            return Ok(Node::new(NodeKind::Break, tok));
        }

        if let Some(tok) = self.consume("continue") {
            self.expect(";")?;
            return Ok(Node::new(NodeKind::Continue, tok));
        }

        if let Some(tok) = self.consume("goto") {
            let (label, _) = self.expect_ident()?;
            self.expect(";")?;
            return Ok(Node::new(NodeKind::Goto(label), tok));
        }

        if let Some(tok) = self.consume(";") {
            return Ok(Node::new(NodeKind::Null, tok));
        }

        if let Some((name, tok)) = self.consume_ident() {
            if self.consume(":").is_some() {
                let body = self.stmt()?;
                return Ok(Node::new(
                    NodeKind::Label {
                        name,
                        body: Box::new(body),
                    },
                    tok,
                ));
            }
            self.pos = tok;
        }

        if self.is_typename() {
            return self.declaration();
        }

        let node = self.read_expr_stmt()?;
        self.expect(";")?;
        Ok(node)
    }
}
