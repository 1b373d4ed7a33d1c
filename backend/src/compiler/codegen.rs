use crate::compiler::{
    ast::{
        ExprKind, Expression, FunctionDef, IfStmt, Literal, LogicalOp, Program, Stmt, StmtKind,
        WhileStmt,
    },
    code::{CodeUnit, Constant, Instr, MODULE_UNIT_NAME},
};

/// Lowers a checked [`Program`] into a [`CodeUnit`] tree.
///
/// Assumes [`crate::compiler::semantics::check_semantics`] accepted the
/// program: `break` outside a loop or a non-name assignment target are
/// silently skipped here.
pub struct CodeBuilder<'l> {
    label: &'l str,
    optimize: u8,
    unit: CodeUnit,
    loops: Vec<LoopLabels>,
    line: u32,
}

struct LoopLabels {
    start: u32,
    breaks: Vec<usize>,
}

impl<'l> CodeBuilder<'l> {
    pub fn new(label: &'l str) -> Self {
        CodeBuilder {
            label,
            optimize: 0,
            unit: CodeUnit::new(MODULE_UNIT_NAME, label),
            loops: Vec::new(),
            line: 1,
        }
    }

    /// Level 1 and above drop `assert` statements.
    pub fn with_optimize(mut self, level: u8) -> Self {
        self.optimize = level;
        self
    }

    pub fn build(mut self, program: &Program) -> CodeUnit {
        self.body(&program.body);
        self.finish()
    }

    fn function(&self, def: &FunctionDef, line: u32) -> CodeUnit {
        let mut builder = CodeBuilder::new(self.label).with_optimize(self.optimize);
        builder.unit.name = def.name.to_string();
        builder.unit.params = def.params.iter().map(|p| p.name.to_string()).collect();
        builder.line = line;
        builder.body(&def.body);
        builder.finish()
    }

    fn finish(mut self) -> CodeUnit {
        // Jumps may target the instruction right after the body, so the
        // implicit return is always present.
        let none = self.constant(Constant::None);
        self.emit(Instr::LoadConst(none));
        self.emit(Instr::Return);
        self.unit
    }

    fn emit(&mut self, instr: Instr) -> usize {
        self.unit.code.push(instr);
        self.unit.lines.push(self.line);
        self.unit.code.len() - 1
    }

    fn here(&self) -> u32 {
        self.unit.code.len() as u32
    }

    /// Point the jump at `at` to the next instruction to be emitted.
    fn patch(&mut self, at: usize) {
        let target = self.here();
        if let Some(instr) = self.unit.code.get_mut(at) {
            *instr = match *instr {
                Instr::Jump(_) => Instr::Jump(target),
                Instr::PopJumpIfFalse(_) => Instr::PopJumpIfFalse(target),
                Instr::PopJumpIfTrue(_) => Instr::PopJumpIfTrue(target),
                Instr::JumpIfFalseOrPop(_) => Instr::JumpIfFalseOrPop(target),
                Instr::JumpIfTrueOrPop(_) => Instr::JumpIfTrueOrPop(target),
                other => other,
            };
        }
    }

    fn constant(&mut self, value: Constant) -> u32 {
        // Code units are never shared, even when structurally equal.
        if !matches!(value, Constant::Code(_)) {
            if let Some(i) = self.unit.consts.iter().position(|c| *c == value) {
                return i as u32;
            }
        }
        self.unit.consts.push(value);
        (self.unit.consts.len() - 1) as u32
    }

    fn name(&mut self, name: &str) -> u32 {
        if let Some(i) = self.unit.names.iter().position(|n| n == name) {
            return i as u32;
        }
        self.unit.names.push(name.to_string());
        (self.unit.names.len() - 1) as u32
    }

    fn body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.line = stmt.line as u32;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(expr);
                self.emit(Instr::Pop);
            }
            StmtKind::Assign(assign) => {
                if let ExprKind::Identifier(target) = assign.target.kind {
                    self.expr(&assign.value);
                    let idx = self.name(target);
                    self.emit(Instr::StoreName(idx));
                }
            }
            StmtKind::If(if_stmt) => self.if_stmt(if_stmt),
            StmtKind::While(while_stmt) => self.while_stmt(while_stmt),
            StmtKind::Def(def) => {
                let code = self.function(def, self.line);
                self.line = stmt.line as u32;
                let idx = self.constant(Constant::Code(Box::new(code)));
                self.emit(Instr::MakeFunction(idx));
                let name = self.name(def.name);
                self.emit(Instr::StoreName(name));
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.expr(expr),
                    None => {
                        let none = self.constant(Constant::None);
                        self.emit(Instr::LoadConst(none));
                    }
                }
                self.emit(Instr::Return);
            }
            StmtKind::Import(module) => {
                let idx = self.name(module);
                self.emit(Instr::ImportName(idx));
                self.emit(Instr::StoreName(idx));
            }
            StmtKind::Assert(assert) => {
                if self.optimize >= 1 {
                    return;
                }
                self.expr(&assert.test);
                let skip = self.emit(Instr::PopJumpIfTrue(0));
                if let Some(message) = &assert.message {
                    self.expr(message);
                }
                self.emit(Instr::RaiseAssert {
                    with_message: assert.message.is_some(),
                });
                self.patch(skip);
            }
            StmtKind::Pass => {}
            StmtKind::Break => {
                let jump = self.emit(Instr::Jump(0));
                if let Some(labels) = self.loops.last_mut() {
                    labels.breaks.push(jump);
                }
            }
            StmtKind::Continue => {
                if let Some(start) = self.loops.last().map(|l| l.start) {
                    self.emit(Instr::Jump(start));
                }
            }
        }
    }

    fn if_stmt(&mut self, if_stmt: &IfStmt) {
        let mut ends = Vec::new();
        let last = if_stmt.branches.len() - 1;

        for (i, branch) in if_stmt.branches.iter().enumerate() {
            self.expr(&branch.condition);
            let next = self.emit(Instr::PopJumpIfFalse(0));
            self.body(&branch.body);
            if i != last || if_stmt.orelse.is_some() {
                ends.push(self.emit(Instr::Jump(0)));
            }
            self.patch(next);
        }

        if let Some(orelse) = &if_stmt.orelse {
            self.body(orelse);
        }
        for end in ends {
            self.patch(end);
        }
    }

    fn while_stmt(&mut self, while_stmt: &WhileStmt) {
        let start = self.here();
        self.expr(&while_stmt.condition);
        let exit = self.emit(Instr::PopJumpIfFalse(0));

        self.loops.push(LoopLabels {
            start,
            breaks: Vec::new(),
        });
        self.body(&while_stmt.body);
        self.emit(Instr::Jump(start));

        self.patch(exit);
        if let Some(labels) = self.loops.pop() {
            for jump in labels.breaks {
                self.patch(jump);
            }
        }
    }

    fn expr(&mut self, expr: &Expression) {
        match &expr.kind {
            ExprKind::Literal(lit) => {
                let value = match lit {
                    Literal::Int(i) => Constant::Int(*i),
                    Literal::Str(s) => Constant::Str(s.clone()),
                    Literal::Bool(b) => Constant::Bool(*b),
                    Literal::None => Constant::None,
                };
                let idx = self.constant(value);
                self.emit(Instr::LoadConst(idx));
            }
            ExprKind::Identifier(id) => {
                let idx = self.name(id);
                self.emit(Instr::LoadName(idx));
            }
            ExprKind::Binary(b) => {
                self.expr(&b.lhs);
                self.expr(&b.rhs);
                self.emit(Instr::BinaryOp(b.op));
            }
            ExprKind::Unary(u) => {
                self.expr(&u.operand);
                self.emit(Instr::UnaryOp(u.op));
            }
            ExprKind::Compare(c) => {
                self.expr(&c.lhs);
                self.expr(&c.rhs);
                self.emit(Instr::Compare(c.op));
            }
            ExprKind::Logical(l) => {
                self.expr(&l.lhs);
                let jump = match l.op {
                    LogicalOp::And => self.emit(Instr::JumpIfFalseOrPop(0)),
                    LogicalOp::Or => self.emit(Instr::JumpIfTrueOrPop(0)),
                };
                self.expr(&l.rhs);
                self.patch(jump);
            }
            ExprKind::Call(call) => {
                self.expr(&call.callee);
                for arg in &call.args {
                    self.expr(arg);
                }
                self.emit(Instr::Call(call.args.len() as u32));
            }
            ExprKind::Attribute(attr) => {
                self.expr(&attr.value);
                let idx = self.name(attr.name);
                self.emit(Instr::LoadAttr(idx));
            }
        }
    }
}
