use std::{cmp::Ordering, collections::HashMap, io::Write, rc::Rc};

use tracing::{debug, trace};

use crate::{
    compiler::{
        ast::{BinOp, CompOp, UnaryOp},
        code::{CodeUnit, Constant, Instr},
    },
    marshal::core::loads,
    runtime::{
        builtins::Builtin,
        error::{ErrorKind, RuntimeError},
        frozen::FrozenTable,
        value::{Function, Module, Scope, Value},
    },
};

/// Nested calls deeper than this raise `RecursionError`.
pub const MAX_DEPTH: usize = 200;

/// Longest string `+` and `*` may produce, in bytes.
pub const MAX_STR_LEN: usize = 1 << 24;

/// Stack machine executing [`CodeUnit`]s. Everything the program prints goes
/// to `out`.
pub struct Interpreter<W: Write> {
    out: W,
    frozen: FrozenTable,
    modules: HashMap<String, Rc<Module>>,
    depth: usize,
}

/// One activation record. Calls push frames onto a heap stack, so the depth
/// of a script's recursion never touches the native stack.
struct Frame {
    code: Rc<CodeUnit>,
    pc: usize,
    stack: Vec<Value>,
    locals: Option<HashMap<String, Value>>,
    globals: Scope,
}

enum Flow {
    Next,
    Jump(u32),
    Return(Value),
    Call(Frame),
}

/// Either a bare error from the current instruction, or one that already
/// carries the location of a deeper frame.
enum Raise {
    Kind(ErrorKind),
    Error(RuntimeError),
}

impl From<ErrorKind> for Raise {
    fn from(kind: ErrorKind) -> Self {
        Raise::Kind(kind)
    }
}

impl From<RuntimeError> for Raise {
    fn from(err: RuntimeError) -> Self {
        Raise::Error(err)
    }
}

impl<W: Write> Interpreter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            frozen: FrozenTable::default(),
            modules: HashMap::new(),
            depth: 0,
        }
    }

    pub fn with_frozen(mut self, frozen: FrozenTable) -> Self {
        self.frozen = frozen;
        self
    }

    /// Execute `unit` as the body of module `name`.
    ///
    /// The module is registered before its body runs, so a circular import
    /// sees the partially initialized module. It is unregistered again if the
    /// body fails.
    pub fn run(&mut self, name: &str, unit: &CodeUnit) -> Result<Rc<Module>, RuntimeError> {
        self.run_unit(name, Rc::new(unit.clone()))
    }

    fn run_unit(&mut self, name: &str, code: Rc<CodeUnit>) -> Result<Rc<Module>, RuntimeError> {
        let globals = Scope::default();
        let module = Rc::new(Module {
            name: name.to_string(),
            globals: Rc::clone(&globals),
        });
        self.modules.insert(name.to_string(), Rc::clone(&module));

        let frame = Frame {
            code,
            pc: 0,
            stack: Vec::new(),
            locals: None,
            globals,
        };
        if let Err(err) = self.execute(frame) {
            self.modules.remove(name);
            return Err(err);
        }
        debug!(module = name, "executed");
        Ok(module)
    }

    /// Decode a frozen image and run it as module `name`.
    pub fn run_image(&mut self, name: &str, image: &[u8]) -> Result<Rc<Module>, RuntimeError> {
        let unit = loads(image).map_err(|source| RuntimeError {
            filename: format!("<frozen {name}>"),
            line: 0,
            kind: ErrorKind::BadImage {
                module: name.to_string(),
                source,
            },
        })?;
        self.run_unit(name, Rc::new(unit))
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run `entry` and every frame it calls until `entry` returns. The call
    /// depth is restored even when a frame fails.
    fn execute(&mut self, entry: Frame) -> Result<Value, RuntimeError> {
        let base = self.depth;
        let result = self.run_frames(entry);
        self.depth = base;
        result
    }

    fn run_frames(&mut self, entry: Frame) -> Result<Value, RuntimeError> {
        let mut frame = entry;
        let mut callers: Vec<Frame> = Vec::new();
        loop {
            let at = frame.pc;
            let Some(&instr) = frame.code.code.get(at) else {
                return Err(RuntimeError {
                    filename: frame.code.filename.clone(),
                    line: frame.code.line_at(at.saturating_sub(1)),
                    kind: ErrorKind::BadCode(format!(
                        "{}: ran past the last instruction",
                        frame.code.name
                    )),
                });
            };
            frame.pc += 1;

            let flow = self
                .step(&mut frame, instr)
                .map_err(|raise| locate(raise, &frame.code, at))?;
            match flow {
                Flow::Next => {}
                Flow::Jump(target) => frame.pc = target as usize,
                Flow::Return(value) => match callers.pop() {
                    Some(caller) => {
                        frame = caller;
                        frame.stack.push(value);
                        self.depth -= 1;
                    }
                    None => return Ok(value),
                },
                Flow::Call(callee) => {
                    if self.depth >= MAX_DEPTH {
                        return Err(locate(ErrorKind::Recursion.into(), &frame.code, at));
                    }
                    self.depth += 1;
                    callers.push(std::mem::replace(&mut frame, callee));
                }
            }
        }
    }

    fn step(&mut self, frame: &mut Frame, instr: Instr) -> Result<Flow, Raise> {
        let Frame {
            code,
            stack,
            locals,
            globals,
            ..
        } = frame;
        let code: &CodeUnit = code;
        let globals: &Scope = globals;
        match instr {
            Instr::LoadConst(i) => stack.push(constant(code, i)?),
            Instr::LoadName(i) => {
                let name = name(code, i)?;
                let value = locals
                    .as_ref()
                    .and_then(|l| l.get(name).cloned())
                    .or_else(|| globals.borrow().get(name).cloned())
                    .or_else(|| Builtin::lookup(name).map(Value::Builtin))
                    .ok_or_else(|| ErrorKind::Name(name.to_string()))?;
                stack.push(value);
            }
            Instr::StoreName(i) => {
                let name = name(code, i)?.to_string();
                let value = pop(stack)?;
                match locals {
                    Some(l) => {
                        l.insert(name, value);
                    }
                    None => {
                        globals.borrow_mut().insert(name, value);
                    }
                }
            }
            Instr::LoadAttr(i) => {
                let attr = name(code, i)?;
                let value = match pop(stack)? {
                    Value::Module(m) => m.get(attr).ok_or_else(|| {
                        ErrorKind::Attribute(format!(
                            "module '{}' has no attribute '{attr}'",
                            m.name
                        ))
                    })?,
                    other => {
                        return Err(ErrorKind::Attribute(format!(
                            "'{}' object has no attribute '{attr}'",
                            other.type_name()
                        ))
                        .into());
                    }
                };
                stack.push(value);
            }
            Instr::ImportName(i) => {
                let module = self.import(name(code, i)?)?;
                stack.push(Value::Module(module));
            }
            Instr::BinaryOp(op) => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                stack.push(binary(op, &lhs, &rhs)?);
            }
            Instr::UnaryOp(op) => {
                let operand = pop(stack)?;
                let value = match op {
                    UnaryOp::Not => Value::Bool(!operand.is_truthy()),
                    UnaryOp::Neg => match operand.as_int() {
                        Some(i) => Value::Int(i.checked_neg().ok_or(ErrorKind::Overflow)?),
                        None => {
                            return Err(ErrorKind::Type(format!(
                                "bad operand type for unary -: '{}'",
                                operand.type_name()
                            ))
                            .into());
                        }
                    },
                };
                stack.push(value);
            }
            Instr::Compare(op) => {
                let rhs = pop(stack)?;
                let lhs = pop(stack)?;
                stack.push(Value::Bool(compare(op, &lhs, &rhs)?));
            }
            Instr::Jump(target) => return Ok(Flow::Jump(target)),
            Instr::PopJumpIfFalse(target) => {
                if !pop(stack)?.is_truthy() {
                    return Ok(Flow::Jump(target));
                }
            }
            Instr::PopJumpIfTrue(target) => {
                if pop(stack)?.is_truthy() {
                    return Ok(Flow::Jump(target));
                }
            }
            Instr::JumpIfFalseOrPop(target) => {
                if !peek(stack)?.is_truthy() {
                    return Ok(Flow::Jump(target));
                }
                pop(stack)?;
            }
            Instr::JumpIfTrueOrPop(target) => {
                if peek(stack)?.is_truthy() {
                    return Ok(Flow::Jump(target));
                }
                pop(stack)?;
            }
            Instr::Call(argc) => {
                let split = stack
                    .len()
                    .checked_sub(argc as usize)
                    .ok_or_else(underflow)?;
                let args = stack.split_off(split);
                let callee = pop(stack)?;
                return self.call(callee, args, stack);
            }
            Instr::MakeFunction(i) => match code.consts.get(i as usize) {
                Some(Constant::Code(inner)) => stack.push(Value::Function(Rc::new(Function {
                    code: Rc::new(inner.as_ref().clone()),
                    globals: Rc::clone(globals),
                }))),
                _ => {
                    return Err(ErrorKind::BadCode(format!(
                        "constant {i} of {} is not a code unit",
                        code.name
                    ))
                    .into());
                }
            },
            Instr::Pop => {
                pop(stack)?;
            }
            Instr::Return => return Ok(Flow::Return(pop(stack)?)),
            Instr::RaiseAssert { with_message } => {
                let message = if with_message {
                    Some(pop(stack)?.to_string())
                } else {
                    None
                };
                return Err(ErrorKind::Assertion(message).into());
            }
        }
        Ok(Flow::Next)
    }

    /// Builtins run immediately and push their result. Script functions
    /// return a new frame for [`Interpreter::run_frames`] to enter.
    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        stack: &mut Vec<Value>,
    ) -> Result<Flow, Raise> {
        match callee {
            Value::Builtin(builtin) => {
                stack.push(builtin.call(args, &mut self.out)?);
                Ok(Flow::Next)
            }
            Value::Function(func) => {
                let params = &func.code.params;
                if params.len() != args.len() {
                    return Err(ErrorKind::Type(format!(
                        "{}() takes {} positional argument{} but {} {} given",
                        func.code.name,
                        params.len(),
                        if params.len() == 1 { "" } else { "s" },
                        args.len(),
                        if args.len() == 1 { "was" } else { "were" },
                    ))
                    .into());
                }
                let locals = params.iter().cloned().zip(args).collect();
                Ok(Flow::Call(Frame {
                    code: Rc::clone(&func.code),
                    pc: 0,
                    stack: Vec::new(),
                    locals: Some(locals),
                    globals: Rc::clone(&func.globals),
                }))
            }
            other => Err(ErrorKind::Type(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
        }
    }

    fn import(&mut self, name: &str) -> Result<Rc<Module>, Raise> {
        if let Some(module) = self.modules.get(name) {
            trace!(module = name, "import cached");
            return Ok(Rc::clone(module));
        }
        let image = self
            .frozen
            .get(name)
            .ok_or_else(|| ErrorKind::Import(format!("No module named '{name}'")))?;
        let unit = loads(image).map_err(|source| ErrorKind::BadImage {
            module: name.to_string(),
            source,
        })?;
        debug!(module = name, "importing frozen module");
        Ok(self.run_unit(name, Rc::new(unit))?)
    }
}

fn locate(raise: Raise, code: &CodeUnit, at: usize) -> RuntimeError {
    match raise {
        Raise::Kind(kind) => RuntimeError {
            filename: code.filename.clone(),
            line: code.line_at(at),
            kind,
        },
        Raise::Error(err) => err,
    }
}

fn underflow() -> ErrorKind {
    ErrorKind::BadCode("value stack underflow".to_string())
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, ErrorKind> {
    stack.pop().ok_or_else(underflow)
}

fn peek(stack: &[Value]) -> Result<&Value, ErrorKind> {
    stack.last().ok_or_else(underflow)
}

fn name(code: &CodeUnit, i: u32) -> Result<&str, ErrorKind> {
    code.names
        .get(i as usize)
        .map(String::as_str)
        .ok_or_else(|| ErrorKind::BadCode(format!("name index {i} out of range in {}", code.name)))
}

fn constant(code: &CodeUnit, i: u32) -> Result<Value, ErrorKind> {
    match code.consts.get(i as usize) {
        Some(Constant::None) => Ok(Value::None),
        Some(Constant::Bool(b)) => Ok(Value::Bool(*b)),
        Some(Constant::Int(n)) => Ok(Value::Int(*n)),
        Some(Constant::Str(s)) => Ok(Value::str(s)),
        Some(Constant::Code(_)) => Err(ErrorKind::BadCode(format!(
            "constant {i} of {} is a code unit",
            code.name
        ))),
        None => Err(ErrorKind::BadCode(format!(
            "constant index {i} out of range in {}",
            code.name
        ))),
    }
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
    }
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, ErrorKind> {
    if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::FloorDiv => {
                if b == 0 {
                    return Err(ErrorKind::ZeroDivision);
                }
                a.checked_div(b).map(|q| {
                    if a % b != 0 && ((a < 0) != (b < 0)) {
                        q - 1
                    } else {
                        q
                    }
                })
            }
            BinOp::Mod => {
                if b == 0 {
                    return Err(ErrorKind::ZeroDivision);
                }
                let r = a.wrapping_rem(b);
                Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
            }
        };
        return result.map(Value::Int).ok_or(ErrorKind::Overflow);
    }

    match (op, lhs, rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            if a.len() + b.len() > MAX_STR_LEN {
                return Err(ErrorKind::Overflow);
            }
            Ok(Value::str(&format!("{a}{b}")))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let count = n.as_int().unwrap_or(0).max(0);
            let count = usize::try_from(count).map_err(|_| ErrorKind::Overflow)?;
            s.len()
                .checked_mul(count)
                .filter(|len| *len <= MAX_STR_LEN)
                .ok_or(ErrorKind::Overflow)?;
            Ok(Value::str(&s.repeat(count)))
        }
        _ => Err(ErrorKind::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            symbol(op),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn compare(op: CompOp, lhs: &Value, rhs: &Value) -> Result<bool, ErrorKind> {
    let ordering = match op {
        CompOp::Eq => return Ok(lhs.equals(rhs)),
        CompOp::Ne => return Ok(!lhs.equals(rhs)),
        _ => match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => match (lhs.as_int(), rhs.as_int()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => {
                    let symbol = match op {
                        CompOp::Lt => "<",
                        CompOp::Le => "<=",
                        CompOp::Gt => ">",
                        _ => ">=",
                    };
                    return Err(ErrorKind::Type(format!(
                        "'{symbol}' not supported between instances of '{}' and '{}'",
                        lhs.type_name(),
                        rhs.type_name()
                    )));
                }
            },
        },
    };
    Ok(match op {
        CompOp::Lt => ordering == Ordering::Less,
        CompOp::Le => ordering != Ordering::Greater,
        CompOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}
