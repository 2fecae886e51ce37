//! Per-voice modulation expressions.
//!
//! A trigger may carry a small program such as
//!
//! ```text
//! gain = 0.5 + 0.5 * sin(t * rate);
//! lp.cutoff = 200 + cc[74] * 8000;
//! ```
//!
//! The source is compiled on the control side into a flat postfix program.
//! Evaluation runs on the render thread, once per processed chunk, using a
//! fixed-size stack and no allocation.

use crate::constants::{MAX_MODULATION_OPS, MAX_MODULATION_VARIABLES, MODULATION_STACK_SIZE};
use crate::controllers::Controllers;
use crate::effects::EffectChain;
use crate::types::{EngineError, ModulationSource};
use std::fmt;

/// What an assignment writes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModTarget {
    Gain,
    Tune,
    Pan,
    Effect { slot: usize, param: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Sin,
    Cos,
    Abs,
    Exp,
    Sqrt,
    Min,
    Max,
    Clamp,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "abs" => Func::Abs,
            "exp" => Func::Exp,
            "sqrt" => Func::Sqrt,
            "min" => Func::Min,
            "max" => Func::Max,
            "clamp" => Func::Clamp,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max => 2,
            Func::Clamp => 3,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Const(f32),
    Variable(usize),
    Controller(usize),
    Time,
    SampleRate,
    Bpm,
    Ppq,
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Call(Func),
}

#[derive(Debug, Clone, Copy)]
struct Assignment {
    target: ModTarget,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModulationError {
    pub message: String,
    /// Byte offset in the expression.
    pub position: usize,
}

impl fmt::Display for ModulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.position)
    }
}

impl std::error::Error for ModulationError {}

impl From<ModulationError> for EngineError {
    fn from(err: ModulationError) -> Self {
        EngineError::Modulation {
            reason: err.to_string(),
        }
    }
}

/// Values a program can read while it runs.
pub struct ModContext<'a> {
    /// Seconds since the voice started.
    pub time: f32,
    pub sample_rate: f32,
    pub bpm: f32,
    pub ppq: f32,
    pub controllers: &'a Controllers,
}

/// A compiled modulation program.
#[derive(Debug, Clone)]
pub struct Modulator {
    ops: Vec<Op>,
    assignments: Vec<Assignment>,
    variables: Vec<f32>,
}

impl Modulator {
    /// Compiles `source` against the voice's effect chain, which resolves
    /// `id.param` targets.
    pub fn compile(
        source: &ModulationSource,
        chain: &EffectChain,
    ) -> Result<Self, ModulationError> {
        if source.variables.len() > MAX_MODULATION_VARIABLES {
            return Err(ModulationError {
                message: format!("too many variables (max {})", MAX_MODULATION_VARIABLES),
                position: 0,
            });
        }
        let tokens = tokenize(&source.expression)?;
        let mut compiler = Compiler {
            tokens,
            pos: 0,
            source,
            chain,
            ops: Vec::new(),
            assignments: Vec::new(),
            depth: 0,
        };
        compiler.program()?;
        Ok(Self {
            ops: compiler.ops,
            assignments: compiler.assignments,
            variables: source.variables.iter().map(|(_, v)| *v).collect(),
        })
    }

    pub fn targets(&self) -> impl Iterator<Item = ModTarget> + '_ {
        self.assignments.iter().map(|a| a.target)
    }

    /// Runs every assignment in order, passing finite results to `apply`.
    pub fn evaluate(&self, ctx: &ModContext<'_>, mut apply: impl FnMut(ModTarget, f32)) {
        let mut stack = [0.0f32; MODULATION_STACK_SIZE];
        for assignment in &self.assignments {
            let mut sp = 0usize;
            for op in &self.ops[assignment.start..assignment.end] {
                match *op {
                    Op::Const(v) => {
                        stack[sp] = v;
                        sp += 1;
                    }
                    Op::Variable(i) => {
                        stack[sp] = self.variables[i];
                        sp += 1;
                    }
                    Op::Controller(n) => {
                        stack[sp] = ctx.controllers.get(n);
                        sp += 1;
                    }
                    Op::Time => {
                        stack[sp] = ctx.time;
                        sp += 1;
                    }
                    Op::SampleRate => {
                        stack[sp] = ctx.sample_rate;
                        sp += 1;
                    }
                    Op::Bpm => {
                        stack[sp] = ctx.bpm;
                        sp += 1;
                    }
                    Op::Ppq => {
                        stack[sp] = ctx.ppq;
                        sp += 1;
                    }
                    Op::Neg => stack[sp - 1] = -stack[sp - 1],
                    Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Rem => {
                        sp -= 1;
                        let (a, b) = (stack[sp - 1], stack[sp]);
                        stack[sp - 1] = match *op {
                            Op::Add => a + b,
                            Op::Sub => a - b,
                            Op::Mul => a * b,
                            Op::Div if b == 0.0 => 0.0,
                            Op::Div => a / b,
                            Op::Rem if b == 0.0 => 0.0,
                            _ => a % b,
                        };
                    }
                    Op::Call(func) => {
                        sp -= func.arity() - 1;
                        let x = stack[sp - 1];
                        stack[sp - 1] = match func {
                            Func::Sin => x.sin(),
                            Func::Cos => x.cos(),
                            Func::Abs => x.abs(),
                            Func::Exp => x.exp(),
                            Func::Sqrt => x.sqrt(),
                            Func::Min => x.min(stack[sp]),
                            Func::Max => x.max(stack[sp]),
                            Func::Clamp => x.max(stack[sp]).min(stack[sp + 1]),
                        };
                    }
                }
            }
            let value = if sp > 0 { stack[sp - 1] } else { 0.0 };
            if value.is_finite() {
                apply(assignment.target, value);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f32),
    Ident(String),
    Symbol(char),
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ModulationError> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit()
            || (c == '.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()))
        {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let value = text[start..i].parse::<f32>().map_err(|_| ModulationError {
                message: format!("invalid number '{}'", &text[start..i]),
                position: start,
            })?;
            tokens.push((Token::Number(value), start));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((Token::Ident(text[start..i].to_string()), start));
        } else if "+-*/%=;,()[].".contains(c) {
            tokens.push((Token::Symbol(c), i));
            i += 1;
        } else {
            return Err(ModulationError {
                message: format!("unexpected character '{}'", c),
                position: i,
            });
        }
    }
    Ok(tokens)
}

struct Compiler<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    source: &'a ModulationSource,
    chain: &'a EffectChain,
    ops: Vec<Op>,
    assignments: Vec<Assignment>,
    depth: usize,
}

impl Compiler<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, p)| *p)
            .unwrap_or(self.source.expression.len())
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, ModulationError> {
        Err(ModulationError {
            message: message.into(),
            position: self.offset(),
        })
    }

    fn eat(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, symbol: char) -> Result<(), ModulationError> {
        if self.eat(symbol) {
            Ok(())
        } else {
            self.error(format!("expected '{}'", symbol))
        }
    }

    fn ident(&mut self) -> Result<String, ModulationError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.error("expected a name"),
        }
    }

    /// Appends `op`, tracking the stack depth it produces.
    fn emit(&mut self, op: Op) -> Result<(), ModulationError> {
        if self.ops.len() >= MAX_MODULATION_OPS {
            return self.error("expression too long");
        }
        match op {
            Op::Neg => {}
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Rem => self.depth -= 1,
            Op::Call(func) => self.depth -= func.arity() - 1,
            _ => {
                self.depth += 1;
                if self.depth > MODULATION_STACK_SIZE {
                    return self.error("expression nests too deeply");
                }
            }
        }
        self.ops.push(op);
        Ok(())
    }

    fn program(&mut self) -> Result<(), ModulationError> {
        while self.peek().is_some() {
            if self.eat(';') {
                continue;
            }
            self.assignment()?;
        }
        Ok(())
    }

    fn assignment(&mut self) -> Result<(), ModulationError> {
        let mut name = self.ident()?;
        if self.eat('.') {
            name = format!("{}.{}", name, self.ident()?);
        }
        let target = match name.as_str() {
            "gain" => ModTarget::Gain,
            "tune" => ModTarget::Tune,
            "pan" => ModTarget::Pan,
            other => match self.chain.resolve_parameter(other) {
                Some((slot, param)) => ModTarget::Effect { slot, param },
                None => return self.error(format!("unknown modulation target '{}'", other)),
            },
        };
        self.expect('=')?;
        let start = self.ops.len();
        self.depth = 0;
        self.expression()?;
        self.assignments.push(Assignment {
            target,
            start,
            end: self.ops.len(),
        });
        if self.peek().is_some() {
            self.expect(';')?;
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<(), ModulationError> {
        self.term()?;
        loop {
            if self.eat('+') {
                self.term()?;
                self.emit(Op::Add)?;
            } else if self.eat('-') {
                self.term()?;
                self.emit(Op::Sub)?;
            } else {
                return Ok(());
            }
        }
    }

    fn term(&mut self) -> Result<(), ModulationError> {
        self.unary()?;
        loop {
            let op = if self.eat('*') {
                Op::Mul
            } else if self.eat('/') {
                Op::Div
            } else if self.eat('%') {
                Op::Rem
            } else {
                return Ok(());
            };
            self.unary()?;
            self.emit(op)?;
        }
    }

    fn unary(&mut self) -> Result<(), ModulationError> {
        if self.eat('-') {
            self.unary()?;
            return self.emit(Op::Neg);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<(), ModulationError> {
        match self.peek().cloned() {
            Some(Token::Number(value)) => {
                self.pos += 1;
                self.emit(Op::Const(value))
            }
            Some(Token::Symbol('(')) => {
                self.pos += 1;
                self.expression()?;
                self.expect(')')
            }
            Some(Token::Ident(name)) => {
                let at = self.offset();
                self.pos += 1;
                if name == "cc" && self.eat('[') {
                    return self.controller();
                }
                if self.eat('(') {
                    return self.call(&name);
                }
                self.variable(&name, at)
            }
            _ => self.error("expected a value"),
        }
    }

    fn controller(&mut self) -> Result<(), ModulationError> {
        let index = match self.peek() {
            Some(Token::Number(n)) if n.fract() == 0.0 && (0.0..128.0).contains(n) => *n as usize,
            _ => return self.error("controller index must be a number from 0 to 127"),
        };
        self.pos += 1;
        self.expect(']')?;
        self.emit(Op::Controller(index))
    }

    fn call(&mut self, name: &str) -> Result<(), ModulationError> {
        let Some(func) = Func::lookup(name) else {
            return self.error(format!("unknown function '{}'", name));
        };
        let mut args = 0;
        if !self.eat(')') {
            loop {
                self.expression()?;
                args += 1;
                if self.eat(')') {
                    break;
                }
                self.expect(',')?;
            }
        }
        if args != func.arity() {
            return self.error(format!(
                "'{}' takes {} argument(s), got {}",
                name,
                func.arity(),
                args
            ));
        }
        self.emit(Op::Call(func))
    }

    fn variable(&mut self, name: &str, at: usize) -> Result<(), ModulationError> {
        if let Some(index) = self.source.variables.iter().rposition(|(n, _)| n == name) {
            return self.emit(Op::Variable(index));
        }
        let op = match name {
            "t" | "time" => Op::Time,
            "sampleRate" => Op::SampleRate,
            "bpm" => Op::Bpm,
            "ppq" => Op::Ppq,
            "pi" => Op::Const(std::f32::consts::PI),
            _ => {
                return Err(ModulationError {
                    message: format!("unknown variable '{}'", name),
                    position: at,
                })
            }
        };
        self.emit(op)
    }
}
