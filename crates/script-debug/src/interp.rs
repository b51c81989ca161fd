//! A tiny line-oriented script language used to drive the debugger.
//!
//! ```text
//! # comments and blank lines are skipped
//! let total = 1 + 2 * 3
//! let names = ["a", "b"]
//! print "total: " + total
//! fn greet
//!   print "hello " + who
//! end
//! let who = "world"
//! call greet
//! include lib/util.script
//! eval let x = 5
//! ```
//!
//! Every statement is a pause point. `fn` bodies run in their own scope and
//! see globals; `include` and `eval` run in the caller's scope.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::engine::ScriptDebugger;
use crate::error::DebugError;
use crate::event::ThreadId;
use crate::frame::{FrameKind, Scope, StackFrame};
use crate::script::{Script, ScriptId};
use crate::value::Value;

/// Deepest call stack a script may build through `call`, `include` and `eval`.
pub const MAX_FRAMES: usize = 200;

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("{script}:{line}: {message}")]
    Parse {
        script: String,
        line: u32,
        message: String,
    },
    #[error("line {line}: unknown variable `{name}`")]
    UnknownVariable { name: String, line: u32 },
    #[error("line {line}: unknown function `{name}`")]
    UnknownFunction { name: String, line: u32 },
    #[error("cannot load `{0}`")]
    UnknownResource(String),
    #[error("line {line}: {message}")]
    Type { line: u32, message: String },
    #[error("line {line}: call stack exceeds {limit} frames")]
    StackOverflow { line: u32, limit: usize },
    #[error(transparent)]
    Debug(#[from] DebugError),
}

pub type InterpResult<T> = Result<T, InterpError>;

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
}

#[derive(Clone, Debug, PartialEq)]
enum StmtKind {
    Let { name: String, expr: Expr },
    Print(Expr),
    Call(String),
    Include(String),
    Eval(String),
    Function { name: String, body: Arc<[Stmt]> },
}

#[derive(Clone, Debug, PartialEq)]
struct Stmt {
    line: u32,
    kind: StmtKind,
}

#[derive(Clone, Debug)]
struct Function {
    script: Arc<Script>,
    body: Arc<[Stmt]>,
}

#[derive(Debug)]
struct Activation {
    script: Arc<Script>,
    line: u32,
    kind: FrameKind,
    scope: Scope,
    name: Option<String>,
}

pub struct Interpreter {
    thread: ThreadId,
    debugger: Option<Arc<ScriptDebugger>>,
    resources: HashMap<String, String>,
    base_dir: Option<PathBuf>,
    next_script: u64,
    globals: Scope,
    /// Outermost first.
    frames: Vec<Activation>,
    functions: HashMap<String, Function>,
    output: Vec<String>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            thread: ThreadId::current(),
            debugger: None,
            resources: HashMap::new(),
            base_dir: None,
            next_script: 1,
            globals: Scope::new(),
            frames: Vec::new(),
            functions: HashMap::new(),
            output: Vec::new(),
        }
    }

    pub fn with_debugger(mut self, debugger: Arc<ScriptDebugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn with_thread(mut self, thread: ThreadId) -> Self {
        self.thread = thread;
        self
    }

    /// Makes `include <name>` resolve to `source`.
    pub fn with_resource(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.resources.insert(name.into(), source.into());
        self
    }

    /// Directory used for includes that were not registered in memory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    /// Allocates the id for the next script this interpreter loads.
    pub fn next_script_id(&mut self) -> ScriptId {
        let id = ScriptId::new(self.next_script);
        self.next_script += 1;
        id
    }

    /// Runs a root script from start to end, reporting engine start and end
    /// to the debugger when one is attached.
    pub fn run(&mut self, script: Script) -> InterpResult<()> {
        if let Some(debugger) = &self.debugger {
            debugger.engine_started()?;
        }

        let scope = self.globals.clone();
        let result = self.exec_script(Arc::new(script), FrameKind::Call, scope);
        self.frames.clear();

        if let Some(debugger) = &self.debugger {
            if let Err(err) = debugger.engine_terminated() {
                tracing::debug!(target: "script_debug.interp", error = %err, "engine end not reported");
            }
        }
        result
    }

    fn exec_script(&mut self, script: Arc<Script>, kind: FrameKind, scope: Scope) -> InterpResult<()> {
        let statements = parse(&script)?;
        self.check_depth()?;
        if let Some(debugger) = &self.debugger {
            continue_after_pause(debugger.script_ready(self.thread, &script, self.frames.len()))?;
        }

        self.frames.push(Activation {
            script,
            line: 0,
            kind,
            scope,
            name: None,
        });
        let result = self.exec_block(&statements);
        self.frames.pop();
        result
    }

    fn check_depth(&self) -> InterpResult<()> {
        if self.frames.len() < MAX_FRAMES {
            return Ok(());
        }
        Err(InterpError::StackOverflow {
            line: self.frames.last().map_or(0, |activation| activation.line),
            limit: MAX_FRAMES,
        })
    }

    fn exec_block(&mut self, statements: &[Stmt]) -> InterpResult<()> {
        for statement in statements {
            self.checkpoint(statement.line)?;
            self.exec(statement)?;
        }
        Ok(())
    }

    fn checkpoint(&mut self, line: u32) -> InterpResult<()> {
        let Some(top) = self.frames.last_mut() else {
            return Ok(());
        };
        top.line = line;
        let Some(debugger) = self.debugger.clone() else {
            return Ok(());
        };
        let script = Arc::clone(&top.script);
        let depth = self.frames.len();
        continue_after_pause(debugger.process_line(self.thread, &script, line, depth, || {
            self.capture()
        }))
    }

    /// Snapshot of the current call stack, innermost first.
    fn capture(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|activation| {
                let frame = StackFrame::capture(
                    &activation.script,
                    activation.line,
                    activation.kind,
                    &activation.scope,
                );
                match &activation.name {
                    Some(name) => frame.with_name(format!("{name}() line {}", activation.line)),
                    None => frame,
                }
            })
            .collect()
    }

    fn current_scope(&self) -> Scope {
        self.frames
            .last()
            .map(|activation| activation.scope.clone())
            .unwrap_or_else(|| self.globals.clone())
    }

    fn exec(&mut self, statement: &Stmt) -> InterpResult<()> {
        let line = statement.line;
        match &statement.kind {
            StmtKind::Let { name, expr } => {
                let value = self.eval(expr, line)?;
                self.current_scope().set(name.clone(), value);
            }
            StmtKind::Print(expr) => {
                let value = self.eval(expr, line)?;
                self.output.push(value.to_string());
            }
            StmtKind::Function { name, body } => {
                let script = self
                    .frames
                    .last()
                    .map(|activation| Arc::clone(&activation.script))
                    .ok_or_else(|| InterpError::Type {
                        line,
                        message: "function defined outside a script".to_owned(),
                    })?;
                self.functions.insert(
                    name.clone(),
                    Function {
                        script,
                        body: Arc::clone(body),
                    },
                );
            }
            StmtKind::Call(name) => {
                let function = self
                    .functions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| InterpError::UnknownFunction {
                        name: name.clone(),
                        line,
                    })?;
                self.check_depth()?;
                self.frames.push(Activation {
                    script: function.script,
                    line,
                    kind: FrameKind::Call,
                    scope: Scope::new(),
                    name: Some(name.clone()),
                });
                let result = self.exec_block(&function.body);
                self.frames.pop();
                result?;
            }
            StmtKind::Include(resource) => {
                let source = self.load(resource)?;
                let id = self.next_script_id();
                let script = Script::from_resource(id, resource.clone(), source);
                let scope = self.current_scope();
                self.exec_script(Arc::new(script), FrameKind::Include, scope)?;
            }
            StmtKind::Eval(code) => {
                let id = self.next_script_id();
                let script = Script::dynamic(id, code.clone()).with_title("eval");
                let scope = self.current_scope();
                self.exec_script(Arc::new(script), FrameKind::Dynamic, scope)?;
            }
        }
        Ok(())
    }

    fn load(&self, resource: &str) -> InterpResult<String> {
        if let Some(source) = self.resources.get(resource) {
            return Ok(source.clone());
        }
        let path = match &self.base_dir {
            Some(dir) => dir.join(resource),
            None => PathBuf::from(resource),
        };
        std::fs::read_to_string(&path).map_err(|_| InterpError::UnknownResource(resource.to_owned()))
    }

    fn lookup(&self, name: &str, line: u32) -> InterpResult<Value> {
        if let Some(value) = self.frames.last().and_then(|activation| activation.scope.get(name)) {
            return Ok(value);
        }
        self.globals
            .get(name)
            .ok_or_else(|| InterpError::UnknownVariable {
                name: name.to_owned(),
                line,
            })
    }

    fn eval(&self, expr: &Expr, line: u32) -> InterpResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => self.lookup(name, line),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item, line))
                .collect::<InterpResult<Vec<_>>>()
                .map(Value::List),
            Expr::Neg(inner) => match self.eval(inner, line)? {
                Value::Int(value) => Ok(Value::Int(-value)),
                Value::Float(value) => Ok(Value::Float(-value)),
                other => Err(type_error(line, format!("cannot negate {}", other.type_name()))),
            },
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, line)?;
                let rhs = self.eval(rhs, line)?;
                binary(*op, lhs, rhs, line)
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// A resume timeout lets the script carry on; everything else stops it.
fn continue_after_pause(result: Result<(), DebugError>) -> InterpResult<()> {
    match result {
        Ok(()) | Err(DebugError::ResumeTimeout(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn type_error(line: u32, message: String) -> InterpError {
    InterpError::Type { line, message }
}

fn binary(op: Op, lhs: Value, rhs: Value, line: u32) -> InterpResult<Value> {
    match (op, lhs, rhs) {
        (Op::Add, Value::Str(lhs), rhs) => Ok(Value::Str(format!("{lhs}{rhs}"))),
        (Op::Add, lhs, Value::Str(rhs)) => Ok(Value::Str(format!("{lhs}{rhs}"))),
        (Op::Add, Value::List(mut lhs), Value::List(rhs)) => {
            lhs.extend(rhs);
            Ok(Value::List(lhs))
        }
        (op, Value::Int(lhs), Value::Int(rhs)) => {
            let result = match op {
                Op::Add => lhs.checked_add(rhs),
                Op::Sub => lhs.checked_sub(rhs),
                Op::Mul => lhs.checked_mul(rhs),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| type_error(line, "integer overflow".to_owned()))
        }
        (op, lhs, rhs) => match (as_float(&lhs), as_float(&rhs)) {
            (Some(lhs), Some(rhs)) => Ok(Value::Float(match op {
                Op::Add => lhs + rhs,
                Op::Sub => lhs - rhs,
                Op::Mul => lhs * rhs,
            })),
            _ => Err(type_error(
                line,
                format!(
                    "unsupported operands {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ),
            )),
        },
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(value) => Some(*value as f64),
        Value::Float(value) => Some(*value),
        _ => None,
    }
}

fn parse(script: &Script) -> InterpResult<Vec<Stmt>> {
    let mut lines = script
        .source()
        .lines()
        .enumerate()
        .map(|(index, text)| (index as u32 + 1, text.trim()))
        .filter(|(_, text)| !text.is_empty() && !text.starts_with('#'));
    let statements = parse_block(script, &mut lines, false)?;
    Ok(statements)
}

fn parse_block<'a>(
    script: &Script,
    lines: &mut impl Iterator<Item = (u32, &'a str)>,
    in_function: bool,
) -> InterpResult<Vec<Stmt>> {
    let mut statements = Vec::new();
    let error = |line: u32, message: String| InterpError::Parse {
        script: script.title(),
        line,
        message,
    };

    while let Some((line, text)) = lines.next() {
        let (keyword, rest) = match text.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (text, ""),
        };
        let kind = match keyword {
            "end" if in_function => return Ok(statements),
            "end" => return Err(error(line, "`end` without `fn`".to_owned())),
            "let" => {
                let (name, expr) = rest
                    .split_once('=')
                    .ok_or_else(|| error(line, "expected `let <name> = <expr>`".to_owned()))?;
                let name = name.trim();
                if !is_identifier(name) {
                    return Err(error(line, format!("invalid variable name `{name}`")));
                }
                StmtKind::Let {
                    name: name.to_owned(),
                    expr: parse_expr(expr).map_err(|message| error(line, message))?,
                }
            }
            "print" => StmtKind::Print(parse_expr(rest).map_err(|message| error(line, message))?),
            "call" if is_identifier(rest) => StmtKind::Call(rest.to_owned()),
            "fn" if is_identifier(rest) => {
                let body = parse_block(script, lines, true)?;
                StmtKind::Function {
                    name: rest.to_owned(),
                    body: body.into(),
                }
            }
            "include" if !rest.is_empty() => StmtKind::Include(rest.to_owned()),
            "eval" if !rest.is_empty() => StmtKind::Eval(rest.to_owned()),
            _ => return Err(error(line, format!("cannot parse `{text}`"))),
        };
        statements.push(Stmt { line, kind });
    }

    if in_function {
        return Err(error(0, "missing `end`".to_owned()));
    }
    Ok(statements)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '[' | ']' | ',' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Comma,
                });
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, other)) => value.push(other),
                            None => return Err("unterminated string".to_owned()),
                        },
                        Some((_, other)) => value.push(other),
                        None => return Err("unterminated string".to_owned()),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let mut end = start;
                while let Some(&(index, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        end = index + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &text[start..end];
                let token = if literal.contains('.') {
                    literal.parse().map(Token::Float).map_err(|_| format!("bad number `{literal}`"))?
                } else {
                    literal.parse().map(Token::Int).map_err(|_| format!("bad number `{literal}`"))?
                };
                tokens.push(token);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(index, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = index + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text[start..end].to_owned()));
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.factor()?;
        while self.peek() == Some(&Token::Star) {
            self.bump();
            let rhs = self.factor()?;
            lhs = Expr::Binary(Op::Mul, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        match self.bump() {
            Some(Token::Int(value)) => Ok(Expr::Literal(Value::Int(value))),
            Some(Token::Float(value)) => Ok(Expr::Literal(Value::Float(value))),
            Some(Token::Str(value)) => Ok(Expr::Literal(Value::Str(value))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Var(name),
            }),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.bump();
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.expr()?);
                    match self.bump() {
                        Some(Token::Comma) => {}
                        Some(Token::RBracket) => return Ok(Expr::List(items)),
                        _ => return Err("expected `,` or `]`".to_owned()),
                    }
                }
            }
            Some(token) => Err(format!("unexpected {token:?}")),
            None => Err("expected an expression".to_owned()),
        }
    }
}

fn parse_expr(text: &str) -> Result<Expr, String> {
    let mut parser = ExprParser {
        tokens: tokenize(text.trim())?,
        pos: 0,
    };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("trailing input in `{}`", text.trim()));
    }
    Ok(expr)
}
