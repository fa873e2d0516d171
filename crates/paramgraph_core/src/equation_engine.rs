use crate::error::EngineError;
use crate::traits::{AlgebraEngine, EvalContext};
use num_complex::Complex64;
use num_traits::{One, Zero};
use std::fmt;

/// Built-in functions understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    /// Complex sign: +1, -1 or 0. `step` is rewritten to this.
    Csgn,
    Atan,
    Atan2,
    /// Reads element `k` of the owner's vector from the evaluation context.
    Vector,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "exp" => Function::Exp,
            "log" | "ln" => Function::Log,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "csgn" => Function::Csgn,
            "atan" => Function::Atan,
            "atan2" => Function::Atan2,
            "Vector" => Function::Vector,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Csgn => "csgn",
            Function::Atan => "atan",
            Function::Atan2 => "atan2",
            Function::Vector => "Vector",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Function::Atan2 => 2,
            _ => 1,
        }
    }
}

/// OpCodes for the stack-based virtual machine.
/// The VM operates on a stack of complex values.
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Pushes a real constant onto the stack.
    LoadConst(f64),
    /// Pushes the imaginary unit.
    LoadImaginary,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops `arity` arguments, pushes the function value.
    Call(Function),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based virtual machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes the bytecode, the evaluation context
/// and a scratch stack.
pub struct VM;

impl VM {
    pub fn execute(
        bytecode: &Bytecode,
        ctx: &EvalContext<'_>,
        stack: &mut Vec<Complex64>,
    ) -> Result<Complex64, EngineError> {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(Complex64::new(*val, 0.0)),
                OpCode::LoadImaginary => stack.push(Complex64::i()),
                OpCode::Add => {
                    let (a, b) = pop2(stack)?;
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let (a, b) = pop2(stack)?;
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let (a, b) = pop2(stack)?;
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let (a, b) = pop2(stack)?;
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let (a, b) = pop2(stack)?;
                    stack.push(complex_pow(a, b));
                }
                OpCode::Neg => {
                    let a = stack.pop().ok_or(EngineError::StackUnderflow)?;
                    stack.push(-a);
                }
                OpCode::Call(func) => {
                    let value = if func.arity() == 2 {
                        let (a, b) = pop2(stack)?;
                        apply2(*func, a, b)
                    } else {
                        let a = stack.pop().ok_or(EngineError::StackUnderflow)?;
                        apply1(*func, a, ctx)?
                    };
                    stack.push(value);
                }
            }
        }

        stack.pop().ok_or(EngineError::StackUnderflow)
    }
}

fn pop2(stack: &mut Vec<Complex64>) -> Result<(Complex64, Complex64), EngineError> {
    let b = stack.pop().ok_or(EngineError::StackUnderflow)?;
    let a = stack.pop().ok_or(EngineError::StackUnderflow)?;
    Ok((a, b))
}

fn complex_pow(a: Complex64, b: Complex64) -> Complex64 {
    // Stay on the real line whenever the real result is well defined.
    if a.im == 0.0 && b.im == 0.0 && (a.re >= 0.0 || b.re.fract() == 0.0) {
        return Complex64::new(a.re.powf(b.re), 0.0);
    }
    a.powc(b)
}

fn csgn(z: Complex64) -> f64 {
    if z.re > 0.0 || (z.re == 0.0 && z.im > 0.0) {
        1.0
    } else if z.re < 0.0 || (z.re == 0.0 && z.im < 0.0) {
        -1.0
    } else {
        0.0
    }
}

fn apply1(func: Function, a: Complex64, ctx: &EvalContext<'_>) -> Result<Complex64, EngineError> {
    Ok(match func {
        Function::Sin => a.sin(),
        Function::Cos => a.cos(),
        Function::Tan => a.tan(),
        Function::Exp => a.exp(),
        Function::Log => a.ln(),
        Function::Sqrt => a.sqrt(),
        Function::Abs => Complex64::new(a.norm(), 0.0),
        Function::Csgn => Complex64::new(csgn(a), 0.0),
        Function::Atan => a.atan(),
        Function::Vector => {
            let vector = ctx.vector.unwrap_or(&[]);
            let index = a.re.round() as i64;
            let value = usize::try_from(index)
                .ok()
                .and_then(|i| vector.get(i))
                .ok_or(EngineError::VectorIndex {
                    index,
                    len: vector.len(),
                })?;
            Complex64::new(*value, 0.0)
        }
        Function::Atan2 => {
            return Err(EngineError::Arity {
                name: func.name().to_string(),
                expected: 2,
                found: 1,
            })
        }
    })
}

fn apply2(func: Function, a: Complex64, b: Complex64) -> Complex64 {
    match func {
        Function::Atan2 => Complex64::new(a.re.atan2(b.re), 0.0),
        // Only `atan2` has arity 2.
        _ => Complex64::new(f64::NAN, 0.0),
    }
}

// --- AST & Parser ---

/// Abstract syntax tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// The imaginary unit `I`.
    Imaginary,
    Symbol(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// True if `symbol` occurs anywhere in the tree.
    pub fn contains_symbol(&self, symbol: &str) -> bool {
        match self {
            Expr::Number(_) | Expr::Imaginary => false,
            Expr::Symbol(name) => name == symbol,
            Expr::Binary(l, _, r) => l.contains_symbol(symbol) || r.contains_symbol(symbol),
            Expr::Unary(_, e) => e.contains_symbol(symbol),
            Expr::Call(_, args) => args.iter().any(|a| a.contains_symbol(symbol)),
        }
    }

    /// Collects the free symbols in first-occurrence order.
    pub fn free_symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) | Expr::Imaginary => {}
            Expr::Symbol(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Binary(l, _, r) => {
                l.collect_symbols(out);
                r.collect_symbols(out);
            }
            Expr::Unary(_, e) => e.collect_symbols(out),
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_symbols(out)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Imaginary => write!(f, "I"),
            Expr::Symbol(name) => write!(f, "{name}"),
            Expr::Binary(l, op, r) => write!(f, "({l}{op}{r})"),
            Expr::Unary(op, e) => write!(f, "{op}{e}"),
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// Constructors that fold constants and drop neutral elements. Every tree the
// engine produces after parsing goes through these.

fn number(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Number(n) => Some(*n),
        _ => None,
    }
}

// A zero only absorbs an operand that still has free symbols. Closed
// operands are kept so that inf or NaN reach the VM.
fn has_symbols(expr: &Expr) -> bool {
    match expr {
        Expr::Number(_) | Expr::Imaginary => false,
        Expr::Symbol(_) => true,
        Expr::Binary(l, _, r) => has_symbols(l) || has_symbols(r),
        Expr::Unary(_, e) => has_symbols(e),
        Expr::Call(_, args) => args.iter().any(has_symbols),
    }
}

fn add(a: Expr, b: Expr) -> Expr {
    match (number(&a), number(&b)) {
        (Some(x), Some(y)) => Expr::Number(x + y),
        (Some(x), _) if x.is_zero() => b,
        (_, Some(y)) if y.is_zero() => a,
        _ => Expr::Binary(Box::new(a), '+', Box::new(b)),
    }
}

fn sub(a: Expr, b: Expr) -> Expr {
    match (number(&a), number(&b)) {
        (Some(x), Some(y)) => Expr::Number(x - y),
        (Some(x), _) if x.is_zero() => neg(b),
        (_, Some(y)) if y.is_zero() => a,
        _ => Expr::Binary(Box::new(a), '-', Box::new(b)),
    }
}

fn mul(a: Expr, b: Expr) -> Expr {
    match (number(&a), number(&b)) {
        (Some(x), Some(y)) => Expr::Number(x * y),
        (Some(x), _) if x.is_zero() && has_symbols(&b) => Expr::Number(0.0),
        (_, Some(y)) if y.is_zero() && has_symbols(&a) => Expr::Number(0.0),
        (Some(x), _) if x.is_one() => b,
        (_, Some(y)) if y.is_one() => a,
        _ => Expr::Binary(Box::new(a), '*', Box::new(b)),
    }
}

fn div(a: Expr, b: Expr) -> Expr {
    match (number(&a), number(&b)) {
        (Some(x), Some(y)) if y != 0.0 => Expr::Number(x / y),
        (Some(x), _) if x.is_zero() && has_symbols(&b) => Expr::Number(0.0),
        (_, Some(y)) if y.is_one() => a,
        _ => Expr::Binary(Box::new(a), '/', Box::new(b)),
    }
}

fn pow(a: Expr, b: Expr) -> Expr {
    match (number(&a), number(&b)) {
        (_, Some(y)) if y.is_zero() => Expr::Number(1.0),
        (_, Some(y)) if y.is_one() => a,
        (Some(x), Some(y)) if x >= 0.0 || y.fract() == 0.0 => Expr::Number(x.powf(y)),
        _ => Expr::Binary(Box::new(a), '^', Box::new(b)),
    }
}

fn neg(a: Expr) -> Expr {
    match a {
        Expr::Number(n) => Expr::Number(-n),
        Expr::Unary('-', inner) => *inner,
        other => Expr::Unary('-', Box::new(other)),
    }
}

fn call(func: Function, args: Vec<Expr>) -> Expr {
    Expr::Call(func, args)
}

fn binary(a: Expr, op: char, b: Expr) -> Expr {
    match op {
        '+' => add(a, b),
        '-' => sub(a, b),
        '*' => mul(a, b),
        '/' => div(a, b),
        _ => pow(a, b),
    }
}

/// Symbolic derivative of `expr` with respect to `var`.
pub fn derivative(expr: &Expr, var: &str) -> Expr {
    match expr {
        Expr::Number(_) | Expr::Imaginary => Expr::Number(0.0),
        Expr::Symbol(name) => Expr::Number(if name == var { 1.0 } else { 0.0 }),
        Expr::Unary(_, e) => neg(derivative(e, var)),
        Expr::Binary(u, op, v) => {
            let du = derivative(u, var);
            let dv = derivative(v, var);
            let (u, v) = ((**u).clone(), (**v).clone());
            match op {
                '+' => add(du, dv),
                '-' => sub(du, dv),
                '*' => add(mul(du, v.clone()), mul(u, dv)),
                '/' => div(
                    sub(mul(du, v.clone()), mul(u, dv)),
                    pow(v, Expr::Number(2.0)),
                ),
                _ => {
                    if v.contains_symbol(var) {
                        // d(u^v) = u^v * (v' ln u + v u'/u)
                        let log_u = call(Function::Log, vec![u.clone()]);
                        let inner = add(mul(dv, log_u), div(mul(v.clone(), du), u.clone()));
                        mul(pow(u, v), inner)
                    } else {
                        let lowered = sub(v.clone(), Expr::Number(1.0));
                        mul(mul(v, pow(u, lowered)), du)
                    }
                }
            }
        }
        Expr::Call(func, args) => {
            let u = args.first().cloned().unwrap_or(Expr::Number(0.0));
            let du = derivative(&u, var);
            match func {
                Function::Sin => mul(call(Function::Cos, vec![u]), du),
                Function::Cos => neg(mul(call(Function::Sin, vec![u]), du)),
                Function::Tan => {
                    let tan_sq = pow(call(Function::Tan, vec![u]), Expr::Number(2.0));
                    mul(add(Expr::Number(1.0), tan_sq), du)
                }
                Function::Exp => mul(call(Function::Exp, vec![u]), du),
                Function::Log => div(du, u),
                Function::Sqrt => div(
                    du,
                    mul(Expr::Number(2.0), call(Function::Sqrt, vec![u])),
                ),
                Function::Abs => mul(call(Function::Csgn, vec![u]), du),
                Function::Atan => div(du, add(Expr::Number(1.0), pow(u, Expr::Number(2.0)))),
                Function::Atan2 => {
                    let x = args.get(1).cloned().unwrap_or(Expr::Number(0.0));
                    let dx = derivative(&x, var);
                    let numerator = sub(mul(x.clone(), du), mul(u.clone(), dx));
                    let denominator = add(
                        pow(x, Expr::Number(2.0)),
                        pow(u, Expr::Number(2.0)),
                    );
                    div(numerator, denominator)
                }
                // Piecewise constant.
                Function::Csgn | Function::Vector => Expr::Number(0.0),
            }
        }
    }
}

/// Replaces symbols by numbers, folding constants on the way up.
pub fn substitute(expr: &Expr, symbols: &[String], values: &[f64]) -> Expr {
    match expr {
        Expr::Number(_) | Expr::Imaginary => expr.clone(),
        Expr::Symbol(name) => symbols
            .iter()
            .zip(values)
            .find(|(s, _)| *s == name)
            .map(|(_, v)| Expr::Number(*v))
            .unwrap_or_else(|| expr.clone()),
        Expr::Unary(_, e) => neg(substitute(e, symbols, values)),
        Expr::Binary(l, op, r) => binary(
            substitute(l, symbols, values),
            *op,
            substitute(r, symbols, values),
        ),
        Expr::Call(func, args) => call(
            *func,
            args.iter()
                .map(|a| substitute(a, symbols, values))
                .collect(),
        ),
    }
}

/// Compiles an AST into bytecode. Any remaining free symbol is an error.
pub struct Compiler;

impl Compiler {
    pub fn compile(expr: &Expr) -> Result<Bytecode, EngineError> {
        let mut ops = Vec::new();
        Self::compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), EngineError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Imaginary => ops.push(OpCode::LoadImaginary),
            Expr::Symbol(name) => return Err(EngineError::UnresolvedSymbol(name.clone())),
            Expr::Binary(left, op, right) => {
                Self::compile_recursive(left, ops)?;
                Self::compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    _ => OpCode::Pow,
                });
            }
            Expr::Unary(_, operand) => {
                Self::compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, args) => {
                for arg in args {
                    Self::compile_recursive(arg, ops)?;
                }
                ops.push(OpCode::Call(*func));
            }
        }
        Ok(())
    }
}

// --- Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, EngineError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some((position, token)) => Err(EngineError::Parse {
            position,
            message: format!("unexpected {token:?}"),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, EngineError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse().map_err(|_| EngineError::Parse {
                position: start,
                message: format!("malformed number '{text}'"),
            })?;
            tokens.push((start, Token::Number(value)));
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((start, Token::Identifier(chars[start..i].iter().collect())));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                _ => {
                    return Err(EngineError::Parse {
                        position: start,
                        message: format!("unexpected character '{c}'"),
                    })
                }
            };
            tokens.push((start, token));
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(usize, Token)> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<(usize, Token)> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(p, _)| *p)
            .unwrap_or(0)
    }

    fn error(&self, message: &str) -> EngineError {
        EngineError::Parse {
            position: self.position(),
            message: message.to_string(),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), EngineError> {
        match self.consume() {
            Some((_, Token::RParen)) => Ok(()),
            _ => Err(self.error("expected ')'")),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, EngineError> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_factor()?;

        while let Some((_, token)) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, EngineError> {
        let mut left = self.parse_unary()?;

        while let Some((_, token)) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        match self.peek() {
            Some((_, Token::Minus)) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary('-', Box::new(expr)))
            }
            Some((_, Token::Plus)) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // `^` binds tighter than unary minus and associates to the right.
    fn parse_power(&mut self) -> Result<Expr, EngineError> {
        let base = self.parse_primary()?;
        if let Some((_, Token::Caret)) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, EngineError> {
        let mut args = Vec::new();
        if let Some((_, Token::RParen)) = self.peek() {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.consume() {
                Some((_, Token::Comma)) => continue,
                Some((_, Token::RParen)) => return Ok(args),
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.consume() {
            Some((_, Token::Number(n))) => Ok(Expr::Number(n)),
            Some((_, Token::Identifier(name))) => {
                if let Some((_, Token::LParen)) = self.peek() {
                    self.consume(); // eat '('
                    let args = self.parse_arguments()?;
                    if name == "pow" {
                        return match <[Expr; 2]>::try_from(args) {
                            Ok([base, exponent]) => {
                                Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)))
                            }
                            Err(args) => Err(EngineError::Arity {
                                name,
                                expected: 2,
                                found: args.len(),
                            }),
                        };
                    }
                    let func = Function::from_name(&name)
                        .ok_or_else(|| EngineError::UnknownFunction(name.clone()))?;
                    if args.len() != func.arity() {
                        return Err(EngineError::Arity {
                            name,
                            expected: func.arity(),
                            found: args.len(),
                        });
                    }
                    Ok(Expr::Call(func, args))
                } else {
                    Ok(match name.as_str() {
                        "I" => Expr::Imaginary,
                        "Pi" => Expr::Number(std::f64::consts::PI),
                        _ => Expr::Symbol(name),
                    })
                }
            }
            Some((_, Token::LParen)) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some((position, token)) => Err(EngineError::Parse {
                position,
                message: format!("unexpected {token:?}"),
            }),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

// --- Engine ---

/// Default `AlgebraEngine`: parses into `Expr`, differentiates symbolically
/// and evaluates through the bytecode VM.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolicEngine;

impl AlgebraEngine for SymbolicEngine {
    type Expr = Expr;

    fn parse(&self, text: &str, symbols: &[String]) -> Result<Expr, EngineError> {
        let expr = parse(text)?;
        for free in expr.free_symbols() {
            if !symbols.contains(&free) {
                log::trace!("identifier '{free}' in '{text}' is not a bound symbol");
            }
        }
        Ok(expr)
    }

    fn differentiate(&self, expr: &Expr, variable: &str, order: u32) -> Result<Expr, EngineError> {
        if variable.is_empty() {
            return Err(EngineError::MissingDifferentiationVariable);
        }
        let mut result = expr.clone();
        for _ in 0..order {
            result = derivative(&result, variable);
        }
        Ok(result)
    }

    fn substitute(&self, expr: &Expr, symbols: &[String], values: &[f64]) -> Expr {
        substitute(expr, symbols, values)
    }

    fn evaluate_numeric(&self, expr: &Expr, ctx: &EvalContext<'_>) -> Result<Complex64, EngineError> {
        let bytecode = Compiler::compile(expr)?;
        let mut stack = Vec::with_capacity(16);
        VM::execute(&bytecode, ctx, &mut stack)
    }
}

impl SymbolicEngine {
    /// Convenience: parse, substitute and evaluate in one go.
    pub fn eval_str(
        &self,
        text: &str,
        symbols: &[String],
        values: &[f64],
    ) -> Result<Complex64, EngineError> {
        let expr = self.parse(text, symbols)?;
        let expr = self.substitute(&expr, symbols, values);
        self.evaluate_numeric(&expr, &EvalContext::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Complex64 {
        SymbolicEngine
            .eval_str(text, &[], &[])
            .expect("expression should evaluate")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn precedence_and_associativity() {
        assert!(close(eval("1 + 2 * 3").re, 7.0));
        assert!(close(eval("2 ^ 3 ^ 2").re, 512.0));
        assert!(close(eval("-2 ^ 2").re, -4.0));
        assert!(close(eval("(1 + 2) * 3 - 4 / 2").re, 7.0));
        assert!(close(eval("1.5e2 + 2E-1").re, 150.2));
    }

    #[test]
    fn functions_and_constants() {
        assert!(close(eval("sin(Pi/2)").re, 1.0));
        assert!(close(eval("atan2(1, 1)").re, std::f64::consts::FRAC_PI_4));
        assert!(close(eval("pow(2, 10)").re, 1024.0));
        assert!(close(eval("csgn(-3)").re, -1.0));
        assert!(close(eval("csgn(0)").re, 0.0));
        assert!(close(eval("abs(-2.5)").re, 2.5));
    }

    #[test]
    fn complex_arithmetic() {
        let z = eval("3 + 2*I");
        assert!(close(z.re, 3.0));
        assert!(close(z.im, 2.0));
        let w = eval("I*I");
        assert!(close(w.re, -1.0));
    }

    #[test]
    fn substitution_binds_symbols() {
        let symbols = vec!["Pulse_Area".to_string(), "Pulse_Duration".to_string()];
        let z = SymbolicEngine
            .eval_str("Pulse_Area / Pulse_Duration", &symbols, &[6.0, 2.0])
            .expect("bound expression");
        assert!(close(z.re, 3.0));
    }

    #[test]
    fn free_symbol_fails_unless_folded_away() {
        let err = SymbolicEngine
            .eval_str("x + 1", &[], &[])
            .expect_err("x is free");
        assert_eq!(err, EngineError::UnresolvedSymbol("x".to_string()));
        assert!(close(eval("0 * x + 4").re, 4.0));
    }

    #[test]
    fn zero_keeps_closed_non_finite_operands() {
        assert!(eval("0 * (1/0)").re.is_nan());
        assert!(eval("log(0) * 0").re.is_nan());
        assert!(eval("0 / (0/0)").re.is_nan());
        assert_eq!(
            substitute(&parse("0 * (1/0)").expect("parse"), &[], &[]),
            parse("0 * (1/0)").expect("parse")
        );
    }

    #[test]
    fn derivatives_of_common_forms() {
        let engine = SymbolicEngine;
        let x = vec!["x".to_string()];
        let cases = [
            ("x*x", 1, 3.0, 6.0),
            ("x^3", 2, 2.0, 12.0),
            ("sin(x)", 1, 0.0, 1.0),
            ("exp(2*x)", 1, 0.0, 2.0),
            ("1/x", 1, 2.0, -0.25),
            ("2^x", 1, 0.0, std::f64::consts::LN_2),
            ("sqrt(x)", 1, 4.0, 0.25),
            ("csgn(x)", 1, 1.0, 0.0),
        ];
        for (text, order, at, expected) in cases {
            let expr = engine.parse(text, &x).expect("parse");
            let d = engine.differentiate(&expr, "x", order).expect("diff");
            let d = engine.substitute(&d, &x, &[at]);
            let value = engine
                .evaluate_numeric(&d, &EvalContext::new())
                .expect("eval");
            assert!(
                (value.re - expected).abs() < 1e-9,
                "d^{order}/dx^{order} {text} at {at}: expected {expected}, got {}",
                value.re
            );
        }
    }

    #[test]
    fn differentiation_drops_constant_terms() {
        let expr = parse("x*x + y").expect("parse");
        let d = derivative(&expr, "x");
        assert!(!d.contains_symbol("y"));
        assert_eq!(d.free_symbols(), vec!["x".to_string()]);
    }

    #[test]
    fn vector_reads_context() {
        let expr = parse("2 * Vector(1)").expect("parse");
        let data = [1.0, 5.0];
        let z = SymbolicEngine
            .evaluate_numeric(&expr, &EvalContext::with_vector(&data))
            .expect("vector eval");
        assert!(close(z.re, 10.0));
        let err = SymbolicEngine
            .evaluate_numeric(&expr, &EvalContext::new())
            .expect_err("no vector");
        assert_eq!(err, EngineError::VectorIndex { index: 1, len: 0 });
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(parse("1 +"), Err(EngineError::Parse { .. })));
        assert!(matches!(parse("(1 + 2"), Err(EngineError::Parse { .. })));
        assert!(matches!(parse("1 $ 2"), Err(EngineError::Parse { .. })));
        assert!(matches!(parse("1 2"), Err(EngineError::Parse { .. })));
        assert_eq!(
            parse("foo(1)"),
            Err(EngineError::UnknownFunction("foo".to_string()))
        );
        assert!(matches!(parse("atan2(1)"), Err(EngineError::Arity { .. })));
    }
}
