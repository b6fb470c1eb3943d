//! Parser for component modules.
//!
//! A module is a sequence of directive strings, `import { .. } from '..'`
//! statements and `const`/`let` bindings, closed by an `export default`
//! markup expression:
//!
//! ```text
//! 'use client';
//! import { useState } from 'react';
//! const [count, setCount] = useState(0);
//! export default (<p className="n">{count + 1}</p>);
//! ```

use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("`{0}` is not defined")]
    Undefined(String),

    #[error("`{0}` is not a function")]
    NotCallable(String),

    #[error("`{0}` is a function and cannot be used as a value")]
    NotAValue(String),

    #[error("`{0}` is declared more than once")]
    Duplicate(String),

    #[error("capability `{0}` is not available to components")]
    Capability(String),

    #[error("module has no default export")]
    MissingDefaultExport,
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Member(Box<Expr>, String),
    Call(String, Vec<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Flag,
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: AttrValue,
}

/// Markup tree. An element with an empty tag is a fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Interp(Expr),
    Element {
        tag: String,
        attrs: Vec<Attr>,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub name: String,
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Name(String),
    Array(Vec<String>),
}

impl Pattern {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Pattern::Name(name) => vec![name.as_str()],
            Pattern::Array(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub pattern: Pattern,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAst {
    pub imports: Vec<Import>,
    pub bindings: Vec<Binding>,
    pub body: Node,
}

// ============================================================================
// Cursor
// ============================================================================

/// Deepest expression or markup nesting a module may use. Compilation,
/// evaluation and rendering all recurse along this depth.
pub const MAX_NESTING: usize = 128;

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let consumed = &self.src[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rsplit('\n')
            .next()
            .map_or(0, |tail| tail.chars().count())
            + 1;
        CompileError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), CompileError> {
        self.skip_trivia()?;
        if self.eat(c) {
            Ok(())
        } else {
            let found = self
                .peek()
                .map_or_else(|| "end of input".to_string(), |f| format!("`{}`", f));
            Err(self.error(format!("expected `{}`, found {}", c, found)))
        }
    }

    /// Whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.pos;
                    match self.rest()[2..].find("*/") {
                        Some(end) => self.pos += 2 + end + 2,
                        None => {
                            self.pos = start;
                            return Err(self.error("unterminated comment"));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
            _ => return None,
        }
        let end = chars
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        Some(&rest[..end])
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !keep(*c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        &rest[..end]
    }

    fn string_literal(&mut self) -> Result<String, CompileError> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"' | '`')) => q,
            _ => return Err(self.error("expected a string literal")),
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some('\n') if quote != '`' => {
                    return Err(self.error("unterminated string literal"))
                }
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some('$') if quote == '`' && self.peek() == Some('{') => {
                    return Err(self.error("template interpolation is not supported"))
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn number_literal(&mut self) -> Result<Value, CompileError> {
        let digits = self.take_while(|c| c.is_ascii_digit() || c == '.');
        if !digits.contains('.') {
            if let Ok(n) = digits.parse::<i64>() {
                return Ok(Value::from(n));
            }
        }
        digits
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error(format!("invalid number `{}`", digits)))
    }
}

const RESERVED: &[&str] = &[
    "const", "let", "var", "import", "export", "default", "from", "function", "return", "true",
    "false", "null", "undefined", "props",
];

// ============================================================================
// Statements
// ============================================================================

pub fn parse_module(source: &str) -> Result<ModuleAst, CompileError> {
    let mut cur = Cursor::new(source);
    let mut imports = Vec::new();
    let mut bindings = Vec::new();

    loop {
        cur.skip_trivia()?;
        let Some(next) = cur.peek() else {
            return Err(CompileError::MissingDefaultExport);
        };

        if matches!(next, '\'' | '"') {
            // Directive prologue such as 'use client'.
            cur.string_literal()?;
            cur.skip_trivia()?;
            cur.eat(';');
            continue;
        }

        let start = cur.pos;
        let word = cur
            .ident()
            .ok_or_else(|| cur.error(format!("unexpected character `{}`", next)))?;
        match word {
            "import" => imports.extend(parse_import(&mut cur)?),
            "const" | "let" => bindings.push(parse_binding(&mut cur)?),
            "export" => {
                cur.skip_trivia()?;
                if cur.ident() != Some("default") {
                    return Err(cur.error("expected `default` after `export`"));
                }
                let body = parse_export_body(&mut cur)?;
                cur.skip_trivia()?;
                cur.eat(';');
                cur.skip_trivia()?;
                if cur.peek().is_some() {
                    return Err(cur.error("unexpected content after the default export"));
                }
                return Ok(ModuleAst {
                    imports,
                    bindings,
                    body,
                });
            }
            other => {
                cur.pos = start;
                return Err(cur.error(format!("unexpected `{}`", other)));
            }
        }
    }
}

fn parse_import(cur: &mut Cursor<'_>) -> Result<Vec<Import>, CompileError> {
    let mut names = Vec::new();
    cur.skip_trivia()?;

    if matches!(cur.peek(), Some('\'' | '"')) {
        // Side-effect import: nothing is bound.
        cur.string_literal()?;
        cur.skip_trivia()?;
        cur.eat(';');
        return Ok(names);
    }

    if let Some(default) = cur.ident() {
        names.push(Import {
            name: default.to_string(),
            default: true,
        });
        cur.skip_trivia()?;
        if cur.eat(',') {
            cur.skip_trivia()?;
        }
    }

    if cur.eat('{') {
        loop {
            cur.skip_trivia()?;
            if cur.eat('}') {
                break;
            }
            let name = cur
                .ident()
                .ok_or_else(|| cur.error("expected an imported name"))?;
            names.push(Import {
                name: name.to_string(),
                default: false,
            });
            cur.skip_trivia()?;
            if cur.starts_with("as") {
                return Err(cur.error("renamed imports are not supported"));
            }
            if !cur.eat(',') {
                cur.expect('}')?;
                break;
            }
        }
    }

    cur.skip_trivia()?;
    if cur.ident() != Some("from") {
        return Err(cur.error("expected `from` in import"));
    }
    cur.skip_trivia()?;
    cur.string_literal()?;
    cur.skip_trivia()?;
    cur.eat(';');
    Ok(names)
}

fn binding_name(cur: &mut Cursor<'_>) -> Result<String, CompileError> {
    cur.skip_trivia()?;
    let start = cur.pos;
    let name = cur
        .ident()
        .ok_or_else(|| cur.error("expected a binding name"))?;
    if RESERVED.contains(&name) {
        cur.pos = start;
        return Err(cur.error(format!("`{}` cannot be used as a binding name", name)));
    }
    Ok(name.to_string())
}

fn parse_binding(cur: &mut Cursor<'_>) -> Result<Binding, CompileError> {
    cur.skip_trivia()?;
    let pattern = if cur.eat('[') {
        let mut names = Vec::new();
        loop {
            cur.skip_trivia()?;
            if cur.eat(']') {
                break;
            }
            names.push(binding_name(cur)?);
            cur.skip_trivia()?;
            if !cur.eat(',') {
                cur.expect(']')?;
                break;
            }
        }
        Pattern::Array(names)
    } else {
        Pattern::Name(binding_name(cur)?)
    };

    cur.expect('=')?;
    let expr = parse_expr(cur)?;
    cur.skip_trivia()?;
    cur.eat(';');
    Ok(Binding { pattern, expr })
}

fn parse_export_body(cur: &mut Cursor<'_>) -> Result<Node, CompileError> {
    cur.skip_trivia()?;
    if cur.eat('(') {
        cur.skip_trivia()?;
        let node = parse_element(cur)?;
        cur.expect(')')?;
        return Ok(node);
    }
    parse_element(cur)
}

// ============================================================================
// Expressions
// ============================================================================

// Operator chains nest to the left, so every link counts as one level of
// depth until the chain is complete.

fn parse_expr(cur: &mut Cursor<'_>) -> Result<Expr, CompileError> {
    cur.descend()?;
    let mut left = parse_term(cur)?;
    let mut links = 1;
    loop {
        cur.skip_trivia()?;
        let op = match cur.peek() {
            Some('+') => BinOp::Add,
            Some('-') => BinOp::Sub,
            _ => break,
        };
        cur.bump();
        cur.descend()?;
        links += 1;
        let right = parse_term(cur)?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
    cur.ascend(links);
    Ok(left)
}

fn parse_term(cur: &mut Cursor<'_>) -> Result<Expr, CompileError> {
    let mut left = parse_unary(cur)?;
    let mut links = 0;
    loop {
        cur.skip_trivia()?;
        let op = match cur.peek() {
            Some('*') => BinOp::Mul,
            Some('/') => BinOp::Div,
            _ => break,
        };
        cur.bump();
        cur.descend()?;
        links += 1;
        let right = parse_unary(cur)?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
    cur.ascend(links);
    Ok(left)
}

fn parse_unary(cur: &mut Cursor<'_>) -> Result<Expr, CompileError> {
    cur.skip_trivia()?;
    if cur.eat('-') {
        cur.descend()?;
        let inner = parse_unary(cur)?;
        cur.ascend(1);
        return Ok(Expr::Neg(Box::new(inner)));
    }
    let mut expr = parse_primary(cur)?;
    let mut links = 0;
    loop {
        cur.skip_trivia()?;
        if !cur.eat('.') {
            break;
        }
        cur.descend()?;
        links += 1;
        cur.skip_trivia()?;
        let field = cur
            .ident()
            .ok_or_else(|| cur.error("expected a property name after `.`"))?;
        expr = Expr::Member(Box::new(expr), field.to_string());
    }
    cur.ascend(links);
    Ok(expr)
}

fn parse_list(cur: &mut Cursor<'_>, close: char) -> Result<Vec<Expr>, CompileError> {
    let mut items = Vec::new();
    loop {
        cur.skip_trivia()?;
        if cur.eat(close) {
            return Ok(items);
        }
        items.push(parse_expr(cur)?);
        cur.skip_trivia()?;
        if !cur.eat(',') {
            cur.expect(close)?;
            return Ok(items);
        }
    }
}

fn parse_primary(cur: &mut Cursor<'_>) -> Result<Expr, CompileError> {
    cur.skip_trivia()?;
    match cur.peek() {
        Some(c) if c.is_ascii_digit() => Ok(Expr::Literal(cur.number_literal()?)),
        Some('\'' | '"' | '`') => Ok(Expr::Literal(Value::String(cur.string_literal()?))),
        Some('(') => {
            cur.bump();
            let inner = parse_expr(cur)?;
            cur.expect(')')?;
            Ok(inner)
        }
        Some('[') => {
            cur.bump();
            Ok(Expr::Array(parse_list(cur, ']')?))
        }
        Some(_) => {
            let Some(word) = cur.ident() else {
                let found = cur.peek().unwrap_or(' ');
                return Err(cur.error(format!("unexpected character `{}`", found)));
            };
            match word {
                "true" => return Ok(Expr::Literal(Value::Bool(true))),
                "false" => return Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => return Ok(Expr::Literal(Value::Null)),
                _ => {}
            }
            cur.skip_trivia()?;
            if cur.eat('(') {
                let args = parse_list(cur, ')')?;
                return Ok(Expr::Call(word.to_string(), args));
            }
            Ok(Expr::Ident(word.to_string()))
        }
        None => Err(cur.error("unexpected end of input")),
    }
}

// ============================================================================
// Markup
// ============================================================================

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn is_attr_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':')
}

fn is_event_handler(name: &str) -> bool {
    name.len() > 2
        && name.starts_with("on")
        && name[2..].starts_with(|c: char| c.is_ascii_uppercase())
}

/// JSX text rules: runs that span lines are trimmed per line and re-joined.
fn normalize_text(raw: &str) -> Option<String> {
    if !raw.contains('\n') {
        return (!raw.is_empty()).then(|| raw.to_string());
    }
    let joined = raw
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// Skip a `{ .. }` attribute value without parsing it.
fn skip_braced(cur: &mut Cursor<'_>) -> Result<(), CompileError> {
    let mut depth = 1usize;
    while depth > 0 {
        match cur.peek() {
            None => return Err(cur.error("unclosed `{` in attribute")),
            Some('\'' | '"' | '`') => {
                cur.string_literal()?;
            }
            Some('{') => {
                cur.bump();
                depth += 1;
            }
            Some('}') => {
                cur.bump();
                depth -= 1;
            }
            Some(_) => {
                cur.bump();
            }
        }
    }
    Ok(())
}

fn parse_element(cur: &mut Cursor<'_>) -> Result<Node, CompileError> {
    cur.descend()?;
    let node = parse_element_body(cur)?;
    cur.ascend(1);
    Ok(node)
}

fn parse_element_body(cur: &mut Cursor<'_>) -> Result<Node, CompileError> {
    if !cur.eat('<') {
        return Err(cur.error("expected markup"));
    }
    let tag = cur.take_while(is_tag_char).to_string();
    let mut attrs = Vec::new();

    loop {
        cur.skip_trivia()?;
        if cur.starts_with("/>") {
            cur.pos += 2;
            return Ok(Node::Element {
                tag,
                attrs,
                children: Vec::new(),
            });
        }
        if cur.eat('>') {
            break;
        }
        if tag.is_empty() {
            return Err(cur.error("fragments cannot have attributes"));
        }

        let name = cur.take_while(is_attr_char).to_string();
        if name.is_empty() {
            let found = cur.peek().map_or_else(|| "end of input".to_string(), |c| format!("`{}`", c));
            return Err(cur.error(format!("expected an attribute name, found {}", found)));
        }
        cur.skip_trivia()?;
        if !cur.eat('=') {
            attrs.push(Attr {
                name,
                value: AttrValue::Flag,
            });
            continue;
        }

        cur.skip_trivia()?;
        match cur.peek() {
            Some('\'' | '"') => {
                let value = cur.string_literal()?;
                attrs.push(Attr {
                    name,
                    value: AttrValue::Literal(value),
                });
            }
            Some('{') => {
                cur.bump();
                if is_event_handler(&name) {
                    // Event handlers never run in a static render.
                    skip_braced(cur)?;
                    continue;
                }
                let expr = parse_expr(cur)?;
                cur.expect('}')?;
                attrs.push(Attr {
                    name,
                    value: AttrValue::Expr(expr),
                });
            }
            _ => return Err(cur.error(format!("expected a value for `{}`", name))),
        }
    }

    let mut children = Vec::new();
    loop {
        if cur.starts_with("</") {
            cur.pos += 2;
            let closing = cur.take_while(is_tag_char);
            if closing != tag {
                return Err(cur.error(format!(
                    "expected `</{}>`, found `</{}>`",
                    tag, closing
                )));
            }
            cur.expect('>')?;
            return Ok(Node::Element {
                tag,
                attrs,
                children,
            });
        }

        match cur.peek() {
            None => return Err(cur.error(format!("unclosed `<{}>`", tag))),
            Some('<') => children.push(parse_element(cur)?),
            Some('{') => {
                cur.bump();
                cur.skip_trivia()?;
                if cur.eat('}') {
                    continue;
                }
                let expr = parse_expr(cur)?;
                cur.expect('}')?;
                children.push(Node::Interp(expr));
            }
            Some(_) => {
                let raw = cur.take_while(|c| c != '<' && c != '{');
                if let Some(text) = normalize_text(raw) {
                    children.push(Node::Text(text));
                }
            }
        }
    }
}
