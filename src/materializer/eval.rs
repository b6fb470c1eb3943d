//! Evaluation of compiled component modules: capability primitives, the step
//! budget, expression evaluation and HTML rendering.

use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use super::compiler::{AttrValue, BinOp, Expr, Node};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("type error: {0}")]
    Type(String),

    #[error("invalid argument to `{name}`: {message}")]
    Argument { name: String, message: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("evaluation budget of {0} steps exhausted")]
    FuelExhausted(u64),

    #[error("rendered markup exceeds {0} bytes")]
    OutputTooLarge(usize),
}

/// A rendering primitive a component may import.
pub type Primitive = fn(&[Value]) -> Result<Value, EvalError>;

/// Allow-list of primitives injected into component modules.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    primitives: HashMap<String, Primitive>,
}

impl Capabilities {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hook stand-ins for a static render plus a few formatting helpers.
    pub fn standard() -> Self {
        Self::empty()
            .with("useState", use_state)
            .with("useMemo", use_value)
            .with("useRef", use_ref)
            .with("useEffect", no_op)
            .with("useCallback", no_op)
            .with("upper", upper)
            .with("lower", lower)
            .with("len", len)
            .with("join", join)
            .with("json", json)
            .with("fallback", fallback)
    }

    pub fn with(mut self, name: &str, primitive: Primitive) -> Self {
        self.primitives.insert(name.to_string(), primitive);
        self
    }

    /// Keep only the listed primitives.
    pub fn only(mut self, names: &[&str]) -> Self {
        self.primitives.retain(|name, _| names.contains(&name.as_str()));
        self
    }

    pub fn get(&self, name: &str) -> Option<Primitive> {
        self.primitives.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primitives.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Primitives
// ============================================================================

fn first(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or(Value::Null)
}

fn string_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a str, EvalError> {
    match args.first() {
        Some(Value::String(s)) => Ok(s),
        other => Err(EvalError::Argument {
            name: name.to_string(),
            message: format!("expected a string, got {}", type_name(other.unwrap_or(&Value::Null))),
        }),
    }
}

/// `[initial, setter]`; the setter is inert in a static render.
fn use_state(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Array(vec![first(args), Value::Null]))
}

fn use_value(args: &[Value]) -> Result<Value, EvalError> {
    Ok(first(args))
}

fn use_ref(args: &[Value]) -> Result<Value, EvalError> {
    let mut object = Map::new();
    object.insert("current".to_string(), first(args));
    Ok(Value::Object(object))
}

fn no_op(_: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Null)
}

fn upper(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::String(string_arg("upper", args)?.to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::String(string_arg("lower", args)?.to_lowercase()))
}

fn len(args: &[Value]) -> Result<Value, EvalError> {
    let n = match args.first() {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        None | Some(Value::Null) => 0,
        Some(other) => {
            return Err(EvalError::Argument {
                name: "len".to_string(),
                message: format!("{} has no length", type_name(other)),
            })
        }
    };
    Ok(Value::from(n as u64))
}

fn join(args: &[Value]) -> Result<Value, EvalError> {
    let items = match args.first() {
        Some(Value::Array(items)) => items,
        other => {
            return Err(EvalError::Argument {
                name: "join".to_string(),
                message: format!(
                    "expected an array, got {}",
                    type_name(other.unwrap_or(&Value::Null))
                ),
            })
        }
    };
    let separator = match args.get(1) {
        Some(value) => display(value),
        None => ",".to_string(),
    };
    let parts: Vec<String> = items.iter().map(display).collect();
    Ok(Value::String(parts.join(&separator)))
}

fn json(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::String(first(args).to_string()))
}

fn fallback(args: &[Value]) -> Result<Value, EvalError> {
    match args.first() {
        None | Some(Value::Null) => Ok(args.get(1).cloned().unwrap_or(Value::Null)),
        Some(Value::String(s)) if s.is_empty() => Ok(args.get(1).cloned().unwrap_or(Value::Null)),
        Some(value) => Ok(value.clone()),
    }
}

// ============================================================================
// Values
// ============================================================================

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// String form used by `+` concatenation and attribute values.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => display_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn number_value(f: f64) -> Result<Value, EvalError> {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| EvalError::Type("arithmetic produced a non-finite number".to_string()))
}

fn arithmetic(op: BinOp, left: Value, right: Value) -> Result<Value, EvalError> {
    if op == BinOp::Add {
        if let (Value::Number(a), Value::Number(b)) = (&left, &right) {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                if let Some(sum) = a.checked_add(b) {
                    return Ok(Value::from(sum));
                }
            }
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            return number_value(a + b);
        }
        return Ok(Value::String(format!("{}{}", display(&left), display(&right))));
    }

    let (a, b) = match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => (
            a.as_f64().unwrap_or(f64::NAN),
            b.as_f64().unwrap_or(f64::NAN),
        ),
        _ => {
            return Err(EvalError::Type(format!(
                "cannot apply `{}` to {} and {}",
                op.symbol(),
                type_name(&left),
                type_name(&right)
            )))
        }
    };

    match op {
        BinOp::Sub => number_value(a - b),
        BinOp::Mul => number_value(a * b),
        BinOp::Div if b == 0.0 => Err(EvalError::DivisionByZero),
        BinOp::Div => number_value(a / b),
        BinOp::Add => unreachable!("handled above"),
    }
}

fn member(target: Value, field: &str) -> Result<Value, EvalError> {
    match target {
        Value::Object(mut map) => Ok(map.remove(field).unwrap_or(Value::Null)),
        Value::Array(items) if field == "length" => Ok(Value::from(items.len() as u64)),
        Value::String(s) if field == "length" => Ok(Value::from(s.chars().count() as u64)),
        Value::Null => Err(EvalError::Type(format!(
            "cannot read `{}` of null",
            field
        ))),
        _ => Ok(Value::Null),
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Bytes of produced value that cost one extra step.
pub const BYTES_PER_STEP: u64 = 64;

/// Upper bound on the HTML a single render may produce.
pub const MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Approximate heap footprint of a value in bytes.
fn value_size(value: &Value) -> u64 {
    match value {
        Value::String(s) => s.len() as u64,
        Value::Array(items) => items.len() as u64 + items.iter().map(value_size).sum::<u64>(),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| key.len() as u64 + value_size(item))
            .sum(),
        _ => 1,
    }
}

/// Remaining evaluation steps. Every expression costs one step plus one
/// per `BYTES_PER_STEP` bytes of the value it produces.
#[derive(Debug)]
pub struct Fuel {
    limit: u64,
    remaining: u64,
}

impl Fuel {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    fn burn(&mut self) -> Result<(), EvalError> {
        if self.remaining == 0 {
            return Err(EvalError::FuelExhausted(self.limit));
        }
        self.remaining -= 1;
        Ok(())
    }

    fn charge(&mut self, value: &Value) -> Result<(), EvalError> {
        let steps = value_size(value) / BYTES_PER_STEP;
        if steps > self.remaining {
            self.remaining = 0;
            return Err(EvalError::FuelExhausted(self.limit));
        }
        self.remaining -= steps;
        Ok(())
    }
}

/// Names visible to an expression. Calls were resolved against the
/// capability allow-list at compile time.
pub struct Scope<'a> {
    pub bindings: &'a HashMap<String, Value>,
    pub primitives: &'a HashMap<String, Primitive>,
    pub props: Option<&'a Value>,
}

pub fn eval(expr: &Expr, scope: &Scope<'_>, fuel: &mut Fuel) -> Result<Value, EvalError> {
    fuel.burn()?;
    let value = eval_step(expr, scope, fuel)?;
    fuel.charge(&value)?;
    Ok(value)
}

fn eval_step(expr: &Expr, scope: &Scope<'_>, fuel: &mut Fuel) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, scope, fuel))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Ident(name) => {
            if name == "props" {
                if let Some(props) = scope.props {
                    return Ok(props.clone());
                }
            }
            scope
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Type(format!("`{}` is not defined", name)))
        }
        Expr::Member(target, field) => member(eval(target, scope, fuel)?, field),
        Expr::Call(name, args) => {
            let primitive = scope
                .primitives
                .get(name)
                .ok_or_else(|| EvalError::Type(format!("`{}` is not a function", name)))?;
            let args = args
                .iter()
                .map(|arg| eval(arg, scope, fuel))
                .collect::<Result<Vec<_>, _>>()?;
            primitive(&args)
        }
        Expr::Neg(inner) => match eval(inner, scope, fuel)? {
            Value::Number(n) => number_value(-n.as_f64().unwrap_or(f64::NAN)),
            other => Err(EvalError::Type(format!(
                "cannot negate {}",
                type_name(&other)
            ))),
        },
        Expr::Binary(op, left, right) => {
            let left = eval(left, scope, fuel)?;
            let right = eval(right, scope, fuel)?;
            arithmetic(*op, left, right)
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn html_attr_name(name: &str) -> &str {
    match name {
        "className" => "class",
        "htmlFor" => "for",
        other => other,
    }
}

/// Text children: null and booleans render nothing, arrays render their items.
fn render_child(value: &Value, out: &mut String) -> Result<(), EvalError> {
    match value {
        Value::Null | Value::Bool(_) => Ok(()),
        Value::String(s) => {
            out.push_str(&escape_html(s));
            Ok(())
        }
        Value::Number(n) => {
            out.push_str(&display_number(n));
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| render_child(item, out)),
        Value::Object(_) => Err(EvalError::Type(
            "objects are not valid as markup children".to_string(),
        )),
    }
}

fn check_output(out: &str) -> Result<(), EvalError> {
    if out.len() > MAX_OUTPUT_BYTES {
        return Err(EvalError::OutputTooLarge(MAX_OUTPUT_BYTES));
    }
    Ok(())
}

pub fn render_node(
    node: &Node,
    scope: &Scope<'_>,
    fuel: &mut Fuel,
    out: &mut String,
) -> Result<(), EvalError> {
    fuel.burn()?;
    check_output(out)?;
    render_step(node, scope, fuel, out)?;
    check_output(out)
}

fn render_step(
    node: &Node,
    scope: &Scope<'_>,
    fuel: &mut Fuel,
    out: &mut String,
) -> Result<(), EvalError> {
    match node {
        Node::Text(text) => {
            out.push_str(&escape_html(text));
            Ok(())
        }
        Node::Interp(expr) => {
            let value = eval(expr, scope, fuel)?;
            render_child(&value, out)
        }
        Node::Element {
            tag,
            attrs,
            children,
        } => {
            if tag.is_empty() {
                return children
                    .iter()
                    .try_for_each(|child| render_node(child, scope, fuel, out));
            }

            out.push('<');
            out.push_str(tag);
            for attr in attrs {
                let value = match &attr.value {
                    AttrValue::Flag => Value::Bool(true),
                    AttrValue::Literal(s) => Value::String(s.clone()),
                    AttrValue::Expr(expr) => eval(expr, scope, fuel)?,
                };
                match value {
                    Value::Null | Value::Bool(false) => {}
                    Value::Bool(true) => {
                        out.push(' ');
                        out.push_str(html_attr_name(&attr.name));
                    }
                    other => {
                        out.push(' ');
                        out.push_str(html_attr_name(&attr.name));
                        out.push_str("=\"");
                        out.push_str(&escape_html(&display(&other)));
                        out.push('"');
                    }
                }
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return Ok(());
            }
            for child in children {
                render_node(child, scope, fuel, out)?;
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
            Ok(())
        }
    }
}
