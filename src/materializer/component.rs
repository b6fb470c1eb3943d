//! Compiled component artifacts.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use super::compiler::{parse_module, AttrValue, CompileError, Expr, Node, Pattern};
use super::eval::{eval, render_node, type_name, Capabilities, EvalError, Fuel, Primitive, Scope};
use super::MaterializeError;

/// Name a default import may bind; the markup runtime is implicit.
const RUNTIME_DEFAULT_IMPORT: &str = "React";

/// Content address of a component source, `sha256:<hex>`.
pub fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// A materialized component: module bindings already evaluated, markup ready
/// to render against props.
#[derive(Debug)]
pub struct CompiledComponent {
    hash: String,
    primitives: HashMap<String, Primitive>,
    bindings: HashMap<String, Value>,
    body: Node,
    fuel: u64,
}

impl CompiledComponent {
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Primitives the module imported, sorted.
    pub fn capabilities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primitives.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render the default export to HTML. `props` is visible to the markup as
    /// `props`; every dynamic value is escaped.
    pub fn render(&self, props: &Value) -> Result<String, EvalError> {
        let scope = Scope {
            bindings: &self.bindings,
            primitives: &self.primitives,
            props: Some(props),
        };
        let mut fuel = Fuel::new(self.fuel);
        let mut out = String::new();
        render_node(&self.body, &scope, &mut fuel, &mut out)?;
        Ok(out)
    }
}

struct StaticScope<'a> {
    defined: &'a HashSet<String>,
    primitives: &'a HashMap<String, Primitive>,
    props: bool,
}

fn check_expr(expr: &Expr, scope: &StaticScope<'_>) -> Result<(), CompileError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Array(items) => items.iter().try_for_each(|item| check_expr(item, scope)),
        Expr::Ident(name) => {
            if (name == "props" && scope.props) || scope.defined.contains(name) {
                Ok(())
            } else if scope.primitives.contains_key(name) {
                Err(CompileError::NotAValue(name.clone()))
            } else {
                Err(CompileError::Undefined(name.clone()))
            }
        }
        Expr::Member(target, _) => check_expr(target, scope),
        Expr::Call(name, args) => {
            if scope.primitives.contains_key(name) {
                args.iter().try_for_each(|arg| check_expr(arg, scope))
            } else if scope.defined.contains(name) || (name == "props" && scope.props) {
                Err(CompileError::NotCallable(name.clone()))
            } else {
                Err(CompileError::Undefined(name.clone()))
            }
        }
        Expr::Neg(inner) => check_expr(inner, scope),
        Expr::Binary(_, left, right) => {
            check_expr(left, scope)?;
            check_expr(right, scope)
        }
    }
}

fn check_node(node: &Node, scope: &StaticScope<'_>) -> Result<(), CompileError> {
    match node {
        Node::Text(_) => Ok(()),
        Node::Interp(expr) => check_expr(expr, scope),
        Node::Element {
            tag,
            attrs,
            children,
        } => {
            // Capitalized tags name components; none are in scope.
            if tag.starts_with(|c: char| c.is_ascii_uppercase()) {
                return Err(CompileError::Undefined(tag.clone()));
            }
            for attr in attrs {
                if let AttrValue::Expr(expr) = &attr.value {
                    check_expr(expr, scope)?;
                }
            }
            children.iter().try_for_each(|child| check_node(child, scope))
        }
    }
}

fn destructure(pattern: &Pattern, value: Value) -> Result<Vec<(String, Value)>, EvalError> {
    match pattern {
        Pattern::Name(name) => Ok(vec![(name.clone(), value)]),
        Pattern::Array(names) => match value {
            Value::Array(mut items) => {
                items.resize(names.len().max(items.len()), Value::Null);
                Ok(names.iter().cloned().zip(items).collect())
            }
            other => Err(EvalError::Type(format!(
                "cannot destructure {} as an array",
                type_name(&other)
            ))),
        },
    }
}

/// Parse, check and evaluate a module against the capability allow-list.
/// `fuel` bounds module evaluation here and each later render separately.
pub fn compile(
    source: &str,
    capabilities: &Capabilities,
    fuel: u64,
) -> Result<CompiledComponent, MaterializeError> {
    let ast = parse_module(source)?;

    let mut primitives = HashMap::new();
    for import in &ast.imports {
        if import.default {
            if import.name != RUNTIME_DEFAULT_IMPORT {
                return Err(CompileError::Capability(import.name.clone()).into());
            }
            continue;
        }
        let primitive = capabilities
            .get(&import.name)
            .ok_or_else(|| CompileError::Capability(import.name.clone()))?;
        if primitives.insert(import.name.clone(), primitive).is_some() {
            return Err(CompileError::Duplicate(import.name.clone()).into());
        }
    }

    let mut defined = HashSet::new();
    let mut bindings = HashMap::new();
    let mut budget = Fuel::new(fuel);
    for binding in &ast.bindings {
        check_expr(
            &binding.expr,
            &StaticScope {
                defined: &defined,
                primitives: &primitives,
                props: false,
            },
        )?;

        let scope = Scope {
            bindings: &bindings,
            primitives: &primitives,
            props: None,
        };
        let value = eval(&binding.expr, &scope, &mut budget)?;
        for (name, value) in destructure(&binding.pattern, value)? {
            if primitives.contains_key(&name) || !defined.insert(name.clone()) {
                return Err(CompileError::Duplicate(name).into());
            }
            bindings.insert(name, value);
        }
    }

    check_node(
        &ast.body,
        &StaticScope {
            defined: &defined,
            primitives: &primitives,
            props: true,
        },
    )?;

    Ok(CompiledComponent {
        hash: content_hash(source),
        primitives,
        bindings,
        body: ast.body,
        fuel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SEED_COMPONENT;
    use serde_json::json;

    fn build(source: &str) -> Result<CompiledComponent, MaterializeError> {
        compile(source, &Capabilities::standard(), 10_000)
    }

    #[test]
    fn test_seed_component_renders() {
        let component = build(SEED_COMPONENT).unwrap();
        let html = component.render(&json!({})).unwrap();

        assert!(html.starts_with(r#"<div class="p-4"><h2 class="text-xl font-bold mb-4">示例页面</h2>"#));
        assert!(html.contains("<p>当前计数: 0</p>"));
        assert!(html.contains(">增加计数</button>"));
        assert!(!html.contains("onClick"));
        assert_eq!(component.capabilities(), vec!["useState"]);
    }

    #[test]
    fn test_content_hash_format() {
        let hash = content_hash("abc");
        assert_eq!(
            hash,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(build("export default <p/>").unwrap().hash(), content_hash("export default <p/>"));
    }

    #[test]
    fn test_undefined_identifier_names_it() {
        let err = build("export default <p>{missingThing}</p>").unwrap_err();
        assert_eq!(err.to_string(), "`missingThing` is not defined");

        let err = build("const a = b + 1; const b = 2; export default <p/>").unwrap_err();
        assert_eq!(err.to_string(), "`b` is not defined");
    }

    #[test]
    fn test_import_outside_allow_list_is_rejected() {
        let err = build("import { fetch } from 'net'; export default <p/>").unwrap_err();
        assert!(matches!(
            err,
            MaterializeError::Compile(CompileError::Capability(ref name)) if name == "fetch"
        ));

        let restricted = Capabilities::standard().only(&["useState"]);
        let err = compile("import { upper } from 'react'; export default <p/>", &restricted, 100)
            .unwrap_err();
        assert_eq!(err.to_string(), "capability `upper` is not available to components");
    }

    #[test]
    fn test_unimported_primitive_is_undefined() {
        let err = build("const a = upper('x'); export default <p/>").unwrap_err();
        assert_eq!(err.to_string(), "`upper` is not defined");
    }

    #[test]
    fn test_calls_and_values_are_distinguished() {
        let err = build("const a = 1; const b = a(); export default <p/>").unwrap_err();
        assert!(matches!(err, MaterializeError::Compile(CompileError::NotCallable(_))));

        let err = build("import { upper } from 'react'; export default <p>{upper}</p>").unwrap_err();
        assert!(matches!(err, MaterializeError::Compile(CompileError::NotAValue(_))));
    }

    #[test]
    fn test_component_tags_are_undefined() {
        let err = build("export default <div><Header /></div>").unwrap_err();
        assert_eq!(err.to_string(), "`Header` is not defined");
    }

    #[test]
    fn test_duplicate_binding() {
        let err = build("const a = 1; let a = 2; export default <p/>").unwrap_err();
        assert!(matches!(err, MaterializeError::Compile(CompileError::Duplicate(_))));
    }

    #[test]
    fn test_module_evaluation_errors_surface() {
        let err = build("const a = 1 / 0; export default <p/>").unwrap_err();
        assert!(matches!(err, MaterializeError::Eval(EvalError::DivisionByZero)));

        let err = build("const [a] = 5; export default <p/>").unwrap_err();
        assert!(err.to_string().contains("cannot destructure number"));
    }

    #[test]
    fn test_fuel_bounds_module_and_render() {
        let long_sum = (0..50).map(|i| i.to_string()).collect::<Vec<_>>().join(" + ");
        let source = format!("const total = {}; export default <p>{{total}}</p>", long_sum);

        let err = compile(&source, &Capabilities::standard(), 20).unwrap_err();
        assert!(matches!(err, MaterializeError::Eval(EvalError::FuelExhausted(20))));

        let ok = compile(&source, &Capabilities::standard(), 1_000).unwrap();
        assert_eq!(ok.render(&json!({})).unwrap(), "<p>1225</p>");
    }

    #[test]
    fn test_doubling_strings_exhaust_fuel() {
        let mut source = String::from("const a0 = \"xxxxxxxx\";\n");
        for i in 1..=40 {
            source.push_str(&format!("const a{i} = a{prev} + a{prev};\n", prev = i - 1));
        }
        source.push_str("export default <p>{len(a40)}</p>");
        let source = source.replacen("const", "import { len } from 'react';\nconst", 1);

        let err = compile(&source, &Capabilities::standard(), 100_000).unwrap_err();
        assert!(matches!(err, MaterializeError::Eval(EvalError::FuelExhausted(100_000))));

        // A short chain stays within budget.
        let short = "const a0 = \"xxxxxxxx\"; const a1 = a0 + a0; export default <p>{a1}</p>";
        let ok = compile(short, &Capabilities::standard(), 100_000).unwrap();
        assert_eq!(ok.render(&json!({})).unwrap(), "<p>xxxxxxxxxxxxxxxx</p>");
    }

    #[test]
    fn test_deeply_nested_source_fails_to_compile() {
        let source = format!("export default <p>{{{}1}}</p>", "-".repeat(100_000));
        let err = compile(&source, &Capabilities::standard(), 100_000).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));
    }

    #[test]
    fn test_props_are_escaped() {
        let component = build(
            "import { fallback, upper } from 'react';\n\
             export default <a title={props.title} data-empty={props.none}>{upper(fallback(props.name, 'anon'))}</a>",
        )
        .unwrap();

        let html = component
            .render(&json!({"title": "\"x\" & <y>", "name": "<b>bob</b>"}))
            .unwrap();
        assert_eq!(
            html,
            "<a title=\"&quot;x&quot; &amp; &lt;y&gt;\">&lt;B&gt;BOB&lt;/B&gt;</a>"
        );

        assert_eq!(component.render(&json!({})).unwrap(), "<a>ANON</a>");
    }

    #[test]
    fn test_render_time_type_error() {
        let component = build("import { useRef } from 'react'; const r = useRef(1); export default <p>{r}</p>").unwrap();
        let err = component.render(&json!({})).unwrap_err();
        assert!(err.to_string().contains("objects are not valid"));
    }

    #[test]
    fn test_void_and_fragment_rendering() {
        let component = build(
            "const items = ['a', 'b']; export default <><img src=\"x.png\" alt=\"\" />{items}<br/></>",
        )
        .unwrap();
        assert_eq!(
            component.render(&json!({})).unwrap(),
            "<img src=\"x.png\" alt=\"\">ab<br>"
        );
    }
}
