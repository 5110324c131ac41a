//! QuickJS Runtime Wrapper
//!
//! One [`ScriptRuntime`] evaluates one script unit in a fresh runtime and
//! context. Loading and every run get their own instance, so no state leaks
//! between runs of the same plugin.

use rquickjs::convert::Coerced;
use rquickjs::context::EvalOptions;
use rquickjs::{Array, Context, Ctx, Function, IntoJs, Object, Runtime, Value as JsValue};

use assay_runtime::{Invocation, PluginFault};
use assay_types::{Signature, Value, DATA_PATH, PROGRESS_CALLBACK};

use crate::error::{ScriptError, ScriptResult};
use crate::globals::{register_host_globals, HostContext};

/// Name of the entry point a unit must define
pub const ENTRY_POINT: &str = "run";

/// Global holding the frozen host helpers
const HOST_HELPERS: &str = "__assayHost";

/// Installed before any unit code runs. The helpers close over the original
/// built-ins and the global binding is frozen, so reassigning `JSON`,
/// `Reflect` or `Function.prototype` in a unit has no effect on the host.
const HELPERS: &str = r#"(() => {
    const toSource = Function.prototype.toString;
    const objectTag = Object.prototype.toString;
    const stringify = JSON.stringify;
    const apply = Reflect.apply;
    const toText = String;
    const text = (v) => {
        try {
            return toText(v);
        } catch (_) {
            return apply(objectTag, v, []);
        }
    };
    const helpers = Object.freeze({
        source: (f) => apply(toSource, f, []),
        call: (f, args) => apply(f, undefined, args),
        render: (v) => {
            if (v === undefined || v === null) return "";
            if (typeof v === "string") return v;
            if (typeof v === "object") {
                try {
                    const json = apply(stringify, undefined, [v]);
                    if (json !== undefined) return json;
                } catch (_) {}
            }
            return text(v);
        },
    });
    Object.defineProperty(globalThis, "__assayHost", { value: helpers });
})();"#;

/// What a unit exposes after evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInfo {
    /// Source text of the entry point function
    pub entry_source: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

pub struct ScriptRuntime {
    context: Context,
    host: HostContext,
}

impl ScriptRuntime {
    /// Create a runtime with host globals installed. The runtime is
    /// interrupted as soon as the host's token is cancelled.
    pub fn new(host: HostContext) -> ScriptResult<Self> {
        let runtime = Runtime::new().map_err(|e| ScriptError::Runtime(e.to_string()))?;

        let token = host.cancel.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || token.is_cancelled())));

        let context = Context::full(&runtime).map_err(|e| ScriptError::Runtime(e.to_string()))?;
        context.with(|ctx| {
            register_host_globals(&ctx, &host)?;
            ctx.eval::<(), _>(HELPERS)
                .map_err(|e| ScriptError::Js(describe_error(&ctx, e)))
        })?;

        Ok(Self {
            context,
            host,
        })
    }

    /// Evaluate the unit's top-level code.
    ///
    /// `name` only labels error messages.
    pub fn eval_unit(&self, name: &str, source: &str) -> ScriptResult<()> {
        self.context.with(|ctx| {
            let mut options = EvalOptions::default();
            options.global = true;
            options.strict = false;
            options.backtrace_barrier = true;

            ctx.eval_with_options::<(), _>(source, options)
                .map_err(|e| ScriptError::Js(format!("{}: {}", name, describe_error(&ctx, e))))
        })
    }

    /// Inspect the evaluated unit. `None` if it defines no entry point.
    pub fn probe(&self) -> ScriptResult<Option<UnitInfo>> {
        self.context.with(|ctx| {
            let Some(entry) = entry_function(&ctx)? else {
                return Ok(None);
            };
            let helpers = helpers(&ctx)?;
            let source: Function = helpers.get("source")?;
            let entry_source: String = source
                .call((entry,))
                .map_err(|e| ScriptError::Js(describe_error(&ctx, e)))?;

            Ok(Some(UnitInfo {
                entry_source,
                name: string_binding(&ctx, "NAME")?,
                description: string_binding(&ctx, "DESCRIPTION")?,
            }))
        })
    }

    /// Call the entry point once with arguments bound in declaration order
    pub fn call_entry(
        &self,
        signature: &Signature,
        invocation: &Invocation,
    ) -> Result<Value, PluginFault> {
        self.context.with(|ctx| {
            let fault = |e: rquickjs::Error| self.fault(describe_error(&ctx, e));

            let entry = entry_function(&ctx)
                .map_err(|e| PluginFault::new(e.to_string()))?
                .ok_or_else(|| PluginFault::new(format!("{} is not a function", ENTRY_POINT)))?;
            let helpers = helpers(&ctx).map_err(|e| PluginFault::new(e.to_string()))?;
            let call: Function = helpers.get("call").map_err(fault)?;
            let render: Function = helpers.get("render").map_err(fault)?;

            let args = Array::new(ctx.clone()).map_err(fault)?;
            for (index, param) in signature.iter().enumerate() {
                let value = bind_argument(&ctx, &param.name, invocation).map_err(fault)?;
                args.set(index, value).map_err(fault)?;
            }

            let result: JsValue = call.call((entry, args)).map_err(fault)?;
            let text: String = render.call((result,)).map_err(fault)?;
            Ok(Value::Text(text))
        })
    }

    fn fault(&self, message: String) -> PluginFault {
        if self.host.cancel.is_cancelled() {
            PluginFault::interrupted()
        } else {
            PluginFault::new(message)
        }
    }
}

fn helpers<'js>(ctx: &Ctx<'js>) -> ScriptResult<Object<'js>> {
    Ok(ctx.globals().get::<_, Object>(HOST_HELPERS)?)
}

fn entry_function<'js>(ctx: &Ctx<'js>) -> ScriptResult<Option<Function<'js>>> {
    let probe = format!(
        "typeof {0} === 'function' ? {0} : undefined",
        ENTRY_POINT
    );
    ctx.eval::<Option<Function>, _>(probe)
        .map_err(|e| ScriptError::Js(describe_error(ctx, e)))
}

/// A top-level string binding; `const`/`let` are not properties of the
/// global object, so this goes through eval.
fn string_binding(ctx: &Ctx<'_>, name: &str) -> ScriptResult<Option<String>> {
    let probe = format!("typeof {0} === 'string' ? {0} : undefined", name);
    ctx.eval::<Option<String>, _>(probe)
        .map_err(|e| ScriptError::Js(describe_error(ctx, e)))
}

fn bind_argument<'js>(
    ctx: &Ctx<'js>,
    name: &str,
    invocation: &Invocation,
) -> rquickjs::Result<JsValue<'js>> {
    match name {
        DATA_PATH => invocation
            .data_root
            .to_string_lossy()
            .into_owned()
            .into_js(ctx),
        PROGRESS_CALLBACK => {
            let sink = invocation.progress.clone();
            let callback = Function::new(ctx.clone(), move |value: f64| {
                let value = if value.is_finite() { value.round() as i64 } else { 0 };
                sink.report(value);
            })?;
            Ok(callback.into_value())
        }
        _ => match invocation.arguments.get(name) {
            Some(value) => value_to_js(ctx, value),
            None => Ok(JsValue::new_undefined(ctx.clone())),
        },
    }
}

/// Convert an argument value to a JavaScript value
pub fn value_to_js<'js>(ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
    Ok(match value {
        Value::Integer(i) => match i32::try_from(*i) {
            Ok(small) => JsValue::new_int(ctx.clone(), small),
            Err(_) => JsValue::new_float(ctx.clone(), *i as f64),
        },
        Value::Float(f) => JsValue::new_float(ctx.clone(), *f),
        Value::Boolean(b) => JsValue::new_bool(ctx.clone(), *b),
        Value::Text(s) => s.as_str().into_js(ctx)?,
    })
}

/// Text for a failed eval or call, taken from the pending exception
fn describe_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }

    let thrown = ctx.catch();
    let text = thrown
        .get::<Coerced<String>>()
        .map(|c| c.0)
        .unwrap_or_else(|_| "exception".to_string());

    let stack = thrown
        .as_exception()
        .and_then(|exception| exception.stack())
        .map(|stack| stack.trim_end().to_string())
        .filter(|stack| !stack.is_empty());

    match stack {
        Some(stack) => format!("{}\n{}", text, stack),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assay_runtime::CancellationToken;
    use assay_types::Arguments;

    fn runtime() -> ScriptRuntime {
        ScriptRuntime::new(HostContext::new("test", CancellationToken::new())).unwrap()
    }

    #[test]
    fn test_probe_reads_bindings() {
        let rt = runtime();
        rt.eval_unit(
            "demo.js",
            "const NAME = 'Demo'; let DESCRIPTION = 'Does a thing';\nfunction run(a = 1) { return a; }",
        )
        .unwrap();

        let info = rt.probe().unwrap().unwrap();
        assert_eq!(info.name.as_deref(), Some("Demo"));
        assert_eq!(info.description.as_deref(), Some("Does a thing"));
        assert!(info.entry_source.starts_with("function run(a = 1)"));
    }

    #[test]
    fn test_probe_without_entry_point() {
        let rt = runtime();
        rt.eval_unit("helper.js", "var run = 5; function helper() {}").unwrap();
        assert!(rt.probe().unwrap().is_none());
    }

    #[test]
    fn test_eval_error_message() {
        let rt = runtime();
        let err = rt.eval_unit("bad.js", "throw new Error('nope')").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("bad.js: "));
        assert!(message.contains("nope"));

        assert!(rt.eval_unit("syntax.js", "function (").is_err());
    }

    #[test]
    fn test_call_renders_result() {
        let rt = runtime();
        rt.eval_unit(
            "calc.js",
            "function run(data_path, count, ratio, flag, label) { return { data_path, count, ratio, flag, label }; }",
        )
        .unwrap();
        let signature = crate::signature::parse_signature(
            "function run(data_path, count, ratio, flag, label) {}",
        )
        .unwrap();

        let args = Arguments::new()
            .with("count", 3)
            .with("ratio", 0.5)
            .with("flag", true)
            .with("label", "x");
        let invocation = Invocation::detached("/data", args);

        let out = rt.call_entry(&signature, &invocation).unwrap();
        assert_eq!(
            out,
            Value::Text(r#"{"data_path":"/data","count":3,"ratio":0.5,"flag":true,"label":"x"}"#.into())
        );
    }

    #[test]
    fn test_render_rules() {
        let rt = runtime();
        let cases = [
            ("function run() { return 'plain'; }", "plain"),
            ("function run() {}", ""),
            ("function run() { return null; }", ""),
            ("function run() { return 42; }", "42"),
            ("function run() { return [1, 'a']; }", r#"[1,"a"]"#),
            ("function run() { const o = { a: 1 }; o.self = o; return o; }", "[object Object]"),
            (
                "function run() { return { toString() { throw new Error('no'); }, toJSON() { throw 1; } }; }",
                "[object Object]",
            ),
        ];
        for (source, expected) in cases {
            rt.eval_unit("case.js", source).unwrap();
            let out = rt
                .call_entry(&Signature::new(), &Invocation::detached("/", Arguments::new()))
                .unwrap();
            assert_eq!(out, Value::Text(expected.into()), "{}", source);
        }
    }

    #[test]
    fn test_unit_cannot_replace_host_builtins() {
        let rt = runtime();
        rt.eval_unit(
            "shadow.js",
            r#"
JSON.stringify = () => { throw new Error("shadowed"); };
Reflect.apply = () => { throw new Error("shadowed"); };
Function.prototype.toString = () => "function run(hijacked) {}";
__assayHost = null;
function run() { return { ok: true }; }
"#,
        )
        .unwrap();

        let info = rt.probe().unwrap().unwrap();
        assert!(info.entry_source.starts_with("function run()"));

        let out = rt
            .call_entry(&Signature::new(), &Invocation::detached("/", Arguments::new()))
            .unwrap();
        assert_eq!(out, Value::Text(r#"{"ok":true}"#.into()));

        // a global binding with the helpers' name cannot be declared
        assert!(rt.eval_unit("clash.js", "let __assayHost = 1;").is_err());
    }
}
