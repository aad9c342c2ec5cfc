//! Probe synthesis
//!
//! Each probe is a self-contained Python program. It loads the target file as
//! a module by path, exercises its module-level functions for one category of
//! runtime behavior, and prints the issue marker followed by one `  - ` bullet
//! per finding. A clean run prints no marker and exits 0.

use crate::features::{self, SourceFeatures};
use crate::types::{DynamicTestCase, ProbeCategory};
use mend_core::FileRecord;

const PRELUDE: &str = r#"import ast
import importlib.util
import os
import sys

HERE = os.path.dirname(os.path.abspath(__file__))
TARGET = os.path.join(HERE, __REL_PATH__)
MODULE_NAME = __MODULE_NAME__
FUNCTIONS = __FUNCTIONS__
CLASSES = __CLASSES__
MARKER = __MARKER__
issues = []

sys.path.insert(0, HERE)
sys.path.insert(0, os.path.dirname(TARGET))


def load_target():
    spec = importlib.util.spec_from_file_location(MODULE_NAME, TARGET)
    module = importlib.util.module_from_spec(spec)
    sys.modules[MODULE_NAME] = module
    spec.loader.exec_module(module)
    return module


def target_tree():
    with open(TARGET, encoding="utf-8") as handle:
        return ast.parse(handle.read())


def short(value):
    text = repr(value)
    return text if len(text) <= 40 else text[:37] + "..."


def callables(module):
    for name in FUNCTIONS:
        fn = getattr(module, name, None)
        if callable(fn):
            yield name, fn


def report():
    if issues:
        print(MARKER)
        for issue in issues:
            print("  - " + str(issue).replace("\n", " "))
    else:
        print("no issues detected")


try:
    target = load_target()
except (SystemExit, EOFError):
    target = None
except Exception as exc:
    issues.append("importing the module raised %s: %s" % (type(exc).__name__, exc))
    target = None
"#;

const USER_INPUT_BODY: &str = r#"
EXPECTED = (TypeError, ValueError, KeyError, AttributeError, EOFError, NotImplementedError)
ADVERSARIAL = [
    None,
    "",
    "A" * 10000,
    "'; DROP TABLE users; --",
    "<script>alert(1)</script>",
    "../../../../etc/passwd",
    "\x00\xff",
    -1,
    2 ** 63,
    float("nan"),
    [],
    {},
]

if target is not None:
    for name, fn in callables(target):
        for value in ADVERSARIAL:
            try:
                fn(value)
            except EXPECTED:
                pass
            except Exception as exc:
                issues.append("%s(%s) raised %s: %s" % (name, short(value), type(exc).__name__, exc))
                break
"#;

const RESOURCE_BODY: &str = r#"
import gc
import warnings

leaks = []


def record_warning(message, category, filename, lineno, file=None, line=None):
    if issubclass(category, ResourceWarning):
        leaks.append(str(message))


warnings.simplefilter("always", ResourceWarning)
warnings.showwarning = record_warning

tree = target_tree()
guarded = set()
for node in ast.walk(tree):
    if isinstance(node, (ast.With, ast.AsyncWith)):
        for item in node.items:
            guarded.add(id(item.context_expr))
for node in ast.walk(tree):
    if isinstance(node, ast.Call) and isinstance(node.func, ast.Name) and node.func.id == "open":
        if id(node) not in guarded:
            issues.append("open() at line %d is not managed by a with-block" % node.lineno)

if target is not None:
    for name, fn in callables(target):
        for _ in range(3):
            try:
                fn()
            except Exception:
                break
    gc.collect()
    for leak in sorted(set(leaks)):
        issues.append("unclosed resource: %s" % leak)
"#;

const CONCURRENCY_BODY: &str = r#"
import threading

if target is not None:
    for name, fn in callables(target):
        errors = []

        def worker(fn=fn, errors=errors):
            try:
                fn()
            except TypeError:
                pass
            except Exception as exc:
                errors.append(exc)

        threads = [threading.Thread(target=worker, daemon=True) for _ in range(8)]
        for thread in threads:
            thread.start()
        for thread in threads:
            thread.join(timeout=5)
        if any(thread.is_alive() for thread in threads):
            issues.append("concurrent calls to %s() did not finish (possible deadlock)" % name)
        kinds = sorted({type(e).__name__ for e in errors})
        if kinds:
            issues.append("concurrent calls to %s() raised %s" % (name, ", ".join(kinds)))
"#;

const BOUNDARY_BODY: &str = r#"
EXPECTED = (TypeError, ValueError, AttributeError, EOFError, NotImplementedError)
UNSAFE = (ZeroDivisionError, IndexError, KeyError, OverflowError, RecursionError)
EDGES = [0, -1, 1, 2 ** 31 - 1, -(2 ** 31), 2 ** 63, 0.0, float("inf"), "", [], [0], {}]

if target is not None:
    for name, fn in callables(target):
        for value in EDGES:
            try:
                fn(value)
            except EXPECTED:
                pass
            except UNSAFE as exc:
                issues.append("%s(%s) raised %s: %s" % (name, short(value), type(exc).__name__, exc))
                break
            except Exception:
                pass
"#;

const ENVIRONMENT_BODY: &str = r#"
for node in ast.walk(target_tree()):
    if isinstance(node, ast.Subscript) and isinstance(node.value, ast.Attribute):
        if node.value.attr == "environ" and isinstance(node.ctx, ast.Load):
            issues.append("os.environ[...] at line %d has no default" % node.lineno)

if target is not None:
    saved = dict(os.environ)
    os.environ.clear()
    try:
        for name, fn in callables(target):
            try:
                fn()
            except KeyError as exc:
                issues.append("%s() fails without environment variable %s" % (name, exc))
            except Exception:
                pass
    finally:
        os.environ.clear()
        os.environ.update(saved)
"#;

const DYNAMIC_BODY: &str = r#"
import builtins

UNSAFE_CALLS = {"eval", "exec", "__import__", "compile"}
DESERIALIZERS = {"pickle", "marshal", "dill"}

for node in ast.walk(target_tree()):
    if not isinstance(node, ast.Call):
        continue
    func = node.func
    if isinstance(func, ast.Name) and func.id in UNSAFE_CALLS:
        issues.append("%s() at line %d executes dynamic code" % (func.id, node.lineno))
    elif isinstance(func, ast.Attribute) and isinstance(func.value, ast.Name):
        owner = func.value.id
        if owner in DESERIALIZERS and func.attr in ("load", "loads"):
            issues.append("%s.%s() at line %d deserializes untrusted data" % (owner, func.attr, node.lineno))
        if owner == "yaml" and func.attr == "load" and not any(k.arg == "Loader" for k in node.keywords):
            issues.append("yaml.load() at line %d has no explicit Loader" % node.lineno)

if target is not None:
    PAYLOAD = "__import__('os').getcwd()"
    seen = []
    real_eval, real_exec = builtins.eval, builtins.exec

    def traced_eval(source, *args, **kwargs):
        seen.append(source)
        return real_eval(source, *args, **kwargs)

    def traced_exec(source, *args, **kwargs):
        seen.append(source)
        return real_exec(source, *args, **kwargs)

    builtins.eval, builtins.exec = traced_eval, traced_exec
    try:
        for name, fn in callables(target):
            del seen[:]
            try:
                fn(PAYLOAD)
            except Exception:
                pass
            if any(isinstance(s, str) and PAYLOAD in s for s in seen):
                issues.append("%s() passes its argument to eval/exec" % name)
    finally:
        builtins.eval, builtins.exec = real_eval, real_exec
"#;

const EPILOGUE: &str = r#"
report()
sys.exit(0)
"#;

/// Turns analyzed files into probes
#[derive(Debug, Clone)]
pub struct ProbeSynthesizer {
    marker: String,
}

impl ProbeSynthesizer {
    /// Create a synthesizer printing `marker` before issue bullets
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Probes for one file, empty when the file has no probe-worthy features
    #[must_use]
    pub fn synthesize(&self, file: &FileRecord) -> Vec<DynamicTestCase> {
        let Some(features) = features::analyze(file) else {
            return Vec::new();
        };
        self.synthesize_with(file, &features)
    }

    /// Probes for one file with precomputed features
    #[must_use]
    pub fn synthesize_with(&self, file: &FileRecord, features: &SourceFeatures) -> Vec<DynamicTestCase> {
        features
            .categories()
            .into_iter()
            .map(|category| self.probe(file, features, category))
            .collect()
    }

    fn probe(&self, file: &FileRecord, features: &SourceFeatures, category: ProbeCategory) -> DynamicTestCase {
        let basename = file.basename();
        let module_name = basename
            .rsplit_once('.')
            .map_or(basename, |(stem, _)| stem);
        let prelude = PRELUDE
            .replace("__REL_PATH__", &py_literal(&sandbox_path(&file.path)))
            .replace("__MODULE_NAME__", &py_literal(module_name))
            .replace("__FUNCTIONS__", &py_list(&features.functions))
            .replace("__CLASSES__", &py_list(&features.classes))
            .replace("__MARKER__", &py_literal(&self.marker));
        let body = match category {
            ProbeCategory::UserInput => USER_INPUT_BODY,
            ProbeCategory::ResourceManagement => RESOURCE_BODY,
            ProbeCategory::Concurrency => CONCURRENCY_BODY,
            ProbeCategory::BoundaryConditions => BOUNDARY_BODY,
            ProbeCategory::EnvironmentConfig => ENVIRONMENT_BODY,
            ProbeCategory::DynamicExecution => DYNAMIC_BODY,
        };
        DynamicTestCase {
            category,
            test_name: format!("{}{basename}", category.test_prefix()),
            code: format!("{prelude}{body}{EPILOGUE}"),
            description: describe(category, basename),
            target_file: Some(file.path.clone()),
        }
    }
}

fn describe(category: ProbeCategory, basename: &str) -> String {
    match category {
        ProbeCategory::UserInput => format!("feed malformed and hostile input to functions in {basename}"),
        ProbeCategory::ResourceManagement => format!("check that {basename} releases files and connections"),
        ProbeCategory::Concurrency => format!("call functions in {basename} from several threads at once"),
        ProbeCategory::BoundaryConditions => format!("call functions in {basename} with edge-case values"),
        ProbeCategory::EnvironmentConfig => format!("run {basename} with an empty environment"),
        ProbeCategory::DynamicExecution => format!("look for eval, exec and unsafe deserialization in {basename}"),
    }
}

/// Relative location of a project file inside a sandbox, as a `/`-joined string
fn sandbox_path(path: &str) -> String {
    crate::runner::sandbox_relative(path)
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_else(|| mend_core::basename(path).to_string())
}

/// JSON string literals are valid Python string literals
fn py_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn py_list(items: &[String]) -> String {
    serde_json::Value::Array(items.iter().cloned().map(serde_json::Value::String).collect()).to_string()
}
