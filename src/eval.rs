//! Expression evaluation.
//!
//! The interpreter turns AST expressions into [`Value`]s under an
//! [`EvalContext`] naming the task scope, the current task-iteration
//! string and whether globbing is active. Identifier lookup walks, in
//! order: the value cache, the task's own fields, the task iteration
//! variable, and the global fields.
//!
//! Values whose evaluation never touched an iteration variable are
//! `immutable` and land in the value cache; a cached entry is reused by
//! any context it is *reachable from* — global entries from everywhere,
//! task-scoped entries only from the same task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::driver::Engine;
use crate::errors::{BuildError, BuildResult, Diagnostics};
use crate::frames::{find_recursive_variable, Frame, FrameGuard};
use crate::parser::{Ast, AstExpr, Field, IdentifierRef, Task};
use crate::tracking::Reference;
use crate::values::{Autocast, IBool, IList, IString, Value};
use crate::wildcards::{self, ReplaceError};

/// What an expression is evaluated against.
#[derive(Clone)]
pub struct EvalContext {
    pub task_scope: Option<Arc<Task>>,
    pub task_iteration: Option<String>,
    pub use_globbing: bool,
}

impl EvalContext {
    /// Global scope, globbing active.
    pub fn global() -> Self {
        EvalContext {
            task_scope: None,
            task_iteration: None,
            use_globbing: true,
        }
    }

    pub fn for_task(task: Arc<Task>, iteration: String) -> Self {
        EvalContext {
            task_scope: Some(task),
            task_iteration: Some(iteration),
            use_globbing: true,
        }
    }
}

/// A cached evaluation result. Only immutable values are stored; the
/// scope is remembered by the defining task's source reference, which is
/// unique per declaration.
struct CachedValue {
    name: String,
    task_scope: Option<Reference>,
    value: Value,
}

/// A cache entry is reachable from a query context when the entry is
/// global or was captured under the same task scope.
fn reachable_by(cached_scope: Option<Reference>, query: &EvalContext) -> bool {
    match cached_scope {
        None => true,
        Some(scope) => query.task_scope.as_ref().map(|task| task.reference) == Some(scope),
    }
}

/// Extra knobs the driver passes down.
pub struct InterpreterOptions {
    /// Explicit task key from the command line.
    pub task: Option<String>,
    pub dry_run: bool,
    /// Directory globbing and timestamp lookups resolve against.
    pub workdir: PathBuf,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        InterpreterOptions {
            task: None,
            dry_run: false,
            workdir: PathBuf::from("."),
        }
    }
}

/// The evaluator plus the build engine's shared state.
pub struct Interpreter {
    pub(crate) engine: Arc<Engine>,
    pub(crate) ast: Ast,
    pub(crate) explicit_task: Option<String>,
    pub(crate) dry_run: bool,
    pub(crate) workdir: PathBuf,
    /// Value cache; the lock also serializes evaluation so recursive
    /// lookups on different threads never observe torn inserts.
    caches: Mutex<Vec<CachedValue>>,
    /// Task-key cache, built once during preparation and read-only
    /// afterwards.
    pub(crate) tasks: RwLock<HashMap<String, Arc<Task>>>,
    weak_self: Weak<Interpreter>,
}

impl Interpreter {
    pub fn new(engine: Arc<Engine>, ast: Ast, options: InterpreterOptions) -> Arc<Interpreter> {
        Arc::new_cyclic(|weak| Interpreter {
            engine,
            ast,
            explicit_task: options.task,
            dry_run: options.dry_run,
            workdir: options.workdir,
            caches: Mutex::new(Vec::new()),
            tasks: RwLock::new(HashMap::new()),
            weak_self: weak.clone(),
        })
    }

    /// A fresh strong handle for jobs that outlive the current borrow.
    pub(crate) fn shared(&self) -> Arc<Interpreter> {
        self.weak_self
            .upgrade()
            .expect("interpreter is alive while its methods run")
    }

    /// Evaluate one expression. Takes the evaluation lock for the whole
    /// recursive descent.
    pub fn evaluate(&self, expr: &AstExpr, context: &EvalContext) -> BuildResult<Value> {
        let mut caches = self.caches.lock();
        let mut scope = Evaluation {
            caches: &mut *caches,
            ast: &self.ast,
            diags: self.engine.diags.as_ref(),
            workdir: &self.workdir,
        };
        scope.eval(expr, context)
    }

    pub fn find_task(&self, key: &str) -> Option<Arc<Task>> {
        self.tasks.read().get(key).cloned()
    }

    fn find_field(&self, name: &str, task: Option<&Arc<Task>>) -> Option<Field> {
        if let Some(task) = task {
            if let Some(field) = task.fields.get(name) {
                return Some(field.clone());
            }
        }
        self.ast.fields.get(name).cloned()
    }

    /// Evaluate a field by name, strictly cast. `None` when the field
    /// does not exist in the task or global scope.
    pub fn evaluate_field<T: Autocast>(
        &self,
        name: &str,
        context: &EvalContext,
    ) -> BuildResult<Option<T>> {
        let Some(field) = self.find_field(name, context.task_scope.as_ref()) else {
            return Ok(None);
        };
        let value = self.evaluate(&field.expression, context)?;
        value.autocast(&self.engine.diags).map(Some)
    }

    pub fn evaluate_field_or<T: Autocast>(
        &self,
        name: &str,
        context: &EvalContext,
        default: T,
    ) -> BuildResult<T> {
        Ok(self.evaluate_field(name, context)?.unwrap_or(default))
    }

    #[cfg(test)]
    pub(crate) fn cached_values(&self) -> Vec<(String, Option<Reference>, bool)> {
        self.caches
            .lock()
            .iter()
            .map(|cached| (cached.name.clone(), cached.task_scope, cached.value.immutable()))
            .collect()
    }
}

/// One locked evaluation pass.
struct Evaluation<'a> {
    caches: &'a mut Vec<CachedValue>,
    ast: &'a Ast,
    diags: &'a Diagnostics,
    workdir: &'a Path,
}

impl Evaluation<'_> {
    fn eval(&mut self, expr: &AstExpr, context: &EvalContext) -> BuildResult<Value> {
        match expr {
            AstExpr::Identifier(identifier) => self.eval_identifier(identifier, context),
            AstExpr::Literal { content, reference } => Ok(Value::Str(IString {
                content: content.clone(),
                reference: *reference,
                immutable: true,
            })),
            AstExpr::FormattedLiteral {
                contents,
                reference,
            } => self.eval_formatted(contents, *reference, context),
            AstExpr::List {
                contents,
                reference,
            } => self.eval_list(contents, *reference, context),
            AstExpr::Boolean { content, reference } => Ok(Value::Bool(IBool {
                content: *content,
                reference: *reference,
                immutable: true,
            })),
            AstExpr::Replace {
                input,
                filter,
                product,
                reference,
            } => self.eval_replace(input, filter, product, *reference, context),
        }
    }

    fn eval_identifier(
        &mut self,
        identifier: &IdentifierRef,
        context: &EvalContext,
    ) -> BuildResult<Value> {
        let _frame = FrameGuard::new(
            &self.diags.frames,
            Frame::IdentifierEvaluate {
                name: identifier.name.clone(),
                reference: identifier.reference,
            },
        );
        if find_recursive_variable(&self.diags.frames.export_local(), &identifier.name) {
            return Err(self.diags.halt(BuildError::RecursiveVariable {
                name: identifier.name.clone(),
                reference: identifier.reference,
            }));
        }

        // an identifier always evaluates its definition with globbing
        // on: a replacement operator disables globbing for its own
        // operands, but a variable standing behind an operand still
        // needs its globs expanded.
        let id_context = EvalContext {
            task_scope: context.task_scope.clone(),
            task_iteration: context.task_iteration.clone(),
            use_globbing: true,
        };

        for cached in self.caches.iter() {
            if cached.name == identifier.name && reachable_by(cached.task_scope, context) {
                return Ok(cached.value.clone());
            }
        }

        // task-specific fields.
        if let Some(task) = context.task_scope.clone() {
            if let Some(field) = task.fields.get(&identifier.name) {
                let value = self.eval(&field.expression, &id_context)?;
                if value.immutable() {
                    self.caches.push(CachedValue {
                        name: identifier.name.clone(),
                        task_scope: Some(task.reference),
                        value: value.clone(),
                    });
                }
                return Ok(value);
            }
        }

        // the task iteration variable; never cached.
        if let (Some(iteration), Some(task)) = (&context.task_iteration, &context.task_scope) {
            if task.iterator.name == identifier.name {
                return Ok(Value::Str(IString {
                    content: iteration.clone(),
                    reference: task.reference,
                    immutable: false,
                }));
            }
        }

        // global fields.
        let ast = self.ast;
        if let Some(field) = ast.fields.get(&identifier.name) {
            let value = self.eval(&field.expression, &EvalContext::global())?;
            if value.immutable() {
                self.caches.push(CachedValue {
                    name: identifier.name.clone(),
                    task_scope: None,
                    value: value.clone(),
                });
            }
            return Ok(value);
        }

        Err(self.diags.halt(BuildError::NoMatchingIdentifier {
            name: identifier.name.clone(),
            reference: identifier.reference,
        }))
    }

    fn eval_formatted(
        &mut self,
        contents: &[AstExpr],
        reference: Reference,
        context: &EvalContext,
    ) -> BuildResult<Value> {
        let mut out = String::new();
        let mut immutable = true;
        for child in contents {
            let value = self.eval(child, context)?;
            immutable &= value.immutable();
            match value {
                Value::Str(string) => out.push_str(&string.content),
                Value::Bool(boolean) => {
                    out.push_str(if boolean.content { "true" } else { "false" })
                }
                Value::StrList(list) => {
                    let joined: Vec<&str> =
                        list.contents.iter().map(|s| s.content.as_str()).collect();
                    out.push_str(&joined.join(" "));
                }
                Value::BoolList(list) => {
                    let joined: Vec<&str> = list
                        .contents
                        .iter()
                        .map(|b| if b.content { "true" } else { "false" })
                        .collect();
                    out.push_str(&joined.join(" "));
                }
            }
        }

        if context.use_globbing && out.contains('*') {
            return self.expand_literal(IString {
                content: out,
                reference,
                immutable,
            });
        }
        Ok(Value::Str(IString {
            content: out,
            reference,
            immutable,
        }))
    }

    /// Globbing: a single match lifts to a scalar, anything else stays a
    /// list.
    fn expand_literal(&mut self, input: IString) -> BuildResult<Value> {
        let paths = match wildcards::compute_paths_in(self.workdir, &input.content) {
            Ok(paths) => paths,
            Err(_) => {
                return Err(self.diags.halt(BuildError::AdjacentWildcards {
                    content: input.content,
                    reference: input.reference,
                }))
            }
        };
        let mut contents: Vec<IString> = paths
            .into_iter()
            .map(|path| IString {
                content: path,
                reference: input.reference,
                immutable: input.immutable,
            })
            .collect();
        if contents.len() == 1 {
            return Ok(Value::Str(contents.pop().unwrap()));
        }
        Ok(Value::StrList(IList {
            contents,
            reference: input.reference,
            immutable: input.immutable,
        }))
    }

    /// The first element fixes the list's kind; same-kind sublists are
    /// spread into place.
    fn eval_list(
        &mut self,
        contents: &[AstExpr],
        reference: Reference,
        context: &EvalContext,
    ) -> BuildResult<Value> {
        let first = self.eval(&contents[0], context)?;
        match first {
            Value::Str(_) | Value::StrList(_) => {
                let mut list = IList::<IString> {
                    contents: Vec::new(),
                    reference,
                    immutable: first.immutable(),
                };
                match first {
                    Value::Str(string) => list.contents.push(string),
                    Value::StrList(inner) => list.contents.extend(inner.contents),
                    _ => unreachable!(),
                }
                for child in &contents[1..] {
                    let value = self.eval(child, context)?;
                    list.immutable &= value.immutable();
                    match value {
                        Value::Str(string) => list.contents.push(string),
                        Value::StrList(inner) => list.contents.extend(inner.contents),
                        other => {
                            return Err(self.diags.halt(BuildError::ListTypeMismatch {
                                list_type: "list<string>",
                                item_type: other.type_name(),
                                reference: other.reference(),
                            }))
                        }
                    }
                }
                Ok(Value::StrList(list))
            }
            Value::Bool(_) | Value::BoolList(_) => {
                let mut list = IList::<IBool> {
                    contents: Vec::new(),
                    reference,
                    immutable: first.immutable(),
                };
                match first {
                    Value::Bool(boolean) => list.contents.push(boolean),
                    Value::BoolList(inner) => list.contents.extend(inner.contents),
                    _ => unreachable!(),
                }
                for child in &contents[1..] {
                    let value = self.eval(child, context)?;
                    list.immutable &= value.immutable();
                    match value {
                        Value::Bool(boolean) => list.contents.push(boolean),
                        Value::BoolList(inner) => list.contents.extend(inner.contents),
                        other => {
                            return Err(self.diags.halt(BuildError::ListTypeMismatch {
                                list_type: "list<bool>",
                                item_type: other.type_name(),
                                reference: other.reference(),
                            }))
                        }
                    }
                }
                Ok(Value::BoolList(list))
            }
        }
    }

    /// `input : filter -> product`. The operator owns wildcard
    /// semantics, so its operands evaluate with globbing off.
    fn eval_replace(
        &mut self,
        input: &AstExpr,
        filter: &AstExpr,
        product: &AstExpr,
        reference: Reference,
        context: &EvalContext,
    ) -> BuildResult<Value> {
        let inner = EvalContext {
            use_globbing: false,
            ..context.clone()
        };
        let input_value = self.eval(input, &inner)?;
        let filter_value = self.eval(filter, &inner)?;
        let product_value = self.eval(product, &inner)?;
        let immutable =
            input_value.immutable() && filter_value.immutable() && product_value.immutable();

        let Value::Str(filter_str) = filter_value else {
            return Err(self.diags.halt(BuildError::ReplaceTypeMismatch {
                reference: filter_value.reference(),
            }));
        };
        let Value::Str(product_str) = product_value else {
            return Err(self.diags.halt(BuildError::ReplaceTypeMismatch {
                reference: product_value.reference(),
            }));
        };

        let inputs: IList<IString> = input_value.autocast(self.diags)?;
        let strings: Vec<String> = inputs
            .contents
            .iter()
            .map(|string| string.content.clone())
            .collect();

        let woven =
            match wildcards::compute_replace(&strings, &filter_str.content, &product_str.content) {
                Ok(woven) => woven,
                Err(ReplaceError::AdjacentWildcards(_)) => {
                    return Err(self.diags.halt(BuildError::AdjacentWildcards {
                        content: filter_str.content,
                        reference: filter_str.reference,
                    }))
                }
                Err(ReplaceError::ChunksLength) => {
                    return Err(self.diags.halt(BuildError::ReplaceChunksLength {
                        reference: product_str.reference,
                    }))
                }
            };

        Ok(Value::StrList(IList {
            contents: woven
                .into_iter()
                .map(|content| IString {
                    content,
                    reference,
                    immutable,
                })
                .collect(),
            reference,
            immutable,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LogLevel;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn interpreter(source: &str) -> Arc<Interpreter> {
        interpreter_in(source, InterpreterOptions::default())
    }

    fn interpreter_in(source: &str, options: InterpreterOptions) -> Arc<Interpreter> {
        let engine = Engine::new(LogLevel::Quiet, 2);
        let tokens = Lexer::new(source, &engine.diags).token_stream().unwrap();
        let ast = Parser::new(tokens, &engine.diags).parse().unwrap();
        Interpreter::new(engine, ast, options)
    }

    fn field_expr(interp: &Interpreter, name: &str) -> AstExpr {
        interp.ast.fields[name].expression.clone()
    }

    fn evaluate(interp: &Interpreter, name: &str) -> Value {
        interp
            .evaluate(&field_expr(interp, name), &EvalContext::global())
            .unwrap()
    }

    fn string_contents(value: &Value) -> Vec<String> {
        match value {
            Value::Str(s) => vec![s.content.clone()],
            Value::StrList(list) => list.contents.iter().map(|s| s.content.clone()).collect(),
            other => panic!("expected strings, got {}", other.type_name()),
        }
    }

    #[test]
    fn literal_evaluates_to_immutable_string() {
        let interp = interpreter("x = \"hello\";");
        let value = evaluate(&interp, "x");
        assert_eq!(string_contents(&value), vec!["hello"]);
        assert!(value.immutable());
    }

    #[test]
    fn formatted_literal_concatenates() {
        let interp = interpreter("name = \"app\"; out = \"build/[name].elf\";");
        let value = evaluate(&interp, "out");
        assert_eq!(string_contents(&value), vec!["build/app.elf"]);
    }

    #[test]
    fn formatted_literal_joins_lists_with_spaces() {
        let interp = interpreter("srcs = \"a.c\", \"b.c\"; line = \"cc [srcs]\";");
        let value = evaluate(&interp, "line");
        assert_eq!(string_contents(&value), vec!["cc a.c b.c"]);
    }

    #[test]
    fn formatted_literal_stringifies_booleans() {
        let interp = interpreter("flag = true; line = \"is [flag]\";");
        let value = evaluate(&interp, "line");
        assert_eq!(string_contents(&value), vec!["is true"]);
    }

    #[test]
    fn list_fixes_kind_by_first_element() {
        let interp = interpreter("bad = \"a\", true;");
        let result = interp.evaluate(&field_expr(&interp, "bad"), &EvalContext::global());
        assert!(result.is_err());
        assert!(matches!(
            interp.engine.diags.reports()[0].error,
            BuildError::ListTypeMismatch {
                list_type: "list<string>",
                item_type: "bool",
                ..
            }
        ));
    }

    #[test]
    fn nested_same_kind_lists_flatten() {
        let interp = interpreter("inner = \"b\", \"c\"; outer = \"a\", inner, \"d\";");
        let value = evaluate(&interp, "outer");
        assert_eq!(string_contents(&value), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn replace_rewrites_matching_elements() {
        let interp = interpreter("srcs = \"a.c\", \"b.c\"; objs = srcs : \"*.c\" -> \"*.o\";");
        let value = evaluate(&interp, "objs");
        assert_eq!(string_contents(&value), vec!["a.o", "b.o"]);
    }

    #[test]
    fn replace_passes_nonmatching_through() {
        let interp =
            interpreter("srcs = \"a.c\", \"README\"; objs = srcs : \"*.c\" -> \"*.o\";");
        let value = evaluate(&interp, "objs");
        assert_eq!(string_contents(&value), vec!["a.o", "README"]);
    }

    #[test]
    fn replace_wraps_scalar_input() {
        let interp = interpreter("obj = \"main.c\" : \"*.c\" -> \"*.o\";");
        let value = evaluate(&interp, "obj");
        assert_eq!(string_contents(&value), vec!["main.o"]);
    }

    #[test]
    fn replace_requires_string_filter() {
        let interp = interpreter("bad = \"a.c\" : true -> \"*.o\";");
        let result = interp.evaluate(&field_expr(&interp, "bad"), &EvalContext::global());
        assert!(result.is_err());
        assert!(matches!(
            interp.engine.diags.reports()[0].error,
            BuildError::ReplaceTypeMismatch { .. }
        ));
    }

    #[test]
    fn replace_rejects_surplus_product_wildcards() {
        let interp = interpreter("bad = \"a.c\" : \"*.c\" -> \"*-*.o\";");
        let result = interp.evaluate(&field_expr(&interp, "bad"), &EvalContext::global());
        assert!(result.is_err());
        assert!(matches!(
            interp.engine.diags.reports()[0].error,
            BuildError::ReplaceChunksLength { .. }
        ));
    }

    #[test]
    fn adjacent_wildcards_in_replace_halt() {
        let interp = interpreter("bad = \"a.c\" : \"**.c\" -> \"*.o\";");
        let result = interp.evaluate(&field_expr(&interp, "bad"), &EvalContext::global());
        assert!(result.is_err());
        assert!(matches!(
            interp.engine.diags.reports()[0].error,
            BuildError::AdjacentWildcards { .. }
        ));
    }

    #[test]
    fn missing_identifier_halts() {
        let interp = interpreter("x = nope;");
        let result = interp.evaluate(&field_expr(&interp, "x"), &EvalContext::global());
        assert!(result.is_err());
        assert!(matches!(
            interp.engine.diags.reports()[0].error,
            BuildError::NoMatchingIdentifier { .. }
        ));
    }

    #[test]
    fn recursive_variable_halts_on_second_occurrence() {
        let interp = interpreter("a = b; b = a;");
        let result = interp.evaluate(&field_expr(&interp, "a"), &EvalContext::global());
        assert!(result.is_err());
        let report = &interp.engine.diags.reports()[0];
        let BuildError::RecursiveVariable { name, .. } = &report.error else {
            panic!("expected recursive variable, got {:?}", report.error);
        };
        assert_eq!(name, "a");
    }

    #[test]
    fn immutable_results_are_cached_globally() {
        let interp = interpreter("x = \"value\"; y = x;");
        evaluate(&interp, "y");
        let cached = interp.cached_values();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].0, "x");
        assert_eq!(cached[0].1, None);
        assert!(cached[0].2, "only immutable values reach the cache");
    }

    #[test]
    fn repeated_evaluation_is_structurally_equal() {
        let interp = interpreter("x = \"a\", \"b\"; y = x : \"*\" -> \"p-*\";");
        let first = evaluate(&interp, "y");
        let second = evaluate(&interp, "y");
        assert_eq!(first, second);
    }

    #[test]
    fn iteration_variable_is_mutable_and_uncached() {
        let source = "\"bin\" as target { line = \"building [target]\"; }";
        let interp = interpreter(source);
        let task = interp.ast.tasks[0].clone();
        let context = EvalContext::for_task(task.clone(), "bin".into());
        let expr = task.fields["line"].expression.clone();
        let value = interp.evaluate(&expr, &context).unwrap();
        assert_eq!(string_contents(&value), vec!["building bin"]);
        assert!(!value.immutable());
        assert!(
            interp.cached_values().is_empty(),
            "values depending on the iteration variable never reach the cache"
        );
    }

    #[test]
    fn task_fields_shadow_global_fields() {
        let source = "cc = \"gcc\"; \"t\" { cc = \"clang\"; line = \"[cc]\"; }";
        let interp = interpreter(source);
        let task = interp.ast.tasks[0].clone();
        let context = EvalContext::for_task(task.clone(), "t".into());
        let expr = task.fields["line"].expression.clone();
        let value = interp.evaluate(&expr, &context).unwrap();
        assert_eq!(string_contents(&value), vec!["clang"]);
    }

    #[test]
    fn task_scoped_cache_is_unreachable_from_other_tasks() {
        let source = "\"a\" { local = \"one\"; } \"b\" { local = \"two\"; }";
        let interp = interpreter(source);
        let task_a = interp.ast.tasks[0].clone();
        let task_b = interp.ast.tasks[1].clone();

        let context_a = EvalContext::for_task(task_a.clone(), "a".into());
        // evaluating through the identifier path caches under task a.
        let identifier = AstExpr::Identifier(IdentifierRef {
            name: "local".into(),
            reference: Reference::new(0, 1),
        });
        let value = interp.evaluate(&identifier, &context_a).unwrap();
        assert_eq!(string_contents(&value), vec!["one"]);

        let context_b = EvalContext::for_task(task_b.clone(), "b".into());
        let value = interp.evaluate(&identifier, &context_b).unwrap();
        assert_eq!(
            string_contents(&value),
            vec!["two"],
            "task b must not see task a's cached value"
        );
    }

    #[test]
    fn glob_lifts_single_match_to_scalar() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("x")).unwrap();
        std::fs::File::create(dir.path().join("x/1")).unwrap();

        let options = InterpreterOptions {
            workdir: dir.path().to_path_buf(),
            ..InterpreterOptions::default()
        };
        let interp = interpreter_in("paths = \"x/*\";", options);
        let value = evaluate(&interp, "paths");
        assert!(matches!(value, Value::Str(_)));
        assert_eq!(string_contents(&value), vec!["x/1"]);
    }

    #[test]
    fn glob_keeps_multiple_matches_as_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("x")).unwrap();
        std::fs::File::create(dir.path().join("x/1")).unwrap();
        std::fs::File::create(dir.path().join("x/2")).unwrap();

        let options = InterpreterOptions {
            workdir: dir.path().to_path_buf(),
            ..InterpreterOptions::default()
        };
        let interp = interpreter_in("paths = \"x/*\";", options);
        let value = evaluate(&interp, "paths");
        assert!(matches!(value, Value::StrList(_)));
        assert_eq!(string_contents(&value), vec!["x/1", "x/2"]);
    }

    #[test]
    fn globbing_without_wildcard_returns_literal_unchanged() {
        let interp = interpreter("plain = \"no-wildcards-here\";");
        let value = evaluate(&interp, "plain");
        assert_eq!(string_contents(&value), vec!["no-wildcards-here"]);
    }

    #[test]
    fn replace_operands_do_not_glob() {
        // the filter contains a `*` but must stay a pattern, not expand
        // against the filesystem.
        let interp = interpreter("objs = \"a.c\" : \"*.c\" -> \"*.o\";");
        let value = evaluate(&interp, "objs");
        assert_eq!(string_contents(&value), vec!["a.o"]);
    }
}
