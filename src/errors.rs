//! The error catalog and the shared error sink.
//!
//! Every failure the engine can produce is a variant of [`BuildError`]. The
//! `Display` impl gives the short message; [`BuildError::render`] produces
//! the full colored report with a source excerpt and a caption pointing at
//! the offending span.
//!
//! Errors are raised through the [`Diagnostics`] sink. `halt` freezes the
//! raising thread's context stack, stores the error and hands back the
//! [`Halted`] sentinel for the caller to propagate; `soft_report` stores
//! without unwinding so sibling jobs can keep collecting, and a later
//! `trigger_report` starts the unwind on the coordinating thread.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use console::style;
use parking_lot::Mutex;
use thiserror::Error;

use crate::frames::{ContextStack, Frame};
use crate::tracking::{Reference, ReferenceView};

/// Zero-sized unwind sentinel. The error payload itself lives in the
/// [`Diagnostics`] sink; this type only carries the fact that evaluation
/// must stop on the current path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halted;

pub type BuildResult<T> = Result<T, Halted>;

/// The closed set of everything that can go wrong while building.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    // semantic: name resolution, types, wildcards, recursion.
    #[error("no matching identifier")]
    NoMatchingIdentifier { name: String, reference: Reference },
    #[error("list type mismatch")]
    ListTypeMismatch {
        list_type: &'static str,
        item_type: &'static str,
        reference: Reference,
    },
    #[error("replace type mismatch")]
    ReplaceTypeMismatch { reference: Reference },
    #[error("invalid replace chunks length")]
    ReplaceChunksLength { reference: Reference },
    #[error("variable type mismatch")]
    VariableTypeMismatch {
        expected: &'static str,
        found: &'static str,
        reference: Reference,
    },
    #[error("adjacent wildcards")]
    AdjacentWildcards { content: String, reference: Reference },
    #[error("recursive variable initialized")]
    RecursiveVariable { name: String, reference: Reference },
    #[error("recursive task built")]
    RecursiveTask { name: String, reference: Reference },

    // operational: tasks, dependencies, processes, input.
    #[error("command failed")]
    NonZeroProcess { cmdline: String, reference: Reference },
    #[error("internal process error")]
    ProcessInternal { cmdline: String, reference: Reference },
    #[error("task not found")]
    TaskNotFound { name: String },
    #[error("no tasks are defined")]
    NoTasks,
    #[error("ambiguous topmost task")]
    AmbiguousTask { reference: Reference },
    #[error("dependency not met")]
    DependencyFailed { name: String, reference: Reference },
    #[error("invalid input file")]
    InvalidInputFile { path: String },
    #[error("duplicate identifier")]
    DuplicateIdentifier {
        name: String,
        first: Reference,
        second: Reference,
    },
    #[error("duplicate task")]
    DuplicateTask {
        key: String,
        first: Reference,
        second: Reference,
    },

    // syntactic: lexer.
    #[error("invalid symbol")]
    InvalidSymbol { symbol: String, reference: Reference },
    #[error("invalid literal")]
    InvalidLiteral { reference: Reference },
    #[error("invalid escape code")]
    InvalidEscapeCode { code: char, reference: Reference },

    // syntactic: parser.
    #[error("invalid grammar")]
    InvalidGrammar { reference: Reference },
    #[error("no valid value")]
    NoValue { name: String, reference: Reference },
    #[error("no linestop")]
    NoLinestop { reference: Reference },
    #[error("no task iterator")]
    NoIterator { reference: Reference },
    #[error("no task opening bracket")]
    NoTaskOpen { reference: Reference },
    #[error("no task closing bracket")]
    NoTaskClose { reference: Reference },
    #[error("invalid list end")]
    InvalidListEnd { reference: Reference },
    #[error("no replacement input")]
    NoReplacementIdentifier { reference: Reference },
    #[error("no replacement original")]
    NoReplacementOriginal { reference: Reference },
    #[error("no replacement arrow")]
    NoReplacementArrow { reference: Reference },
    #[error("no replacement product")]
    NoReplacementReplacement { reference: Reference },
    #[error("invalid escaped expression")]
    InvalidEscapedExpression { reference: Reference },
    #[error("no expression closing bracket")]
    NoExpressionClose { reference: Reference },
    #[error("empty expression")]
    EmptyExpression { reference: Reference },
}

fn error_prefix(message: &str) -> String {
    format!(
        "{} {}",
        style("error:").red().bold(),
        style(message).bold()
    )
}

/// Render a bracketed source excerpt with the referenced span underlined
/// and a caption caret beneath it.
fn excerpt(config: &str, reference: Reference, caption: &str) -> String {
    let view = ReferenceView::extract(config, reference);
    let number = view.line_num.to_string();
    let left_pad = " ".repeat(number.len() + 1);
    let underline_pad = " ".repeat(view.line_prefix.chars().count() + 1);
    format!(
        "{} | {}{}{}\n{}|{}⤷ {}",
        number,
        view.line_prefix,
        style(&view.line_ref).underlined(),
        view.line_suffix,
        left_pad,
        underline_pad,
        style(caption).bold()
    )
}

fn line_of(config: &str, reference: Reference) -> usize {
    ReferenceView::extract(config, reference).line_num
}

impl BuildError {
    /// The primary source reference this error points at, when it has one.
    pub fn reference(&self) -> Option<Reference> {
        use BuildError::*;
        match self {
            NoMatchingIdentifier { reference, .. }
            | ListTypeMismatch { reference, .. }
            | ReplaceTypeMismatch { reference }
            | ReplaceChunksLength { reference }
            | VariableTypeMismatch { reference, .. }
            | AdjacentWildcards { reference, .. }
            | RecursiveVariable { reference, .. }
            | RecursiveTask { reference, .. }
            | NonZeroProcess { reference, .. }
            | ProcessInternal { reference, .. }
            | AmbiguousTask { reference }
            | DependencyFailed { reference, .. }
            | InvalidSymbol { reference, .. }
            | InvalidLiteral { reference }
            | InvalidEscapeCode { reference, .. }
            | InvalidGrammar { reference }
            | NoValue { reference, .. }
            | NoLinestop { reference }
            | NoIterator { reference }
            | NoTaskOpen { reference }
            | NoTaskClose { reference }
            | InvalidListEnd { reference }
            | NoReplacementIdentifier { reference }
            | NoReplacementOriginal { reference }
            | NoReplacementArrow { reference }
            | NoReplacementReplacement { reference }
            | InvalidEscapedExpression { reference }
            | NoExpressionClose { reference }
            | EmptyExpression { reference } => Some(*reference),
            DuplicateIdentifier { second, .. } | DuplicateTask { second, .. } => Some(*second),
            TaskNotFound { .. } | NoTasks | InvalidInputFile { .. } => None,
        }
    }

    /// Render the full human-readable report against the source.
    pub fn render(&self, config: &str) -> String {
        use BuildError::*;
        match self {
            NoMatchingIdentifier { name, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "variable '{}' referred to on line {} does not exist.",
                    name,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "variable referred to here")
            ),
            ListTypeMismatch {
                list_type,
                item_type,
                reference,
            } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "an item of type '{}' cannot be stored in a list of type '{}'.",
                    item_type, list_type
                )),
                excerpt(config, *reference, "faulty type here")
            ),
            ReplaceTypeMismatch { reference } => format!(
                "{}\n{}",
                error_prefix("the replacement operator can only operate with strings."),
                excerpt(config, *reference, "faulty type here")
            ),
            ReplaceChunksLength { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "invalid combination of wildcards in replacement operator on line {}.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "too many wildcards here")
            ),
            VariableTypeMismatch {
                expected,
                found,
                reference,
            } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "expected variable defined on line {} to be of type '{}', but was '{}'.",
                    line_of(config, *reference),
                    expected,
                    found
                )),
                excerpt(config, *reference, "variable defined here")
            ),
            AdjacentWildcards { content, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "string '{}' declared on line {} contains two or more adjacent wildcards.",
                    content,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "string initialized here")
            ),
            RecursiveVariable { name, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "variable '{}' referred to on line {} contains a recursive reference \
                     and cannot be initialized.",
                    name,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "recursive reference here")
            ),
            RecursiveTask { name, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "task '{}' declared on line {} contains a recursive dependency \
                     and cannot be built.",
                    name,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "task declared here")
            ),
            NonZeroProcess { cmdline, reference } => format!(
                "{}\n{}",
                error_prefix(&format!("the command '{}' failed.", cmdline)),
                excerpt(config, *reference, "command defined here")
            ),
            ProcessInternal { cmdline, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "the command '{}' could not be dispatched.",
                    cmdline
                )),
                excerpt(config, *reference, "command defined here")
            ),
            TaskNotFound { name } => {
                error_prefix(&format!("task '{}' does not exist.", name))
            }
            NoTasks => error_prefix("no tasks are defined."),
            AmbiguousTask { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "topmost task defined on line {} is ambiguous. specify a specific \
                     task to build or move the definition.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "task defined here")
            ),
            DependencyFailed { name, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "dependency '{}' referred to on line {} not met; file does not exist \
                     and no task was found.",
                    name,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "dependency referred to here")
            ),
            InvalidInputFile { path } => {
                error_prefix(&format!("config file '{}' is unreachable.", path))
            }
            DuplicateIdentifier {
                name,
                first,
                second,
            } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "identifier '{}' originally defined on line {} contains a duplicate \
                     definition on line {}.",
                    name,
                    line_of(config, *first),
                    line_of(config, *second)
                )),
                excerpt(config, *second, "duplicate initialization here")
            ),
            DuplicateTask { key, first, second } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "task originally defined on line {} contains a duplicate definition \
                     on line {} for criteria '{}'.",
                    line_of(config, *first),
                    line_of(config, *second),
                    key
                )),
                excerpt(config, *second, "duplicate initialization here")
            ),
            InvalidSymbol { symbol, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "invalid symbol '{}' encountered on line {}.",
                    symbol,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "symbol encountered here")
            ),
            InvalidLiteral { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "invalid literal encountered on line {}.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "invalid symbol here")
            ),
            InvalidEscapeCode { code, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "escape code '\\{}' on line {} is invalid.",
                    code,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "escape code here")
            ),
            InvalidGrammar { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "invalid language syntax encountered on line {}.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "syntax encountered here")
            ),
            NoValue { name, reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "invalid value for variable '{}' declared on line {}.",
                    name,
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "variable declared here")
            ),
            NoLinestop { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "missing semicolon or invalid expression on line {}.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "semicolon expected after this expression")
            ),
            NoIterator { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "task defined on line {} doesn't have a valid explicit iterator.",
                    line_of(config, *reference)
                )),
                excerpt(
                    config,
                    *reference,
                    "explicit iterator required because of this"
                )
            ),
            NoTaskOpen { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "task defined on line {} doesn't have an opening curly bracket.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "task defined here")
            ),
            NoTaskClose { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "task defined on line {} doesn't have a closing curly bracket.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "task defined here")
            ),
            InvalidListEnd { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "list defined on line {} contains an invalid ending.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "item expected after this separator")
            ),
            NoReplacementIdentifier { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "replacement operator on line {} does not contain a valid input \
                     expression.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "expression expected before this colon")
            ),
            NoReplacementOriginal { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "replacement operator on line {} does not contain a valid matching \
                     expression.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "expression expected after this colon")
            ),
            NoReplacementArrow { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "expected an arrow in the replacement operator on line {}.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "arrow expected after this expression")
            ),
            NoReplacementReplacement { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "replacement operator on line {} does not contain a valid output \
                     expression.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "expression expected after this arrow")
            ),
            InvalidEscapedExpression { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "string defined on line {} contains an invalid expression.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "invalid expression here")
            ),
            NoExpressionClose { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "expected a closing bracket after expression on line {}.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "expected closing bracket after this")
            ),
            EmptyExpression { reference } => format!(
                "{}\n{}",
                error_prefix(&format!(
                    "expected an expression after an opening bracket on line {}.",
                    line_of(config, *reference)
                )),
                excerpt(config, *reference, "expected expression after this bracket")
            ),
        }
    }
}

/// One rendered report: the thread's display ordinal, its error and the
/// context frames that were live when the error was raised.
pub struct ErrorReport {
    pub thread_ordinal: usize,
    pub error: BuildError,
    pub frames: Vec<Frame>,
}

/// The shared diagnostic state: the per-thread error map plus the
/// per-thread context-stack table.
pub struct Diagnostics {
    pub frames: ContextStack,
    errors: Mutex<HashMap<ThreadId, BuildError>>,
    ordinals: Mutex<HashMap<ThreadId, usize>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics {
            frames: ContextStack::new(),
            errors: Mutex::new(HashMap::new()),
            ordinals: Mutex::new(HashMap::new()),
        }
    }

    fn ordinal(&self, id: ThreadId) -> usize {
        let mut ordinals = self.ordinals.lock();
        let next = ordinals.len() + 1;
        *ordinals.entry(id).or_insert(next)
    }

    fn store(&self, error: BuildError) {
        let id = thread::current().id();
        self.ordinal(id);
        self.errors.lock().insert(id, error);
    }

    /// Freeze the current thread's context stack, store the error and hand
    /// back the unwind sentinel. No further work happens on this path.
    #[must_use]
    pub fn halt(&self, error: BuildError) -> Halted {
        self.frames.freeze();
        self.store(error);
        Halted
    }

    /// Store the error without unwinding. Used by jobs that want sibling
    /// jobs to keep collecting their own errors before a later
    /// [`Diagnostics::trigger_report`].
    pub fn soft_report(&self, error: BuildError) {
        self.frames.freeze();
        self.store(error);
    }

    /// Start the unwind for errors collected through `soft_report`.
    #[must_use]
    pub fn trigger_report(&self) -> Halted {
        debug_assert!(
            !self.errors.lock().is_empty(),
            "attempt to trigger a report on an empty error state"
        );
        Halted
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().is_empty()
    }

    /// Everything collected so far, ordered by thread ordinal, each error
    /// paired with its thread's frozen frame stack.
    pub fn reports(&self) -> Vec<ErrorReport> {
        let errors = self.errors.lock();
        let stacks = self.frames.dump();
        let mut reports: Vec<ErrorReport> = errors
            .iter()
            .map(|(id, error)| ErrorReport {
                thread_ordinal: self.ordinal(*id),
                error: error.clone(),
                frames: stacks.get(id).cloned().unwrap_or_default(),
            })
            .collect();
        reports.sort_by_key(|report| report.thread_ordinal);
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_stores_error_and_freezes() {
        let diags = Diagnostics::new();
        let halted = diags.halt(BuildError::NoTasks);
        assert_eq!(halted, Halted);
        assert!(diags.has_errors());
        assert!(diags.frames.is_frozen());
        let reports = diags.reports();
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].error, BuildError::NoTasks));
    }

    #[test]
    fn soft_report_accumulates_per_thread() {
        let diags = Diagnostics::new();
        diags.soft_report(BuildError::NoTasks);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                diags.soft_report(BuildError::TaskNotFound {
                    name: "other".into(),
                });
            });
        });
        assert_eq!(diags.reports().len(), 2);
    }

    #[test]
    fn later_error_replaces_earlier_on_same_thread() {
        let diags = Diagnostics::new();
        diags.soft_report(BuildError::NoTasks);
        diags.soft_report(BuildError::TaskNotFound { name: "x".into() });
        let reports = diags.reports();
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].error, BuildError::TaskNotFound { .. }));
    }

    #[test]
    fn render_includes_line_number_and_excerpt() {
        console::set_colors_enabled(false);
        let config = "cc = gc;\n";
        let error = BuildError::NoMatchingIdentifier {
            name: "gc".into(),
            reference: Reference::new(5, 2),
        };
        let rendered = error.render(config);
        assert!(rendered.contains("variable 'gc' referred to on line 1"));
        assert!(rendered.contains("1 | cc = gc;"));
        assert!(rendered.contains("⤷ variable referred to here"));
    }

    #[test]
    fn render_without_reference_is_message_only() {
        console::set_colors_enabled(false);
        let error = BuildError::TaskNotFound {
            name: "deploy".into(),
        };
        let rendered = error.render("");
        assert!(rendered.contains("task 'deploy' does not exist."));
        assert!(!rendered.contains('|'));
    }

    #[test]
    fn short_messages_are_stable() {
        assert_eq!(BuildError::NoTasks.to_string(), "no tasks are defined");
        assert_eq!(
            BuildError::AdjacentWildcards {
                content: "**".into(),
                reference: Reference::new(0, 2),
            }
            .to_string(),
            "adjacent wildcards"
        );
    }
}
