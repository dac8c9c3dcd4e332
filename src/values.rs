//! Evaluated values.
//!
//! Every value carries the reference of the expression it came from and an
//! `immutable` flag: true when the whole evaluation path was independent
//! of task-iteration variables, which is what makes it safe to cache.

use crate::errors::{BuildError, BuildResult, Diagnostics};
use crate::tracking::Reference;

#[derive(Debug, Clone, PartialEq)]
pub struct IString {
    pub content: String,
    pub reference: Reference,
    pub immutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IBool {
    pub content: bool,
    pub reference: Reference,
    pub immutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IList<T> {
    pub contents: Vec<T>,
    pub reference: Reference,
    pub immutable: bool,
}

/// The value sum type: strings, booleans, and homogeneous lists of either.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(IString),
    Bool(IBool),
    StrList(IList<IString>),
    BoolList(IList<IBool>),
}

impl Value {
    pub fn reference(&self) -> Reference {
        match self {
            Value::Str(v) => v.reference,
            Value::Bool(v) => v.reference,
            Value::StrList(v) => v.reference,
            Value::BoolList(v) => v.reference,
        }
    }

    pub fn immutable(&self) -> bool {
        match self {
            Value::Str(v) => v.immutable,
            Value::Bool(v) => v.immutable,
            Value::StrList(v) => v.immutable,
            Value::BoolList(v) => v.immutable,
        }
    }

    /// The name types go by in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::StrList(_) => "list<string>",
            Value::BoolList(_) => "list<bool>",
        }
    }

    /// Cast into a concrete value kind, halting with
    /// `VariableTypeMismatch` when the rules don't allow it.
    pub fn autocast<T: Autocast>(self, diags: &Diagnostics) -> BuildResult<T> {
        T::autocast(self, diags)
    }
}

fn mismatch<T>(value: &Value, expected: &'static str, diags: &Diagnostics) -> BuildResult<T> {
    Err(diags.halt(BuildError::VariableTypeMismatch {
        expected,
        found: value.type_name(),
        reference: value.reference(),
    }))
}

/// The closed set of coercions the engine applies when reading fields:
/// scalars wrap into one-element lists, one-element lists collapse into
/// scalars, and everything else is a mismatch.
pub trait Autocast: Sized {
    fn autocast(value: Value, diags: &Diagnostics) -> BuildResult<Self>;
}

impl Autocast for IString {
    fn autocast(value: Value, diags: &Diagnostics) -> BuildResult<Self> {
        match value {
            Value::Str(string) => Ok(string),
            Value::StrList(list) if list.contents.len() == 1 => {
                Ok(list.contents.into_iter().next().unwrap())
            }
            other => mismatch(&other, "string", diags),
        }
    }
}

impl Autocast for IBool {
    fn autocast(value: Value, diags: &Diagnostics) -> BuildResult<Self> {
        match value {
            Value::Bool(boolean) => Ok(boolean),
            Value::BoolList(list) if list.contents.len() == 1 => {
                Ok(list.contents.into_iter().next().unwrap())
            }
            other => mismatch(&other, "bool", diags),
        }
    }
}

impl Autocast for IList<IString> {
    fn autocast(value: Value, diags: &Diagnostics) -> BuildResult<Self> {
        match value {
            Value::StrList(list) => Ok(list),
            Value::Str(string) => Ok(IList {
                reference: string.reference,
                immutable: string.immutable,
                contents: vec![string],
            }),
            other => mismatch(&other, "string or list<string>", diags),
        }
    }
}

impl Autocast for IList<IBool> {
    fn autocast(value: Value, diags: &Diagnostics) -> BuildResult<Self> {
        match value {
            Value::BoolList(list) => Ok(list),
            Value::Bool(boolean) => Ok(IList {
                reference: boolean.reference,
                immutable: boolean.immutable,
                contents: vec![boolean],
            }),
            other => mismatch(&other, "bool or list<bool>", diags),
        }
    }
}
