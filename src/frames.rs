//! Per-thread diagnostic context frames.
//!
//! While the engine evaluates variables and builds tasks it pushes a frame
//! for every named unit it enters. When an error is raised the stack is
//! frozen and later rendered beneath the error as a chain of
//! `note: while …` lines. Frames also drive recursion detection: a unit
//! appearing twice on its own stack is a cycle.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use console::style;
use parking_lot::Mutex;

use crate::tracking::{Reference, ReferenceView};

/// One entry in the diagnostic context stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The task the build was started for.
    EntryBuild { task: String, reference: Reference },
    /// A task built because another task depends on it.
    DependencyBuild { task: String, reference: Reference },
    /// A variable currently being evaluated.
    IdentifierEvaluate { name: String, reference: Reference },
}

impl Frame {
    /// The name recursion detection compares frames by.
    pub fn unique_identifier(&self) -> &str {
        match self {
            Frame::EntryBuild { task, .. } => task,
            Frame::DependencyBuild { task, .. } => task,
            Frame::IdentifierEvaluate { name, .. } => name,
        }
    }

    pub fn reference(&self) -> Reference {
        match self {
            Frame::EntryBuild { reference, .. } => *reference,
            Frame::DependencyBuild { reference, .. } => *reference,
            Frame::IdentifierEvaluate { reference, .. } => *reference,
        }
    }

    /// Render this frame for a `note: while …` line.
    pub fn render(&self, config: &str) -> String {
        let view = ReferenceView::extract(config, self.reference());
        match self {
            Frame::EntryBuild { task, .. } => format!(
                "building task '{}' {}",
                task,
                style(format!("(defined on line {})", view.line_num)).italic()
            ),
            Frame::DependencyBuild { task, .. } => format!(
                "building task '{}' as a dependency {}",
                task,
                style(format!("(defined on line {})", view.line_num)).italic()
            ),
            Frame::IdentifierEvaluate { name, .. } => format!(
                "evaluating variable '{}' {}",
                name,
                style(format!("(referred to on line {})", view.line_num)).italic()
            ),
        }
    }
}

#[derive(Default)]
struct StackTable {
    stacks: HashMap<ThreadId, Vec<Frame>>,
    frozen: HashMap<ThreadId, bool>,
}

/// The shared table of per-thread frame stacks.
///
/// Push and pop always address the calling thread's stack. A thread's stack
/// can be exported and imported into another thread so that work scheduled
/// across thread boundaries keeps its causal chain.
#[derive(Default)]
pub struct ContextStack {
    table: Mutex<StackTable>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the calling thread's stack; subsequent pushes and pops become
    /// no-ops so the frames stay intact for rendering.
    pub fn freeze(&self) {
        let mut table = self.table.lock();
        table.frozen.insert(thread::current().id(), true);
    }

    pub fn is_frozen(&self) -> bool {
        let table = self.table.lock();
        table
            .frozen
            .get(&thread::current().id())
            .copied()
            .unwrap_or(false)
    }

    fn push(&self, frame: Frame) {
        let mut table = self.table.lock();
        let id = thread::current().id();
        if table.frozen.get(&id).copied().unwrap_or(false) {
            return;
        }
        table.stacks.entry(id).or_default().push(frame);
    }

    fn pop(&self) {
        let mut table = self.table.lock();
        let id = thread::current().id();
        if table.frozen.get(&id).copied().unwrap_or(false) {
            return;
        }
        if let Some(stack) = table.stacks.get_mut(&id) {
            stack.pop();
        }
    }

    /// Snapshot of the calling thread's stack.
    pub fn export_local(&self) -> Vec<Frame> {
        let table = self.table.lock();
        table
            .stacks
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the calling thread's stack with a snapshot captured on
    /// another thread.
    pub fn import_local(&self, frames: Vec<Frame>) {
        let mut table = self.table.lock();
        table.stacks.insert(thread::current().id(), frames);
    }

    /// Snapshot of every thread's stack, for the error renderer.
    pub fn dump(&self) -> HashMap<ThreadId, Vec<Frame>> {
        self.table.lock().stacks.clone()
    }
}

/// RAII frame: pushes on construction, pops on scope exit. Both directions
/// are no-ops once the owning thread's stack is frozen.
pub struct FrameGuard<'a> {
    stack: &'a ContextStack,
}

impl<'a> FrameGuard<'a> {
    pub fn new(stack: &'a ContextStack, frame: Frame) -> Self {
        stack.push(frame);
        FrameGuard { stack }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

/// A task is recursive once its key appears twice among the build frames.
pub fn find_recursive_task(stack: &[Frame], task: &str) -> bool {
    let count = stack
        .iter()
        .filter(|frame| {
            matches!(
                frame,
                Frame::EntryBuild { .. } | Frame::DependencyBuild { .. }
            ) && frame.unique_identifier() == task
        })
        .count();
    count >= 2
}

/// A variable is recursive once its name appears twice among the
/// evaluation frames.
pub fn find_recursive_variable(stack: &[Frame], variable: &str) -> bool {
    let count = stack
        .iter()
        .filter(|frame| {
            matches!(frame, Frame::IdentifierEvaluate { .. })
                && frame.unique_identifier() == variable
        })
        .count();
    count >= 2
}
