//! The build engine: task lookup, dependency resolution with
//! timestamp-based skip, recursion detection, and run orchestration.
//!
//! Dependency builds are dispatched through an `Unbound` scheduler so
//! that nested fan-out cannot starve the fixed pool; the commands of one
//! task go through a `Managed` scheduler backed by the pool.

use std::sync::Arc;

use crate::cli::{EntryHandle, EntryStatus};
use crate::errors::{BuildError, BuildResult};
use crate::eval::{EvalContext, Interpreter};
use crate::filesystem;
use crate::frames::{find_recursive_task, Frame, FrameGuard};
use crate::pipeline::{JobState, Managed, PipelineJob, PipelineScheduler, Topography, Unbound};
use crate::process::ExecuteJob;
use crate::values::{IBool, IList, IString};

const DEPENDS: &str = "depends";
const DEPENDS_PARALLEL: &str = "depends_parallel";
const RUN: &str = "run";
const RUN_PARALLEL: &str = "run_parallel";
const VISIBLE: &str = "visible";

/// Everything one task build needs to run, including the scheduling
/// thread's frame stack so diagnostics keep the causal chain across
/// thread boundaries.
pub struct RunContext {
    pub task: Arc<crate::parser::Task>,
    pub task_iteration: String,
    pub parent_handle: Option<Arc<EntryHandle>>,
    pub parent_frames: Vec<Frame>,
}

/// A dependency build dispatched onto its own thread.
struct BuildJob {
    interpreter: Arc<Interpreter>,
    context: RunContext,
    state: JobState,
}

impl PipelineJob for BuildJob {
    fn compute(&self) {
        let frames = &self.interpreter.engine.diags.frames;
        frames.import_local(self.context.parent_frames.clone());
        let _frame = FrameGuard::new(
            frames,
            Frame::DependencyBuild {
                task: self.context.task_iteration.clone(),
                reference: self.context.task.reference,
            },
        );
        if self.interpreter.run_task(&self.context).is_err() {
            self.state.report_error();
        }
    }

    fn state(&self) -> &JobState {
        &self.state
    }
}

impl Interpreter {
    fn file_timestamp(&self, path: &str) -> Option<u64> {
        let resolved = self.workdir.join(path);
        filesystem::get_file_timestamp(&resolved.to_string_lossy())
    }

    /// Build the selected task after parsing succeeded. The task cache is
    /// prepared first: every task's identifier expression is evaluated
    /// with an empty context and each resulting key registered against
    /// the shared task.
    pub fn build(&self) -> BuildResult<()> {
        let diags = &self.engine.diags;

        for task in &self.ast.tasks {
            let value = self.evaluate(&task.identifier, &EvalContext::global())?;
            let keys: IList<IString> = value.autocast(diags)?;
            let mut cache = self.tasks.write();
            for key in &keys.contents {
                if let Some(existing) = cache.get(&key.content) {
                    let first = existing.reference;
                    return Err(diags.halt(BuildError::DuplicateTask {
                        key: key.content.clone(),
                        first,
                        second: task.reference,
                    }));
                }
                cache.insert(key.content.clone(), task.clone());
            }
        }

        if self.ast.tasks.is_empty() {
            return Err(diags.halt(BuildError::NoTasks));
        }

        let (task, task_iteration) = match &self.explicit_task {
            Some(key) => match self.find_task(key) {
                Some(task) => (task, key.clone()),
                None => {
                    return Err(diags.halt(BuildError::TaskNotFound { name: key.clone() }))
                }
            },
            None => {
                // emptiness was rejected above, the topmost task exists.
                let task = self.ast.tasks[0].clone();
                let value = self.evaluate(&task.identifier, &EvalContext::global())?;
                let crate::values::Value::Str(key) = value else {
                    return Err(diags.halt(BuildError::AmbiguousTask {
                        reference: task.reference,
                    }));
                };
                (task, key.content)
            }
        };

        let _frame = FrameGuard::new(
            &diags.frames,
            Frame::EntryBuild {
                task: task_iteration.clone(),
                reference: task.reference,
            },
        );
        self.run_task(&RunContext {
            task,
            task_iteration,
            parent_handle: None,
            parent_frames: Vec::new(),
        })
    }

    /// Build one task: dependency freshness, dependency builds, then the
    /// task's own commands.
    pub fn run_task(&self, run: &RunContext) -> BuildResult<()> {
        let diags = &self.engine.diags;

        if find_recursive_task(&diags.frames.export_local(), &run.task_iteration) {
            return Err(diags.halt(BuildError::RecursiveTask {
                name: run.task_iteration.clone(),
                reference: run.task.reference,
            }));
        }

        let context = EvalContext::for_task(run.task.clone(), run.task_iteration.clone());

        let dependencies: Option<IList<IString>> = self.evaluate_field(DEPENDS, &context)?;

        let mut dependency_build_required = false;
        if let Some(dependencies) = &dependencies {
            let latest_change = self.compute_latest_dependency_change(dependencies)?;
            if let Some(own_change) = self.file_timestamp(&run.task_iteration) {
                if own_change >= latest_change {
                    self.engine.cli.increment_skipped_tasks();
                    return Ok(());
                }
            }
            dependency_build_required = true;
        }

        // the handle is generated only once we know the task will
        // actually be rebuilt.
        let visible = self.evaluate_field_or(
            VISIBLE,
            &context,
            IBool {
                content: true,
                reference: run.task.reference,
                immutable: true,
            },
        )?;
        let handle = match &run.parent_handle {
            Some(parent) => self.engine.cli.derive_entry_from(
                parent,
                &run.task_iteration,
                EntryStatus::Scheduled,
                visible.content,
            ),
            None => {
                let handle = self.engine.cli.generate_entry(
                    &run.task_iteration,
                    EntryStatus::Scheduled,
                    visible.content,
                );
                handle.set_highlighted(true);
                handle
            }
        };

        if dependency_build_required {
            let parallel = self.evaluate_field_or(
                DEPENDS_PARALLEL,
                &context,
                IBool {
                    content: false,
                    reference: run.task.reference,
                    immutable: true,
                },
            )?;
            if let Some(dependencies) = &dependencies {
                self.solve_dependencies(dependencies, &handle, parallel.content)?;
            }
        }

        let commands: Option<IList<IString>> = self.evaluate_field(RUN, &context)?;
        let Some(commands) = commands else {
            // abstract task: nothing to execute.
            handle.set_status(EntryStatus::Finished);
            return Ok(());
        };
        let run_parallel = self.evaluate_field_or(
            RUN_PARALLEL,
            &context,
            IBool {
                content: false,
                reference: run.task.reference,
                immutable: true,
            },
        )?;

        if self.dry_run {
            return Ok(());
        }

        let topography = if run_parallel.content {
            Topography::Parallel
        } else {
            Topography::Sequential
        };
        let mut scheduler =
            PipelineScheduler::<Managed>::new(self.engine.pipeline.clone(), topography);
        for cmdline in &commands.contents {
            scheduler.schedule_job(ExecuteJob::new(
                cmdline.content.clone(),
                cmdline.reference,
                handle.clone(),
                self.engine.clone(),
            ));
        }
        scheduler.send_and_await();

        if scheduler.had_errors() {
            handle.set_status(EntryStatus::Failed);
            return Err(diags.trigger_report());
        }

        handle.set_status(EntryStatus::Finished);
        Ok(())
    }

    /// The newest change among the dependency names: a file contributes
    /// its mtime, a known task recurses into its own `depends`, and a
    /// task without `depends` forces a rebuild all the way up.
    fn compute_latest_dependency_change(
        &self,
        dependencies: &IList<IString>,
    ) -> BuildResult<u64> {
        let diags = &self.engine.diags;
        let mut latest_change = 0u64;

        for dependency in &dependencies.contents {
            let task = self.find_task(&dependency.content);
            let modified = self.file_timestamp(&dependency.content);
            if let Some(modified) = modified {
                latest_change = latest_change.max(modified);
            }
            let task = match (task, modified) {
                (None, Some(_)) => continue,
                (None, None) => {
                    // neither a file nor a known task.
                    return Err(diags.halt(BuildError::DependencyFailed {
                        name: dependency.content.clone(),
                        reference: dependency.reference,
                    }));
                }
                (Some(task), _) => task,
            };

            let _frame = FrameGuard::new(
                &diags.frames,
                Frame::DependencyBuild {
                    task: dependency.content.clone(),
                    reference: task.reference,
                },
            );
            if find_recursive_task(&diags.frames.export_local(), &dependency.content) {
                return Err(diags.halt(BuildError::RecursiveTask {
                    name: dependency.content.clone(),
                    reference: task.reference,
                }));
            }

            let context = EvalContext::for_task(task.clone(), dependency.content.clone());
            let nested: Option<IList<IString>> = self.evaluate_field(DEPENDS, &context)?;
            match nested {
                Some(nested) => {
                    latest_change =
                        latest_change.max(self.compute_latest_dependency_change(&nested)?);
                }
                // a dependency task with no depends of its own cannot be
                // skipped, so everything above it rebuilds.
                None => return Ok(u64::MAX),
            }
        }
        Ok(latest_change)
    }

    /// Run every dependency that resolves to a known task, each on its
    /// own thread, under the selected topography.
    fn solve_dependencies(
        &self,
        dependencies: &IList<IString>,
        parent_handle: &Arc<EntryHandle>,
        parallel: bool,
    ) -> BuildResult<()> {
        let topography = if parallel {
            Topography::Parallel
        } else {
            Topography::Sequential
        };
        let mut scheduler =
            PipelineScheduler::<Unbound>::new(self.engine.pipeline.clone(), topography);

        for dependency in &dependencies.contents {
            let Some(task) = self.find_task(&dependency.content) else {
                continue;
            };
            scheduler.schedule_job(Arc::new(BuildJob {
                interpreter: self.shared(),
                context: RunContext {
                    task,
                    task_iteration: dependency.content.clone(),
                    parent_handle: Some(parent_handle.clone()),
                    parent_frames: self.engine.diags.frames.export_local(),
                },
                state: JobState::new(),
            }));
        }

        scheduler.send_and_await();
        if scheduler.had_errors() {
            return Err(self.engine.diags.trigger_report());
        }
        Ok(())
    }
}
