use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cogs_core::{
    Clock, LogObserver, Medium, Page, SchedulerConfig, SystemClock, TickObserver, TimerHandle,
    Timers, TokioTimers,
};
use cogs_store::CookieStore;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};
use crate::types::{ControllerState, Step, StepOutcome, TaskBody};

struct TaskEntry {
    /// Controller-prefixed name (`"<controller>-<task>"`).
    name: String,
    body: TaskBody,
    every: Duration,
    awake: bool,
    handle: Option<TimerHandle>,
}

struct Inner {
    store: CookieStore,
    state_key: String,
    tasks: Vec<TaskEntry>,
    steps: Vec<Step>,
    step_current: usize,
    step_active: bool,
    drive: Option<TimerHandle>,
    resume: Option<TimerHandle>,
}

impl Inner {
    fn snapshot(&self) -> ControllerState {
        ControllerState {
            task_names: self.tasks.iter().map(|t| t.name.clone()).collect(),
            task_awake: self.tasks.iter().map(|t| t.awake).collect(),
            step_current: self.step_current,
            step_active: self.step_active,
        }
    }

    fn persist(&mut self) -> Result<()> {
        let state = serde_json::to_value(self.snapshot()).map_err(cogs_store::StoreError::from)?;
        let key = self.state_key.clone();
        self.store.add(&key, state)?;
        Ok(())
    }

    /// Persist from a timer tick, where there is nobody to hand the error to.
    fn persist_logged(&mut self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, "state persist failed");
        }
    }
}

/// Manages named recurring tasks and one sequential step machine, persisting
/// enough state into the durable store to resume the step machine after the
/// host page is torn down and rebuilt.
///
/// Recurring tasks do NOT auto-resume: bodies are code references that
/// cannot be persisted, so the owning script re-registers them on every
/// load. The step machine resumes: if the persisted state says a sequence
/// was mid-flight, the controller polls until the re-registered step list
/// covers the saved index and only then restarts the driving loop.
///
/// Cheap to clone; all clones drive the same controller.
#[derive(Clone)]
pub struct ThreadController {
    name: String,
    inner: Arc<Mutex<Inner>>,
    timers: Arc<dyn Timers>,
    observer: Arc<dyn TickObserver>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for ThreadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadController")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ThreadController {
    /// Create a controller named `name`, loading any persisted state from
    /// the medium. Fails with [`SchedulerError::InvalidName`] on an empty
    /// name.
    pub fn new(
        name: &str,
        medium: Arc<dyn Medium>,
        clock: Arc<dyn Clock>,
        timers: Arc<dyn Timers>,
        observer: Arc<dyn TickObserver>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(SchedulerError::InvalidName);
        }
        let store = CookieStore::new(&format!("ThreadController-{name}"), medium, clock)?;
        let state_key = format!("{name}-State");
        let saved: ControllerState = store
            .get(&state_key)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let controller = Self {
            name: name.to_string(),
            inner: Arc::new(Mutex::new(Inner {
                store,
                state_key,
                tasks: Vec::new(),
                steps: Vec::new(),
                step_current: saved.step_current,
                step_active: saved.step_active,
                drive: None,
                resume: None,
            })),
            timers,
            observer,
            config,
        };

        if saved.step_active {
            info!(
                controller = name,
                saved_index = saved.step_current,
                "step sequence was mid-flight, waiting for steps to be re-registered"
            );
            controller.schedule_resume();
        }
        Ok(controller)
    }

    /// [`ThreadController::new`] with the system clock, tokio timers, the
    /// logging observer and default timing config.
    pub fn with_defaults(name: &str, medium: Arc<dyn Medium>) -> Result<Self> {
        Self::new(
            name,
            medium,
            Arc::new(SystemClock),
            Arc::new(TokioTimers),
            Arc::new(LogObserver),
            SchedulerConfig::default(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diagnostic snapshot of what would be persisted right now.
    pub fn state(&self) -> ControllerState {
        self.inner.lock().unwrap().snapshot()
    }

    // --- recurring tasks ----------------------------------------------------

    /// Register a recurring task. A duplicate name is silently ignored —
    /// scripts re-run their registration block on every page load.
    ///
    /// With `awake`, a timer starts firing `body` every `every` (or the
    /// configured default interval, 1s).
    pub fn add_task(
        &self,
        name: &str,
        body: impl Fn() -> Option<Value> + Send + Sync + 'static,
        awake: bool,
        every: Option<Duration>,
    ) -> Result<()> {
        let prefixed = self.prefixed(name);
        let every = every.unwrap_or(Duration::from_millis(self.config.task_interval_ms));
        let mut inner = self.inner.lock().unwrap();
        if inner.tasks.iter().any(|t| t.name == prefixed) {
            debug!(task = %prefixed, "task already registered");
            return Ok(());
        }
        let body: TaskBody = Arc::new(body);
        let handle = awake.then(|| self.task_timer(&prefixed, &body, every));
        inner.tasks.push(TaskEntry {
            name: prefixed.clone(),
            body,
            every,
            awake,
            handle,
        });
        inner.persist()?;
        info!(task = %prefixed, awake, every_ms = every.as_millis() as u64, "task added");
        Ok(())
    }

    /// Whether a task with this name is registered (awake or asleep).
    pub fn has_task(&self, name: &str) -> bool {
        let prefixed = self.prefixed(name);
        self.inner
            .lock()
            .unwrap()
            .tasks
            .iter()
            .any(|t| t.name == prefixed)
    }

    /// Registered task names, in registration order (unprefixed).
    pub fn task_names(&self) -> Vec<String> {
        let prefix = format!("{}-", self.name);
        self.inner
            .lock()
            .unwrap()
            .tasks
            .iter()
            .map(|t| t.name.strip_prefix(&prefix).unwrap_or(&t.name).to_string())
            .collect()
    }

    /// Cancel a task's timer and forget its registration.
    pub fn remove_task(&self, name: &str) -> Result<()> {
        let prefixed = self.prefixed(name);
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .tasks
            .iter()
            .position(|t| t.name == prefixed)
            .ok_or_else(|| SchedulerError::UnknownTask {
                name: name.to_string(),
            })?;
        let entry = inner.tasks.remove(index);
        if let Some(handle) = entry.handle {
            handle.cancel();
        }
        inner.persist()?;
        info!(task = %prefixed, "task removed");
        Ok(())
    }

    /// Cancel every task's timer and forget all registrations.
    pub fn remove_all_tasks(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.tasks.len();
        for entry in inner.tasks.drain(..) {
            if let Some(handle) = entry.handle {
                handle.cancel();
            }
        }
        inner.persist()?;
        info!(controller = %self.name, count, "all tasks removed");
        Ok(())
    }

    /// Stop a task's timer but keep its registration.
    pub fn sleep_task(&self, name: &str) -> Result<()> {
        let prefixed = self.prefixed(name);
        let mut inner = self.inner.lock().unwrap();
        let entry = Self::find_task(&mut inner, &prefixed, name)?;
        if let Some(handle) = entry.handle.take() {
            handle.cancel();
        }
        entry.awake = false;
        inner.persist()?;
        debug!(task = %prefixed, "task asleep");
        Ok(())
    }

    /// Recreate the timer of a sleeping task. No-op when already awake —
    /// timer handles cannot be paused, only cancelled and recreated.
    pub fn wake_task(&self, name: &str) -> Result<()> {
        let prefixed = self.prefixed(name);
        let mut inner = self.inner.lock().unwrap();
        let entry = Self::find_task(&mut inner, &prefixed, name)?;
        if entry.awake {
            return Ok(());
        }
        let (body, every) = (entry.body.clone(), entry.every);
        let handle = self.task_timer(&prefixed, &body, every);
        let entry = Self::find_task(&mut inner, &prefixed, name)?;
        entry.handle = Some(handle);
        entry.awake = true;
        inner.persist()?;
        debug!(task = %prefixed, "task awake");
        Ok(())
    }

    /// Invoke a task body once, synchronously, bypassing its timer. Returns
    /// the body's value; a panicking body is reported to the observer and
    /// yields `None`.
    pub fn manual_run(&self, name: &str) -> Result<Option<Value>> {
        let prefixed = self.prefixed(name);
        let body = {
            let inner = self.inner.lock().unwrap();
            inner
                .tasks
                .iter()
                .find(|t| t.name == prefixed)
                .map(|t| t.body.clone())
                .ok_or_else(|| SchedulerError::UnknownTask {
                    name: name.to_string(),
                })?
        };
        match catch_unwind(AssertUnwindSafe(|| body())) {
            Ok(value) => Ok(value),
            Err(panic) => {
                self.observer.task_failed(&prefixed, &panic_detail(&panic));
                Ok(None)
            }
        }
    }

    // --- step machine -------------------------------------------------------

    /// Append a step. Registration never starts execution; it is legal (and
    /// required, after a reload) while a sequence is marked active.
    pub fn add_step(&self, step: Step) {
        let mut inner = self.inner.lock().unwrap();
        inner.steps.push(step);
        debug!(controller = %self.name, steps = inner.steps.len(), "step registered");
    }

    /// Convenience step built from the page primitives: wait until
    /// `guard_selector` exists, then click `click_selector` to advance.
    pub fn add_click_step(&self, page: Arc<dyn Page>, guard_selector: &str, click_selector: &str) {
        let guard_page = page.clone();
        let guard_selector = guard_selector.to_string();
        let click_selector = click_selector.to_string();
        self.add_step(Step::new(
            move || guard_page.exists(&guard_selector),
            move || {
                if page.click(&click_selector) {
                    StepOutcome::Advance
                } else {
                    StepOutcome::Retry
                }
            },
        ));
    }

    /// Start (or resume) driving the step machine from the current index.
    pub fn start_steps(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.steps.is_empty() {
            return Err(SchedulerError::NoSteps);
        }
        // An explicit start supersedes a pending resume poll.
        if let Some(handle) = inner.resume.take() {
            handle.cancel();
        }
        inner.step_active = true;
        if inner.drive.is_none() {
            inner.drive = Some(self.drive_timer());
        }
        inner.persist()?;
        info!(controller = %self.name, index = inner.step_current, "step machine driving");
        Ok(())
    }

    /// Pause: cancel the driving timer, keep the index.
    pub fn sleep_steps(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.drive.take() {
            handle.cancel();
        }
        if let Some(handle) = inner.resume.take() {
            handle.cancel();
        }
        inner.step_active = false;
        inner.persist()?;
        debug!(controller = %self.name, index = inner.step_current, "step machine asleep");
        Ok(())
    }

    /// Full rewind: cancel the driving timer and reset the index to zero.
    pub fn reset_steps(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.drive.take() {
            handle.cancel();
        }
        if let Some(handle) = inner.resume.take() {
            handle.cancel();
        }
        inner.step_current = 0;
        inner.step_active = false;
        inner.persist()?;
        info!(controller = %self.name, "step machine reset");
        Ok(())
    }

    pub fn step_index(&self) -> usize {
        self.inner.lock().unwrap().step_current
    }

    pub fn steps_active(&self) -> bool {
        self.inner.lock().unwrap().step_active
    }

    pub fn step_count(&self) -> usize {
        self.inner.lock().unwrap().steps.len()
    }

    // --- internals ----------------------------------------------------------

    fn prefixed(&self, task: &str) -> String {
        format!("{}-{}", self.name, task)
    }

    fn find_task<'a>(
        inner: &'a mut Inner,
        prefixed: &str,
        bare: &str,
    ) -> Result<&'a mut TaskEntry> {
        inner
            .tasks
            .iter_mut()
            .find(|t| t.name == prefixed)
            .ok_or_else(|| SchedulerError::UnknownTask {
                name: bare.to_string(),
            })
    }

    fn task_timer(&self, name: &str, body: &TaskBody, every: Duration) -> TimerHandle {
        let name = name.to_string();
        let body = body.clone();
        let observer = self.observer.clone();
        self.timers.repeating(
            every,
            Box::new(move || {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| {
                    body();
                })) {
                    observer.task_failed(&name, &panic_detail(&panic));
                }
            }),
        )
    }

    fn drive_timer(&self) -> TimerHandle {
        let inner = self.inner.clone();
        let observer = self.observer.clone();
        self.timers.repeating(
            Duration::from_millis(self.config.drive_interval_ms),
            Box::new(move || drive_tick(&inner, &observer)),
        )
    }

    /// The resume-after-reload protocol: the step list is empty right after
    /// a reload, so poll coarsely until the owning script has re-registered
    /// enough steps to cover the saved index, then start driving there.
    fn schedule_resume(&self) {
        let controller = self.clone();
        let handle = self.timers.repeating(
            Duration::from_millis(self.config.resume_poll_ms),
            Box::new(move || {
                let mut inner = controller.inner.lock().unwrap();
                if !inner.step_active {
                    // Reset or sleep beat us to it; stop polling.
                    if let Some(handle) = inner.resume.take() {
                        handle.cancel();
                    }
                    return;
                }
                // A saved index equal to the list length is a sequence that
                // finished but never got its reset tick before the reload;
                // the driving timer's first fire performs that reset.
                if !inner.steps.is_empty() && inner.steps.len() >= inner.step_current {
                    if let Some(handle) = inner.resume.take() {
                        handle.cancel();
                    }
                    if inner.drive.is_none() {
                        inner.drive = Some(controller.drive_timer());
                    }
                    inner.persist_logged();
                    info!(
                        controller = %controller.name,
                        index = inner.step_current,
                        "step machine resumed after reload"
                    );
                }
            }),
        );
        self.inner.lock().unwrap().resume = Some(handle);
    }
}

/// One fire of the driving timer. The guard and action run with the
/// controller unlocked so step bodies can call back into it; advancement is
/// re-validated against the index afterwards.
fn drive_tick(inner: &Arc<Mutex<Inner>>, observer: &Arc<dyn TickObserver>) {
    let (index, step) = {
        let mut guard = inner.lock().unwrap();
        if !guard.step_active {
            return;
        }
        if guard.step_current >= guard.steps.len() {
            // Sequence complete: implicit reset back to idle.
            guard.step_current = 0;
            guard.step_active = false;
            if let Some(handle) = guard.drive.take() {
                handle.cancel();
            }
            guard.persist_logged();
            info!("step sequence complete");
            return;
        }
        (guard.step_current, guard.steps[guard.step_current].clone())
    };

    let passed = match catch_unwind(AssertUnwindSafe(|| (step.guard)())) {
        Ok(passed) => passed,
        Err(panic) => {
            observer.step_failed(index, &panic_detail(&panic));
            return;
        }
    };
    if !passed {
        // Guard not satisfied; discard this tick.
        return;
    }

    let outcome = match catch_unwind(AssertUnwindSafe(|| (step.action)())) {
        Ok(outcome) => outcome,
        Err(panic) => {
            observer.step_failed(index, &panic_detail(&panic));
            return;
        }
    };

    match outcome {
        StepOutcome::Retry => {
            debug!(index, "step not ready, retrying next tick");
        }
        StepOutcome::Fail => {
            observer.step_failed(index, "action reported failure");
        }
        StepOutcome::Advance => {
            let advanced = {
                let mut guard = inner.lock().unwrap();
                if guard.step_active && guard.step_current == index {
                    guard.step_current += 1;
                    guard.persist_logged();
                    true
                } else {
                    false
                }
            };
            if advanced {
                debug!(index, "step advanced");
                if let Some(effect) = &step.on_advance {
                    if catch_unwind(AssertUnwindSafe(|| effect())).is_err() {
                        observer.step_failed(index, "on_advance side effect panicked");
                    }
                }
            }
        }
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
