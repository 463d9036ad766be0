// End-to-end behaviour across a simulated page reload: the controller is
// destroyed and rebuilt against the same medium, and the step machine must
// pick up exactly where the persisted state says it stopped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cogs_core::{LogObserver, ManualTimers, MemoryJar, Page, SchedulerConfig, SystemClock};
use cogs_scheduler::{Step, StepOutcome, ThreadController};

fn controller(name: &str, medium: &Arc<MemoryJar>, timers: &Arc<ManualTimers>) -> ThreadController {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    ThreadController::new(
        name,
        medium.clone(),
        Arc::new(SystemClock),
        timers.clone(),
        Arc::new(LogObserver),
        SchedulerConfig::default(),
    )
    .unwrap()
}

fn register_steps(controller: &ThreadController, runs: &[Arc<AtomicUsize>; 3]) {
    for counter in runs {
        let counter = counter.clone();
        controller.add_step(Step::new(
            || true,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                StepOutcome::Advance
            },
        ));
    }
}

#[test]
fn step_machine_resumes_at_saved_index_after_reload() {
    let medium = Arc::new(MemoryJar::new());
    let runs: [Arc<AtomicUsize>; 3] = std::array::from_fn(|_| Arc::new(AtomicUsize::new(0)));

    // First page lifetime: advance through the first two steps.
    {
        let timers = Arc::new(ManualTimers::new());
        let controller = controller("Permit", &medium, &timers);
        register_steps(&controller, &runs);
        controller.start_steps().unwrap();

        timers.advance(Duration::from_millis(1000));
        assert_eq!(controller.step_index(), 2);
        assert!(controller.steps_active());
        // Reload: controller and all its timers are torn down here.
    }

    // Second page lifetime, same medium.
    let timers = Arc::new(ManualTimers::new());
    let rebuilt = controller("Permit", &medium, &timers);
    assert_eq!(rebuilt.step_index(), 2);
    assert!(rebuilt.steps_active());

    // The resume poll must wait: no steps are registered yet, and driving
    // at index 2 with an empty list would reset the sequence.
    timers.advance(Duration::from_millis(4000));
    assert_eq!(rebuilt.step_index(), 2);
    assert_eq!(runs[2].load(Ordering::SeqCst), 0);

    // The owning script replays its registration block.
    register_steps(&rebuilt, &runs);

    // Next resume poll sees enough steps and starts the driving loop.
    timers.advance(Duration::from_millis(2000));
    timers.advance(Duration::from_millis(500));
    assert_eq!(rebuilt.step_index(), 3);

    // Only the remaining step ran; the first two were not replayed.
    assert_eq!(runs[0].load(Ordering::SeqCst), 1);
    assert_eq!(runs[1].load(Ordering::SeqCst), 1);
    assert_eq!(runs[2].load(Ordering::SeqCst), 1);

    // One more tick and the machine retires itself.
    timers.advance(Duration::from_millis(500));
    assert_eq!(rebuilt.step_index(), 0);
    assert!(!rebuilt.steps_active());
}

#[test]
fn reload_between_last_advance_and_reset_still_retires_the_machine() {
    let medium = Arc::new(MemoryJar::new());
    let runs: [Arc<AtomicUsize>; 3] = std::array::from_fn(|_| Arc::new(AtomicUsize::new(0)));

    // First lifetime: all three steps advance, but the reload lands before
    // the tick that would have reset the machine back to idle.
    {
        let timers = Arc::new(ManualTimers::new());
        let controller = controller("Permit", &medium, &timers);
        register_steps(&controller, &runs);
        controller.start_steps().unwrap();

        timers.advance(Duration::from_millis(1500));
        assert_eq!(controller.step_index(), 3);
        assert!(controller.steps_active());
    }

    // Second lifetime: the owner replays the same three steps. The saved
    // index equals the list length, so no step is left to run; the machine
    // must still reach its reset instead of polling forever.
    let timers = Arc::new(ManualTimers::new());
    let rebuilt = controller("Permit", &medium, &timers);
    register_steps(&rebuilt, &runs);

    timers.advance(Duration::from_millis(2000));
    timers.advance(Duration::from_millis(500));
    assert_eq!(rebuilt.step_index(), 0);
    assert!(!rebuilt.steps_active());
    assert_eq!(timers.live(), 0);

    // No step ran a second time.
    for counter in &runs {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn reset_during_the_resume_wait_abandons_the_old_sequence() {
    let medium = Arc::new(MemoryJar::new());
    let runs: [Arc<AtomicUsize>; 3] = std::array::from_fn(|_| Arc::new(AtomicUsize::new(0)));

    {
        let timers = Arc::new(ManualTimers::new());
        let controller = controller("Permit", &medium, &timers);
        register_steps(&controller, &runs);
        controller.start_steps().unwrap();
        timers.advance(Duration::from_millis(500));
        assert_eq!(controller.step_index(), 1);
    }

    let timers = Arc::new(ManualTimers::new());
    let rebuilt = controller("Permit", &medium, &timers);
    rebuilt.reset_steps().unwrap();

    register_steps(&rebuilt, &runs);
    timers.advance(Duration::from_millis(10_000));
    // The resume poll was cancelled; nothing drives until asked to.
    assert_eq!(rebuilt.step_index(), 0);
    assert_eq!(runs[1].load(Ordering::SeqCst), 0);
}

/// Scripted page: selectors "appear" as the test reveals them, and clicks
/// are recorded.
#[derive(Default)]
struct ScriptedPage {
    visible: Mutex<Vec<String>>,
    clicked: Mutex<Vec<String>>,
}

impl ScriptedPage {
    fn reveal(&self, selector: &str) {
        self.visible.lock().unwrap().push(selector.to_string());
    }
}

impl Page for ScriptedPage {
    fn exists(&self, selector: &str) -> bool {
        self.visible.lock().unwrap().iter().any(|s| s == selector)
    }

    fn click(&self, selector: &str) -> bool {
        if !self.exists(selector) {
            return false;
        }
        self.clicked.lock().unwrap().push(selector.to_string());
        true
    }
}

#[test]
fn click_steps_wait_for_their_selectors() {
    let medium = Arc::new(MemoryJar::new());
    let timers = Arc::new(ManualTimers::new());
    let controller = controller("Portal", &medium, &timers);
    let page = Arc::new(ScriptedPage::default());

    controller.add_click_step(page.clone(), "#search-form", "#search-submit");
    controller.add_click_step(page.clone(), "#results-table", "#first-result");
    controller.start_steps().unwrap();

    // Nothing on the page yet: ticks are discarded.
    timers.advance(Duration::from_millis(2000));
    assert_eq!(controller.step_index(), 0);

    // The form renders but the submit button lags a tick behind.
    page.reveal("#search-form");
    timers.advance(Duration::from_millis(500));
    assert_eq!(controller.step_index(), 0);

    page.reveal("#search-submit");
    timers.advance(Duration::from_millis(500));
    assert_eq!(controller.step_index(), 1);
    assert_eq!(*page.clicked.lock().unwrap(), ["#search-submit"]);

    page.reveal("#results-table");
    page.reveal("#first-result");
    timers.advance(Duration::from_millis(500));
    assert_eq!(controller.step_index(), 2);
    assert_eq!(
        *page.clicked.lock().unwrap(),
        ["#search-submit", "#first-result"]
    );
}
