//! Integration tests for the cadence-kernel crate.
//!
//! These tests exercise the schedulers, the event bus, and the registry as
//! integrated subsystems, including the timing scenarios the primitives
//! promise to honour.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cadence_kernel::{
    EventBus, KernelError, OneShotConfig, OneShotScheduler, Outcome, PacerState,
    RecurringConfig, RecurringScheduler, SchedulerRegistry, Status, TimingConfig, event_set,
};

#[derive(Debug)]
struct Alpha {
    value: i32,
}

#[derive(Debug)]
struct Beta {
    value: i32,
}

event_set!(pub AppEvents { Alpha, Beta });

// ═══════════════════════════════════════════════════════════════════════
//  Recurring scheduler
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn recurring_three_ticks_then_stops() {
    let config = RecurringConfig::new(Duration::from_millis(50), |_| true)
        .with_max_iterations(3)
        .with_run_immediately(true);
    let scheduler = RecurringScheduler::new("scenario-a", config);
    scheduler.start().unwrap();

    thread::sleep(Duration::from_millis(400));
    assert_eq!(scheduler.execution_count(), 3);
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.state(), PacerState::Stopped);
}

#[test]
fn recurring_cap_holds_across_periods() {
    for (period_ms, cap) in [(10_u64, 1_u64), (15, 4), (25, 2)] {
        let config = RecurringConfig::new(Duration::from_millis(period_ms), |_| true)
            .with_max_iterations(cap)
            .with_run_immediately(true);
        let scheduler = RecurringScheduler::new(format!("cap-{cap}"), config);
        scheduler.start().unwrap();

        thread::sleep(Duration::from_millis(period_ms * cap + 150));
        assert_eq!(scheduler.execution_count(), cap, "period {period_ms}ms");
        assert!(!scheduler.is_running());
    }
}

#[test]
fn recurring_cancel_in_every_state() {
    let make = || {
        RecurringScheduler::new(
            "cancel-any",
            RecurringConfig::new(Duration::from_millis(5), |_| true).with_run_immediately(true),
        )
    };

    // Idle.
    let idle = make();
    idle.cancel();
    assert!(idle.is_cancelled());

    // Running.
    let running = make();
    running.start().unwrap();
    thread::sleep(Duration::from_millis(20));
    running.cancel();
    assert!(running.is_cancelled());
    let seen = running.execution_count();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(running.execution_count(), seen);

    // Paused.
    let paused = make();
    paused.start().unwrap();
    assert!(paused.pause());
    paused.cancel();
    assert!(paused.is_cancelled());
    assert_eq!(paused.state(), PacerState::Cancelled);
}

#[test]
fn recurring_pause_resume_cycles() {
    let hits = Arc::new(AtomicU64::new(0));
    let h = Arc::clone(&hits);
    let scheduler = RecurringScheduler::new(
        "pulse",
        RecurringConfig::new(Duration::from_millis(5), move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            true
        })
        .with_run_immediately(true),
    );
    scheduler.start().unwrap();

    for _ in 0..3 {
        thread::sleep(Duration::from_millis(20));
        assert!(scheduler.pause());
        assert!(scheduler.is_paused());
        thread::sleep(Duration::from_millis(20));
        let frozen = hits.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(hits.load(Ordering::SeqCst), frozen);
        assert!(scheduler.resume());
    }

    scheduler.cancel();
}

#[test]
fn recurring_period_edit_takes_effect_without_restart() {
    let scheduler = RecurringScheduler::new(
        "retune",
        RecurringConfig::new(Duration::from_millis(100), |_| true).with_run_immediately(true),
    );
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(scheduler.execution_count(), 1);

    // The wait already in progress is honoured; every wait after the next
    // tick uses the new period.
    scheduler.set_period(Duration::from_millis(5));
    thread::sleep(Duration::from_millis(230));
    assert!(scheduler.execution_count() > 5);
    assert_eq!(scheduler.config().period, Duration::from_millis(5));
    scheduler.cancel();
}

#[test]
fn recurring_callback_may_cancel_its_own_scheduler() {
    let slot: Arc<Mutex<Option<Arc<RecurringScheduler>>>> = Arc::new(Mutex::new(None));
    let s = Arc::clone(&slot);
    let scheduler = Arc::new(RecurringScheduler::new(
        "self-cancel",
        RecurringConfig::new(Duration::from_millis(5), move |i| {
            if i == 2 {
                if let Some(me) = s.lock().unwrap().as_ref() {
                    me.cancel();
                }
            }
            true
        })
        .with_run_immediately(true),
    ));
    *slot.lock().unwrap() = Some(Arc::clone(&scheduler));
    scheduler.start().unwrap();

    thread::sleep(Duration::from_millis(100));
    assert!(scheduler.is_cancelled());
    assert_eq!(scheduler.execution_count(), 3);
    assert!(!scheduler.is_running());

    // Break the Arc cycle so the scheduler can drop.
    slot.lock().unwrap().take();
}

#[test]
fn recurring_cancel_waits_for_in_flight_callback() {
    let done = Arc::new(AtomicBool::new(false));
    let d = Arc::clone(&done);
    let scheduler = RecurringScheduler::new(
        "in-flight",
        RecurringConfig::new(Duration::from_millis(5), move |_| {
            thread::sleep(Duration::from_millis(100));
            d.store(true, Ordering::SeqCst);
            true
        })
        .with_run_immediately(true),
    );
    scheduler.start().unwrap();

    thread::sleep(Duration::from_millis(30));
    assert!(!done.load(Ordering::SeqCst), "callback should still be sleeping");
    scheduler.cancel();

    assert!(done.load(Ordering::SeqCst));
    assert_eq!(scheduler.execution_count(), 1);
    assert_eq!(scheduler.state(), PacerState::Cancelled);
}

#[test]
fn recurring_zero_period_honours_cap() {
    for immediate in [false, true] {
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let scheduler = RecurringScheduler::new(
            "zero-period",
            RecurringConfig::new(Duration::ZERO, move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                true
            })
            .with_max_iterations(5)
            .with_run_immediately(immediate),
        );
        scheduler.start().unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 5, "immediate = {immediate}");
        assert_eq!(scheduler.execution_count(), 5);
        assert_eq!(scheduler.state(), PacerState::Stopped);
    }
}

#[test]
fn recurring_unbounded_period_waits_until_cancelled() {
    let scheduler = RecurringScheduler::new(
        "forever",
        RecurringConfig::new(Duration::MAX, |_| true).with_run_immediately(true),
    );
    scheduler.start().unwrap();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(scheduler.execution_count(), 1);
    assert_eq!(scheduler.state(), PacerState::Running);

    let begun = Instant::now();
    scheduler.cancel();
    assert!(begun.elapsed() < Duration::from_secs(1));
    assert_eq!(scheduler.state(), PacerState::Cancelled);
}

// ═══════════════════════════════════════════════════════════════════════
//  One-shot scheduler
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn one_shot_cancel_at_half_delay_never_fires() {
    let fired = Arc::new(AtomicU32::new(0));
    let f = Arc::clone(&fired);
    let scheduler = OneShotScheduler::new(
        "scenario-b",
        OneShotConfig::new(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(50));
    scheduler.cancel();

    thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(scheduler.is_cancelled());
}

#[test]
fn one_shot_with_tight_wait_slice() {
    let timing = TimingConfig::new().with_wait_slice(Duration::from_millis(5));
    let fired = Arc::new(AtomicU32::new(0));
    let f = Arc::clone(&fired);
    let scheduler = OneShotScheduler::with_timing(
        "tight",
        OneShotConfig::new(Duration::from_millis(30), move || {
            f.fetch_add(1, Ordering::SeqCst);
        }),
        &timing,
    )
    .unwrap();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(scheduler.has_fired());
}

#[test]
fn one_shot_unbounded_delay_stays_pending() {
    let fired = Arc::new(AtomicU32::new(0));
    let f = Arc::clone(&fired);
    let scheduler = OneShotScheduler::new(
        "never",
        OneShotConfig::new(Duration::MAX, move || {
            f.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(100));
    assert!(scheduler.is_pending());
    assert!(!scheduler.has_fired());

    let begun = Instant::now();
    scheduler.cancel();
    assert!(begun.elapsed() < Duration::from_secs(1));
    assert!(!scheduler.is_pending());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Event bus
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn bus_alpha_listener_sees_value_once() {
    let bus = EventBus::<AppEvents>::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let _sub = bus.subscribe(move |e: &Alpha| s.lock().unwrap().push(e.value));

    bus.dispatch(Alpha { value: 5 });
    assert_eq!(*seen.lock().unwrap(), vec![5]);
}

#[test]
fn bus_structurally_identical_types_stay_separate() {
    let bus = EventBus::<AppEvents>::new();
    let alpha_hits = Arc::new(AtomicU32::new(0));
    let a = Arc::clone(&alpha_hits);
    let _sub = bus.subscribe(move |_: &Alpha| {
        a.fetch_add(1, Ordering::SeqCst);
    });

    bus.dispatch(Beta { value: 5 });
    bus.dispatch(Beta { value: 6 });
    assert_eq!(alpha_hits.load(Ordering::SeqCst), 0);
}

#[test]
fn bus_concurrent_subscriptions_are_all_observed() {
    const THREADS: usize = 16;
    let bus = EventBus::<AppEvents>::new();
    let hits = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bus = bus.clone();
            let hits = Arc::clone(&hits);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                bus.subscribe(move |_: &Beta| {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            })
        })
        .collect();
    let subscriptions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(bus.listener_count::<Beta>(), THREADS);
    bus.dispatch(Beta { value: 0 });
    assert_eq!(hits.load(Ordering::SeqCst), THREADS as u32);
    drop(subscriptions);
    assert_eq!(bus.total_listeners(), 0);
}

#[test]
fn bus_double_unsubscribe_then_dispatch() {
    let bus = EventBus::<AppEvents>::new();
    let hits = Arc::new(AtomicU32::new(0));
    let h = Arc::clone(&hits);
    let sub = bus.subscribe(move |_: &Alpha| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    assert!(sub.unsubscribe());
    assert!(!sub.unsubscribe());
    bus.dispatch(Alpha { value: 1 });
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn bus_async_dispatch_from_scheduler_tick() {
    let bus = EventBus::<AppEvents>::new();
    let total = Arc::new(AtomicU32::new(0));
    let t = Arc::clone(&total);
    let _sub = bus.subscribe(move |e: &Alpha| {
        t.fetch_add(e.value as u32, Ordering::SeqCst);
    });

    let publisher = bus.clone();
    let scheduler = RecurringScheduler::new(
        "publisher",
        RecurringConfig::new(Duration::from_millis(5), move |i| {
            publisher
                .dispatch_async(Alpha { value: i as i32 + 1 })
                .is_ok()
        })
        .with_max_iterations(4)
        .with_run_immediately(true),
    );
    scheduler.start().unwrap();

    thread::sleep(Duration::from_millis(200));
    // 1 + 2 + 3 + 4
    assert_eq!(total.load(Ordering::SeqCst), 10);
}

// ═══════════════════════════════════════════════════════════════════════
//  Registry + outcome
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn registry_shutdown_cancels_everything() {
    let registry = SchedulerRegistry::new();
    let ticks = Arc::new(RecurringScheduler::new(
        "ticks",
        RecurringConfig::new(Duration::from_millis(5), |_| true),
    ));
    ticks.start().unwrap();
    registry.register_recurring(Arc::clone(&ticks)).unwrap();
    registry
        .register_one_shot(Arc::new(
            OneShotScheduler::new(
                "later",
                OneShotConfig::new(Duration::from_secs(60), || {}),
            )
            .unwrap(),
        ))
        .unwrap();

    registry.cancel_all();
    assert!(ticks.is_cancelled());
    assert!(registry.one_shot("later").unwrap().is_cancelled());
    assert_eq!(registry.list_by_state(PacerState::Cancelled).len(), 2);
}

#[test]
fn start_twice_reports_bad_outcome() {
    let scheduler = RecurringScheduler::new(
        "outcome",
        RecurringConfig::new(Duration::from_millis(10), |_| true),
    );
    let first: Outcome<()> = scheduler.start().into();
    assert_eq!(first.status, Status::Good);

    let second = scheduler.start();
    assert!(matches!(second, Err(KernelError::AlreadyRunning { .. })));
    let second: Outcome<()> = second.into();
    assert_eq!(second.status, Status::Bad);
    assert!(second.message.is_some());

    scheduler.cancel();
}
