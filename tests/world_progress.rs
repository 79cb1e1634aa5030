use mc_ecs::{context, Callback, IterMode, SyncMode, Term, ThreadContext};
use mc_ecs::{Arena, Barrier, TaskQueue, World};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

/// Single-lane harness: installs a one-participant `ThreadContext` as the calling
/// thread's current context (required since task callbacks read it back out via
/// `context::tctx_current` rather than having it threaded through their closure).
fn single_lane_ctx() -> ThreadContext {
    let mut buf = vec![0u8; 4096];
    let arena = Arena::from_buffer(&mut buf);
    std::mem::forget(buf);
    ThreadContext::new(0, 1, Barrier::new(1), Arc::new(AtomicU64::new(0)), arena)
}

/// End-to-end scenario 6 driven through `World::progress`: a move system (writes
/// Position from Velocity) registered before a render-order system that only reads
/// Position runs strictly after it, via the planner-inferred dependency edge, and
/// both systems' callbacks each run exactly once per frame.
#[test]
fn progress_runs_dependent_systems_in_order_through_the_task_queue() {
    let mut world = World::new();
    let pos = world.component_register::<Position>("Position").unwrap();
    let vel = world.component_register::<Velocity>("Velocity").unwrap();

    for _ in 0..5 {
        let e = world.entity_new();
        world.set(e, pos, Position { x: 0.0, y: 0.0 });
        world.set(e, vel, Velocity { x: 1.0, y: 1.0 });
    }

    let move_ran = Arc::new(AtomicUsize::new(0));
    let render_ran = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let o = order.clone();
    let r = move_ran.clone();
    world.system_init(
        "move",
        vec![Term::new(pos).out(), Term::new(vel).inn()],
        Callback::Terms(Box::new(move |_table, _range| {
            r.fetch_add(1, Ordering::SeqCst);
            o.lock().unwrap().push("move");
        })),
        IterMode::Terms,
        SyncMode::None,
    );

    let o = order.clone();
    let r = render_ran.clone();
    world.system_init(
        "render",
        vec![Term::new(pos).inn()],
        Callback::Terms(Box::new(move |_table, _range| {
            r.fetch_add(1, Ordering::SeqCst);
            o.lock().unwrap().push("render");
        })),
        IterMode::Terms,
        SyncMode::None,
    );

    let ctx = single_lane_ctx();
    unsafe { context::tctx_set_current(&ctx as *const ThreadContext as *mut ThreadContext) };

    let queue = TaskQueue::new();
    world.progress(&ctx, &queue);

    unsafe { context::tctx_set_current(std::ptr::null_mut()) };

    assert_eq!(move_ran.load(Ordering::SeqCst), 1);
    assert_eq!(render_ran.load(Ordering::SeqCst), 1);
    assert_eq!(*order.lock().unwrap(), vec!["move", "render"]);
}

/// Scenario 7, via `World::progress`'s underlying queue: running a second frame
/// reuses the same `TaskQueue` after it was fully drained and its counters reset.
#[test]
fn progress_can_run_multiple_frames_on_the_same_queue() {
    let mut world = World::new();
    let pos = world.component_register::<Position>("Position").unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    let r = ran.clone();
    world.system_init(
        "tick",
        vec![Term::new(pos).inn()],
        Callback::Terms(Box::new(move |_table, _range| {
            r.fetch_add(1, Ordering::SeqCst);
        })),
        IterMode::Terms,
        SyncMode::None,
    );

    let e = world.entity_new();
    world.set(e, pos, Position { x: 0.0, y: 0.0 });

    let ctx = single_lane_ctx();
    unsafe { context::tctx_set_current(&ctx as *const ThreadContext as *mut ThreadContext) };

    let queue = TaskQueue::new();
    world.progress(&ctx, &queue);
    assert_eq!(queue.tasks_count(), 0);
    world.progress(&ctx, &queue);
    assert_eq!(queue.tasks_count(), 0);

    unsafe { context::tctx_set_current(std::ptr::null_mut()) };
    assert_eq!(ran.load(Ordering::SeqCst), 2);
}
