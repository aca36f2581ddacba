mod common;

use std::sync::{Arc, Mutex};

use common::init_tracing;
use praxis_core::GoalResult;
use praxis_model::{agent, body, goal, plan, service, ActionStatus, ModelRegistry};
use praxis_engine::Engine;

#[derive(Clone, Default)]
struct HandledBy(Arc<Mutex<Vec<String>>>);

impl HandledBy {
    fn record(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    fn names(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn poll_n(engine: &mut Engine, n: usize) {
    for _ in 0..n {
        engine.poll(Some(10));
    }
}

fn rig_registry(handled: &HandledBy) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    goal("Operate").commit(&mut registry).unwrap();
    plan("OperatePlan")
        .handles("Operate")
        .body(body().action("Calibrate"))
        .commit(&mut registry)
        .unwrap();
    // The robot has the plan but no handler; only an attached rig can
    // perform the calibration.
    agent("Robot").plan("OperatePlan").commit(&mut registry).unwrap();

    let sink = handled.clone();
    service("CalibrationRig")
        .handle_action("Calibrate", move |ops, _, _, _| {
            sink.record(&ops.handle().name);
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();
    registry
}

#[test]
fn actions_route_to_the_attached_service() {
    init_tracing();
    let handled = HandledBy::default();
    let mut engine = Engine::new(rig_registry(&handled));

    let robot = engine.create_agent("Robot", "robot1");
    let rig_a = engine.create_service("CalibrationRig", "rig-a");
    assert!(engine.attach_service(robot.handle(), &rig_a, false));
    robot.start();

    let pursue = robot.pursue("Operate", false);
    poll_n(&mut engine, 40);
    assert_eq!(pursue.promise.result(), Some(GoalResult::Success));
    assert_eq!(handled.names(), vec!["rig-a".to_string()]);

    // Re-attaching the same handle is a no-op returning false.
    assert!(!engine.attach_service(robot.handle(), &rig_a, false));
    assert!(!engine.attach_service(robot.handle(), &rig_a, true));

    // Detached, the action has nowhere to go and the intention fails.
    assert!(engine.detach_service(robot.handle(), &rig_a));
    assert!(!engine.detach_service(robot.handle(), &rig_a));

    let pursue = robot.pursue("Operate", false);
    poll_n(&mut engine, 40);
    assert_eq!(pursue.promise.result(), Some(GoalResult::Fail));
    assert_eq!(handled.names().len(), 1);
}

#[test]
fn force_attach_replaces_a_same_template_conflict() {
    init_tracing();
    let handled = HandledBy::default();
    let mut engine = Engine::new(rig_registry(&handled));

    let robot = engine.create_agent("Robot", "robot1");
    let rig_a = engine.create_service("CalibrationRig", "rig-a");
    let rig_b = engine.create_service("CalibrationRig", "rig-b");

    assert!(engine.attach_service(robot.handle(), &rig_b, false));
    // A second instance of the same template type is refused...
    assert!(!engine.attach_service(robot.handle(), &rig_a, false));
    // ...unless forced, which replaces the prior instance.
    assert!(engine.attach_service(robot.handle(), &rig_a, true));

    robot.start();
    let pursue = robot.pursue("Operate", false);
    poll_n(&mut engine, 40);

    assert_eq!(pursue.promise.result(), Some(GoalResult::Success));
    assert_eq!(handled.names(), vec!["rig-a".to_string()]);
}

#[test]
fn attaching_an_unknown_service_fails() {
    init_tracing();
    let handled = HandledBy::default();
    let mut engine = Engine::new(rig_registry(&handled));

    let robot = engine.create_agent("Robot", "robot1");
    let ghost = praxis_core::Handle::random("rig-ghost");
    assert!(!engine.attach_service(robot.handle(), &ghost, false));
    assert!(!engine.attach_service(robot.handle(), &ghost, true));
}

#[test]
fn pending_service_actions_complete_on_a_later_sweep() {
    init_tracing();
    let handled = HandledBy::default();
    let mut registry = ModelRegistry::new();
    goal("Operate").commit(&mut registry).unwrap();
    plan("OperatePlan")
        .handles("Operate")
        .body(body().action("Calibrate"))
        .commit(&mut registry)
        .unwrap();
    agent("Robot").plan("OperatePlan").commit(&mut registry).unwrap();

    let sink = handled.clone();
    let stash = Arc::new(Mutex::new(Vec::new()));
    let pending = Arc::clone(&stash);
    service("SlowRig")
        .handle_action("Calibrate", move |ops, _, _, handle| {
            sink.record(&ops.handle().name);
            pending.lock().unwrap().push(handle.clone());
            ActionStatus::Pending
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let robot = engine.create_agent("Robot", "robot1");
    let rig = engine.create_service("SlowRig", "rig-slow");
    engine.attach_service(robot.handle(), &rig, false);
    robot.start();

    let pursue = robot.pursue("Operate", false);
    poll_n(&mut engine, 20);
    assert_eq!(handled.names().len(), 1);
    assert!(!pursue.promise.is_complete(), "the action is still pending");

    // Complete it out-of-band; the service sweep reports back.
    stash.lock().unwrap().drain(..).for_each(|h| h.succeed());
    poll_n(&mut engine, 20);
    assert_eq!(pursue.promise.result(), Some(GoalResult::Success));
}
