mod common;

use std::sync::{Arc, Mutex};

use common::{init_tracing, Counter};
use praxis_core::{BdiLog, Field, GoalResult, MemoryBus, UniqueId};
use praxis_model::{
    agent, body, goal, message_schema, plan, resource, tactic, ActionStatus, ModelRegistry,
};
use praxis_engine::{Engine, EngineError};

fn poll_n(engine: &mut Engine, n: usize) {
    for _ in 0..n {
        engine.poll(Some(10));
    }
}

#[test]
fn agent_stopped_by_default() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    plan("Plan1")
        .handles("Goal1")
        .body(body().action("Plan1Action"))
        .commit(&mut registry)
        .unwrap();
    let invoked = Counter::new();
    let counter = invoked.clone();
    agent("TestAgent1")
        .plan("Plan1")
        .handle_action("Plan1Action", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("TestAgent1", "agent1");
    poll_n(&mut engine, 5);

    assert!(!engine.agent_running(bot.handle()));
    assert_eq!(invoked.get(), 0);
}

#[test]
fn agent_start_stop() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    plan("Plan1")
        .handles("Goal1")
        .body(body().action("Plan1Action"))
        .commit(&mut registry)
        .unwrap();
    let invoked = Counter::new();
    let counter = invoked.clone();
    agent("TestAgent1")
        .plan("Plan1")
        .handle_action("Plan1Action", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("TestAgent1", "agent1");

    // Pursue on a stopped agent: the desire queues, nothing runs.
    bot.pursue("Goal1", true);
    poll_n(&mut engine, 100);
    assert_eq!(invoked.get(), 0, "no plan may run before the agent starts");

    bot.start();
    engine.poll(Some(10));
    assert!(engine.agent_running(bot.handle()));
    poll_n(&mut engine, 100);
    assert_eq!(invoked.get(), 1, "the persistent goal runs exactly once");

    // Stop: desires and intentions drain completely.
    bot.stop();
    for _ in 0..100 {
        if engine.agent_stopped(bot.handle()) {
            break;
        }
        engine.poll(Some(10));
    }
    assert!(engine.agent_stopped(bot.handle()));
    assert!(engine.desires(bot.handle()).is_empty());
    assert!(engine.intentions(bot.handle()).is_empty());

    // Restart: desires must not reappear on their own.
    bot.start();
    poll_n(&mut engine, 50);
    assert!(engine.desires(bot.handle()).is_empty());
    assert!(engine.intentions(bot.handle()).is_empty());

    // A fresh pursue runs again and the persistent desire stays.
    bot.pursue("Goal1", true);
    poll_n(&mut engine, 50);
    assert_eq!(invoked.get(), 2);
    assert!(!engine.desires(bot.handle()).is_empty());
}

#[test]
fn pause_retains_desires() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    plan("Plan1")
        .handles("Goal1")
        .body(body().action("Plan1Action"))
        .commit(&mut registry)
        .unwrap();
    let invoked = Counter::new();
    let counter = invoked.clone();
    agent("TestAgent1")
        .plan("Plan1")
        .handle_action("Plan1Action", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("TestAgent1", "agent1");
    bot.pursue("Goal1", true);
    bot.start();
    poll_n(&mut engine, 30);
    assert_eq!(invoked.get(), 1);

    bot.pause();
    poll_n(&mut engine, 30);
    assert!(!engine.agent_running(bot.handle()));
    assert_eq!(engine.desires(bot.handle()).len(), 1);

    // Resuming re-activates the persistent desire.
    bot.start();
    poll_n(&mut engine, 30);
    assert_eq!(invoked.get(), 2);
}

#[test]
fn plan_switch_mid_intention() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    message_schema("Switchboard")
        .field_with_default("switch_plans", Field::Bool(false))
        .commit(&mut registry)
        .unwrap();
    goal("SwitchGoal").commit(&mut registry).unwrap();
    plan("PlanA")
        .handles("SwitchGoal")
        .pre(|ctx| ctx.bool_belief("Switchboard", "switch_plans") == Some(false))
        .body(body().action("ActionA"))
        .commit(&mut registry)
        .unwrap();
    plan("PlanB")
        .handles("SwitchGoal")
        .pre(|ctx| ctx.bool_belief("Switchboard", "switch_plans") == Some(true))
        .body(body().action("ActionB"))
        .commit(&mut registry)
        .unwrap();

    let ran_a = Counter::new();
    let ran_b = Counter::new();
    let a = ran_a.clone();
    let b = ran_b.clone();
    agent("Switcher")
        .plans(["PlanA", "PlanB"])
        .belief_name("Switchboard")
        .handle_action("ActionA", move |ops, _, _, _| {
            a.bump();
            // Flip the belief and demand a replan; this action never
            // completes, so only a forced reschedule can supersede it.
            ops.post_percept("Switchboard", "switch_plans", Field::Bool(true));
            ops.force_reschedule();
            ActionStatus::Pending
        })
        .handle_action("ActionB", move |ops, _, _, _| {
            b.bump();
            ops.stop();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("Switcher", "switcher1");
    bot.pursue("SwitchGoal", false);
    bot.start();
    poll_n(&mut engine, 60);

    assert_eq!(ran_a.get(), 1, "the first schedule commits plan A");
    assert_eq!(ran_b.get(), 1, "the forced replan switches to plan B");
    assert!(engine.agent_stopped(bot.handle()));
}

#[test]
fn pursue_rejected_without_plans() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    agent("Planless").commit(&mut registry).unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("Planless", "agent1");
    bot.start();
    let pursue = bot.pursue("Goal1", false);
    poll_n(&mut engine, 32);

    assert!(engine.desires(bot.handle()).is_empty());
    assert_eq!(pursue.promise.result(), Some(GoalResult::Dropped));
}

#[test]
fn unknown_template_refuses_start() {
    init_tracing();
    let registry = ModelRegistry::new();
    let mut engine = Engine::new(registry);

    let ghost = engine.create_agent("UnknownTemplate", "agent1");
    assert!(!ghost.valid());
    assert_ne!(engine.status(), 0);

    match engine.start() {
        Ok(_) => panic!("engine must refuse to start after a bootstrap error"),
        Err((engine, error)) => {
            assert!(matches!(error, EngineError::CriticalBootstrap(_)));
            assert_ne!(engine.status(), 0);
        }
    }
}

#[test]
fn perform_1k_goals() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    plan("Plan1")
        .handles("Goal1")
        .body(body().action("Plan1Action"))
        .commit(&mut registry)
        .unwrap();
    let invoked = Counter::new();
    let counter = invoked.clone();
    agent("TestAgent1")
        .plan("Plan1")
        .handle_action("Plan1Action", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("TestAgent1", "agent1");
    for _ in 0..1000 {
        bot.pursue("Goal1", false);
    }
    bot.start();

    for _ in 0..300 {
        engine.poll(Some(10));
        if invoked.get() == 1000 && engine.desires(bot.handle()).is_empty() {
            break;
        }
    }

    assert_eq!(invoked.get(), 1000);
    assert!(engine.desires(bot.handle()).is_empty());
}

#[test]
fn pursue_same_id_merges_to_one_desire() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    plan("Plan1")
        .handles("Goal1")
        .body(body().action("Plan1Action"))
        .commit(&mut registry)
        .unwrap();
    agent("TestAgent1")
        .plan("Plan1")
        .handle_action("Plan1Action", |_, _, _, _| ActionStatus::Success)
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("TestAgent1", "agent1");

    let id = UniqueId::random();
    let first = bot.pursue_with("Goal1", true, None, Some(id));
    let second = bot.pursue_with("Goal1", true, None, Some(id));
    bot.start();
    poll_n(&mut engine, 50);

    assert_eq!(engine.desires(bot.handle()).len(), 1);
    // The merged desire adopted the latest promise; the earlier one is
    // dropped without ever firing.
    assert_eq!(second.promise.result(), Some(GoalResult::Success));
    assert_eq!(first.promise.result(), None);
}

#[test]
fn drop_of_unknown_goal_is_a_noop() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    plan("Plan1")
        .handles("Goal1")
        .body(body().action("Plan1Action"))
        .commit(&mut registry)
        .unwrap();
    agent("TestAgent1")
        .plan("Plan1")
        .handle_action("Plan1Action", |_, _, _, _| ActionStatus::Success)
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("TestAgent1", "agent1");
    bot.start();
    poll_n(&mut engine, 5);

    let ghost = praxis_core::Handle::random("Goal1");
    assert!(!engine.drop_goal(bot.handle(), &ghost, "nothing to drop"));
}

#[test]
fn plan_effects_never_raise_percepts() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    resource("battery")
        .min(0)
        .max(100)
        .commit(&mut registry)
        .unwrap();
    goal("Consume").commit(&mut registry).unwrap();
    plan("Burn")
        .handles("Consume")
        .effects(|ctx| {
            let _ = ctx.consume_resource("battery", 10);
        })
        .body(body().action("Noop"))
        .commit(&mut registry)
        .unwrap();
    agent("Consumer")
        .plan("Burn")
        .resource("battery")
        .handle_action("Noop", |_, _, _, _| ActionStatus::Success)
        .commit(&mut registry)
        .unwrap();

    let bus = MemoryBus::new();
    let mut engine = Engine::new(registry).with_bus(bus.clone());
    let bot = engine.create_agent("Consumer", "agent1");
    let pursue = bot.pursue("Consume", false);
    bot.start();
    poll_n(&mut engine, 40);

    assert_eq!(pursue.promise.result(), Some(GoalResult::Success));
    // Effects are hypothetical: the live resource is untouched and no
    // percept ever reached the bus.
    assert_eq!(engine.resource(bot.handle(), "battery"), Some(100));
    let percepts = bus
        .events()
        .iter()
        .filter(|e| matches!(e.payload, praxis_core::BusPayload::Percept { .. }))
        .count();
    assert_eq!(percepts, 0);
}

#[test]
fn sleep_suspends_until_the_timer_fires() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Nap").commit(&mut registry).unwrap();
    plan("NapPlan")
        .handles("Nap")
        .body(body().sleep(200).action("WakeUp"))
        .commit(&mut registry)
        .unwrap();
    let woke = Counter::new();
    let counter = woke.clone();
    agent("Sleeper")
        .plan("NapPlan")
        .handle_action("WakeUp", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let bus = MemoryBus::new();
    let mut engine = Engine::new(registry).with_bus(bus.clone());
    let bot = engine.create_agent("Sleeper", "agent1");
    bot.pursue("Nap", false);
    bot.start();

    poll_n(&mut engine, 10);
    assert_eq!(woke.get(), 0, "still sleeping at 100ms of engine time");

    poll_n(&mut engine, 30);
    assert_eq!(woke.get(), 1);
    assert_eq!(
        bus.count_logs(|log| matches!(log, BdiLog::SleepStarted { .. })),
        1
    );
    assert_eq!(
        bus.count_logs(|log| matches!(log, BdiLog::SleepFinished { .. })),
        1
    );
}

#[test]
fn select_tactic_reroutes_plan_selection() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Travel").commit(&mut registry).unwrap();
    plan("ByFoot")
        .handles("Travel")
        .body(body().action("Walk"))
        .commit(&mut registry)
        .unwrap();
    plan("ByAir")
        .handles("Travel")
        .body(body().action("Fly"))
        .commit(&mut registry)
        .unwrap();
    tactic("Airborne")
        .goal("Travel")
        .plans(["ByAir"])
        .commit(&mut registry)
        .unwrap();

    let walked = Counter::new();
    let flew = Counter::new();
    let w = walked.clone();
    let f = flew.clone();
    agent("Traveller")
        .plans(["ByFoot", "ByAir"])
        .handle_action("Walk", move |_, _, _, _| {
            w.bump();
            ActionStatus::Success
        })
        .handle_action("Fly", move |_, _, _, _| {
            f.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("Traveller", "agent1");
    bot.pursue("Travel", true);
    bot.start();
    poll_n(&mut engine, 30);
    assert_eq!(walked.get(), 1, "registration order wins without a tactic");
    assert_eq!(flew.get(), 0);

    bot.select_tactic("Airborne");
    poll_n(&mut engine, 30);
    assert_eq!(flew.get(), 1, "the tactic switch re-plans onto ByAir");
    assert_eq!(walked.get(), 1);
}

#[test]
fn dropping_a_goal_drops_its_sub_goals_first() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Mission").commit(&mut registry).unwrap();
    goal("Recon").commit(&mut registry).unwrap();
    plan("MissionPlan")
        .handles("Mission")
        .body(body().goal("Recon").action("Finish"))
        .commit(&mut registry)
        .unwrap();
    plan("ReconPlan")
        .handles("Recon")
        .body(body().sleep(60_000))
        .commit(&mut registry)
        .unwrap();

    let finished = Counter::new();
    let counter = finished.clone();
    agent("Operative")
        .plans(["MissionPlan", "ReconPlan"])
        .handle_action("Finish", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let bus = MemoryBus::new();
    let mut engine = Engine::new(registry).with_bus(bus.clone());
    let bot = engine.create_agent("Operative", "agent1");
    let pursue = bot.pursue("Mission", false);
    bot.start();

    // Let the sub-goal spin up (it sleeps for a long time).
    for _ in 0..50 {
        engine.poll(Some(10));
        if engine.desires(bot.handle()).len() == 2 {
            break;
        }
    }
    assert_eq!(engine.desires(bot.handle()).len(), 2);

    assert!(engine.drop_goal(bot.handle(), &pursue.handle, "mission aborted"));
    poll_n(&mut engine, 20);

    assert!(engine.desires(bot.handle()).is_empty());
    assert_eq!(finished.get(), 0, "the tail action never runs");
    assert_eq!(pursue.promise.result(), Some(GoalResult::Dropped));

    // The sub-goal's FINISHED log lands before the parent's.
    let order: Vec<&'static str> = bus
        .events()
        .iter()
        .filter_map(|e| match &e.payload {
            praxis_core::BusPayload::BdiLog { entry, .. } => match entry {
                BdiLog::SubGoalFinished { .. } => Some("sub"),
                BdiLog::GoalFinished { .. } => Some("goal"),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(order, vec!["sub", "goal"]);
}

#[test]
fn failed_plans_follow_the_tactic_policy() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Deliver").commit(&mut registry).unwrap();
    plan("Primary")
        .handles("Deliver")
        .body(body().action("TryPrimary"))
        .commit(&mut registry)
        .unwrap();
    plan("Backup")
        .handles("Deliver")
        .body(body().action("TryBackup"))
        .commit(&mut registry)
        .unwrap();

    let primary = Counter::new();
    let backup = Counter::new();
    let p = primary.clone();
    let b = backup.clone();
    agent("Courier")
        .plans(["Primary", "Backup"])
        .handle_action("TryPrimary", move |_, _, _, _| {
            p.bump();
            ActionStatus::Fail
        })
        .handle_action("TryBackup", move |_, _, _, _| {
            b.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("Courier", "agent1");
    let pursue = bot.pursue("Deliver", false);
    bot.start();
    poll_n(&mut engine, 60);

    // Exclude policy: the failed primary plan is never retried; the
    // backup completes the goal.
    assert_eq!(primary.get(), 1);
    assert_eq!(backup.get(), 1);
    assert_eq!(pursue.promise.result(), Some(GoalResult::Success));
    assert!(engine.desires(bot.handle()).is_empty());
}

#[test]
fn goal_parameters_are_schema_checked() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    message_schema("DeliveryOrder")
        .field("destination", praxis_core::FieldKind::Str)
        .commit(&mut registry)
        .unwrap();
    goal("Deliver")
        .message("DeliveryOrder")
        .commit(&mut registry)
        .unwrap();
    plan("DeliverPlan")
        .handles("Deliver")
        .body(body().action("Go"))
        .commit(&mut registry)
        .unwrap();
    let went = Counter::new();
    let counter = went.clone();
    agent("Courier")
        .plan("DeliverPlan")
        .handle_action("Go", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("Courier", "agent1");
    bot.start();

    // Missing parameters: rejected at the event boundary.
    bot.pursue("Deliver", false);
    poll_n(&mut engine, 10);
    assert!(engine.desires(bot.handle()).is_empty());

    // Wrong schema: rejected.
    let wrong = praxis_core::Message::new("SomethingElse");
    bot.pursue_with("Deliver", false, Some(wrong), None);
    poll_n(&mut engine, 10);
    assert!(engine.desires(bot.handle()).is_empty());
    assert_eq!(went.get(), 0);

    // Well-formed parameters reach the plan.
    let order = praxis_core::Message::new("DeliveryOrder")
        .with("destination", Field::Str("depot-7".into()));
    let pursue = bot.pursue_with("Deliver", false, Some(order), None);
    poll_n(&mut engine, 30);
    assert_eq!(went.get(), 1);
    assert_eq!(pursue.promise.result(), Some(GoalResult::Success));
}

#[test]
fn background_loop_runs_agents() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Goal1").commit(&mut registry).unwrap();
    plan("Plan1")
        .handles("Goal1")
        .body(body().action("Plan1Action"))
        .commit(&mut registry)
        .unwrap();
    let invoked = Counter::new();
    let counter = invoked.clone();
    agent("TestAgent1")
        .plan("Plan1")
        .handle_action("Plan1Action", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("TestAgent1", "agent1");
    bot.pursue("Goal1", true);
    bot.start();

    let handle = engine.start().expect("no bootstrap errors");
    for _ in 0..200 {
        if invoked.get() >= 1 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let engine = handle.stop();

    assert_eq!(invoked.get(), 1);
    assert!(engine.agent_running(bot.handle()));
}

#[test]
fn initial_desires_start_with_the_agent() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    goal("Heartbeat").commit(&mut registry).unwrap();
    plan("BeatOnce")
        .handles("Heartbeat")
        .body(body().action("Beat"))
        .commit(&mut registry)
        .unwrap();
    let beats = Counter::new();
    let counter = beats.clone();
    agent("Monitor")
        .plan("BeatOnce")
        .initial_goal("Heartbeat")
        .handle_action("Beat", move |_, _, _, _| {
            counter.bump();
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("Monitor", "monitor1");
    poll_n(&mut engine, 10);
    assert_eq!(engine.desires(bot.handle()).len(), 1);
    assert_eq!(beats.get(), 0);

    bot.start();
    poll_n(&mut engine, 30);
    assert_eq!(beats.get(), 1);
}

#[test]
fn legacy_direct_message_handlers_bypass_beliefs() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    message_schema("Order")
        .field("item", praxis_core::FieldKind::Str)
        .commit(&mut registry)
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    agent("Clerk")
        .belief_name("Order")
        .handle_message("Order", move |_, msg| {
            sink.lock()
                .unwrap()
                .push(msg.str_field("item").unwrap_or_default().to_string());
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bot = engine.create_agent("Clerk", "clerk1");
    bot.start();
    poll_n(&mut engine, 3);

    let msg = praxis_core::Message::new("Order").with("item", Field::Str("bolts".into()));
    bot.send_message_to_handler(msg);
    poll_n(&mut engine, 3);

    assert_eq!(seen.lock().unwrap().as_slice(), ["bolts".to_string()]);
    // Direct messages are not stored in the belief context.
    let stored = engine.belief(bot.handle(), "Order").unwrap();
    assert_eq!(stored.str_field("item"), Some(""));
}
