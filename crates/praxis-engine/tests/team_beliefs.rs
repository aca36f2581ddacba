mod common;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use common::init_tracing;
use praxis_core::{Field, FieldKind, Handle, Message};
use praxis_model::{
    agent, body, goal, message_schema, plan, role, team, ActionStatus, ModelRegistry,
};
use praxis_engine::Engine;

fn poll_n(engine: &mut Engine, n: usize) {
    for _ in 0..n {
        engine.poll(Some(10));
    }
}

#[test]
fn shared_beliefs_flow_member_to_team_to_readers() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    message_schema("FieldReport")
        .field("sightings", FieldKind::I64)
        .commit(&mut registry)
        .unwrap();
    role("Scout")
        .writes("FieldReport")
        .commit(&mut registry)
        .unwrap();
    role("Analyst")
        .reads("FieldReport")
        .commit(&mut registry)
        .unwrap();

    agent("ScoutUnit")
        .belief_name("FieldReport")
        .role("Scout")
        .commit(&mut registry)
        .unwrap();
    agent("AnalystUnit")
        .role("Analyst")
        .commit(&mut registry)
        .unwrap();
    team("Command").commit(&mut registry).unwrap();

    let mut engine = Engine::new(registry);
    let bob = engine.create_agent("ScoutUnit", "bob");
    let amy = engine.create_agent("AnalystUnit", "amy");
    let hq = engine.create_agent("Command", "hq");
    engine.add_team_member(hq.handle(), bob.handle());
    engine.add_team_member(hq.handle(), amy.handle());

    bob.start();
    amy.start();
    hq.start();
    poll_n(&mut engine, 3);

    bob.post_percept("FieldReport", "sightings", Field::I64(3));
    poll_n(&mut engine, 20);

    // The team holds bob's beliefset, keyed by his id.
    let at_team = engine.shared_beliefs(hq.handle(), "FieldReport");
    assert_eq!(at_team.len(), 1);
    assert_eq!(at_team[0].0, bob.handle().id);
    assert_eq!(at_team[0].1.i64_field("sightings"), Some(3));

    // The reading member received the fan-out; the writer got no echo.
    let at_amy = engine.shared_beliefs(amy.handle(), "FieldReport");
    assert_eq!(at_amy.len(), 1);
    assert_eq!(at_amy[0].0, bob.handle().id);
    assert!(engine.shared_beliefs(bob.handle(), "FieldReport").is_empty());

    // Nobody's shared set ever lists its holder as owner.
    for holder in [bob.handle(), amy.handle(), hq.handle()] {
        assert!(engine
            .shared_beliefs(holder, "FieldReport")
            .iter()
            .all(|(owner, _)| owner != &holder.id));
    }
}

#[test]
fn updates_refresh_the_relay_watermark() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    message_schema("FieldReport")
        .field("sightings", FieldKind::I64)
        .commit(&mut registry)
        .unwrap();
    role("Scout")
        .writes("FieldReport")
        .commit(&mut registry)
        .unwrap();
    role("Analyst")
        .reads("FieldReport")
        .commit(&mut registry)
        .unwrap();
    agent("ScoutUnit")
        .belief_name("FieldReport")
        .role("Scout")
        .commit(&mut registry)
        .unwrap();
    agent("AnalystUnit")
        .role("Analyst")
        .commit(&mut registry)
        .unwrap();
    team("Command").commit(&mut registry).unwrap();

    let mut engine = Engine::new(registry);
    let bob = engine.create_agent("ScoutUnit", "bob");
    let amy = engine.create_agent("AnalystUnit", "amy");
    let hq = engine.create_agent("Command", "hq");
    engine.add_team_member(hq.handle(), bob.handle());
    engine.add_team_member(hq.handle(), amy.handle());
    bob.start();
    amy.start();
    hq.start();

    bob.post_percept("FieldReport", "sightings", Field::I64(1));
    poll_n(&mut engine, 20);
    bob.post_percept("FieldReport", "sightings", Field::I64(7));
    poll_n(&mut engine, 60);

    let at_amy = engine.shared_beliefs(amy.handle(), "FieldReport");
    assert_eq!(at_amy.len(), 1, "updates overwrite, never duplicate");
    assert_eq!(at_amy[0].1.i64_field("sightings"), Some(7));
}

#[test]
fn ping_pong_until_the_count_passes_five() {
    init_tracing();
    let mut registry = ModelRegistry::new();
    message_schema("Ping")
        .field("count", FieldKind::I64)
        .commit(&mut registry)
        .unwrap();
    message_schema("Pong")
        .field("count", FieldKind::I64)
        .commit(&mut registry)
        .unwrap();
    goal("SendPing").commit(&mut registry).unwrap();
    goal("SendPong").commit(&mut registry).unwrap();
    plan("PingPlan")
        .handles("SendPing")
        .body(body().action("DoPing"))
        .commit(&mut registry)
        .unwrap();
    plan("PongPlan")
        .handles("SendPong")
        .body(body().action("DoPong"))
        .commit(&mut registry)
        .unwrap();

    let count_last = Arc::new(AtomicI64::new(0));
    let sue_handle: Arc<Mutex<Option<Handle>>> = Arc::new(Mutex::new(None));
    let bob_handle: Arc<Mutex<Option<Handle>>> = Arc::new(Mutex::new(None));

    let count = Arc::clone(&count_last);
    let peer = Arc::clone(&sue_handle);
    agent("PingAgent")
        .belief_name("Pong")
        .plan("PingPlan")
        .handle_action("DoPing", move |ops, _, _, _| {
            let received = ops
                .belief("Pong")
                .and_then(|m| m.i64_field("count"))
                .unwrap_or(0);
            if received > 5 {
                ops.stop();
                return ActionStatus::Success;
            }
            let next = received + 1;
            count.fetch_max(next, Ordering::SeqCst);
            let peer = peer.lock().unwrap().clone().expect("sue exists");
            ops.send_message(&peer, Message::new("Ping").with("count", Field::I64(next)));
            if next > 5 {
                ops.stop();
            }
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let count = Arc::clone(&count_last);
    let peer = Arc::clone(&bob_handle);
    agent("PongAgent")
        .belief_name("Ping")
        .plan("PongPlan")
        .handle_action("DoPong", move |ops, _, _, _| {
            let received = ops
                .belief("Ping")
                .and_then(|m| m.i64_field("count"))
                .unwrap_or(0);
            if received > 5 {
                ops.stop();
                return ActionStatus::Success;
            }
            let next = received + 1;
            count.fetch_max(next, Ordering::SeqCst);
            let peer = peer.lock().unwrap().clone().expect("bob exists");
            ops.send_message(&peer, Message::new("Pong").with("count", Field::I64(next)));
            if next > 5 {
                ops.stop();
            }
            ActionStatus::Success
        })
        .commit(&mut registry)
        .unwrap();

    let mut engine = Engine::new(registry);
    let bob = engine.create_agent("PingAgent", "bob");
    let sue = engine.create_agent("PongAgent", "sue");
    *sue_handle.lock().unwrap() = Some(sue.handle().clone());
    *bob_handle.lock().unwrap() = Some(bob.handle().clone());

    bob.pursue("SendPing", true);
    sue.pursue("SendPong", true);
    bob.start();
    sue.start();

    for _ in 0..300 {
        engine.poll(Some(10));
        if engine.agent_stopped(bob.handle()) && engine.agent_stopped(sue.handle()) {
            break;
        }
    }

    assert!(engine.agent_stopped(bob.handle()));
    assert!(engine.agent_stopped(sue.handle()));
    assert!(count_last.load(Ordering::SeqCst) >= 6);
}
