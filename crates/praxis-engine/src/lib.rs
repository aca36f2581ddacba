//! The reasoning core: event dispatch, A* scheduling, intention
//! execution, delegation auctions, and shared-belief relay, driven by
//! a cooperative engine tick.

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod routing;
pub mod schedule;
pub mod service;

pub use agent::{Agent, AgentState, DesireParent, DesireState, ScheduleDirty};
pub use config::EngineConfig;
pub use engine::{AgentHandle, Engine, EngineHandle, GoalPursue, PollResult};
pub use error::{EngineError, Result};
pub use event::{
    ActionCompleteEvent, ActionEvent, AuctionBid, AuctionEvent, ControlCommand, DelegationEvent,
    DelegationStatus, DropEvent, Event, EventBody, MessageEvent, PerceptEvent, PursueEvent,
    RegisterEvent, ShareBeliefSetEvent, TacticEvent, TimerEvent,
};
pub use executor::{ExecutorEffect, Intention, IntentionExecutor, IntentionState, RunningState};
pub use routing::{Directory, Mailbox, MailboxKind, Notifier};
pub use schedule::{
    IntentionChoice, Schedule, ScheduleDesire, ScheduleRequest, ScheduledIntention,
};
pub use service::Service;
