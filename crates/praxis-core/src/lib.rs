pub mod beliefs;
pub mod bus;
pub mod clock;
pub mod error;
pub mod id;
pub mod message;
pub mod promise;
pub mod resource;

pub use beliefs::{BeliefContext, SharedBeliefSet};
pub use bus::{
    BdiLog, BdiLogHeader, BdiLogLevel, BusAdapter, BusEnvelope, BusPayload, DropMode, MemoryBus,
};
pub use clock::{Clock, TimerQueue};
pub use error::{CoreError, Result};
pub use id::{Handle, UniqueId};
pub use message::{Field, FieldKind, Message, MessageSchema, SchemaField};
pub use promise::{GoalResult, Promise};
pub use resource::Resource;
