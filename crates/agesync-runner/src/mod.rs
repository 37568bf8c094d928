mod age_instance;
mod event_consumer;
mod session;
mod simulation;

pub mod event_bus;
pub mod logging;

pub use age_instance::{AgeInstance, InstanceError};
pub use event_bus::{create_event_bus_manager, EventBus, EventBusManager, EventSender};
pub use event_consumer::{
    run_consumer, CompositeConsumer, EventConsumer, LoggingConsumer, SessionStats, StatsConsumer,
};
pub use session::{ClientSession, SimulatedEngine};
pub use simulation::{run_simulation, SimulationConfig, SimulationReport};

pub use agesync_events::{
    EventContext, EventEnvelope, EventSource, EventType, ScriptEventType, SystemEvent,
};
