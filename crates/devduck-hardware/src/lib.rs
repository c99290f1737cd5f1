//! # DevDuck Hardware - gestures for a rubber duck on a serial line
//!
//! Voice-AI events come in; newline-terminated gesture tokens go out to a
//! microcontroller over USB serial. The duck is optional: with no device
//! attached every operation degrades to a logged no-op.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  webhook event                                                │
//! │       ↓                                                       │
//! │  ┌──────────────┐   ┌─────────────────────┐                   │
//! │  │ EventReactor │ → │ AnimationScheduler  │                   │
//! │  │ (normalizer) │   │  talk loop / fire   │                   │
//! │  └──────────────┘   └─────────────────────┘                   │
//! │                           ↓ enqueue (many producers)          │
//! │                   ┌───────────────┐    ┌────────────────┐     │
//! │                   │ CommandWriter │ →  │ SerialChannel  │ → USB│
//! │                   │ (one thread)  │    │ (lazy connect) │     │
//! │                   └───────────────┘    └────────────────┘     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the writer thread ever calls [`SerialChannel::send`], so commands
//! never interleave on the wire.

pub mod channel;
pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod port;
pub mod routine;
pub mod scheduler;
pub mod sim;
pub mod writer;

pub use channel::{ConnectionState, SerialChannel};
pub use command::{encode, GestureCommand, UnknownGesture, LINE_TERMINATOR};
pub use config::{AnimationConfig, DuckConfig, HardwareConfig};
pub use discovery::{discover_port, PortSource};
pub use error::{HardwareError, HardwareResult};
pub use events::{
    gesture_for_function, normalize_type, EventKind, EventReactor, FunctionCall, NormalizedEvent,
    Reaction,
};
pub use port::{PortBackend, PortInfo, SystemPorts};
pub use routine::{Routine, RoutineBook, RoutineStep};
pub use scheduler::{Action, AnimationScheduler, TalkStart, TalkState};
pub use sim::{SimWire, SimulatedPorts, SIM_DUCK_PORT};
pub use writer::{CommandWriter, WriterStats};
