//! Event Normalizer - maps voice-AI webhook message types onto a small, stable
//! set of kinds and reacts to them with duck motion.
//!
//! The upstream vocabulary is not stable, so matching is tolerant (several
//! spellings per kind, case-insensitive, `_` treated as `-`) and anything
//! unrecognized becomes [`EventKind::Unknown`] rather than an error.

use crate::command::GestureCommand;
use crate::scheduler::{Action, AnimationScheduler, TalkStart};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ConversationStarted,
    ConversationEnded,
    SpeechStarted,
    SpeechEnded,
    FunctionCall,
    Unknown,
}

impl EventKind {
    /// Classify a raw message type.
    pub fn from_type(raw: &str) -> Self {
        match normalize_type(raw).as_str() {
            "conversation-started" | "conversation-start" | "call-started" => {
                EventKind::ConversationStarted
            }
            "conversation-ended" | "conversation-end" | "call-ended" => EventKind::ConversationEnded,
            "speech-started" | "speech-start" | "speech-begin" => EventKind::SpeechStarted,
            "speech-ended" | "speech-end" | "speech-stop" => EventKind::SpeechEnded,
            "function-call" => EventKind::FunctionCall,
            _ => EventKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ConversationStarted => "conversation_started",
            EventKind::ConversationEnded => "conversation_ended",
            EventKind::SpeechStarted => "speech_started",
            EventKind::SpeechEnded => "speech_ended",
            EventKind::FunctionCall => "function_call",
            EventKind::Unknown => "unknown",
        }
    }

    /// Conversation and speech lifecycle events (the ones kept in history).
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            EventKind::ConversationStarted
                | EventKind::ConversationEnded
                | EventKind::SpeechStarted
                | EventKind::SpeechEnded
        )
    }
}

/// Lowercase, trim, `_` → `-`.
pub fn normalize_type(raw: &str) -> String {
    raw.trim().to_lowercase().replace('_', "-")
}

/// An inbound event. `payload` is the whole message, untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub kind: EventKind,
    pub raw_type: String,
    pub payload: Value,
}

impl NormalizedEvent {
    pub fn new(raw_type: impl Into<String>, payload: Value) -> Self {
        let raw_type = raw_type.into();
        Self {
            kind: EventKind::from_type(&raw_type),
            raw_type,
            payload,
        }
    }

    /// Build from a webhook `message` object. A missing or non-string `type`
    /// normalizes to `Unknown`.
    pub fn from_message(message: &Value) -> Self {
        let raw_type = message
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Self::new(raw_type, message.clone())
    }

    pub fn function_call(&self) -> Option<FunctionCall> {
        if self.kind == EventKind::FunctionCall {
            FunctionCall::from_payload(&self.payload)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl FunctionCall {
    /// Read `functionCall: {name, parameters}` from a message. Non-object
    /// parameters are treated as empty.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let call = payload.get("functionCall")?;
        let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
        let parameters = call
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(Self {
            name: name.to_string(),
            parameters,
        })
    }
}

/// One-shot gesture that accompanies a function call, if any.
pub fn gesture_for_function(name: &str) -> Option<GestureCommand> {
    match name {
        "provide_encouragement" => Some(GestureCommand::Nod),
        _ => None,
    }
}

/// What the reactor did. Task handles may be awaited or dropped.
#[derive(Debug)]
pub enum Reaction {
    Greeted(JoinHandle<usize>),
    Talking(TalkStart),
    Acknowledged {
        stopped: bool,
        nod: JoinHandle<usize>,
    },
    Stopped {
        stopped: bool,
    },
    FunctionCall {
        call: Option<FunctionCall>,
        gesture: Option<JoinHandle<usize>>,
    },
    Ignored,
}

impl Reaction {
    pub fn label(&self) -> &'static str {
        match self {
            Reaction::Greeted(_) => "greeted",
            Reaction::Talking(_) => "talking",
            Reaction::Acknowledged { .. } => "acknowledged",
            Reaction::Stopped { .. } => "stopped",
            Reaction::FunctionCall { .. } => "function_call",
            Reaction::Ignored => "ignored",
        }
    }

    /// Wait for any one-shot motion this reaction fired. Returns the number of
    /// commands delivered.
    pub async fn settle(self) -> usize {
        let task = match self {
            Reaction::Greeted(task) => Some(task),
            Reaction::Acknowledged { nod, .. } => Some(nod),
            Reaction::FunctionCall { gesture, .. } => gesture,
            _ => None,
        };
        match task {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }
}

/// Applies the event transition table to the scheduler.
#[derive(Clone)]
pub struct EventReactor {
    scheduler: Arc<AnimationScheduler>,
}

impl EventReactor {
    pub fn new(scheduler: Arc<AnimationScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Arc<AnimationScheduler> {
        &self.scheduler
    }

    pub async fn react(&self, event: &NormalizedEvent) -> Reaction {
        match event.kind {
            EventKind::ConversationStarted => {
                info!(target: "devduck::hardware", event = %event.raw_type, "conversation started; greeting");
                let greeting = self.scheduler.greet();
                // Open the port now so the first talking motion has no settle lag.
                drop(self.scheduler.warm_up());
                Reaction::Greeted(greeting)
            }
            EventKind::SpeechStarted => Reaction::Talking(self.scheduler.start_talking().await),
            EventKind::SpeechEnded => {
                let stopped = self.scheduler.stop_talking();
                let nod = self.scheduler.acknowledge();
                Reaction::Acknowledged { stopped, nod }
            }
            EventKind::ConversationEnded => Reaction::Stopped {
                stopped: self.scheduler.stop_talking(),
            },
            EventKind::FunctionCall => {
                let call = event.function_call();
                let gesture = call
                    .as_ref()
                    .and_then(|c| gesture_for_function(&c.name))
                    .map(|g| self.scheduler.fire_once(Action::Gesture(g)));
                Reaction::FunctionCall { call, gesture }
            }
            EventKind::Unknown => {
                debug!(target: "devduck::hardware", event = %event.raw_type, "unknown event type; no hardware action");
                Reaction::Ignored
            }
        }
    }
}
