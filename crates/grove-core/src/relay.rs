//! Inter-pillar relay.
//!
//! When several pillars run together each one broadcasts its reaction notes
//! so the others can answer them. Messages are JSON on the topic
//! `sound_state/<pillar id>`; a receiver drops messages on its own topic.

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::music::NoteEvent;

pub const TOPIC_PREFIX: &str = "sound_state/";

/// Topic a pillar publishes on.
pub fn topic_for(pillar_id: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, pillar_id)
}

/// Pillar id encoded in a topic, if the topic is a relay topic.
pub fn pillar_from_topic(topic: &str) -> Option<&str> {
    topic.strip_prefix(TOPIC_PREFIX)
}

/// One pillar's batch of reaction notes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub pillar_id: String,
    pub reaction_notes: Vec<NoteEvent>,
}

impl RelayMessage {
    pub fn new(pillar_id: impl Into<String>, reaction_notes: Vec<NoteEvent>) -> Self {
        Self {
            pillar_id: pillar_id.into(),
            reaction_notes,
        }
    }

    pub fn topic(&self) -> String {
        topic_for(&self.pillar_id)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Transport for relay messages.
pub trait Relay: Send {
    fn publish(&mut self, message: &RelayMessage) -> Result<()>;

    /// Next message from another pillar, without blocking.
    fn try_recv(&mut self) -> Option<RelayMessage>;
}

type Envelope = (String, Vec<u8>);

/// In-process bus. Every attached relay receives every message.
#[derive(Clone, Debug, Default)]
pub struct LoopbackBus {
    subscribers: Arc<Mutex<Vec<Sender<Envelope>>>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a pillar to the bus.
    pub fn attach(&self, pillar_id: impl Into<String>) -> LoopbackRelay {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        LoopbackRelay {
            pillar_id: pillar_id.into(),
            bus: self.clone(),
            inbox: rx,
        }
    }

    /// Deliver a raw payload to every attached relay. Detached relays are
    /// forgotten.
    pub fn publish_raw(&self, topic: &str, payload: Vec<u8>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send((topic.to_string(), payload.clone())).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug)]
pub struct LoopbackRelay {
    pillar_id: String,
    bus: LoopbackBus,
    inbox: Receiver<Envelope>,
}

impl LoopbackRelay {
    pub fn pillar_id(&self) -> &str {
        &self.pillar_id
    }
}

impl Relay for LoopbackRelay {
    fn publish(&mut self, message: &RelayMessage) -> Result<()> {
        if message.pillar_id != self.pillar_id {
            return Err(Error::Relay(format!(
                "pillar '{}' cannot publish as '{}'",
                self.pillar_id, message.pillar_id
            )));
        }
        let payload = message.encode()?;
        log::debug!(
            "[RELAY] Publishing {} notes on {}",
            message.reaction_notes.len(),
            message.topic()
        );
        self.bus.publish_raw(&message.topic(), payload);
        Ok(())
    }

    fn try_recv(&mut self) -> Option<RelayMessage> {
        while let Ok((topic, payload)) = self.inbox.try_recv() {
            if pillar_from_topic(&topic) == Some(self.pillar_id.as_str()) {
                continue;
            }
            match RelayMessage::decode(&payload) {
                Ok(message) => return Some(message),
                Err(e) => log::warn!("[RELAY] Dropping undecodable message on {}: {}", topic, e),
            }
        }
        None
    }
}
