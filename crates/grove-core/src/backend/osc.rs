//! SuperCollider backend over OSC.
//!
//! Each loaded instrument becomes a group on the server; notes are spawned as
//! synths (`/s_new`) inside that group using the instrument id as the synthdef
//! name. Releasing an instrument frees the whole group, which also cuts any
//! notes still sounding on it.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rosc::{encoder, OscMessage, OscPacket, OscType};

use super::{AudioBackend, ResourceId};
use crate::error::{Error, Result};
use crate::music::{Articulation, Chord, Layer, NoteEvent};
use crate::timing::beats_to_duration;

/// First node id used for layer groups; ids below are left to the server.
const FIRST_GROUP_ID: i32 = 1000;

/// scsynth `addToHead` add action.
const ADD_TO_HEAD: i32 = 0;

/// scsynth default group.
const DEFAULT_GROUP: i32 = 1;

/// UDP-based OSC client.
#[derive(Clone)]
pub struct OscClient {
    sock: Arc<UdpSocket>,
    /// Target address in "host:port" format.
    pub addr: String,
}

impl OscClient {
    /// Create a client bound to an ephemeral port, targeting `addr`.
    pub fn new<A: Into<String>>(addr: A) -> Result<Self> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            sock: Arc::new(sock),
            addr: addr.into(),
        })
    }

    /// Send an OSC message with the given path and arguments.
    pub fn send_msg(&self, path: &str, args: Vec<OscType>) -> Result<()> {
        let packet = OscPacket::Message(OscMessage {
            addr: path.into(),
            args,
        });
        let buf = encoder::encode(&packet).map_err(|e| Error::Backend(e.to_string()))?;
        self.sock.send_to(&buf, &self.addr)?;
        Ok(())
    }
}

impl std::fmt::Debug for OscClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscClient")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

/// Plays through a SuperCollider server.
#[derive(Debug)]
pub struct OscBackend {
    osc: OscClient,
    next_group: AtomicI32,
    /// Current tempo as `f64` bits, for beat-to-seconds conversion.
    tempo_bits: AtomicU64,
    /// Synthdef name per group.
    synthdefs: Mutex<HashMap<i32, String>>,
}

impl OscBackend {
    /// Connect to the server at `addr` ("host:port").
    pub fn connect(addr: &str) -> Result<Self> {
        let osc = OscClient::new(addr)?;
        osc.send_msg("/notify", vec![OscType::Int(1)])?;
        log::info!("[OSC] Sending to {}", addr);
        Ok(Self {
            osc,
            next_group: AtomicI32::new(FIRST_GROUP_ID),
            tempo_bits: AtomicU64::new(100f64.to_bits()),
            synthdefs: Default::default(),
        })
    }

    fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo_bits.load(Ordering::Relaxed))
    }

    fn seconds(&self, beats: f64) -> f32 {
        beats_to_duration(beats, self.tempo()).as_secs_f32()
    }

    fn synthdefs(&self) -> MutexGuard<'_, HashMap<i32, String>> {
        self.synthdefs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn synthdef(&self, resource: ResourceId) -> Result<String> {
        self.synthdefs()
            .get(&resource.as_i32())
            .cloned()
            .ok_or_else(|| Error::Backend(format!("no instrument loaded as {}", resource)))
    }

    fn s_new(&self, synthdef: &str, group: ResourceId, controls: Vec<(&str, f32)>) -> Result<()> {
        let mut args = vec![
            OscType::String(synthdef.to_string()),
            OscType::Int(-1),
            OscType::Int(ADD_TO_HEAD),
            OscType::Int(group.as_i32()),
        ];
        for (name, value) in controls {
            args.push(OscType::String(name.to_string()));
            args.push(OscType::Float(value));
        }
        self.osc.send_msg("/s_new", args)
    }
}

impl AudioBackend for OscBackend {
    fn load_instrument(&self, layer: Layer, instrument_id: &str) -> Result<ResourceId> {
        let group = self.next_group.fetch_add(1, Ordering::Relaxed);
        self.osc.send_msg(
            "/g_new",
            vec![
                OscType::Int(group),
                OscType::Int(ADD_TO_HEAD),
                OscType::Int(DEFAULT_GROUP),
            ],
        )?;
        self.synthdefs().insert(group, instrument_id.to_string());
        log::debug!("[OSC] Group {} holds '{}' for {}", group, instrument_id, layer);
        Ok(ResourceId(group))
    }

    fn release_instrument(&self, resource: ResourceId) -> Result<()> {
        self.synthdefs().remove(&resource.as_i32());
        self.osc
            .send_msg("/g_freeAll", vec![OscType::Int(resource.as_i32())])?;
        self.osc
            .send_msg("/n_free", vec![OscType::Int(resource.as_i32())])
    }

    fn play_note(&self, resource: ResourceId, note: &NoteEvent) -> Result<()> {
        let synthdef = self.synthdef(resource)?;
        let mut controls = vec![
            ("freq", note.frequency() as f32),
            ("amp", note.velocity),
            ("sustain", self.seconds(note.duration)),
        ];
        match note.articulation {
            Some(Articulation::Staccato) => controls.push(("staccato", 1.0)),
            Some(Articulation::Tremolo) => controls.push(("tremolo", 1.0)),
            None => {}
        }
        self.s_new(&synthdef, resource, controls)
    }

    fn play_chord(&self, resource: ResourceId, chord: &Chord) -> Result<()> {
        let synthdef = self.synthdef(resource)?;
        let env = chord.envelope;
        for &pitch in &chord.pitches {
            let freq = NoteEvent::new(pitch, 1.0, 0.0).frequency() as f32;
            self.s_new(
                &synthdef,
                resource,
                vec![
                    ("freq", freq),
                    ("amp", env.level),
                    ("sustain", self.seconds(chord.duration)),
                    ("attack", self.seconds(env.attack)),
                    ("decay", self.seconds(env.decay)),
                    ("sustainLevel", env.sustain as f32),
                    ("release", self.seconds(env.release)),
                ],
            )?;
        }
        Ok(())
    }

    fn set_tempo(&self, bpm: f64) -> Result<()> {
        self.tempo_bits.store(bpm.to_bits(), Ordering::Relaxed);
        Ok(())
    }
}
