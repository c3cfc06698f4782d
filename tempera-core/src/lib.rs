//! # tempera-core
//!
//! Control stack for a granular-synthesis instrument driven over MIDI: an
//! ordered dispatcher shared by every controller, emitter and global control
//! handles, and two pattern sequencers that play the grid on a step clock.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tempera_core::config::Config;
//! use tempera_core::dispatcher::Dispatcher;
//! use tempera_core::emitter::EmitterPool;
//! use tempera_core::midi::sink::MidiPortSink;
//! use tempera_core::sequencer::{LinearSequencer, Sequencer, SequencerOptions, Timing};
//!
//! // 1. Open the outbound channel
//! let config = Config::load();
//! let dispatcher = Arc::new(Dispatcher::new(Box::new(MidiPortSink::from_settings(&config.midi()))));
//! dispatcher.start()?;
//!
//! // 2. Emitter handles share the dispatcher
//! let pool = Arc::new(EmitterPool::new(Arc::clone(&dispatcher), config.playback())?);
//!
//! // 3. Sequence steps 0 and 4 with emitters 1 and 2, twice
//! let seq = LinearSequencer::new(pool, Timing::from_secs(0.1)?, SequencerOptions::from_config(&config))?;
//! seq.dispatch_json(r#"{"action": "set_pattern", "pattern": {"0": 1, "4": 2}}"#)?;
//! seq.run(2)?;
//! seq.cleanup()?;
//!
//! // 4. Drain and close
//! dispatcher.stop()?;
//! ```
//!
//! ## Module Overview
//!
//! - [`dispatcher`]: `Dispatcher`: one delivery thread, submission-ordered requests
//! - [`emitter`]: `EmitterHandle` per emitter, `EmitterPool` batch helpers for steps
//! - [`global`]: `GlobalControls`: effects, envelope, tracks, transport bytes
//! - [`sequencer`]: `LinearSequencer`, `BankedSequencer`, timing and event parsing
//! - [`midi`]: message factory (encoders) and sinks (`midir` port, recording)
//! - [`config`]: TOML configuration (embedded defaults + user override)
//! - [`error`]: error enums for every layer

pub mod config;
pub mod dispatcher;
pub mod emitter;
pub mod error;
pub mod global;
pub mod midi;
pub mod sequencer;

pub use tempera_types as types;
