//! # cadence-core
//!
//! The I/O-free heart of a generation session: minting correlation ids,
//! the wire vocabulary spoken with the worker, the session state machine,
//! and the router that admits only events for the active session.

pub mod errors;
pub mod events;
pub mod ids;
pub mod machine;
pub mod params;
pub mod record;
pub mod router;

pub use errors::{ParameterError, SessionError};
pub use events::{ClientEvent, Completion, Failure, ProgressStage, ProgressUpdate, ServerEvent};
pub use ids::{Correlator, SessionId};
pub use machine::{SessionStateMachine, Transition};
pub use params::{Backend, DurationBucket, GenerationParameters, Mood, MusicKey, MusicStyle, Tempo};
pub use record::{ArtifactDescriptor, SessionFailure, SessionRecord, Stage};
pub use router::{EventRouter, RouteOutcome};
