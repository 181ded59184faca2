//! Both ends of a renderlink connection.
//!
//! The render server runs a [`Dispatcher`]: it polls its communicator, decodes
//! one command at a time and hands it to a [`RenderBackend`], writing back
//! whatever reply the command owes. The numeric host drives the other end
//! through a [`Sender`], which encodes commands and waits for their replies.

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod sender;

pub use backend::{BackendError, RecordingBackend, RenderBackend};
pub use dispatcher::{
    DispatchConfig, DispatchPhase, DispatchState, DispatchStats, Dispatcher, FrameSummary,
    Handled, Outcome,
};
pub use error::{DispatchError, Result};
pub use sender::{Reply, Sender, DEFAULT_REPLY_WAIT};
