//! MOSAIC Core Types
//!
//! Protocol documents, pass-scoped global state, events and errors shared by
//! every MOSAIC crate. This crate performs no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod i18n;
pub mod id;
pub mod protocol;
pub mod state;

// Re-exports
pub use error::{BusinessError, CoreError, CoreResult, ErrorCategory};
pub use event::{Event, RenderRequest, INITIALIZE_OPERATION, RENDERING_OPERATION};
pub use i18n::{MapTranslator, NoopTranslator, Translator};
pub use id::PassId;
pub use protocol::{
    BindingDecl, Component, Container, Hierarchy, Protocol, RenderOptions, RenderingItem,
    DEFAULT_RENDERING_KEY, EXTRA_KEY,
};
pub use state::{GlobalState, GLOBAL_ERROR_KEY};
