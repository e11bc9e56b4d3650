// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON log layout that augments every record with extra fields.
//!
//! Each event is written as one flat JSON object: the standard event
//! attributes first, then the mixed fields supplied by a [`JsonAdapter`]
//! (by default the local `hostname`). Null mixed values are skipped.
//!
//! The layout can be driven directly ([`ExtendedJsonLayout::to_serializable`])
//! or installed as the event formatter of a `tracing-subscriber` `fmt`
//! subscriber ([`JsonLayoutFormatter`], [`init_subscriber`]).

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod adapter;
pub mod config;
pub mod error;
pub mod event;
pub mod formatter;
pub mod hostname;
pub mod layout;
pub mod level;
pub mod wrapper;

pub use adapter::{
    AdapterRegistry, CompositeAdapter, HostnameAdapter, JsonAdapter, StaticFieldsAdapter,
};
pub use config::LayoutConfig;
pub use error::LayoutError;
pub use event::{EventView, LogEvent, Marker, SerializeOptions, Source, StackFrame, ThrownProxy};
pub use formatter::{init_subscriber, JsonLayoutFormatter};
pub use layout::{ExtendedJsonLayout, ExtendedJsonLayoutBuilder};
pub use level::Level;
pub use wrapper::{ExtendedJsonWrapper, OwnedWrapper};
