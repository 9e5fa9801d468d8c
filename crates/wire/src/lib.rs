// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The control-socket wire protocol (C8 in the architecture): the
//! `Request`/`Query`/`Response` envelopes a daemon and its clients
//! exchange, and the length-prefixed JSON framing they're sent with.
//! Neither side of the socket depends on the other's crate — `jqmd` and
//! `jqmctl` both depend only on `jqm-wire`.

mod dto;
mod framing;
mod query;
mod request;
mod response;

pub use dto::{DeliverableEntry, HistoryEntry, InstanceDetail, InstanceSummary, MessageEntry};
pub use framing::{
    decode, encode, read_message, read_value, read_value_timeout, write_message, write_value,
    write_value_timeout, ProtocolError, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE,
};
pub use query::{InstanceFilters, Query};
pub use request::Request;
pub use response::Response;
