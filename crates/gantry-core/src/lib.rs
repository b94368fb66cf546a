//! # Gantry Core
//!
//! The data model shared by the Gantry dispatch pipeline.
//!
//! This crate holds everything a handler touches on its way in and out, but
//! none of the dispatch logic itself:
//!
//! - **Connection**: the already-routed inbound request ([`Connection`], [`Request`])
//! - **Response family**: wire responses ([`NativeResponse`]), the generic
//!   [`Response`], pre-built [`JsonResponse`]s, and [`ResponseClass`]
//!   constructors for plain values
//! - **Containers**: self-rendering responses ([`ResponseContainer`], [`Redirect`])
//! - **Response metadata**: [`Cookie`], [`ResponseHeader`], [`MediaType`],
//!   [`BackgroundTasks`]
//! - **Application state**: the typed [`State`] handed to containers
//!
//! ```text
//! ┌────────────┐     ┌───────────────────┐     ┌────────────────┐
//! │ Connection │────▶│ gantry-framework  │────▶│ NativeResponse │
//! │  (routed)  │     │ (dispatch core)   │     │   (to wire)    │
//! └────────────┘     └───────────────────┘     └────────────────┘
//! ```

pub mod background;
pub mod connection;
pub mod container;
pub mod cookie;
pub mod error;
pub mod header;
pub mod media;
pub mod response;
pub mod state;

pub use background::{BackgroundTask, BackgroundTasks};
pub use connection::{Connection, Request, RequestBuilder};
pub use container::{JsonContainer, Redirect, ResponseContainer};
pub use cookie::{Cookie, SameSite};
pub use error::{ConnectionError, ConnectionResult, ResponseError, ResponseResult};
pub use header::{HeaderValues, ResponseHeader, ResponseHeaders};
pub use media::MediaType;
pub use response::{
    DefaultResponseClass, JsonResponse, JsonResponseClass, NativeResponse, Response,
    ResponseClass, render_content,
};
pub use state::State;

// Re-exported so downstream crates agree on the exact versions.
pub use bytes::Bytes;
pub use http::{HeaderMap, Method, StatusCode};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BackgroundTask, BackgroundTasks, Connection, Cookie, JsonContainer, JsonResponse,
        MediaType, NativeResponse, Redirect, Request, Response, ResponseContainer,
        ResponseHeader, SameSite, State,
    };
}
