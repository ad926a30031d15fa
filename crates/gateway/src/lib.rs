//! The HTTP gateway: Meta's webhook endpoints in front, the turn pipeline
//! behind.
//!
//! Inbound traffic is verified, parsed, and routed into the coalescer first;
//! nothing else happens on the request path, so the webhook answers inside
//! Meta's delivery timeout no matter how slow the model is. The
//! [`TurnPipeline`] picks up each coalesced turn on the flush path: audio is
//! transcribed, the agent loop runs, and the reply goes back out through the
//! Graph API, spoken when the user spoke first.

mod pipeline;
mod server;

pub use {
    pipeline::TurnPipeline,
    server::{AppState, build_app, run},
};
