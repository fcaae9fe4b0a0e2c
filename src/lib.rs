//! # alert-relay
//!
//! Real-time delivery of camera alerts to authenticated dashboards.
//!
//! Dashboards open a WebSocket at `/ws?token=JWT`, narrow what they receive
//! with per-camera subscriptions, and get every `ALERT_CREATED` or
//! `CAMERA_STATS` event the alert pipeline publishes for those cameras.
//! A liveness monitor prunes silent peers. The [`client`] module holds the
//! reconnecting dashboard-side counterpart.
//!
//! ## Architecture
//!
//! ```text
//! Alert pipeline (REST / in-process)        Dashboards (WebSocket)
//!     │                                          │
//!     ├── REST Handlers (api/)                   ├── WS Handler + AuthGate (ws/)
//!     │                                          │
//!     └──────────────► RealtimeHub (ws/) ◄───────┘
//!                          │
//!                          ├── Broadcaster (encode once, fan out)
//!                          ├── ConnectionRegistry
//!                          └── LivenessMonitor
//! ```

pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod server;
pub mod ws;
