//! # Archi Graph
//!
//! Node metadata service for the Archi theme's interactive graph.
//!
//! The validation engine, metadata facade, and graph mutation API live in
//! [`archi_graph_core`]. This crate adds the pieces a deployment needs: a
//! SQLite store, bearer-token authorization with CSRF tokens, the cached
//! public node listing, an axum HTTP server, and the `archi-graph` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Graph editor │──▶│  HTTP (axum) │──▶│ GraphEditor  │
//! │  (browser)   │   │ auth + CSRF  │   │ MetaManager  │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           │                  │
//!                           ▼                  ▼
//!                    ┌──────────────┐   ┌──────────────┐
//!                    │  GraphCache  │◀──│ SQLite store │
//!                    │ /graph/nodes │   │ entity_meta  │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! archi-graph init
//! archi-graph entity add --kind project --title "Villa Savoye"
//! archi-graph meta set 1 _archi_node_color '#e67e22'
//! archi-graph serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`auth`] | Bearer tokens, roles, CSRF tokens |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Connection pool and SQLite implementation of the core `Store` |
//! | [`cache`] | Cached public node listing |
//! | [`server`] | Graph editor HTTP server |

pub mod auth;
pub mod cache;
pub mod config;
pub mod entity_cmd;
pub mod meta_cmd;
pub mod migrate;
pub mod schema_cmd;
pub mod server;
pub mod sqlite_store;
