//! HTTP surface for bulk sends.
//!
//! Endpoints:
//! - GET  /health
//! - GET  /api/sessions, POST /api/sessions, DELETE /api/sessions/{id}
//! - POST /api/bulk, GET /api/bulk/{id}, POST /api/bulk/{id}/cancel

pub mod jobs;
pub mod routes;
pub mod state;
