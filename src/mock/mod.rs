//! In-memory stand-in for the services REST API.
//!
//! - `GET /api/services?page&limit&status&name_like&type`: a filtered page of services.
//! - `GET /api/services/:id`: one service.
//! - `POST /api/services`: create a service, answers `201 {id}`.
//! - `PUT /api/services/:id`: rename or retype a service.
//! - `DELETE /api/services/:id`: remove a service.
//! - `GET /api/services/:id/events?page&limit`: a page of the service's history.

pub mod api;
pub mod server;
pub mod store;

pub use server::{router, spawn};
pub use store::MockStore;
