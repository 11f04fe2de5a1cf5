//! dl-daemon: HTTP edge for the datalake ingest service.

pub mod api_types;
pub mod routes;
pub mod state;
