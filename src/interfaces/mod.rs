// Headless HTTP surface (spec §6): health/status/positions/events queries
// and the operator/ingest command endpoints.
pub mod http;
