// Health/heartbeat loop (spec §4.11)
pub mod health_service;

// Per-feed connectivity tracking feeding PANIC_API_SILENT and /api/health
pub mod connection_health_service;

// Periodic METRICS_JSON log line
pub mod metrics_reporter;
