// Independent concurrency loops (signal gate, decision engine, executor, ...)
pub mod agents;

// Wires ports/adapters and shared state together at startup
pub mod bootstrap;

// Price cache and tradable-symbol allowlist
pub mod market_data;

// Health/heartbeat and agent status surfaces
pub mod monitoring;

// Circuit breaker, risk state, sizing and target computation
pub mod risk_management;

// Top-level orchestrator and graceful shutdown
pub mod system;
