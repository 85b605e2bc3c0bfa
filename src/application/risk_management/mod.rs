// Three-state Circuit Breaker machine over Risk State
pub mod circuit_breaker_service;

// Operator/scheduler command enum
pub mod commands;

// Exponential backoff retry policy for order submission
pub mod order_retry_strategy;

// Token-bucket process-wide rate limiter
pub mod order_throttler;

// Per-symbol in-flight entry tracking
pub mod pending_orders_tracker;

// Applies operator/scheduler commands to the shared risk state
pub mod risk_command_loop;

// Persisted RiskState owner and daily rollover
pub mod risk_state_manager;

// Cross-loop read-only risk view
pub mod shared_state;

// Position size computation
pub mod sizing_engine;

// ATR-based TP/SL target computation
pub mod target_engine;
