// Independent concurrency loops (spec §4, concurrency model L1-L6)
pub mod decision_engine;
pub mod executor;
pub mod outcome_tracker;
pub mod position_tracker;
pub mod signal_gate;
pub mod watchdog;
