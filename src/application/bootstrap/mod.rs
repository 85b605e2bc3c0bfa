// Port/adapter wiring, split by concern so `system::Application::build` can
// compose them in sequence.
pub mod agents;
pub mod persistence;
pub mod services;
