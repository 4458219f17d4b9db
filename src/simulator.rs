//! Soak simulator: a player tapping against a flaky server.
//! Run with: cargo test simulate_flaky -- --nocapture
