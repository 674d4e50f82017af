//! Step definitions for the behavioural suite.

mod gateway_steps;
