//! Live traffic map with an hour-ahead congestion prediction.
//!
//! Startup fetches the traffic feed once ([`fetch`] → [`dataset`]) and loads
//! the classifier ([`model`]); both are kept in a [`server::AppContext`] that
//! every request reads from. Requests render the map ([`map`]) and, on POST,
//! a prediction ([`predictor`]).

pub mod config;
pub mod dataset;
pub mod fetch;
pub mod logging;
pub mod map;
pub mod model;
pub mod monitor;
pub mod page;
pub mod predictor;
pub mod server;
pub mod types;
