//! Filter-and-aggregate engine behind the retail sales dashboard.
//!
//! The host loads a [`data::model::SalesTable`] once, keeps the user's
//! [`data::filter::FilterSelection`] in a [`state::DashboardState`], and asks
//! [`report::DashboardReport`] for the numbers and series it displays.

pub mod data;
pub mod error;
pub mod report;
pub mod state;

pub use error::{DashboardError, Result};
