pub mod alert;
pub mod dto;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod services;

pub use error::SosError;
pub use services::{toggle_alert, SosOutcome};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::sos_routes()
}
