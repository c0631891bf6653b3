// Server layer - WebSocket hub and the thin HTTP translation surface

mod hub;
mod routes;

pub use hub::WsHub;
pub use routes::{router, AppState};
