/// Callback-query wrapper and dispatcher endpoint
pub mod interaction;
/// Default access policy
pub mod policy;
/// Bot-backed unit transport
pub mod transport;

pub use interaction::{callback_schema, handle_inline_callback, route_press, TelegramInteraction};
pub use policy::FlagPolicy;
pub use transport::TelegramTransport;
