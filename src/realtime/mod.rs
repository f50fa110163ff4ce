//! Realtime board activity over the event socket.
//!
//! A participant registers its channel bindings, connects, and then
//! publishes and receives `board.activity` events on those routes.

mod channel;
mod messages;
mod payload;
mod router;

pub use channel::{ConnectionContext, ConnectionState, PublishData, RealtimeChannel};
pub use messages::{
    ActivityData, ClientFrame, Envelope, RealtimeEvent, Recipient, ServerFrame, BOARD_ACTIVITY,
    BOARD_ACTIVITY_EVENT,
};
pub use payload::{BoardPayload, ContentType};
pub use router::{EventRouter, ListenerToken};
