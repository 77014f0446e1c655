//! The WebSocket gateway: wire protocol, sessions, auth, heartbeat, and
//! frame routing.

pub mod auth;
pub mod bridge;
pub mod codec;
pub mod heartbeat;
pub mod message;
pub mod router;
pub mod server;
pub mod session;

pub use auth::{AuthHandler, AuthResult};
pub use bridge::EventBridge;
pub use codec::MessageCodec;
pub use heartbeat::HeartbeatHandler;
pub use message::{
    message_type, AgentStatus, AuthRequest, AuthResponse, EventPayload, HeartbeatAck,
    HeartbeatPayload, MessageFrame, SessionConfig,
};
pub use router::{
    AuthMessageHandler, HeartbeatAckMessageHandler, HeartbeatMessageHandler, MessageHandler,
    MessageRouter, RequestMessageHandler,
};
pub use server::{gateway_router, GatewayState};
pub use session::{close_code, Connection, GatewaySession, SessionManager, SessionStats};
