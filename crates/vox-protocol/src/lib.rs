pub mod http;
pub mod ws;

pub use http::{
    ComponentStatus, ConversationRequest, ConversationResponse, ErrorBody, IssueKeyRequest,
    IssuedKeyResponse, KeySummary, LivenessResponse, MetadataPayload, ReadinessResponse,
    TimingPayload, TokensPayload,
};
pub use ws::{ClientMessage, ServerMessage, SessionConfig};
