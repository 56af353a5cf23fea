//! Message envelope and in-process routing

pub mod message;
pub mod router;

pub use message::{
    Message, Payload, Performative, PROTOCOL_DEFINE_TASK, PROTOCOL_GET_BUNDLES,
    PROTOCOL_REPORT_RESULT, PROTOCOL_SET_CONFIG,
};
pub use router::{MessageRouter, MessageSender, RouterHandle};
