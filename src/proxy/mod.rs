//! Mode dispatch and response relaying

mod http;
mod sink;

pub use http::{HttpProxy, ProxyRequest, Strategy};
pub use sink::{relay, ClientSink, PendingResponse, ResponseSink, BODY_CHANNEL_CAPACITY};
