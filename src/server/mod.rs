pub mod responder;

pub use responder::{LocalResource, ResourceResponder, ResourceTable, encode_responses};
