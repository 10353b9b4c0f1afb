pub mod client;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{ByteStream, ChatClient, MockStreamProducer};
pub use stream::{decode_stream, EventStream, PendingToolCall, StreamDecoder};
