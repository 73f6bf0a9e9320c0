pub mod gateway;
pub mod push;
pub mod relay;

pub use gateway::{GatewayError, HttpGateway, RemoteStore};
pub use push::{LoopbackChannel, PushChannel, PushError, RelayClient, Subscription};
pub use relay::Relay;
