pub mod connector;
pub mod endpoint;
pub mod memory;
pub mod network;
pub mod protocol;
pub mod session;

pub use connector::IrohNetwork;
pub use endpoint::{EndpointState, PeerEndpoint};
pub use memory::{Bootstrap, MemoryHub, MemoryNetwork};
pub use network::PeerNetwork;
pub use protocol::{ALPN, StreamChannel};
pub use session::Session;
