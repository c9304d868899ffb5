pub mod membership;
pub mod transport;
pub mod wire;
