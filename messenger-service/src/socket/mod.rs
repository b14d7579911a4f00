pub mod gateway;
pub mod handlers;
pub mod identity;
pub mod request;

pub use gateway::{Emission, Gateway, Target};
pub use request::{events, ClientRequest};
