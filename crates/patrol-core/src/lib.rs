//! patrol-core — shared domain types, configuration, and the opaque-id codec.
//! All other Patrol crates depend on this one.

pub mod codec;
pub mod config;
pub mod model;

pub use codec::{CodecError, CodecSecret, EntityType, IdCodec};
pub use model::{
    GeoPoint, Message, NewAssignment, NewMessage, OrderStatus, Role, ServiceOrder,
    TaskAssignment, User,
};
