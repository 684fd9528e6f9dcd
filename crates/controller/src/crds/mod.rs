pub mod authprovider;
pub mod support;

pub use authprovider::*;
pub use support::*;
