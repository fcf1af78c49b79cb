pub mod appliance;
pub mod record;

pub use appliance::*;
pub use record::*;
