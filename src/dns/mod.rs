pub mod record;
pub mod resolve;
pub mod zones;
