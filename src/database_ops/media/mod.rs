pub mod relay;
pub mod upload;
