pub mod message;
pub mod template;
pub mod tenant;
