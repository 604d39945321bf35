pub mod release;
pub mod slug;
