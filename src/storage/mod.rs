mod writer;

pub use writer::{HEADER, ProfileWriter};
