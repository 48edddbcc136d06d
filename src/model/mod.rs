//! Record model and write images

mod image;
mod record;

pub use image::{OpType, RecordImage};
pub use record::Record;
