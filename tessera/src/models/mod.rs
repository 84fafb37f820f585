mod common;
mod cross_reference;
mod insight;
mod note;
mod recall;
mod synthesis;
mod tag;

pub use common::*;
pub use cross_reference::*;
pub use insight::*;
pub use note::*;
pub use recall::*;
pub use synthesis::*;
pub use tag::*;
