mod span;

pub use span::{Key, Span};
