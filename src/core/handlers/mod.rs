//! The four decision-handler kinds (§4.2). Each builds a focused prompt,
//! calls the language model, and parses the reply into a `Decision`.

pub mod chat;
pub mod critic;
pub mod parse;
pub mod reactive;
pub mod strategic;

pub use parse::parse_decision;
