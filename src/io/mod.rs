pub mod selector;
pub(crate) mod sys;

pub use selector::Selector;
pub(crate) use sys::SysSelector;
