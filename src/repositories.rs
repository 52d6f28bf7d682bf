pub mod accounts;
pub mod catbox;
pub mod enhancer;
