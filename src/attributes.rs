pub(crate) mod cache;
pub(crate) mod extract;
