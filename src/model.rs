pub(crate) mod attributes;
pub(crate) mod item;
pub(crate) mod profile;
