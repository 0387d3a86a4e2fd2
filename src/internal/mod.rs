pub(crate) mod encoders;
pub(crate) mod env;
