pub(crate) mod orchestrate;
pub(crate) mod progress;
pub(crate) mod serve;
pub(crate) mod splits;
