pub(crate) mod context;
pub(crate) mod docker;
pub(crate) mod error;
pub(crate) mod manifest;
pub(crate) mod naming;
pub(crate) mod pipeline;
pub(crate) mod plan;
pub(crate) mod process;
pub(crate) mod publish;
pub(crate) mod resolve;
pub(crate) mod storage;
pub(crate) mod synth;
pub(crate) mod temp_path;
pub(crate) mod validate;

pub mod cli;
pub mod logfmt;

pub(crate) type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
