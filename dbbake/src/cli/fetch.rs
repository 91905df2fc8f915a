use std::path::PathBuf;

use clap::Args;

use crate::{storage, Result};

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Object-storage reference: `az://account/container/blob` or a blob HTTPS URL.
    pub reference: String,

    /// Destination file. Defaults to the blob's base name in the current directory.
    #[arg(long = "out")]
    pub out: Option<PathBuf>,
}

pub fn fetch(args: FetchArgs) -> Result<()> {
    let reference = storage::BlobReference::parse(&args.reference)
        .ok_or_else(|| format!("unrecognized object-storage reference: {:?}", args.reference))?;

    let destination = args
        .out
        .unwrap_or_else(|| PathBuf::from(reference.file_name()));

    storage::fetch(&reference, &destination)
}
