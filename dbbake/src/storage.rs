//! Object-storage fetching with an ordered authentication fallback chain.
//!
//! Strategies run in a fixed order: ambient identity, then the shared account key, then a
//! short-lived capability token. Ambient identity is the most auditable but least universally
//! available; the capability token works almost anywhere but is the least auditable. The ordering
//! encodes that security preference.

use std::{path::Path, time::Duration};

use log::{info, warn};
use time::format_description::well_known::Rfc3339;

use crate::{error::PipelineError, process, Result};

/// How long a generated capability token stays valid.
const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// A reference to a single blob, parsed from either the `az://account/container/blob` shorthand
/// or a full `https://<account>.blob.core.windows.net/container/blob` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReference {
    pub account: String,
    pub container: String,
    pub blob: String,
}

const BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

impl BlobReference {
    pub fn parse(input: &str) -> Option<Self> {
        let (account, remainder) = if let Some(remainder) = input.strip_prefix("az://") {
            remainder.split_once('/')?
        } else if let Some(remainder) = input.strip_prefix("https://") {
            let (host, path) = remainder.split_once('/')?;
            (host.strip_suffix(BLOB_HOST_SUFFIX)?, path)
        } else {
            return None;
        };

        let (container, blob) = remainder.split_once('/')?;
        if account.is_empty() || container.is_empty() || blob.is_empty() {
            return None;
        }

        Some(Self {
            account: account.to_owned(),
            container: container.to_owned(),
            blob: blob.to_owned(),
        })
    }

    pub fn url(&self) -> String {
        format!(
            "https://{}{BLOB_HOST_SUFFIX}/{}/{}",
            self.account, self.container, self.blob
        )
    }

    /// Base name of the blob, used to name the downloaded file.
    pub fn file_name(&self) -> &str {
        self.blob.rsplit('/').next().unwrap_or(&self.blob)
    }
}

/// One authentication strategy. Failure is retryable in the sense that the driver falls through
/// to the next strategy; it is never fatal on its own.
pub trait FetchStrategy {
    fn name(&self) -> &'static str;
    fn fetch(&self, reference: &BlobReference, destination: &Path) -> Result<()>;
}

/// Reads the blob with the invoking process's already-established identity.
pub struct AmbientIdentity;

impl FetchStrategy for AmbientIdentity {
    fn name(&self) -> &'static str {
        "ambient identity"
    }

    fn fetch(&self, reference: &BlobReference, destination: &Path) -> Result<()> {
        process::command!(
            "az",
            "storage",
            "blob",
            "download",
            "--auth-mode",
            "login",
            "--account-name",
            reference.account,
            "--container-name",
            reference.container,
            "--name",
            reference.blob,
            "--file",
            destination,
            "--no-progress",
        )
        .output()?;
        Ok(())
    }
}

/// Retrieves an account-level key through the management plane, then reads the blob with it.
pub struct SharedAccountKey;

#[derive(serde::Deserialize)]
struct AccountKey {
    value: String,
}

impl SharedAccountKey {
    fn first_key(account: &str) -> Result<String> {
        let output = process::command!(
            "az",
            "storage",
            "account",
            "keys",
            "list",
            "--account-name",
            account,
            "--output",
            "json",
        )
        .output()?;

        let keys: Vec<AccountKey> = serde_json::from_slice(&output.stdout)?;
        keys.into_iter()
            .next()
            .map(|key| key.value)
            .ok_or_else(|| format!("no keys returned for storage account {account}").into())
    }
}

impl FetchStrategy for SharedAccountKey {
    fn name(&self) -> &'static str {
        "shared account key"
    }

    fn fetch(&self, reference: &BlobReference, destination: &Path) -> Result<()> {
        let key = Self::first_key(&reference.account)?;
        process::command!(
            "az",
            "storage",
            "blob",
            "download",
            "--account-key",
            key,
            "--account-name",
            reference.account,
            "--container-name",
            reference.container,
            "--name",
            reference.blob,
            "--file",
            destination,
            "--no-progress",
        )
        .output()?;
        Ok(())
    }
}

/// Synthesizes a short-lived read-only token scoped to the exact blob, then fetches over plain
/// HTTPS with it.
pub struct CapabilityToken;

impl FetchStrategy for CapabilityToken {
    fn name(&self) -> &'static str {
        "capability token"
    }

    fn fetch(&self, reference: &BlobReference, destination: &Path) -> Result<()> {
        let expiry = (time::OffsetDateTime::now_utc() + TOKEN_LIFETIME)
            .replace_nanosecond(0)?
            .format(&Rfc3339)?;

        let output = process::command!(
            "az",
            "storage",
            "blob",
            "generate-sas",
            "--account-name",
            reference.account,
            "--container-name",
            reference.container,
            "--name",
            reference.blob,
            "--permissions",
            "r",
            "--expiry",
            expiry,
            "--output",
            "tsv",
        )
        .output()?;
        let token = std::str::from_utf8(&output.stdout)?.trim();

        let response = reqwest::blocking::get(format!("{}?{token}", reference.url()))?
            .error_for_status()?;
        std::fs::write(destination, response.bytes()?)?;
        Ok(())
    }
}

/// Fetches a blob using the default strategy chain.
pub fn fetch(reference: &BlobReference, destination: &Path) -> Result<()> {
    fetch_with(
        &[&AmbientIdentity, &SharedAccountKey, &CapabilityToken],
        reference,
        destination,
    )
}

/// Runs the strategies in order, short-circuiting on the first success. Each failure is a warning;
/// only exhaustion of the whole chain is fatal.
pub fn fetch_with(
    strategies: &[&dyn FetchStrategy],
    reference: &BlobReference,
    destination: &Path,
) -> Result<()> {
    for strategy in strategies {
        match strategy.fetch(reference, destination) {
            Ok(()) => {
                info!(
                    "fetched {} to {} via {}",
                    reference.url(),
                    destination.display(),
                    strategy.name()
                );
                return Ok(());
            }
            Err(error) => warn!(
                "{} fetch of {} failed: {error}",
                strategy.name(),
                reference.url()
            ),
        }
    }

    Err(PipelineError::FetchExhausted {
        reference: reference.url(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;

    #[test]
    fn test_parse_shorthand() {
        let parsed = BlobReference::parse("az://prodexports/backups/app.bacpac").unwrap();
        assert_eq!(
            parsed,
            BlobReference {
                account: "prodexports".to_owned(),
                container: "backups".to_owned(),
                blob: "app.bacpac".to_owned(),
            }
        );
    }

    #[test]
    fn test_parse_https_url() {
        let parsed = BlobReference::parse(
            "https://prodexports.blob.core.windows.net/backups/nested/app.bacpac",
        )
        .unwrap();
        assert_eq!(parsed.account, "prodexports");
        assert_eq!(parsed.container, "backups");
        assert_eq!(parsed.blob, "nested/app.bacpac");
        assert_eq!(parsed.file_name(), "app.bacpac");
    }

    #[test]
    fn test_parse_rejects_local_paths_and_foreign_urls() {
        assert!(BlobReference::parse("/exports/app.bacpac").is_none());
        assert!(BlobReference::parse("https://example.com/backups/app.bacpac").is_none());
        assert!(BlobReference::parse("az://account-only").is_none());
    }

    #[test]
    fn test_url_round_trip() {
        let url = "https://prodexports.blob.core.windows.net/backups/app.bacpac";
        assert_eq!(BlobReference::parse(url).unwrap().url(), url);
    }

    struct ScriptedStrategy {
        name: &'static str,
        succeed: bool,
        called: Cell<bool>,
    }

    impl ScriptedStrategy {
        fn new(name: &'static str, succeed: bool) -> Self {
            Self {
                name,
                succeed,
                called: Cell::new(false),
            }
        }
    }

    impl FetchStrategy for ScriptedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fetch(&self, _reference: &BlobReference, _destination: &Path) -> Result<()> {
            self.called.set(true);
            if self.succeed {
                Ok(())
            } else {
                Err("simulated auth failure".into())
            }
        }
    }

    fn reference() -> BlobReference {
        BlobReference::parse("az://account/container/blob.bacpac").unwrap()
    }

    #[test]
    fn test_falls_through_to_last_strategy() {
        let first = ScriptedStrategy::new("first", false);
        let second = ScriptedStrategy::new("second", false);
        let third = ScriptedStrategy::new("third", true);

        fetch_with(
            &[&first, &second, &third],
            &reference(),
            &PathBuf::from("/dev/null"),
        )
        .unwrap();

        assert!(first.called.get() && second.called.get() && third.called.get());
    }

    #[test]
    fn test_short_circuits_on_first_success() {
        let first = ScriptedStrategy::new("first", true);
        let second = ScriptedStrategy::new("second", true);

        fetch_with(&[&first, &second], &reference(), &PathBuf::from("/dev/null")).unwrap();

        assert!(first.called.get());
        assert!(!second.called.get(), "later strategies must not run");
    }

    #[test]
    fn test_exhaustion_is_fatal() {
        let first = ScriptedStrategy::new("first", false);
        let second = ScriptedStrategy::new("second", false);
        let third = ScriptedStrategy::new("third", false);

        let error = fetch_with(
            &[&first, &second, &third],
            &reference(),
            &PathBuf::from("/dev/null"),
        )
        .unwrap_err();

        assert!(error
            .downcast_ref::<PipelineError>()
            .is_some_and(|e| matches!(e, PipelineError::FetchExhausted { .. })));
    }
}
