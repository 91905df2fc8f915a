//! Registry publishing with bounded exponential-backoff retry.

use std::time::Duration;

use image_ref::{ImageName, ImageRef, Tag};
use log::{debug, info, warn};

use crate::{docker, error::PipelineError, logfmt, Result};

/// Seam between the retry logic and the `docker` command line, so the retry/backoff behavior is
/// testable without an engine.
pub trait PushEngine {
    fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<()>;
    fn push(&self, target: &ImageRef) -> Result<()>;
    fn remote_exists(&self, target: &ImageRef) -> Result<bool>;
}

pub struct DockerPushEngine;

impl PushEngine for DockerPushEngine {
    fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<()> {
        docker::tag(source, target)
    }

    fn push(&self, target: &ImageRef) -> Result<()> {
        docker::push(target)
    }

    fn remote_exists(&self, target: &ImageRef) -> Result<bool> {
        docker::remote_exists(target)
    }
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub max_attempts: u32,
    pub backoff_base: u32,
    pub backoff_unit: Duration,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
            backoff_unit: Duration::from_secs(5),
        }
    }
}

/// Tags the local image into the remote repository for its own tag plus every alias, and pushes
/// each, retrying individual pushes with exponential backoff.
pub fn publish(
    engine: &dyn PushEngine,
    source: &ImageRef,
    repository: &ImageName,
    aliases: &[Tag],
    options: &PublishOptions,
) -> Result<()> {
    publish_with(engine, source, repository, aliases, options, |delay| {
        std::thread::sleep(delay)
    })
}

/// Like [`publish`], with the backoff wait injected for tests.
pub fn publish_with(
    engine: &dyn PushEngine,
    source: &ImageRef,
    repository: &ImageName,
    aliases: &[Tag],
    options: &PublishOptions,
    mut sleep: impl FnMut(Duration),
) -> Result<()> {
    let mut targets = vec![source.with_name(repository.clone())];
    targets.extend(
        aliases
            .iter()
            .map(|alias| ImageRef::new(repository.clone(), alias.clone())),
    );

    for target in &targets {
        // Tagging is local and not retried; a failure here is immediately fatal.
        engine.tag(source, target)?;
        push_with_retry(engine, target, options, &mut sleep)?;

        // The push engine's own success is authoritative; the existence check is best-effort
        // because there is no cheap local equivalent of the post-build verification.
        match engine.remote_exists(target) {
            Ok(true) => debug!("verified {target} against the remote repository"),
            Ok(false) => warn!("{target} was pushed but does not resolve remotely yet"),
            Err(error) => warn!("could not verify {target} against the remote repository: {error}"),
        }
    }

    Ok(())
}

fn push_with_retry(
    engine: &dyn PushEngine,
    target: &ImageRef,
    options: &PublishOptions,
    sleep: &mut impl FnMut(Duration),
) -> Result<()> {
    for attempt in 1..=options.max_attempts {
        match engine.push(target) {
            Ok(()) => {
                info!(
                    "pushed {target}{}",
                    logfmt::props(&serde_json::json!({ "attempt": attempt }))
                );
                return Ok(());
            }
            Err(error) => {
                warn!("push attempt {attempt}/{} for {target} failed: {error}", options.max_attempts);
                if attempt < options.max_attempts {
                    // Saturates instead of overflowing; an absurd --max-attempts must not panic
                    // mid-retry.
                    let delay = options
                        .backoff_unit
                        .saturating_mul(options.backoff_base.saturating_pow(attempt));
                    debug!("waiting {delay:?} before retrying");
                    sleep(delay);
                }
            }
        }
    }

    Err(PipelineError::PublishExhausted {
        image: target.to_string(),
        attempts: options.max_attempts,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Fails the first `failures` pushes, then succeeds.
    struct FlakyEngine {
        failures: u32,
        pushes: RefCell<Vec<String>>,
        tags: RefCell<Vec<String>>,
    }

    impl FlakyEngine {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                pushes: RefCell::new(Vec::new()),
                tags: RefCell::new(Vec::new()),
            }
        }
    }

    impl PushEngine for FlakyEngine {
        fn tag(&self, _source: &ImageRef, target: &ImageRef) -> Result<()> {
            self.tags.borrow_mut().push(target.to_string());
            Ok(())
        }

        fn push(&self, target: &ImageRef) -> Result<()> {
            self.pushes.borrow_mut().push(target.to_string());
            if self.pushes.borrow().len() as u32 <= self.failures {
                Err("simulated registry failure".into())
            } else {
                Ok(())
            }
        }

        fn remote_exists(&self, _target: &ImageRef) -> Result<bool> {
            Ok(true)
        }
    }

    fn source() -> ImageRef {
        "app:v1".parse().unwrap()
    }

    fn repository() -> ImageName {
        "registry.example.com/app".parse().unwrap()
    }

    fn options() -> PublishOptions {
        PublishOptions {
            max_attempts: 3,
            backoff_base: 2,
            backoff_unit: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_success_on_third_attempt_backs_off_twice() {
        let engine = FlakyEngine::new(2);
        let mut delays = Vec::new();

        publish_with(&engine, &source(), &repository(), &[], &options(), |d| {
            delays.push(d)
        })
        .unwrap();

        assert_eq!(
            delays,
            [Duration::from_secs(10), Duration::from_secs(20)],
            "backoff is base^attempt * unit"
        );
        assert_eq!(engine.pushes.borrow().len(), 3);
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let engine = FlakyEngine::new(u32::MAX);
        let mut delays = Vec::new();

        let error = publish_with(&engine, &source(), &repository(), &[], &options(), |d| {
            delays.push(d)
        })
        .unwrap_err();

        assert!(error
            .downcast_ref::<PipelineError>()
            .is_some_and(|e| matches!(
                e,
                PipelineError::PublishExhausted { attempts: 3, .. }
            )));
        assert_eq!(engine.pushes.borrow().len(), 3, "no further attempts");
        assert_eq!(delays.len(), 2, "no wait after the final failure");
    }

    #[test]
    fn test_huge_attempt_counts_saturate_instead_of_panicking() {
        let engine = FlakyEngine::new(u32::MAX);
        let options = PublishOptions {
            max_attempts: 64,
            ..options()
        };
        let mut delays = Vec::new();

        publish_with(&engine, &source(), &repository(), &[], &options, |d| {
            delays.push(d)
        })
        .unwrap_err();

        assert_eq!(delays.len(), 63);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_first_attempt_success_never_waits() {
        let engine = FlakyEngine::new(0);
        publish_with(&engine, &source(), &repository(), &[], &options(), |_| {
            panic!("must not wait")
        })
        .unwrap();
    }

    #[test]
    fn test_aliases_are_tagged_and_pushed() {
        let engine = FlakyEngine::new(0);
        let aliases = vec!["latest".parse::<Tag>().unwrap()];

        publish_with(
            &engine,
            &source(),
            &repository(),
            &aliases,
            &options(),
            |_| {},
        )
        .unwrap();

        assert_eq!(
            *engine.tags.borrow(),
            [
                "registry.example.com/app:v1",
                "registry.example.com/app:latest"
            ]
        );
        assert_eq!(engine.pushes.borrow().len(), 2);
    }
}
