use std::path::PathBuf;

/// A fresh path under the system temporary directory with a random file name and the provided
/// extension. Nothing is created; the caller owns whatever it writes there.
pub fn scratch_path(extension: &str) -> PathBuf {
    use rand::distributions::{Alphanumeric, DistString};

    const LEN: usize = 16;

    let mut name = String::with_capacity(LEN + 1 + extension.len());
    Alphanumeric.append_string(&mut rand::thread_rng(), &mut name, LEN);
    name.push('.');
    name.push_str(extension);
    std::env::temp_dir().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unique() {
        assert_ne!(scratch_path("log"), scratch_path("log"));
    }

    #[test]
    fn test_extension() {
        assert_eq!(
            scratch_path("log").extension().unwrap().to_str().unwrap(),
            "log"
        );
    }
}
