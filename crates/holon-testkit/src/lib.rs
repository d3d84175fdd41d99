//! Environment seams for the certification launcher.
//!
//! Cross-SDK certification runs this SDK's client against a reference peer
//! built with the Go toolchain. The launcher shells out to that helper;
//! these functions are the environment contract it reads.

use std::process::Command;

/// Where the Go cache lands when the environment does not say.
pub const DEFAULT_GO_CACHE: &str = "/tmp/go-cache";

/// The helper binary path from `GO_BIN`, trimmed.
///
/// `None` when the variable is absent or blank; the launcher supplies its
/// own default in that case.
pub fn go_bin() -> Option<String> {
    match std::env::var("GO_BIN") {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

/// The Go build cache directory, from `GOCACHE`, defaulting to
/// [`DEFAULT_GO_CACHE`] when absent or blank.
pub fn go_cache() -> String {
    match std::env::var("GOCACHE") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => DEFAULT_GO_CACHE.to_string(),
    }
}

/// A [`Command`] for the helper binary with the cache directory applied.
///
/// `GO_BIN` overrides `default_bin` when set. The caller adds its own
/// arguments (`run ./cmd/peer`, flags, ...).
pub fn helper_command(default_bin: &str) -> Command {
    let bin = go_bin().unwrap_or_else(|| default_bin.to_string());
    let mut command = Command::new(bin);
    command.env("GOCACHE", go_cache());
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-global, so every mutation lives in
    // this one test.
    #[test]
    fn env_seams() {
        std::env::remove_var("GO_BIN");
        std::env::remove_var("GOCACHE");
        assert_eq!(go_bin(), None);
        assert_eq!(go_cache(), DEFAULT_GO_CACHE);

        std::env::set_var("GO_BIN", "  /usr/local/go/bin/go \n");
        assert_eq!(go_bin().as_deref(), Some("/usr/local/go/bin/go"));
        let command = helper_command("go");
        assert_eq!(command.get_program(), "/usr/local/go/bin/go");

        std::env::set_var("GO_BIN", "   ");
        assert_eq!(go_bin(), None);

        std::env::set_var("GOCACHE", "/var/cache/go");
        assert_eq!(go_cache(), "/var/cache/go");

        std::env::set_var("GOCACHE", "");
        assert_eq!(go_cache(), DEFAULT_GO_CACHE);

        std::env::remove_var("GO_BIN");
        std::env::remove_var("GOCACHE");
        let command = helper_command("go");
        assert_eq!(command.get_program(), "go");
    }
}
