//! `burrow run`: pull an image and run a command inside it.

use std::path::PathBuf;
use std::time::Duration;

use burrow_common::cancel::CancelToken;
use burrow_common::config::{BurrowConfig, RegistryConfig};
use burrow_common::constants::{
    DEFAULT_AUTH_SERVICE, DEFAULT_AUTH_URL, DEFAULT_PULL_TIMEOUT_SECS, DEFAULT_REGISTRY_URL,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use burrow_common::error::BurrowError;
use burrow_common::types::ImageReference;
use burrow_runtime::engine::Engine;
use clap::Args;

use crate::output::LayerProgress;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image to run: `name`, `name:tag`, `namespace/name[:tag]`, or `name@sha256:<hex>`.
    pub image: String,

    /// Command to execute inside the image, followed by its arguments.
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,

    /// Registry base URL.
    #[arg(long, env = "BURROW_REGISTRY_URL", default_value = DEFAULT_REGISTRY_URL)]
    pub registry_url: String,

    /// Token endpoint for anonymous pull tokens.
    #[arg(long, env = "BURROW_AUTH_URL", default_value = DEFAULT_AUTH_URL)]
    pub auth_url: String,

    /// `service` parameter sent to the token endpoint.
    #[arg(long, env = "BURROW_AUTH_SERVICE", default_value = DEFAULT_AUTH_SERVICE)]
    pub auth_service: String,

    /// Timeout for each registry request, in seconds.
    #[arg(long, env = "BURROW_REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Upper bound for the whole pull (token, manifest, and layers), in seconds.
    #[arg(long, env = "BURROW_PULL_TIMEOUT", default_value_t = DEFAULT_PULL_TIMEOUT_SECS)]
    pub pull_timeout_secs: u64,

    /// Directory the ephemeral root is created in (defaults to the system temp dir).
    #[arg(long, env = "BURROW_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Extract layers without checking their size and SHA-256 digest.
    #[arg(long)]
    pub skip_digest_verification: bool,

    /// Hostname set inside the sandbox's UTS namespace.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Do not print layer progress.
    #[arg(short, long)]
    pub quiet: bool,
}

impl RunArgs {
    /// Builds the session configuration from the parsed flags.
    #[must_use]
    pub fn config(&self) -> BurrowConfig {
        BurrowConfig {
            registry: RegistryConfig {
                registry_url: self.registry_url.clone(),
                auth_url: self.auth_url.clone(),
                auth_service: self.auth_service.clone(),
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            pull_timeout: Duration::from_secs(self.pull_timeout_secs),
            temp_dir: self.tmp_dir.clone(),
            verify_digests: !self.skip_digest_verification,
            hostname: self.hostname.clone(),
        }
    }
}

/// Executes the `run` command and returns the process exit code.
///
/// Session failures are reported as `error: <stage>: <message>` and mapped
/// to their exit code rather than returned.
///
/// # Errors
///
/// Returns an error if the interrupt handler cannot be installed.
pub fn execute(args: RunArgs) -> anyhow::Result<i32> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    match run_session(&args, cancel) {
        Ok(code) => {
            tracing::info!(code, "session finished");
            Ok(code)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "session failed");
            eprintln!("error: {}: {e}", e.stage());
            Ok(e.exit_code())
        }
    }
}

fn run_session(args: &RunArgs, cancel: CancelToken) -> Result<i32, BurrowError> {
    let image = ImageReference::parse(&args.image)?;
    let Some((command, command_args)) = args.command.split_first() else {
        return Err(BurrowError::Config {
            message: "no command given".into(),
        });
    };

    let mut engine = Engine::new(args.config(), cancel)?;
    if !args.quiet {
        engine = engine.with_progress(Box::new(LayerProgress::new(image.to_string())));
    }
    engine.run(&image, command, command_args.to_vec())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::commands::{Cli, Command};

    use super::*;

    fn parse(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).expect("parse");
        match cli.command {
            Command::Run(args) => args,
        }
    }

    #[test]
    fn defaults_match_public_registry() {
        let args = parse(&["burrow", "run", "alpine", "true"]);
        let config = args.config();
        assert_eq!(config, BurrowConfig::default());
        assert_eq!(args.command, vec!["true"]);
    }

    #[test]
    fn trailing_arguments_pass_through_verbatim() {
        let args = parse(&["burrow", "run", "busybox", "ls", "-la", "--color", "/"]);
        assert_eq!(args.image, "busybox");
        assert_eq!(args.command, vec!["ls", "-la", "--color", "/"]);
    }

    #[test]
    fn options_before_image_are_parsed() {
        let args = parse(&[
            "burrow",
            "run",
            "--hostname",
            "box",
            "--skip-digest-verification",
            "--pull-timeout-secs",
            "60",
            "--tmp-dir",
            "/var/tmp",
            "alpine:3.19",
            "sh",
            "-c",
            "exit 7",
        ]);
        let config = args.config();
        assert_eq!(config.hostname.as_deref(), Some("box"));
        assert!(!config.verify_digests);
        assert_eq!(config.pull_timeout, Duration::from_secs(60));
        assert_eq!(config.temp_dir, Some(PathBuf::from("/var/tmp")));
        assert_eq!(args.command, vec!["sh", "-c", "exit 7"]);
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["burrow", "run", "alpine"]).is_err());
    }

    #[test]
    fn invalid_image_reference_is_config_error() {
        let args = parse(&["burrow", "run", "Not A Valid/Image", "true"]);
        let err = run_session(&args, CancelToken::new()).unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
