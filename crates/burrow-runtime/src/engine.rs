//! Runtime engine that orchestrates one sandbox session.
//!
//! [`Engine::pull`] creates the ephemeral root and populates it;
//! [`PulledImage::launch`] isolates and runs the command inside it. Both
//! remove the root before returning, whatever the outcome.

use std::path::Path;

use burrow_common::cancel::CancelToken;
use burrow_common::config::BurrowConfig;
use burrow_common::error::Result;
use burrow_common::types::{ImageReference, SessionState};
use burrow_image::layer::{ExtractedLayer, LayerFetcher, NoProgress, PullProgress};
use burrow_image::manifest::Manifest;
use burrow_image::registry::RegistryClient;
use burrow_image::rootfs::EphemeralRoot;
use burrow_image::transport::{ReqwestTransport, Transport};

use crate::launcher::{Isolation, PreparedRoot, resolve_executable};
use crate::session::Session;

/// Drives a single session from image reference to exit code.
pub struct Engine {
    config: BurrowConfig,
    cancel: CancelToken,
    transport: Box<dyn Transport>,
    progress: Box<dyn PullProgress>,
}

impl Engine {
    /// Creates an engine talking to the configured registry over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: BurrowConfig, cancel: CancelToken) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Self::with_transport(config, cancel, Box::new(transport))
    }

    /// Creates an engine using a custom transport.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` if the configuration is invalid.
    pub fn with_transport(
        config: BurrowConfig,
        cancel: CancelToken,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel,
            transport,
            progress: Box::new(NoProgress),
        })
    }

    /// Reports layer progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn PullProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Pulls `image`, then runs `command` with `args` inside it.
    ///
    /// Returns the child's exit code.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage's error; the root is gone by then.
    pub fn run(self, image: &ImageReference, command: &str, args: Vec<String>) -> Result<i32> {
        self.pull(image)?.launch(command, args)
    }

    /// Creates the ephemeral root and extracts every layer of `image` into it.
    ///
    /// The registry client, and with it the HTTP connection pool, is gone
    /// when this returns.
    ///
    /// # Errors
    ///
    /// Returns an auth, manifest, layer, I/O, or cancellation error. The
    /// root has been removed in every error case.
    pub fn pull(self, image: &ImageReference) -> Result<PulledImage> {
        let Self {
            config,
            cancel,
            transport,
            progress,
        } = self;
        let mut session = Session::new();
        tracing::info!(session = %session.id(), image = %image, "session started");

        let root = EphemeralRoot::create(config.temp_dir.as_deref())?;
        let client = RegistryClient::new(transport, config.registry.clone());
        let pull_cancel = cancel.with_deadline(config.pull_timeout);

        let populated = session
            .advance(SessionState::RootPopulating)
            .and_then(|()| {
                populate(
                    &client,
                    image,
                    root.path(),
                    &pull_cancel,
                    config.verify_digests,
                    progress.as_ref(),
                )
            })
            .and_then(|pulled| session.advance(SessionState::RootReady).map(|()| pulled));
        drop(client);

        match populated {
            Ok((manifest, layers)) => Ok(PulledImage {
                config,
                cancel,
                session,
                root,
                manifest,
                layers,
            }),
            Err(e) => {
                tracing::info!(session = %session.id(), stage = %e.stage(), "pull failed");
                session.fail();
                finish(&mut session, root);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

fn populate(
    client: &RegistryClient,
    image: &ImageReference,
    root: &Path,
    cancel: &CancelToken,
    verify_digests: bool,
    progress: &dyn PullProgress,
) -> Result<(Manifest, Vec<ExtractedLayer>)> {
    let token = client.obtain_pull_token(image, cancel)?;
    let manifest = client.fetch_manifest(&token, image, cancel)?;
    let layers = LayerFetcher::new(client, cancel.clone())
        .verify_digests(verify_digests)
        .with_progress(progress)
        .fetch_and_extract(&token, image, &manifest, root)?;
    Ok((manifest, layers))
}

/// An image fully extracted into an ephemeral root, ready to launch.
///
/// Dropping it removes the root without running anything.
#[derive(Debug)]
pub struct PulledImage {
    config: BurrowConfig,
    cancel: CancelToken,
    session: Session,
    root: EphemeralRoot,
    manifest: Manifest,
    layers: Vec<ExtractedLayer>,
}

impl PulledImage {
    /// Host path of the populated root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// The manifest the root was built from.
    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The layers extracted, in order.
    #[must_use]
    pub fn layers(&self) -> &[ExtractedLayer] {
        &self.layers
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Runs `command` with `args` inside the root and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns a spawn error if the command cannot be resolved or started,
    /// or an isolation error. The root has been removed in every case.
    pub fn launch(self, command: &str, args: Vec<String>) -> Result<i32> {
        let Self {
            config,
            cancel,
            mut session,
            root,
            ..
        } = self;

        let outcome = execute(&config, &cancel, &mut session, root.path(), command, args);
        match &outcome {
            Ok(_) => record(&mut session, SessionState::Terminated),
            Err(e) => {
                tracing::info!(session = %session.id(), stage = %e.stage(), "launch failed");
                session.fail();
            }
        }
        finish(&mut session, root);
        outcome
    }
}

fn execute(
    config: &BurrowConfig,
    cancel: &CancelToken,
    session: &mut Session,
    root: &Path,
    command: &str,
    args: Vec<String>,
) -> Result<i32> {
    cancel.check("launch")?;
    let executable = resolve_executable(command)?;
    let prepared = PreparedRoot::prepare(root)?;
    tracing::debug!(null_device = ?prepared.null_device(), "device tree ready");

    let isolated = Isolation::new(config.hostname.clone()).enter(&prepared, executable, args)?;
    session.advance(SessionState::IsolationEntered)?;

    let child = isolated.spawn()?;
    // The child must be reaped whatever the bookkeeping says.
    record(session, SessionState::ChildRunning);
    tracing::info!(session = %session.id(), pid = child.pid(), "waiting for child");
    child.wait()
}

/// Destroys the root and closes the session. Removal errors are logged.
fn finish(session: &mut Session, root: EphemeralRoot) {
    if let Err(e) = root.destroy() {
        tracing::error!(session = %session.id(), error = %e, "failed to remove ephemeral root");
    }
    record(session, SessionState::CleanedUp);
}

/// Advances the session where a failed transition must not abort the run.
fn record(session: &mut Session, next: SessionState) {
    if let Err(e) = session.advance(next) {
        tracing::error!(session = %session.id(), error = %e, "session bookkeeping");
    }
}
