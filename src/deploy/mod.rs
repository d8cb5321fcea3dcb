// ABOUTME: Remote deployment orchestration using the type state pattern.
// ABOUTME: Exports the stages, their state markers, and the pipeline drivers.

mod deployment;
mod error;
mod execute;
mod pipeline;
mod probe;
mod provision;
mod proxy;
mod state;
mod teardown;
mod transfer;
mod transitions;
mod validate;

pub use deployment::{DeployReport, Deployment};
pub use error::{DeployError, DeployErrorKind, RemoteResultExt, Stage};
pub use execute::{
    COMPOSE_MANIFESTS, CONTAINER_NAME, DOCKERFILE, DeployMode, DeploymentExecutor, IMAGE_REPOSITORY,
    MANAGED_LABEL, StartedApp, image_tag,
};
pub use pipeline::{cleanup, deploy, detect_mode};
pub use probe::{ConnectivityProof, connect};
pub use provision::{
    COMPOSE_STANDALONE_PATH, COMPOSE_VERSION, Component, ComposeFlavor, EnvironmentProvisioner,
    PackageFamily, RedHatTool, RuntimeProfile, compose_asset,
};
pub use proxy::{
    DEFAULT_SITE_MARKER, ProxyConfigurator, ProxyLayout, ProxyRule, ProxySite, SITE_NAME,
    site_paths,
};
pub use state::{Connected, Proxied, Provisioned, Started, Transferred, Validated};
pub use teardown::{TeardownManager, TeardownReport};
pub use transfer::{EXCLUDES, Mirror, Rsync, prepare_remote_dir};
pub use validate::{DeploymentValidator, HttpProbe, ValidationOutcome};
