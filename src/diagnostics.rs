// ABOUTME: Diagnostics accumulator for advisory (non-fatal) outcomes.
// ABOUTME: Best-effort sub-steps record typed warnings here instead of discarding failures.

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check whether a warning of the given kind was recorded.
    pub fn has(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn package_index(message: impl Into<String>) -> Self {
        Self::new(WarningKind::PackageIndex, message)
    }

    pub fn unknown_package_manager(message: impl Into<String>) -> Self {
        Self::new(WarningKind::UnknownPackageManager, message)
    }

    pub fn group_membership(message: impl Into<String>) -> Self {
        Self::new(WarningKind::GroupMembership, message)
    }

    pub fn service_enable(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ServiceEnable, message)
    }

    pub fn image_pull(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ImagePull, message)
    }

    pub fn stack_down(message: impl Into<String>) -> Self {
        Self::new(WarningKind::StackDown, message)
    }

    pub fn image_prune(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ImagePrune, message)
    }

    pub fn loopback_probe(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LoopbackProbe, message)
    }

    pub fn external_probe(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ExternalProbe, message)
    }

    pub fn default_site(message: impl Into<String>) -> Self {
        Self::new(WarningKind::DefaultSite, message)
    }

    pub fn teardown_step(message: impl Into<String>) -> Self {
        Self::new(WarningKind::TeardownStep, message)
    }
}

/// Categories of advisory outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Refreshing the package index failed; installs may still succeed.
    PackageIndex,
    /// Package manager family not recognised; installs were skipped.
    UnknownPackageManager,
    /// Could not add the deploying user to the runtime group.
    GroupMembership,
    /// Enabling or starting a system service failed.
    ServiceEnable,
    /// Pulling compose images failed; a local build may substitute.
    ImagePull,
    /// Bringing down the previous stack failed.
    StackDown,
    /// Removing superseded images failed.
    ImagePrune,
    /// Loopback HTTP probe failed (app may still be warming up).
    LoopbackProbe,
    /// External HTTP probe failed (firewalling is outside our control).
    ExternalProbe,
    /// Disabling the distribution's default proxy site failed.
    DefaultSite,
    /// A best-effort teardown step failed.
    TeardownStep,
}
