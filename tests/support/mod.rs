// ABOUTME: Test support utilities.
// ABOUTME: A scripted fake host behind RemoteShell, a copying mirror, and config builders.

use async_trait::async_trait;
use dockhand::config::{
    AppSettings, DeploymentTarget, RunConfig, RunMode, SourceReference, Timeouts,
};
use dockhand::deploy::{DeployError, Mirror};
use dockhand::interrupt::Interrupt;
use dockhand::remote::{Escalation, Remote, RemoteShell};
use dockhand::ssh::{self, CommandOutput};
use dockhand::types::{BranchName, RemoteDir, RepoUrl, Token};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("dockhand=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const REMOTE_DIR: &str = "/home/deploy/deployments/app";
pub const SITES_AVAILABLE_SITE: &str = "/etc/nginx/sites-available/dockhand";
pub const SITES_ENABLED_SITE: &str = "/etc/nginx/sites-enabled/dockhand";
pub const CONF_D_SITE: &str = "/etc/nginx/conf.d/dockhand.conf";
pub const DEFAULT_AVAILABLE: &str = "/etc/nginx/sites-available/default";
pub const DEFAULT_ENABLED: &str = "/etc/nginx/sites-enabled/default";

/// Installed under /usr/sbin, so only found through sudo's secure_path
/// unless `login_path_has_sbin` is set.
const SBIN_BINARIES: &[&str] = &["nginx"];

/// Which package manager the fake host exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Distro {
    Debian,
    Fedora,
    CentOs7,
    Unknown,
}

/// Observable state of the fake host. Tests mutate it to stage scenarios.
#[derive(Debug, Default)]
pub struct HostState {
    pub binaries: BTreeSet<String>,
    pub compose_plugin: bool,
    pub groups: BTreeSet<String>,
    pub dirs: BTreeSet<String>,
    pub files: BTreeMap<String, String>,
    /// Container name to image.
    pub containers: BTreeMap<String, String>,
    pub images: BTreeSet<String>,
    /// Directories with a compose stack up.
    pub stacks: BTreeSet<String>,
    /// Directories whose stack images were built by `up --build`.
    pub stack_images: BTreeSet<String>,
    pub reloads: usize,
    pub arch: String,
    /// The SSH user's PATH includes /usr/sbin (false on stock debian).
    pub login_path_has_sbin: bool,

    pub unavailable_packages: BTreeSet<String>,
    /// `nginx -t` fails while a tool-owned site is present.
    pub reject_site: bool,
    /// `nginx -t` always fails.
    pub broken_nginx: bool,
    pub docker_inactive: bool,
    pub app_unhealthy: bool,
    pub pull_fails: bool,
    pub build_fails: bool,
    pub download_fails: bool,
}

/// In-memory host that interprets the rendered command text.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
    log: Mutex<Vec<String>>,
    /// Trigger this interrupt when a command containing the needle runs.
    interrupt_on: Mutex<Option<(String, Interrupt)>>,
}

#[allow(dead_code)]
impl FakeHost {
    pub fn new(distro: Distro) -> Arc<Self> {
        let host = Self::default();
        {
            let mut state = host.state.lock();
            state.arch = "x86_64".to_string();
            for b in ["sh", "curl", "rsync"] {
                state.binaries.insert(b.to_string());
            }
            let manager = match distro {
                Distro::Debian => Some("apt-get"),
                Distro::Fedora => Some("dnf"),
                Distro::CentOs7 => Some("yum"),
                Distro::Unknown => None,
            };
            if let Some(manager) = manager {
                state.binaries.insert(manager.to_string());
            }
        }
        Arc::new(host)
    }

    /// A debian host that already has everything installed and enabled.
    pub fn provisioned() -> Arc<Self> {
        let host = Self::new(Distro::Debian);
        {
            let mut state = host.state();
            install_package(&mut state, "docker.io");
            install_package(&mut state, "nginx");
            install_package(&mut state, "docker-compose-plugin");
            state.groups.insert("docker".to_string());
        }
        host
    }

    pub fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock()
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_commands(&self) {
        self.log.lock().clear();
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.log.lock().iter().any(|c| c.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.log.lock().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn interrupt_when(&self, needle: &str, interrupt: Interrupt) {
        *self.interrupt_on.lock() = Some((needle.to_string(), interrupt));
    }

    /// Copy a local tree into a directory the way the mirror would.
    pub fn receive_tree(&self, local: &Path, remote_dir: &str) {
        let mut state = self.state();
        state.dirs.insert(remote_dir.to_string());
        if let Ok(entries) = std::fs::read_dir(local) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let content = std::fs::read_to_string(&path).unwrap_or_default();
                    state.files.insert(format!("{remote_dir}/{name}"), content);
                }
            }
        }
    }

    pub fn site_present(&self) -> bool {
        let state = self.state();
        [SITES_AVAILABLE_SITE, SITES_ENABLED_SITE, CONF_D_SITE]
            .iter()
            .any(|p| state.files.contains_key(*p))
    }

    fn handle(&self, command: &str, stdin: Option<&[u8]>) -> CommandOutput {
        let (cwd, rest) = match command.strip_prefix("cd ") {
            Some(tail) => match tail.split_once(" && ") {
                Some((dir, rest)) => (Some(unquote_all(dir).join(" ")), rest),
                None => (None, command),
            },
            None => (None, command),
        };
        let mut words = unquote_all(rest);
        let elevated = words.len() >= 2 && words[0] == "sudo" && words[1] == "-n";
        if elevated {
            words.drain(..2);
        }
        if words.first().map(String::as_str) == Some("env") {
            words.remove(0);
            while words.first().is_some_and(|w| w.contains('=')) {
                words.remove(0);
            }
        }
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        let stdin = stdin.map(|s| String::from_utf8_lossy(s).into_owned());

        let mut state = self.state();
        interpret(&mut state, cwd.as_deref(), elevated, &words, stdin)
    }
}

#[async_trait]
impl RemoteShell for FakeHost {
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> ssh::Result<CommandOutput> {
        self.log.lock().push(command.to_string());
        let output = self.handle(command, stdin);
        if let Some((needle, interrupt)) = self.interrupt_on.lock().as_ref()
            && command.contains(needle.as_str())
        {
            interrupt.trigger();
        }
        Ok(output)
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(code: u32, stderr: impl Into<String>) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

fn status(success: bool) -> CommandOutput {
    if success { ok("") } else { fail(1, "") }
}

fn install_package(state: &mut HostState, package: &str) -> bool {
    if state.unavailable_packages.contains(package) {
        return false;
    }
    match package {
        "docker.io" | "docker" => {
            state.binaries.insert("docker".to_string());
        }
        "nginx" => {
            state.binaries.insert("nginx".to_string());
            if state.binaries.contains("apt-get") {
                state.dirs.insert("/etc/nginx/sites-available".to_string());
                state.dirs.insert("/etc/nginx/sites-enabled".to_string());
                state
                    .files
                    .insert(DEFAULT_AVAILABLE.to_string(), "server {}\n".to_string());
                state
                    .files
                    .insert(DEFAULT_ENABLED.to_string(), format!("-> {DEFAULT_AVAILABLE}"));
            } else {
                state.dirs.insert("/etc/nginx/conf.d".to_string());
            }
        }
        "docker-compose-plugin" => state.compose_plugin = true,
        _ => return false,
    }
    true
}

fn nginx_test(state: &HostState) -> CommandOutput {
    if !state.binaries.contains("nginx") {
        return fail(127, "nginx: command not found");
    }
    let site = [SITES_AVAILABLE_SITE, SITES_ENABLED_SITE, CONF_D_SITE]
        .iter()
        .any(|p| state.files.contains_key(*p));
    if state.broken_nginx || (state.reject_site && site) {
        fail(1, "nginx: [emerg] invalid configuration")
    } else {
        ok("")
    }
}

fn interpret(
    state: &mut HostState,
    cwd: Option<&str>,
    elevated: bool,
    words: &[&str],
    stdin: Option<String>,
) -> CommandOutput {
    match words {
        ["true"] => ok(""),
        ["sh", "-c", _, "sh", name] => {
            let on_path =
                elevated || state.login_path_has_sbin || !SBIN_BINARIES.contains(name);
            status(on_path && state.binaries.contains(*name))
        }
        ["uname", "-m"] => ok(format!("{}\n", state.arch)),
        ["id", "-nG", user] => {
            let groups = state.groups.iter().cloned().collect::<Vec<_>>().join(" ");
            ok(format!("{user} {groups}\n"))
        }
        ["usermod", "-aG", group, _] => {
            state.groups.insert((*group).to_string());
            ok("")
        }
        [manager, "update", "-q"] | [manager, "makecache", "-q"]
            if state.binaries.contains(*manager) =>
        {
            ok("")
        }
        [manager, "install", "-y", "-q", package] if state.binaries.contains(*manager) => {
            if install_package(state, package) {
                ok("")
            } else {
                fail(100, format!("E: Unable to locate package {package}"))
            }
        }
        ["systemctl", "enable", "--now", service] => status(state.binaries.contains(*service)),
        ["systemctl", "is-active", "docker"] => {
            status(state.binaries.contains("docker") && !state.docker_inactive)
        }
        ["systemctl", "reload-or-restart", "nginx"] => {
            state.reloads += 1;
            ok("")
        }
        ["nginx", "-t"] => nginx_test(state),
        ["curl", "-fsSL", "-o", path, _url] => {
            if state.download_fails {
                return fail(22, "curl: (22) The requested URL returned error: 404");
            }
            state.files.insert((*path).to_string(), String::new());
            state.binaries.insert("docker-compose".to_string());
            ok("")
        }
        ["chmod", _, path] => status(state.files.contains_key(*path)),
        ["curl", "-fsS", "-o", "/dev/null", "--max-time", _, _url] => status(
            !state.app_unhealthy && (!state.containers.is_empty() || !state.stacks.is_empty()),
        ),
        ["mkdir", "-p", dir] => {
            state.dirs.insert((*dir).to_string());
            ok("")
        }
        ["chown", _, dir] => status(state.dirs.contains(*dir)),
        ["test", "-d", dir] => status(state.dirs.contains(*dir)),
        ["test", "-f", path] => status(state.files.contains_key(*path)),
        ["test", "-e", path] => {
            status(state.files.contains_key(*path) || state.dirs.contains(*path))
        }
        ["tee", path] => {
            state
                .files
                .insert((*path).to_string(), stdin.unwrap_or_default());
            ok("")
        }
        ["ln", "-sfn", source, link] => {
            state.files.insert((*link).to_string(), format!("-> {source}"));
            ok("")
        }
        ["rm", "-rf", dir] => {
            let prefix = format!("{dir}/");
            state.dirs.retain(|d| d != dir && !d.starts_with(&prefix));
            state.files.retain(|f, _| !f.starts_with(&prefix));
            ok("")
        }
        ["rm", "-f", paths @ ..] => {
            for path in paths {
                state.files.remove(*path);
            }
            ok("")
        }
        ["docker", "compose", "version"] => status(state.compose_plugin),
        ["docker-compose", "version"] => status(state.binaries.contains("docker-compose")),
        ["docker", "compose", "-f", manifest, sub @ ..] | ["docker-compose", "-f", manifest, sub @ ..] => {
            compose(state, cwd, manifest, sub)
        }
        ["docker", rest @ ..] if state.binaries.contains("docker") => docker(state, rest),
        _ => fail(127, format!("{}: command not found", words.join(" "))),
    }
}

fn compose(state: &mut HostState, cwd: Option<&str>, manifest: &str, sub: &[&str]) -> CommandOutput {
    let Some(dir) = cwd else {
        return fail(14, "no configuration file provided: not found");
    };
    if !state.files.contains_key(&format!("{dir}/{manifest}")) {
        return fail(14, format!("open {dir}/{manifest}: no such file or directory"));
    }
    match sub {
        ["pull"] if state.pull_fails => fail(18, "pull access denied for app"),
        ["pull"] => ok(""),
        ["down", "--remove-orphans"] => {
            state.stacks.remove(dir);
            ok("")
        }
        ["down", "--rmi", "local", "--remove-orphans"] => {
            state.stacks.remove(dir);
            state.stack_images.remove(dir);
            ok("")
        }
        ["up", "-d", "--build", "--remove-orphans"] => {
            state.stacks.insert(dir.to_string());
            state.stack_images.insert(dir.to_string());
            ok("")
        }
        _ => fail(1, "unknown compose command"),
    }
}

fn docker(state: &mut HostState, args: &[&str]) -> CommandOutput {
    match args {
        ["build", "--label", _, "-t", image, dir] => {
            if state.build_fails || !state.files.contains_key(&format!("{dir}/Dockerfile")) {
                return fail(1, "failed to solve: failed to read dockerfile");
            }
            state.images.insert((*image).to_string());
            ok("")
        }
        ["container", "inspect", "--format", _, name] => match state.containers.get(*name) {
            Some(_) => ok("4f1c2a9e\n"),
            None => fail(1, format!("Error: No such container: {name}")),
        },
        ["rm", "-f", name] => {
            state.containers.remove(*name);
            ok("")
        }
        ["run", "-d", "--name", name, .., image] => {
            if state.containers.contains_key(*name) {
                return fail(125, format!("Conflict. The container name \"/{name}\" is already in use"));
            }
            if !state.images.contains(*image) {
                return fail(125, format!("Unable to find image '{image}' locally"));
            }
            state.containers.insert((*name).to_string(), (*image).to_string());
            ok("a1b2c3\n")
        }
        ["images", repository, "--format", _] => {
            let prefix = format!("{repository}:");
            let tags: Vec<String> = state
                .images
                .iter()
                .filter_map(|i| i.strip_prefix(&prefix).map(String::from))
                .collect();
            ok(tags.iter().map(|t| format!("{t}\n")).collect::<String>())
        }
        ["rmi", "-f", image] => status(state.images.remove(*image)),
        ["rmi", image] => {
            if state.containers.values().any(|i| i == image) {
                return fail(1, format!("conflict: unable to remove {image}: image is being used"));
            }
            status(state.images.remove(*image))
        }
        _ => fail(1, format!("docker: unknown command {}", args.join(" "))),
    }
}

/// Split rendered shell text into words, honouring single and double quotes.
fn unquote_all(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                    current.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Mirror that copies the top level of the local tree into the fake host.
pub struct CopyMirror {
    host: Arc<FakeHost>,
    fail: bool,
}

#[allow(dead_code)]
impl CopyMirror {
    pub fn new(host: Arc<FakeHost>) -> Self {
        Self { host, fail: false }
    }

    pub fn failing(host: Arc<FakeHost>) -> Self {
        Self { host, fail: true }
    }
}

#[async_trait]
impl Mirror for CopyMirror {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn mirror(&self, local: &Path, target: &DeploymentTarget) -> Result<(), DeployError> {
        if self.fail {
            return Err(DeployError::Transfer(
                "rsync failed with exit code Some(12): connection unexpectedly closed".to_string(),
            ));
        }
        self.host.receive_tree(local, target.remote_dir.as_str());
        Ok(())
    }
}

/// Local source tree with a Dockerfile.
#[allow(dead_code)]
pub fn dockerfile_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM node:20\nEXPOSE 3000\n").unwrap();
    std::fs::write(dir.path().join("server.js"), "// app\n").unwrap();
    dir
}

/// Local source tree with a compose manifest.
#[allow(dead_code)]
pub fn compose_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("docker-compose.yml"),
        "services:\n  web:\n    build: .\n    ports:\n      - \"127.0.0.1:3000:3000\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM node:20\n").unwrap();
    dir
}

/// Resolved configuration for a deploy of `https://github.com/acme/app.git`.
#[allow(dead_code)]
pub fn run_config(source: &Path) -> RunConfig {
    RunConfig {
        mode: RunMode::Deploy,
        dry_run: false,
        source: SourceReference {
            url: RepoUrl::parse("https://github.com/acme/app.git").unwrap(),
            repo: RepoUrl::parse("https://github.com/acme/app.git")
                .unwrap()
                .repo_name()
                .unwrap(),
            branch: BranchName::default(),
            local_path: source.to_path_buf(),
            token: Token::new("ghp_test").unwrap(),
            token_user: "x-access-token".to_string(),
        },
        target: DeploymentTarget {
            host: "127.0.0.1".to_string(),
            port: 22,
            user: "deploy".to_string(),
            key_path: source.join("id_ed25519"),
            remote_dir: RemoteDir::new(REMOTE_DIR).unwrap(),
            trust_first_connection: true,
        },
        app: AppSettings {
            app_port: 3000,
            host_port: None,
        },
        timeouts: Timeouts {
            connect: Duration::from_secs(1),
            command: Duration::from_secs(5),
            settle: Duration::ZERO,
            http: Duration::from_millis(300),
        },
    }
}

#[allow(dead_code)]
pub fn remote(host: &Arc<FakeHost>) -> Remote {
    Remote::new(host.clone(), Escalation::Sudo, Interrupt::new())
}

#[allow(dead_code)]
pub fn remote_with(host: &Arc<FakeHost>, interrupt: Interrupt) -> Remote {
    Remote::new(host.clone(), Escalation::Sudo, interrupt)
}
