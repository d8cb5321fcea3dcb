// ABOUTME: Typed builder for commands executed on the target host.
// ABOUTME: Every interpolated value is shell-quoted on render; raw snippets must be 'static.

use std::fmt;

/// How root-only commands are elevated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Prefix with `sudo -n` (fails instead of prompting).
    Sudo,
    /// Already root.
    None,
}

impl Escalation {
    pub fn for_user(user: &str) -> Self {
        if user == "root" {
            Escalation::None
        } else {
            Escalation::Sudo
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Body {
    Exec { program: String, args: Vec<String> },
    Script(&'static str),
}

/// A single remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    body: Body,
    env: Vec<(String, String)>,
    current_dir: Option<String>,
    elevated: bool,
    mutating: bool,
    stdin: Option<Vec<u8>>,
}

impl RemoteCommand {
    /// A command that changes host state.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            body: Body::Exec {
                program: program.into(),
                args: Vec::new(),
            },
            env: Vec::new(),
            current_dir: None,
            elevated: false,
            mutating: true,
            stdin: None,
        }
    }

    /// A read-only command (still executed during dry runs).
    pub fn probe(program: impl Into<String>) -> Self {
        Self::new(program).read_only()
    }

    /// A fixed shell snippet. Only literals are accepted so runtime values
    /// can never be spliced into shell text.
    pub fn script(script: &'static str) -> Self {
        Self {
            body: Body::Script(script),
            env: Vec::new(),
            current_dir: None,
            elevated: false,
            mutating: true,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        if let Body::Exec { args, .. } = &mut self.body {
            args.push(arg.into());
        }
        self
    }

    pub fn args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Body::Exec { args, .. } = &mut self.body {
            args.extend(new_args.into_iter().map(Into::into));
        }
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<String>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Run with root privileges.
    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.mutating = false;
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    pub fn stdin_data(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Render to the shell text sent over the channel.
    pub fn render(&self, escalation: Escalation) -> String {
        let sudo = self.elevated && escalation == Escalation::Sudo;
        let mut parts: Vec<String> = Vec::new();

        match &self.body {
            Body::Exec { program, args } => {
                if sudo {
                    parts.push("sudo -n".to_string());
                }
                if !self.env.is_empty() {
                    parts.push("env".to_string());
                    parts.extend(self.env.iter().map(|(k, v)| quote(&format!("{k}={v}"))));
                }
                parts.push(quote(program));
                parts.extend(args.iter().map(|a| quote(a)));
            }
            Body::Script(script) => {
                if sudo {
                    parts.push("sudo -n sh -c".to_string());
                    parts.push(quote(script));
                } else {
                    parts.push((*script).to_string());
                }
            }
        }

        let command = parts.join(" ");
        match &self.current_dir {
            Some(dir) => format!("cd {} && {}", quote(dir), command),
            None => command,
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(Escalation::Sudo))
    }
}

/// Quote a value for a POSIX shell. Plain words are left bare for readable logs.
pub fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | '%' | '+' | ',')
        });
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_leaves_plain_words_bare() {
        assert_eq!(quote("docker"), "docker");
        assert_eq!(quote("127.0.0.1:3000:3000"), "127.0.0.1:3000:3000");
        assert_eq!(quote("/home/deploy/deployments/app"), "/home/deploy/deployments/app");
    }

    #[test]
    fn quote_wraps_metacharacters() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("$(id)"), "'$(id)'");
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote("{{.Names}}"), "'{{.Names}}'");
    }

    #[test]
    fn render_elevated_with_sudo() {
        let cmd = RemoteCommand::new("systemctl")
            .args(["enable", "--now", "docker"])
            .elevated();
        assert_eq!(
            cmd.render(Escalation::Sudo),
            "sudo -n systemctl enable --now docker"
        );
        assert_eq!(cmd.render(Escalation::None), "systemctl enable --now docker");
    }

    #[test]
    fn render_env_and_directory() {
        let cmd = RemoteCommand::new("apt-get")
            .args(["install", "-y", "docker.io"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .current_dir("/srv/my app")
            .elevated();
        assert_eq!(
            cmd.render(Escalation::Sudo),
            "cd '/srv/my app' && sudo -n env DEBIAN_FRONTEND=noninteractive apt-get install -y docker.io"
        );
    }

    #[test]
    fn render_script_under_sudo_is_wrapped() {
        let cmd = RemoteCommand::script("command -v nginx || test -x /usr/sbin/nginx").elevated();
        assert_eq!(
            cmd.render(Escalation::Sudo),
            "sudo -n sh -c 'command -v nginx || test -x /usr/sbin/nginx'"
        );
    }

    #[test]
    fn probe_is_read_only() {
        assert!(!RemoteCommand::probe("id").is_mutating());
        assert!(RemoteCommand::new("rm").is_mutating());
    }

    #[test]
    fn escalation_for_root_is_none() {
        assert_eq!(Escalation::for_user("root"), Escalation::None);
        assert_eq!(Escalation::for_user("deploy"), Escalation::Sudo);
    }
}
