// ABOUTME: Validated domain types shared across stages.
// ABOUTME: Parsing happens once at the edge so stages never re-check raw strings.

mod branch_name;
mod remote_dir;
mod repo_url;
mod token;

pub use branch_name::{BranchName, BranchNameError};
pub use remote_dir::{RemoteDir, RemoteDirError};
pub use repo_url::{RepoName, RepoUrl, RepoUrlError};
pub use token::Token;
