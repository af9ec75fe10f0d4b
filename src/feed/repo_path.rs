use core::fmt::{Display, Formatter};
use url::Url;

/// A normalized repository identifier derived from a profile URL.
///
/// Curated resources link to their code hosting presence in one of two shapes:
/// an organization page (`https://github.com/acme`) or a repository page
/// (`https://github.com/acme/core`, possibly with extra path segments such as
/// `/tree/main`). Anything else is unresolvable and the resource is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepoPath {
    /// An organization or user page; has no releases or commits of its own.
    Org(String),

    /// A single repository.
    Repo { owner: String, repo: String },
}

impl RepoPath {
    /// Parse a loosely formatted profile URL into a normalized path.
    ///
    /// Path segments beyond `owner/repo` are ignored, and a trailing `.git`
    /// is stripped from the repository name. Returns `None` when the input
    /// is not a URL or has no usable path segments; never fails otherwise.
    #[must_use]
    pub fn resolve(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());

        let owner = segments.next()?.to_string();
        match segments.next() {
            None => Some(Self::Org(owner)),
            Some(repo) => Some(Self::Repo {
                owner,
                repo: repo.trim_end_matches(".git").to_string(),
            }),
        }
    }

    /// Returns `true` for the organization form.
    #[must_use]
    pub const fn is_org(&self) -> bool {
        matches!(self, Self::Org(_))
    }
}

impl Display for RepoPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Org(org) => write!(f, "{org}"),
            Self::Repo { owner, repo } => write!(f, "{owner}/{repo}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_org_url() {
        let path = RepoPath::resolve("https://github.com/masumi-network").unwrap();
        assert_eq!(path, RepoPath::Org("masumi-network".to_string()));
        assert_eq!(path.to_string(), "masumi-network");
        assert!(path.is_org());
    }

    #[test]
    fn test_resolve_repo_url() {
        let path = RepoPath::resolve("https://github.com/tokio-rs/tokio").unwrap();
        assert_eq!(path.to_string(), "tokio-rs/tokio");
        assert!(!path.is_org());
    }

    #[test]
    fn test_resolve_ignores_extra_path_segments() {
        let path = RepoPath::resolve("https://github.com/tokio-rs/tokio/tree/master/tokio-util").unwrap();
        assert_eq!(path.to_string(), "tokio-rs/tokio");
    }

    #[test]
    fn test_resolve_strips_git_extension() {
        let path = RepoPath::resolve("https://github.com/serde-rs/serde.git").unwrap();
        assert_eq!(path.to_string(), "serde-rs/serde");
    }

    #[test]
    fn test_resolve_trailing_slash_is_org() {
        let path = RepoPath::resolve("https://github.com/acme/").unwrap();
        assert_eq!(path, RepoPath::Org("acme".to_string()));
    }

    #[test]
    fn test_resolve_other_host() {
        // Resolution is shape-based, not host-based
        let path = RepoPath::resolve("https://host/org/repo").unwrap();
        assert_eq!(path.to_string(), "org/repo");
    }

    #[test]
    fn test_resolve_not_a_url() {
        assert_eq!(RepoPath::resolve("not a url"), None);
    }

    #[test]
    fn test_resolve_no_path_segments() {
        assert_eq!(RepoPath::resolve("https://github.com/"), None);
        assert_eq!(RepoPath::resolve("https://github.com"), None);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let url = "https://github.com/acme/core/releases";
        assert_eq!(RepoPath::resolve(url), RepoPath::resolve(url));
    }

    #[test]
    fn test_same_repo_different_paths_are_equal() {
        let a = RepoPath::resolve("https://github.com/acme/core/tree/main").unwrap();
        let b = RepoPath::resolve("https://github.com/acme/core/issues").unwrap();
        assert_eq!(a, b);
    }
}
