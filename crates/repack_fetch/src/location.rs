use percent_encoding::percent_decode_str;
use repack_config::ArchiveFormat;
use url::Url;

use crate::FetchError;

/// Where the archive of one branch of a repository can be downloaded.
///
/// GitLab serves branch archives at
/// `{repo}/-/archive/{branch}/{name}-{branch}.{suffix}`, where `name` is the
/// last path segment of the repository and slashes in the branch name become
/// dashes in the file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocation {
    url: Url,
    repo_name: String,
}

impl ArchiveLocation {
    pub fn new(repo_url: &str, branch: &str, format: ArchiveFormat) -> Result<Self, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidUrl {
            url: repo_url.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = repo_url.trim().trim_end_matches('/');
        let mut url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
        url.set_query(None);
        url.set_fragment(None);

        let repo_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            // Decoded here, `push` encodes the file name again.
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .ok_or_else(|| invalid("the url has no repository path"))?;

        let branch = branch.trim().trim_matches('/');
        if branch.is_empty() {
            return Err(invalid("the branch name is empty"));
        }
        let file_name = format!(
            "{repo_name}-{}.{}",
            branch.replace('/', "-"),
            format.suffix()
        );

        url.path_segments_mut()
            .map_err(|_| invalid("the url cannot be a base"))?
            .pop_if_empty()
            .extend(["-", "archive"])
            .extend(branch.split('/'))
            .push(&file_name);

        Ok(Self { url, repo_name })
    }

    /// The archive download url.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The short repository name, the last segment of the repository url.
    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }
}
