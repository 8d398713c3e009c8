//! A fake Git forge and helpers to inspect the archives it hands out.

use std::{
    io::{Read, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{
    Router,
    body::Body,
    extract::{Path as UrlPath, State},
    http::{
        HeaderMap, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
    serve,
};
use repack::server::{AppState, router};
use repack_config::Config;
use repack_fetch::ArchiveFetcher;
use tar::{EntryType, Header};
use tokio::net::TcpListener;

pub const TOKEN: &str = "glpat-test-token";

/// The commit hash GitLab appends to the root directory of its archives.
const COMMIT: &str = "4f1c2a9e0b7d";

struct ForgeState {
    downloads: AtomicUsize,
}

/// Serves `/group/<project>/-/archive/<branch>/<project>-<branch>.tar.gz` and
/// the uncompressed `.tar` the way GitLab does. Requests without the right
/// token get `401`, the `login` project answers with a sign-in page and
/// status `200`.
pub struct FakeForge {
    base: String,
    state: Arc<ForgeState>,
}

impl FakeForge {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ForgeState {
            downloads: AtomicUsize::new(0),
        });

        let router = Router::new()
            .route(
                "/group/{project}/-/archive/{branch}/{file}",
                get(archive_handler),
            )
            .with_state(state.clone());

        tokio::spawn(async move {
            let _ = serve(listener, router).await;
        });

        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn repo_url(&self, project: &str) -> String {
        format!("{}/group/{project}/", self.base)
    }

    /// The number of archives handed out so far.
    pub fn downloads(&self) -> usize {
        self.state.downloads.load(Ordering::SeqCst)
    }
}

async fn archive_handler(
    State(state): State<Arc<ForgeState>>,
    UrlPath((project, branch, file)): UrlPath<(String, String, String)>,
    headers: HeaderMap,
) -> Response<Body> {
    if project == "login" {
        return Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from("<!DOCTYPE html><html><body>Sign in</body></html>"))
            .unwrap();
    }

    let authorized = headers
        .get(AUTHORIZATION)
        .is_some_and(|value| value == format!("Bearer {TOKEN}").as_str());
    if !authorized {
        return Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"401 Unauthorized"}"#))
            .unwrap();
    }

    let body = if project != "proj" {
        None
    } else if file == format!("{project}-{branch}.tar.gz") {
        Some(source_archive(&project, &branch))
    } else if file == format!("{project}-{branch}.tar") {
        Some(source_tar(&project, &branch))
    } else {
        None
    };
    let Some(body) = body else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"404 Not Found"}"#))
            .unwrap();
    };

    state.downloads.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(body))
        .unwrap()
}

/// The gzip compressed archive the forge serves for `branch`.
pub fn source_archive(project: &str, branch: &str) -> Vec<u8> {
    let tar = source_tar(project, branch);
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

/// The uncompressed archive the forge serves for `branch`.
pub fn source_tar(project: &str, branch: &str) -> Vec<u8> {
    let root = format!("{project}-{branch}-{COMMIT}");
    let mut builder = tar::Builder::new(Vec::new());

    let mut global = Header::new_ustar();
    global.set_entry_type(EntryType::XGlobalHeader);
    let comment = format!("52 comment={COMMIT}\n");
    global.set_size(comment.len() as u64);
    builder
        .append_data(&mut global, "pax_global_header", comment.as_bytes())
        .unwrap();

    append(&mut builder, &format!("{root}/"), EntryType::Directory, "");
    append(
        &mut builder,
        &format!("{root}/README.md"),
        EntryType::Regular,
        &format!("built from {branch}\n"),
    );
    append(&mut builder, &format!("{root}/src/"), EntryType::Directory, "");
    append(
        &mut builder,
        &format!("{root}/src/main.rs"),
        EntryType::Regular,
        "fn main() {}\n",
    );

    builder.into_inner().unwrap()
}

fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, entry_type: EntryType, contents: &str) {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(contents.len() as u64);
    header.set_mode(if entry_type.is_dir() { 0o755 } else { 0o644 });
    header.set_mtime(1_700_000_000);
    builder
        .append_data(&mut header, path, contents.as_bytes())
        .unwrap();
}

/// Lists the members of a (possibly gzip compressed) tar archive as
/// `(path, contents)`, directories without their trailing slash.
pub fn read_members(bytes: &[u8]) -> Vec<(String, String)> {
    let reader: Box<dyn Read + '_> = if bytes.starts_with(&[0x1f, 0x8b]) {
        Box::new(flate2::read::GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    };

    let mut archive = tar::Archive::new(reader);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            (path, contents)
        })
        .collect()
}

/// A configuration pointing at `repo_url` that writes into `download_dir`.
pub fn config(
    repo_url: &str,
    branch: &str,
    output_name: &str,
    download_dir: &Path,
    serve_mode: &str,
) -> Config {
    let json = serde_json::json!({
        "repo_url": repo_url,
        "branch": branch,
        "access_token": TOKEN,
        "output_name": output_name,
        "serve_mode": serve_mode,
        "download_dir": download_dir,
        "fetch_timeout_secs": 10,
    });
    let (config, unused) = Config::from_json(&json.to_string()).unwrap();
    assert!(unused.is_empty(), "unused keys: {unused:?}");
    config.validate().unwrap();
    config
}

pub fn fetcher() -> ArchiveFetcher {
    ArchiveFetcher::new(std::time::Duration::from_secs(10)).unwrap()
}

/// Serves the application for `config` on a random local port and returns
/// its state and base url.
pub async fn spawn_app(config: Config) -> (AppState, String) {
    let state = AppState::new(config, fetcher()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = router(state.clone());
    tokio::spawn(async move {
        let _ = serve(listener, app).await;
    });

    (state, format!("http://{addr}"))
}
