use repack::server::{AppState, prepare};
use reqwest::{
    StatusCode,
    header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
};

use crate::{
    common::{FakeForge, config, fetcher, read_members, spawn_app},
    setup_tracing,
};

async fn get(url: &str) -> reqwest::Response {
    reqwest::get(url).await.unwrap()
}

#[tokio::test]
async fn eager_startup_serves_the_produced_archive() {
    setup_tracing();
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (state, base) = spawn_app(config(
        &forge.repo_url("proj"),
        "main",
        "proj-bundle.tar",
        dir.path(),
        "eager",
    ))
    .await;

    prepare(&state).await;
    assert_eq!(
        state.current().map(|archive| archive.file_name),
        Some("proj-bundle.tar".to_string())
    );

    let index = get(&format!("{base}/")).await;
    assert_eq!(index.status(), StatusCode::OK);
    let page = index.text().await.unwrap();
    assert!(page.contains(r#"href="/download/proj-bundle.tar""#), "{page}");

    let response = get(&format!("{base}/download/proj-bundle.tar")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        r#"attachment; filename="proj-bundle.tar""#
    );
    assert_eq!(response.headers()[CONTENT_TYPE], "application/x-tar");
    let length: u64 = response.headers()[CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.len() as u64, length);
    assert_eq!(bytes.as_ref(), fs_err::read(dir.path().join("proj-bundle.tar")).unwrap());
    assert!(
        read_members(&bytes)
            .iter()
            .all(|(path, _)| path.starts_with("proj-bundle"))
    );

    // Eager mode never goes back to the forge.
    let _ = get(&format!("{base}/download/proj-bundle.tar")).await;
    assert_eq!(forge.downloads(), 1);
}

#[tokio::test]
async fn failed_startup_still_serves_an_empty_index() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (state, base) = spawn_app(config(
        &forge.repo_url("login"),
        "main",
        "proj.tar",
        dir.path(),
        "eager",
    ))
    .await;

    prepare(&state).await;
    assert!(state.current().is_none());

    let page = get(&format!("{base}/")).await.text().await.unwrap();
    assert!(page.contains("No archive has been produced yet."));
    assert!(!dir.path().join("proj.tar").exists());
}

#[tokio::test]
async fn eager_download_of_unknown_file_is_not_found() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (_state, base) = spawn_app(config(
        &forge.repo_url("proj"),
        "main",
        "proj.tar",
        dir.path(),
        "eager",
    ))
    .await;

    let response = get(&format!("{base}/download/other.tar")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().await.unwrap().contains("other.tar"));
    assert_eq!(forge.downloads(), 0);
}

#[tokio::test]
async fn eager_serves_archives_left_by_earlier_runs() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    fs_err::write(dir.path().join("old.tar.gz"), b"\x1f\x8b earlier").unwrap();
    let (_state, base) = spawn_app(config(
        &forge.repo_url("proj"),
        "main",
        "proj.tar",
        dir.path(),
        "eager",
    ))
    .await;

    let response = get(&format!("{base}/download/old.tar.gz")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/gzip");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"\x1f\x8b earlier");
}

#[tokio::test]
async fn download_rejects_path_like_names() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (_state, base) = spawn_app(config(
        &forge.repo_url("proj"),
        "main",
        "proj.tar",
        dir.path(),
        "eager",
    ))
    .await;

    for name in ["..%2Fsecret.tar", "nested%2Fproj.tar", "a%5Cb.tar"] {
        let response = get(&format!("{base}/download/{name}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{name}");
    }
}

#[tokio::test]
async fn lazy_mode_rebuilds_on_every_download() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (state, base) = spawn_app(config(
        &forge.repo_url("proj"),
        "main",
        "proj.tar.gz",
        dir.path(),
        "lazy",
    ))
    .await;

    prepare(&state).await;
    assert_eq!(forge.downloads(), 0);

    let page = get(&format!("{base}/")).await.text().await.unwrap();
    assert!(page.contains(r#"href="/download/proj.tar.gz""#), "{page}");

    for expected_downloads in 1..=2 {
        let response = get(&format!("{base}/download/proj.tar.gz")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/gzip");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            r#"attachment; filename="proj.tar.gz""#
        );
        let bytes = response.bytes().await.unwrap();
        assert!(bytes.starts_with(&[0x1f, 0x8b]));
        assert_eq!(read_members(&bytes)[0].0, "proj");
        assert_eq!(forge.downloads(), expected_downloads);
    }

    assert_eq!(
        state.current().map(|archive| archive.root_name),
        Some("proj".to_string())
    );
}

#[tokio::test]
async fn lazy_mode_only_builds_the_configured_name() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (_state, base) = spawn_app(config(
        &forge.repo_url("proj"),
        "main",
        "proj.tar",
        dir.path(),
        "lazy",
    ))
    .await;

    let response = get(&format!("{base}/download/other.tar")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(forge.downloads(), 0);
}

#[tokio::test]
async fn lazy_failure_is_a_server_error_and_keeps_state() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (state, base) = spawn_app(config(
        &forge.repo_url("login"),
        "main",
        "proj.tar",
        dir.path(),
        "lazy",
    ))
    .await;

    let response = get(&format!("{base}/download/proj.tar")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let message = response.text().await.unwrap();
    assert!(message.contains("failed to download the repository archive"), "{message}");
    assert!(message.contains("text/html"), "{message}");

    assert!(state.current().is_none());
    assert!(!dir.path().join("proj.tar").exists());
}

#[tokio::test]
async fn concurrent_lazy_downloads_all_succeed() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let (_state, base) = spawn_app(config(
        &forge.repo_url("proj"),
        "main",
        "proj.tar",
        dir.path(),
        "lazy",
    ))
    .await;

    let url = format!("{base}/download/proj.tar");
    let responses = futures::future::join_all((0..4).map(|_| get(&url))).await;
    for response in responses {
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.bytes().await.unwrap();
        assert_eq!(read_members(&bytes)[0].0, "proj");
    }
    assert_eq!(forge.downloads(), 4);
}

#[tokio::test]
async fn rebuild_with_new_branch_updates_state() {
    let forge = FakeForge::spawn().await;
    let dir = tempfile::tempdir().unwrap();
    let repo_url = forge.repo_url("proj");

    let main = AppState::new(config(&repo_url, "main", "proj.tar", dir.path(), "eager"), fetcher())
        .unwrap();
    let first = main.rebuild().await.unwrap();

    let develop = AppState::new(
        config(&repo_url, "develop", "proj.tar", dir.path(), "eager"),
        fetcher(),
    )
    .unwrap();
    let second = develop.rebuild().await.unwrap();

    assert_eq!(first.path, second.path);
    assert_eq!(develop.current(), Some(second.clone()));
    let members = read_members(&fs_err::read(&second.path).unwrap());
    assert!(
        members
            .iter()
            .any(|(path, contents)| path == "proj/README.md" && contents == "built from develop\n")
    );
}
