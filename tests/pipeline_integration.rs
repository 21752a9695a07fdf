//! End-to-end pipeline runs against a scripted session and a mock image host.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use binder_core::assemble::{AssemblyStatus, read_pages};
use binder_core::{
    BrowserSession, ChapterStatus, Credentials, DocumentFormat, FailureKind, FetchOptions, HttpClient,
    ImageFetcher, Manifest, NoProgress, PartialFailurePolicy, Pipeline, PipelineConfig,
    PipelineError, ProcessExit, RunSummary, SiteProfile, UrlExtractor,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::fixtures::{
    StaticSession, chapter_page, eight_comic_catalog, noisy_png, quick_policy,
};
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

const CATALOG_URL: &str = "https://www.8comic.com/html/103.html";
const TITLE: &str = "Test Comic";

fn chapter_url(chapter: usize) -> String {
    format!("https://www.8comic.com/view/{chapter}.html")
}

fn image_url(server: &MockServer, chapter: usize, page: usize) -> String {
    format!("{}/c{chapter}/{page}.png", server.uri())
}

/// Page `p` of every chapter is `40 + p` pixels wide, so order survives
/// into the document as a width sequence.
async fn mount_chapter_images(server: &MockServer, chapter: usize, pages: usize) {
    for p in 1..=pages {
        Mock::given(method("GET"))
            .and(path(format!("/c{chapter}/{p}.png")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(noisy_png(40 + p as u32, 50, (chapter * 100 + p) as u32)),
            )
            .mount(server)
            .await;
    }
}

/// Catalog with one chapter per entry of `page_counts`.
fn session(server: &MockServer, page_counts: &[usize]) -> Arc<StaticSession> {
    let hrefs: Vec<(String, String)> = (1..=page_counts.len())
        .map(|c| (format!("/view/{c}.html"), format!("第{c}話")))
        .collect();
    let listing: Vec<(&str, &str)> = hrefs.iter().map(|(h, n)| (h.as_str(), n.as_str())).collect();

    let mut session = StaticSession::new().with_page(CATALOG_URL, eight_comic_catalog(TITLE, &listing));
    for (i, pages) in page_counts.iter().enumerate() {
        let chapter = i + 1;
        let urls: Vec<String> = (1..=*pages).map(|p| image_url(server, chapter, p)).collect();
        session = session.with_page(chapter_url(chapter), chapter_page(&urls));
    }
    Arc::new(session)
}

fn pipeline(
    session: &Arc<StaticSession>,
    out: &TempDir,
    policy: PartialFailurePolicy,
    overwrite: bool,
    max_attempts: u32,
) -> Pipeline {
    pipeline_in_format(session, out, policy, overwrite, max_attempts, DocumentFormat::Pdf)
}

fn pipeline_in_format(
    session: &Arc<StaticSession>,
    out: &TempDir,
    policy: PartialFailurePolicy,
    overwrite: bool,
    max_attempts: u32,
    format: DocumentFormat,
) -> Pipeline {
    let fetcher = ImageFetcher::new(
        4,
        quick_policy(max_attempts),
        HttpClient::new().unwrap(),
        FetchOptions {
            overwrite,
            ..FetchOptions::default()
        },
    )
    .unwrap();
    let dyn_session: Arc<dyn BrowserSession> = session.clone();
    Pipeline::new(
        PipelineConfig {
            output_dir: out.path().to_path_buf(),
            profile: SiteProfile::EightComic,
            content_id: "103".to_string(),
            overwrite,
            policy,
            format,
        },
        dyn_session,
        fetcher,
    )
    .with_discovery_policy(quick_policy(1))
    .with_extractor(UrlExtractor::new(SiteProfile::EightComic.strategies(), quick_policy(1)))
}

async fn run(pipeline: &Pipeline) -> RunSummary {
    pipeline
        .run(None, &AtomicBool::new(false), &NoProgress)
        .await
        .unwrap()
}

fn page_widths(summary: &RunSummary, chapter_index: usize) -> Vec<u32> {
    let document = summary.outcomes[chapter_index].document.as_ref().unwrap();
    read_pages(&document.path)
        .unwrap()
        .into_iter()
        .map(|bytes| image::load_from_memory(&bytes).unwrap().width())
        .collect()
}

#[tokio::test]
async fn test_run_builds_ordered_documents_and_manifest() {
    let server = require_mock_server!();
    mount_chapter_images(&server, 1, 5).await;
    mount_chapter_images(&server, 2, 2).await;
    let out = TempDir::new().unwrap();
    let session = session(&server, &[5, 2]);

    let summary = run(&pipeline(&session, &out, PartialFailurePolicy::Strict, false, 3)).await;

    assert_eq!(summary.title, TITLE);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.exit_outcome(), ProcessExit::Success);
    assert_eq!(page_widths(&summary, 0), vec![41, 42, 43, 44, 45]);
    assert_eq!(page_widths(&summary, 1), vec![41, 42]);

    let document = summary.outcomes[0].document.as_ref().unwrap();
    assert!(document.path.ends_with("Test Comic_103-pdf/ch0001 - 第1話.pdf"));
    assert_eq!(document.page_count, 5);

    let manifest_path = summary.manifest_path.as_ref().unwrap();
    let manifest: Manifest = serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert_eq!(manifest.title, TITLE);
    let counts: Vec<usize> = manifest.entries.iter().map(|e| e.page_count).collect();
    assert_eq!(counts, vec![5, 2]);
    assert_eq!(manifest.entries[1].chapter_id.as_str(), "ch0002");

    let url_list = summary.book_dir.join("Test Comic_103-urls").join("ch0001 - 第1話.txt");
    assert!(fs::read_to_string(url_list).unwrap().starts_with("# strategy: primary-src"));
}

#[tokio::test]
async fn test_cbz_format_writes_archives_in_cbz_directory() {
    let server = require_mock_server!();
    mount_chapter_images(&server, 1, 3).await;
    let out = TempDir::new().unwrap();
    let session = session(&server, &[3]);

    let summary = run(&pipeline_in_format(
        &session,
        &out,
        PartialFailurePolicy::Strict,
        false,
        3,
        DocumentFormat::Cbz,
    ))
    .await;

    let document = summary.outcomes[0].document.as_ref().unwrap();
    assert!(document.path.ends_with("Test Comic_103-cbz/ch0001 - 第1話.cbz"));
    assert_eq!(page_widths(&summary, 0), vec![41, 42, 43]);
    let manifest: Manifest =
        serde_json::from_str(&fs::read_to_string(summary.manifest_path.unwrap()).unwrap()).unwrap();
    assert_eq!(manifest.entries[0].page_count, 3);
}

#[tokio::test]
async fn test_second_run_makes_no_network_calls_and_keeps_documents() {
    let server = require_mock_server!();
    mount_chapter_images(&server, 1, 3).await;
    let out = TempDir::new().unwrap();

    let first_session = session(&server, &[3]);
    let first = run(&pipeline(&first_session, &out, PartialFailurePolicy::Strict, false, 3)).await;
    let path = first.outcomes[0].document.as_ref().unwrap().path.clone();
    let bytes_before = fs::read(&path).unwrap();
    let mtime_before = fs::metadata(&path).unwrap().modified().unwrap();
    let requests_before = server.received_requests().await.unwrap().len();
    assert_eq!(requests_before, 3);

    let second_session = session(&server, &[3]);
    let second = run(&pipeline(&second_session, &out, PartialFailurePolicy::Strict, false, 3)).await;

    assert_eq!(server.received_requests().await.unwrap().len(), requests_before);
    // only the catalog is rendered; the chapter page is never revisited
    assert_eq!(second_session.renders(), 1);
    let outcome = &second.outcomes[0];
    assert!(outcome.references_from_checkpoint);
    assert_eq!(outcome.network_pages, 0);
    assert_eq!(outcome.assembly, Some(AssemblyStatus::UpToDate));
    assert_eq!(fs::read(&path).unwrap(), bytes_before);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime_before);
}

#[tokio::test]
async fn test_overwrite_regenerates_everything() {
    let server = require_mock_server!();
    mount_chapter_images(&server, 1, 2).await;
    let out = TempDir::new().unwrap();

    let first_session = session(&server, &[2]);
    run(&pipeline(&first_session, &out, PartialFailurePolicy::Strict, false, 3)).await;

    let second_session = session(&server, &[2]);
    let second = run(&pipeline(&second_session, &out, PartialFailurePolicy::Strict, true, 3)).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 4);
    assert_eq!(second_session.renders(), 2);
    assert!(!second.outcomes[0].references_from_checkpoint);
    assert_eq!(second.outcomes[0].assembly, Some(AssemblyStatus::Built));
}

async fn mount_with_dead_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/c1/2.png"))
        .respond_with(ResponseTemplate::new(503))
        .with_priority(1)
        .mount(server)
        .await;
    mount_chapter_images(server, 1, 3).await;
}

#[tokio::test]
async fn test_lenient_policy_drops_failed_page_and_records_gap() {
    let server = require_mock_server!();
    mount_with_dead_page(&server).await;
    let out = TempDir::new().unwrap();
    let session = session(&server, &[3]);

    let summary = run(&pipeline(&session, &out, PartialFailurePolicy::Lenient, false, 2)).await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, ChapterStatus::Partial);
    assert_eq!(outcome.gaps.len(), 1);
    assert_eq!(outcome.gaps[0].page_index, 1);
    assert_eq!(outcome.gaps[0].attempts, 2);
    assert_eq!(page_widths(&summary, 0), vec![41, 43]);
    assert_eq!(summary.partial(), 1);
    assert_eq!(summary.exit_outcome(), ProcessExit::Success);
}

#[tokio::test]
async fn test_strict_policy_produces_no_document() {
    let server = require_mock_server!();
    mount_with_dead_page(&server).await;
    let out = TempDir::new().unwrap();
    let session = session(&server, &[3]);

    let summary = run(&pipeline(&session, &out, PartialFailurePolicy::Strict, false, 2)).await;

    let outcome = &summary.outcomes[0];
    assert!(matches!(
        outcome.status,
        ChapterStatus::Failed {
            kind: FailureKind::Fetch,
            ..
        }
    ));
    assert!(outcome.document.is_none());
    assert_eq!(summary.exit_outcome(), ProcessExit::Failure);

    let documents_dir = summary.book_dir.join("Test Comic_103-pdf");
    let document_count = fs::read_dir(&documents_dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|x| x == "pdf")
        })
        .count();
    assert_eq!(document_count, 0);

    let manifest: Manifest =
        serde_json::from_str(&fs::read_to_string(summary.manifest_path.unwrap()).unwrap()).unwrap();
    assert!(manifest.entries.is_empty());
}

#[tokio::test]
async fn test_extraction_failure_does_not_stop_later_chapters() {
    let server = require_mock_server!();
    mount_chapter_images(&server, 2, 2).await;
    let out = TempDir::new().unwrap();
    let session = Arc::new(
        StaticSession::new()
            .with_page(
                CATALOG_URL,
                eight_comic_catalog(TITLE, &[("/view/1.html", "empty"), ("/view/2.html", "full")]),
            )
            .with_page(chapter_url(1), "<html><body><p>nothing here</p></body></html>")
            .with_page(
                chapter_url(2),
                chapter_page(&[image_url(&server, 2, 1), image_url(&server, 2, 2)]),
            ),
    );

    let summary = run(&pipeline(&session, &out, PartialFailurePolicy::Strict, false, 3)).await;

    assert!(matches!(
        summary.outcomes[0].status,
        ChapterStatus::Failed {
            kind: FailureKind::Extraction,
            ..
        }
    ));
    assert_eq!(summary.outcomes[1].status, ChapterStatus::Succeeded);
    assert_eq!(summary.documents_available(), 1);
    assert_eq!(summary.exit_outcome(), ProcessExit::Success);
    let url_list = summary.book_dir.join("Test Comic_103-urls").join("ch0001 - empty.txt");
    assert!(!url_list.exists());
}

#[tokio::test]
async fn test_cancelled_run_skips_remaining_chapters() {
    let server = require_mock_server!();
    mount_chapter_images(&server, 1, 2).await;
    let out = TempDir::new().unwrap();
    let session = session(&server, &[2, 2]);

    let summary = pipeline(&session, &out, PartialFailurePolicy::Strict, false, 3)
        .run(None, &AtomicBool::new(true), &NoProgress)
        .await
        .unwrap();

    assert_eq!(summary.cancelled(), 2);
    assert_eq!(summary.documents_available(), 0);
    assert_eq!(summary.exit_outcome(), ProcessExit::Failure);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_credentials_authenticate_before_discovery() {
    let server = require_mock_server!();
    mount_chapter_images(&server, 1, 1).await;
    let out = TempDir::new().unwrap();
    let session = session(&server, &[1]);
    let credentials = Credentials::new("reader", "secret");

    pipeline(&session, &out, PartialFailurePolicy::Strict, false, 3)
        .run(Some(&credentials), &AtomicBool::new(false), &NoProgress)
        .await
        .unwrap();

    assert_eq!(session.logins(), 1);
}

#[tokio::test]
async fn test_missing_catalog_is_a_discovery_error() {
    let out = TempDir::new().unwrap();
    let session = Arc::new(StaticSession::new());
    let fetcher = ImageFetcher::new(
        1,
        quick_policy(1),
        HttpClient::new().unwrap(),
        FetchOptions::default(),
    )
    .unwrap();
    let dyn_session: Arc<dyn BrowserSession> = session.clone();
    let pipeline = Pipeline::new(
        PipelineConfig {
            output_dir: out.path().to_path_buf(),
            profile: SiteProfile::EightComic,
            content_id: "103".to_string(),
            overwrite: false,
            policy: PartialFailurePolicy::Strict,
            format: DocumentFormat::Pdf,
        },
        dyn_session,
        fetcher,
    )
    .with_discovery_policy(quick_policy(1));

    let err = pipeline
        .run(None, &AtomicBool::new(false), &NoProgress)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Discovery(_)));
    assert_eq!(err.kind(), FailureKind::Discovery);
    assert!(fs::read_dir(out.path()).unwrap().next().is_none());
}
