//! End-to-end tests: configuration file and plan file in, results and report out

use std::fs;
use std::path::Path;
use std::time::Duration;
use sumi_gather::config::load_config_with_hash;
use sumi_gather::output::{read_results_json, write_markdown_report, write_results_json, TaskClass};
use sumi_gather::plan::load_plan;
use sumi_gather::storage::{open_directive_store, DirectiveStore};
use sumi_gather::{GatherError, Orchestrator, TaskState};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52,
];

const ARTICLE: &str = "<html><head><title>Field Notes</title></head><body>\
    <p>The river rose two metres overnight and the lower bridge was closed.</p>\
    </body></html>";

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config = format!(
        r#"
[orchestrator]
workers = 3

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[rate-limit]
requests-per-second = 50.0
burst = 5
max-acquire-wait-ms = 5000

[retry]
base-delay-ms = 10
max-delay-ms = 50
jitter = 0.0

[adapters]
media-dir = "{media}"

[output]
results-path = "{results}"
report-path = "{report}"
directive-cache-path = "{cache}"
"#,
        media = dir.join("media").display(),
        results = dir.join("out/results.json").display(),
        report = dir.join("out/report.md").display(),
        cache = dir.join("directives.db").display(),
    );

    let config_path = dir.join("gather.toml");
    fs::write(&config_path, config).unwrap();
    config_path
}

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ARTICLE)
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/images/cat.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG_BYTES)
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ARTICLE)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_pipeline() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let config_path = write_config(dir.path());
    let plan_path = dir.path().join("plan.json");
    fs::write(
        &plan_path,
        format!(
            r#"{{"tasks": [
                {{"id": 1, "url": "{base}/article", "kind": "text"}},
                {{"id": 2, "url": "{base}/article?utm_source=newsletter", "kind": "text"}},
                {{"id": 3, "url": "{base}/missing", "kind": "text"}},
                {{"id": 4, "url": "{base}/private/page", "kind": "text"}},
                {{"id": 5, "url": "{base}/images/cat.png", "kind": "image"}},
                {{"id": 6, "url": "{base}/flaky", "kind": "text", "max_retries": 2}}
            ]}}"#,
            base = base
        ),
    )
    .unwrap();

    let (config, hash) = load_config_with_hash(&config_path).unwrap();
    let plan = load_plan(&plan_path).unwrap();
    let results_path = config.output.results_path.clone();
    let report_path = config.output.report_path.clone();
    let cache_path = config.output.directive_cache_path.clone().unwrap();

    let orchestrator = Orchestrator::from_config(config).unwrap();
    let mut results = orchestrator.run(&plan).await.unwrap();
    drop(orchestrator);
    results.report = results.report.with_config_hash(hash.clone());

    let statuses: Vec<TaskState> = results.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            TaskState::Success,
            TaskState::SkippedDuplicate,
            TaskState::Failed,
            TaskState::Disallowed,
            TaskState::Success,
            TaskState::Success,
        ]
    );

    let article = results.get(1).unwrap();
    assert_eq!(results.get(2).unwrap().content_hash, article.content_hash);
    assert_eq!(results.get(2).unwrap().duplicate_of, Some(1));
    assert_eq!(results.get(6).unwrap().attempts, 2);
    assert_eq!(results.report.tasks[5].class, TaskClass::Recovered);

    let image = results.get(5).unwrap();
    assert!(image.has_payload());
    assert!(dir.path().join("media").read_dir().unwrap().next().is_some());

    assert_eq!(results.report.succeeded, 2);
    assert_eq!(results.report.recovered, 1);
    assert_eq!(results.report.deduplicated, 1);
    assert_eq!(results.report.failed, 1);
    assert_eq!(results.report.disallowed, 1);
    assert_eq!(results.report.failure_kinds.get("http_404"), Some(&1));

    write_results_json(&results, &results_path).unwrap();
    write_markdown_report(&results, &report_path).unwrap();

    let reloaded = read_results_json(&results_path).unwrap();
    assert_eq!(reloaded.results, results.results);
    assert_eq!(reloaded.report.config_hash.as_deref(), Some(hash.as_str()));
    assert_eq!(reloaded.errors.len(), 2);

    let report = fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("# Sumi-Gather Run Report"));
    assert!(report.contains(&hash));
    assert!(report.contains("http_404"));

    let store = open_directive_store(&cache_path).unwrap();
    assert_eq!(store.count_directives().unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_plan_file_rejected() {
    let dir = TempDir::new().unwrap();

    let broken = dir.path().join("broken.json");
    fs::write(&broken, r#"{"tasks": [{"id": 1, "url": "#).unwrap();
    assert!(matches!(load_plan(&broken), Err(GatherError::Plan(_))));

    let malformed = dir.path().join("malformed.json");
    fs::write(
        &malformed,
        r#"{"tasks": [
            {"id": 1, "url": "https://example.com/a", "kind": "text"},
            {"id": 1, "url": "ftp://example.com/b", "kind": "text"},
            {"id": 2, "url": "https://example.com/c", "kind": "video", "strategy": "rendered"}
        ]}"#,
    )
    .unwrap();
    match load_plan(&malformed) {
        Err(GatherError::Plan(rejected)) => {
            assert_eq!(rejected.problems.len(), 3, "{:?}", rejected.problems);
        }
        other => panic!("expected plan rejection, got {:?}", other.map(|p| p.len())),
    }

    assert!(matches!(
        load_plan(&dir.path().join("absent.json")),
        Err(GatherError::Io(_))
    ));
}

#[tokio::test]
async fn test_cancelled_pipeline_reports_interruption() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/slow/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ARTICLE)
                .insert_header("content-type", "text/html")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (mut config, _) = load_config_with_hash(&write_config(dir.path())).unwrap();
    config.orchestrator.workers = 1;

    let tasks: Vec<String> = (1..=4)
        .map(|id| {
            format!(
                r#"{{"id": {id}, "url": "{base}/slow/{id}", "kind": "text"}}"#,
                id = id,
                base = server.uri()
            )
        })
        .collect();
    let plan_path = dir.path().join("plan.json");
    fs::write(&plan_path, format!(r#"{{"tasks": [{}]}}"#, tasks.join(","))).unwrap();
    let plan = load_plan(&plan_path).unwrap();

    let orchestrator = Orchestrator::from_config(config).unwrap();
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let results = orchestrator.run(&plan).await.unwrap();
    assert_eq!(results.get(1).unwrap().status, TaskState::Success);
    assert_eq!(results.report.cancelled, 3);
    assert!(results.report.interrupted);
    assert!(results.errors.is_empty());
}

#[tokio::test]
async fn test_planned_url_is_fetched_as_given() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    // Only the URL as written in the plan answers; its normalized form
    // (no trailing slash, no `source` parameter) would 404
    Mock::given(method("GET"))
        .and(path("/dir/"))
        .and(query_param("source", "feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ARTICLE)
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (config, _) = load_config_with_hash(&write_config(dir.path())).unwrap();
    let plan_path = dir.path().join("plan.json");
    fs::write(
        &plan_path,
        format!(
            r#"{{"tasks": [{{"id": 1, "url": "{}/dir/?source=feed", "kind": "text"}}]}}"#,
            server.uri()
        ),
    )
    .unwrap();
    let plan = load_plan(&plan_path).unwrap();

    let results = Orchestrator::from_config(config)
        .unwrap()
        .run(&plan)
        .await
        .unwrap();

    let result = results.get(1).unwrap();
    assert_eq!(result.status, TaskState::Success, "{:?}", result.error);
    assert!(result.final_url().unwrap().ends_with("/dir/?source=feed"));
}
