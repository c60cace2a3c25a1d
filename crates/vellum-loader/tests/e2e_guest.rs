//! End-to-end tests against the real guest artifact.
//!
//! These are ignored by default because they need the production `.wasm`
//! binary. Point `VELLUM_GUEST_WASM` at the artifact and run:
//!
//! ```text
//! VELLUM_GUEST_WASM=/path/to/vellum_guest_bg.wasm cargo test -- --ignored
//! ```

use url::Url;

use vellum_common::{BridgeConfig, LoaderConfig, MarkdownOptions, PlaintextOptions};
use vellum_loader::Bridge;

fn real_guest_bridge() -> Bridge {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vellum=debug".into()),
        )
        .try_init();

    let path = std::env::var("VELLUM_GUEST_WASM")
        .expect("set VELLUM_GUEST_WASM to the guest artifact path");
    let path = std::fs::canonicalize(path).expect("guest artifact path should exist");
    let url = Url::from_file_path(&path).unwrap();

    let config = BridgeConfig {
        loader: LoaderConfig {
            module_url: Some(url.to_string()),
            cache_enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    Bridge::with_config(config).unwrap()
}

#[tokio::test]
#[ignore = "requires the guest artifact (set VELLUM_GUEST_WASM)"]
async fn test_markdown_heading_list_and_statistics() {
    let bridge = real_guest_bridge();

    let output = bridge
        .markdown_to_html("## Hello\n\n* a\n* b\n", &MarkdownOptions::default())
        .await
        .unwrap();

    assert_eq!(output.headings.len(), 1);
    assert_eq!(output.headings[0].heading, "Hello");
    assert_eq!(output.headings[0].id, "hello");

    assert!(output.html.contains("<ul>"));
    assert_eq!(output.html.matches("<li>").count(), 2);

    assert!(output.statistics.word_count > 0);
}

#[tokio::test]
#[ignore = "requires the guest artifact (set VELLUM_GUEST_WASM)"]
async fn test_search_term_marks_first_match_with_id() {
    let bridge = real_guest_bridge();

    let options = MarkdownOptions {
        search_term: Some("apple".into()),
        ..Default::default()
    };
    let output = bridge
        .markdown_to_html("apple apple", &options)
        .await
        .unwrap();

    assert!(
        output
            .html
            .contains("<mark id=\"search-match\">apple</mark>"),
        "first match should carry the scroll anchor: {}",
        output.html
    );
    assert!(
        output.html.contains("<mark>apple</mark>"),
        "later matches are plain marks: {}",
        output.html
    );
}

#[tokio::test]
#[ignore = "requires the guest artifact (set VELLUM_GUEST_WASM)"]
async fn test_canonical_root_url_prefixes_relative_links() {
    let bridge = real_guest_bridge();

    let options = MarkdownOptions {
        canonical_root_url: Some("https://example.com".into()),
        ..Default::default()
    };
    let output = bridge
        .markdown_to_html("[home](/home)", &options)
        .await
        .unwrap();

    assert!(
        output.html.contains("https://example.com/home"),
        "relative link should be prefixed: {}",
        output.html
    );
}

#[tokio::test]
#[ignore = "requires the guest artifact (set VELLUM_GUEST_WASM)"]
async fn test_markdown_to_plaintext_strips_markup() {
    let bridge = real_guest_bridge();

    let text = bridge
        .markdown_to_plaintext("**bold** text", &PlaintextOptions::default())
        .await
        .unwrap();

    assert!(!text.contains("**"));
    assert!(text.contains("bold"));
}

#[tokio::test]
#[ignore = "requires the guest artifact (set VELLUM_GUEST_WASM)"]
async fn test_empty_mjml_document_renders_skeleton() {
    let bridge = real_guest_bridge();

    let html = bridge.mjml_to_html("<mjml></mjml>").await.unwrap();

    assert!(html.contains("<html"));
    assert!(html.contains("<head"));
    assert!(html.contains("<body"));
}
