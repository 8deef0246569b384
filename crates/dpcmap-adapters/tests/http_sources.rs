//! HTTP-level adapter tests against a local mock server.

use std::sync::Arc;

use dpcmap_adapters::{
    AllianceDirectory, DirectoryFeed, DuckDuckGoSearch, FrontierSource, HttpPageRenderer, MapFeed,
    PageRenderer, WebSearch,
};
use dpcmap_storage::{HttpClientConfig, HttpFetcher};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(HttpClientConfig::default()).expect("fetcher")
}

#[tokio::test]
async fn renderer_returns_text_and_script_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/map"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><h1>Mapper</h1>
               <script type="application/json">{"points":[{"id":1,"name":"A"}]}</script>
               </body></html>"#,
        ))
        .mount(&server)
        .await;

    let renderer = HttpPageRenderer::new(fetcher());
    let page = renderer
        .render(&format!("{}/map", server.uri()))
        .await
        .expect("render")
        .expect("page present");
    assert_eq!(page.text, "Mapper");
    assert_eq!(page.script_json.len(), 1);
}

#[tokio::test]
async fn renderer_maps_missing_pages_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let renderer = HttpPageRenderer::new(fetcher());
    let page = renderer
        .render(&format!("{}/gone", server.uri()))
        .await
        .expect("render");
    assert!(page.is_none());
}

#[tokio::test]
async fn frontier_index_and_practice_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><script type="application/json">
               {"practices":[{"id":17,"name":"Example Family Medicine","lat":39.8,"lng":-89.6}]}
               </script></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/practices/17.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"id":17,"name":"Example Family Medicine"}"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/practices/99.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let renderer: Arc<dyn PageRenderer> = Arc::new(HttpPageRenderer::new(fetcher()));
    let source = FrontierSource::new(renderer, fetcher(), server.uri());

    let points = source.point_index().await.expect("index");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].id, 17);

    assert!(source.practice(17).await.expect("fetch").is_some());
    assert!(source.practice(99).await.expect("fetch").is_none());
}

#[tokio::test]
async fn directory_pagination_stops_when_nothing_new_appears() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="/providers/alpha-care">Alpha</a><a href="/providers/beta-care">Beta</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/providers"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<a href="/providers/alpha-care">Alpha again</a>"#),
        )
        .mount(&server)
        .await;

    let directory = AllianceDirectory::new(fetcher(), server.uri());
    let slugs = directory.profile_slugs().await.expect("slugs");
    assert_eq!(slugs, vec!["alpha-care".to_string(), "beta-care".to_string()]);
}

#[tokio::test]
async fn directory_profile_404_is_not_found_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/providers/gone-care"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let directory = AllianceDirectory::new(fetcher(), server.uri());
    let page = directory.profile_page("gone-care").await.expect("fetch");
    assert!(page.is_none());
}

#[tokio::test]
async fn search_unwraps_result_anchors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/html/"))
        .and(query_param("q", "example family medicine springfield il"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexamplefamilymed.com%2F">r</a>"#,
        ))
        .mount(&server)
        .await;

    let search = DuckDuckGoSearch::new(fetcher(), server.uri());
    let results = search
        .search("example family medicine springfield il")
        .await
        .expect("search");
    assert_eq!(results, vec!["https://examplefamilymed.com/".to_string()]);
}
