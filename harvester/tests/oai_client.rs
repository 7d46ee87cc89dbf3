use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use harvester::oai::{OaiClient, RecordSource};
use harvester::Interval;
use harvester_core::config::HttpConfig;
use harvester_core::{Config, Error, FilterKind, Granularity, Target};
use pretty_assertions::assert_eq;
use wiremock::matchers::{basic_auth, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target(server: &MockServer) -> Target {
    Target {
        name: "demo".into(),
        base_url: format!("{}/oai", server.uri()),
        set: Some("demo".into()),
        metadata_prefix: Some("mods".into()),
        username: None,
        password: None,
        datasource: "ds.demo".into(),
        filter: FilterKind::Default,
        granularity: Granularity::Day,
    }
}

fn http() -> HttpConfig {
    Config::default().http
}

fn client(target: Target, http: &HttpConfig) -> OaiClient {
    let interval = Interval::validate(Some("2022-07-12"), None).expect("valid interval");
    OaiClient::new(target, interval, http).expect("client")
}

fn page(records: &[(&str, bool)], token: Option<&str>) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><ListRecords>"#,
    );
    for (id, deleted) in records {
        if *deleted {
            body.push_str(&format!(
                r#"<record><header status="deleted"><identifier>{id}</identifier><datestamp>2022-07-13</datestamp></header></record>"#
            ));
        } else {
            body.push_str(&format!(
                r#"<record><header><identifier>{id}</identifier><datestamp>2022-07-13</datestamp></header><metadata><mods><title>{id}</title></mods></metadata></record>"#
            ));
        }
    }
    if let Some(token) = token {
        body.push_str(&format!(
            r#"<resumptionToken completeListSize="3" cursor="0">{token}</resumptionToken>"#
        ));
    }
    body.push_str("</ListRecords></OAI-PMH>");
    body
}

fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/xml; charset=utf-8")
}

#[tokio::test]
async fn first_request_carries_the_selectors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("metadataPrefix", "mods"))
        .and(query_param("set", "demo"))
        .and(query_param("from", "2022-07-12"))
        .and(query_param_is_missing("until"))
        .and(query_param_is_missing("resumptionToken"))
        .respond_with(xml(page(&[("oai:1", false), ("oai:2", true)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client(target(&server), &http());
    let batch = client.next_batch().await.expect("batch");

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.records[0].id, "oai:1");
    assert!(!batch.records[0].deleted);
    assert!(batch.records[1].deleted);
    assert_eq!(batch.continuation_token, None);
    assert!(client.is_exhausted());
}

#[tokio::test]
async fn resumption_token_drives_the_second_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("metadataPrefix", "mods"))
        .respond_with(xml(page(&[("oai:1", false), ("oai:2", false)], Some("tok-1"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oai"))
        .and(query_param("verb", "ListRecords"))
        .and(query_param("resumptionToken", "tok-1"))
        .and(query_param_is_missing("metadataPrefix"))
        .and(query_param_is_missing("set"))
        .and(query_param_is_missing("from"))
        .respond_with(xml(page(&[("oai:3", false)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client(target(&server), &http());

    let first = client.next_batch().await.expect("first page");
    assert_eq!(first.continuation_token.as_deref(), Some("tok-1"));
    assert_eq!(first.total_hint, Some(3));
    assert!(!client.is_exhausted());

    let second = client.next_batch().await.expect("second page");
    assert_eq!(second.len(), 1);
    assert_eq!(second.total_hint, Some(3));
    assert!(client.is_exhausted());

    assert!(matches!(client.next_batch().await, Err(Error::Internal(_))));
}

#[tokio::test]
async fn undeclared_xip_prefix_is_repaired_before_parsing() {
    let server = MockServer::start().await;
    let body = r#"<OAI-PMH><ListRecords><record><header><identifier>oai:du:abc</identifier><datestamp>2022-07-13T10:00:00Z</datestamp></header><metadata><xip:DeliverableUnit><xip:Title>Radioavisen</xip:Title></xip:DeliverableUnit></metadata></record></ListRecords></OAI-PMH>"#;
    Mock::given(method("GET"))
        .and(path("/oai"))
        .respond_with(xml(body.to_string()))
        .mount(&server)
        .await;

    let mut client = client(target(&server), &http());
    let batch = client.next_batch().await.expect("repaired page parses");

    assert_eq!(batch.len(), 1);
    assert_eq!(batch.records[0].id, "oai:du:abc");
    assert!(batch.records[0].metadata_xml.contains("Radioavisen"));
}

#[tokio::test]
async fn no_records_match_is_an_empty_final_page() {
    let server = MockServer::start().await;
    let body = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><error code="noRecordsMatch">nothing here</error></OAI-PMH>"#;
    Mock::given(method("GET"))
        .respond_with(xml(body.to_string()))
        .mount(&server)
        .await;

    let mut client = client(target(&server), &http());
    let batch = client.next_batch().await.expect("empty batch");
    assert!(batch.is_empty());
    assert!(client.is_exhausted());
}

#[tokio::test]
async fn other_protocol_errors_fail_the_fetch() {
    let server = MockServer::start().await;
    let body = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><error code="badResumptionToken">expired</error></OAI-PMH>"#;
    Mock::given(method("GET"))
        .respond_with(xml(body.to_string()))
        .mount(&server)
        .await;

    let mut client = client(target(&server), &http());
    let err = client.next_batch().await.unwrap_err();
    assert!(err.to_string().contains("badResumptionToken"), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn server_error_names_the_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut client = client(target(&server), &http());
    match client.next_batch().await {
        Err(Error::HarvestFetch { url, details }) => {
            assert!(url.starts_with(&server.uri()), "{url}");
            assert!(url.contains("verb=ListRecords"), "{url}");
            assert!(details.contains("500"), "{details}");
        }
        other => panic!("expected fetch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unparsable_body_names_the_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(xml("<OAI-PMH><ListRecords><record></ListRecords>".to_string()))
        .mount(&server)
        .await;

    let mut client = client(target(&server), &http());
    match client.next_batch().await {
        Err(Error::HarvestFetch { url, details }) => {
            assert!(url.contains("/oai"), "{url}");
            assert!(details.starts_with("unparsable XML"), "{details}");
        }
        other => panic!("expected fetch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn credentials_are_sent_as_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(basic_auth("harvest", "s3cret"))
        .respond_with(xml(page(&[("oai:1", false)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut target = target(&server);
    target.username = Some("harvest".into());
    target.password = Some("s3cret".into());

    let mut client = client(target, &http());
    assert_eq!(client.next_batch().await.expect("batch").len(), 1);
}

#[tokio::test]
async fn slow_source_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(xml(page(&[], None)).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut http = http();
    http.read_timeout_secs = 1;

    let mut client = client(target(&server), &http);
    match client.next_batch().await {
        Err(Error::HarvestFetch { details, .. }) => assert!(details.contains("timed out"), "{details}"),
        other => panic!("expected timeout, got {other:?}"),
    }
}

/// Serves one response whose body arrives in slices, `gap` apart.
async fn trickle_server(body: String, slices: usize, gap: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.expect("head");

        let bytes = body.as_bytes();
        let step = bytes.len().div_ceil(slices);
        for chunk in bytes.chunks(step) {
            tokio::time::sleep(gap).await;
            socket.write_all(chunk).await.expect("chunk");
            socket.flush().await.expect("flush");
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn slow_but_steady_body_outlasts_the_read_timeout() {
    let body = page(&[("oai:1", false), ("oai:2", false), ("oai:3", false)], None);
    let base = trickle_server(body, 4, Duration::from_millis(600)).await;

    let target = Target {
        name: "demo".into(),
        base_url: format!("{base}/oai"),
        set: None,
        metadata_prefix: Some("mods".into()),
        username: None,
        password: None,
        datasource: "ds.demo".into(),
        filter: FilterKind::Default,
        granularity: Granularity::Day,
    };
    let mut http = http();
    http.read_timeout_secs = 1;

    let started = Instant::now();
    let mut client = client(target, &http);
    let batch = client.next_batch().await.expect("each read arrives within the window");

    assert_eq!(batch.len(), 3);
    assert!(started.elapsed() > Duration::from_secs(2));
}
