use super::*;
use crate::dom::{parse_document, ConfirmationArea, SubmitEvent};
use crate::form::Form;
use crate::transport::RawResponse;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;
use tokio_test::assert_ok;
use url::Url;

type Reply = Result<RawResponse, TransportFailure>;

/// Answers requests per action path, in the order replies were scripted.
#[derive(Default)]
struct ScriptedTransport {
    requests: Mutex<Vec<SubmissionRequest>>,
    pending: Mutex<HashMap<String, VecDeque<oneshot::Receiver<Reply>>>>,
}

impl ScriptedTransport {
    /// Queues a reply for `path` that the test sends later.
    fn expect(&self, path: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    fn reply(&self, path: &str, status: u16, body: &str) {
        let _ = self.expect(path).send(Ok(RawResponse::new(status, body)));
    }

    fn fail(&self, path: &str, failure: TransportFailure) {
        let _ = self.expect(path).send(Err(failure));
    }

    fn requests_to(&self, path: &str) -> Vec<SubmissionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.action().path() == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, request: &SubmissionRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        let rx = self
            .pending
            .lock()
            .unwrap()
            .get_mut(request.action().path())
            .and_then(VecDeque::pop_front);
        match rx {
            Some(rx) => rx.await.unwrap_or(Err(TransportFailure::Aborted)),
            None => Err(TransportFailure::Network("nothing scripted".into())),
        }
    }
}

const PRIMARY_FORM: &str =
    r#"<form id="smart_form" method="post" action="/post-replays"><input name="name" value="a"></form>"#;

fn primary_with(form_html: &str) -> (Arc<ScriptedTransport>, PrimaryController) {
    let transport = Arc::new(ScriptedTransport::default());
    let settings = Settings::builder()
        .base_url(Url::parse("http://results.test/admin/").unwrap())
        .build()
        .unwrap();
    let ctx = Context::new(transport.clone(), settings);
    let element = parse_document(form_html)
        .into_iter()
        .find_map(|node| node.as_element().cloned())
        .unwrap();
    let area = ConfirmationArea::with_children(parse_document("<p>Upload replays above.</p>"));
    (transport, PrimaryController::new(Form::new(element), area, ctx))
}

fn primary() -> (Arc<ScriptedTransport>, PrimaryController) {
    primary_with(PRIMARY_FORM)
}

fn htmls(fragments: &[&str]) -> String {
    let body = serde_json::json!({ "htmls": fragments });
    format!("for(;;);{body}")
}

fn message(text: &str) -> String {
    format!("for(;;);{}", serde_json::json!({ "message": text }))
}

fn confirm_box(id: &str, action: &str) -> String {
    format!(
        r#"<div class="confirm_box" id="{id}"><p>Game {id}</p><form method="post" action="{action}"><input type="hidden" name="game" value="{id}"></form></div>"#
    )
}

async fn bind_boxes(
    transport: &ScriptedTransport,
    psc: &PrimaryController,
    boxes: &[String],
) -> Vec<ConfirmationController> {
    let fragments: Vec<&str> = boxes.iter().map(String::as_str).collect();
    transport.reply("/post-replays", 200, &htmls(&fragments));
    psc.on_submit(&mut SubmitEvent::new())
        .settled()
        .await
        .unwrap()
        .success()
        .unwrap()
}

fn block_id(csc: &ConfirmationController) -> Option<String> {
    csc.block().with_element(|el| el.id().map(str::to_string))
}

#[tokio::test]
async fn scenario_primary_then_confirmation() {
    let (transport, psc) = primary();
    transport.reply(
        "/post-replays",
        200,
        r#"for(;;);{"htmls":["<div class=\"confirm_box\"><form method=\"post\" action=\"/c\"></form></div>"]}"#,
    );

    let mut evt = SubmitEvent::new();
    let submission = psc.on_submit(&mut evt);
    assert!(evt.default_prevented());
    let bound = submission.settled().await.unwrap().success().unwrap();

    assert_eq!(bound.len(), 1);
    assert_eq!(psc.area().blocks().len(), 1);
    assert!(psc.area().blocks()[0].ptr_eq(bound[0].block()));
    assert_eq!(
        psc.area().inner_html(),
        r#"<div class="confirm_box"><form method="post" action="/c"></form></div>"#
    );
    assert_eq!(psc.confirmations().len(), 1);

    transport.reply("/c", 200, r#"for(;;);{"message":"done"}"#);
    let mut evt = SubmitEvent::new();
    let answer = assert_ok!(bound[0].on_submit(&mut evt).settled().await);
    assert!(evt.default_prevented());
    assert_eq!(answer, Settled::Success("done".to_string()));

    let block = bound[0].block();
    assert_eq!(block.last_text().as_deref(), Some("done"));
    assert_eq!(
        block.inner_html(),
        r#"<form method="post" action="/c"></form>done"#
    );
    assert!(transport.requests_to("/c")[0].fields().is_empty());
}

#[tokio::test]
async fn primary_requests_always_carry_the_ajax_marker() {
    for form in [
        PRIMARY_FORM,
        r#"<form method="post" action="/post-replays"></form>"#,
        r#"<form method="post" action="/post-replays"><input name="is_ajax" value="0"></form>"#,
    ] {
        let (transport, psc) = primary_with(form);
        transport.reply("/post-replays", 200, &htmls(&[]));
        psc.on_submit(&mut SubmitEvent::new()).settled().await.unwrap();

        let sent = transport.requests_to("/post-replays");
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .fields()
            .iter()
            .any(|f| f.name == "is_ajax" && f.text_value() == Some("1")));
        assert!(sent[0].encode_urlencoded().contains("is_ajax=1"));
    }
}

#[tokio::test]
async fn confirmation_requests_never_carry_the_ajax_marker() {
    let (transport, psc) = primary();
    let cscs = bind_boxes(&transport, &psc, &[confirm_box("g1", "/c1")]).await;

    transport.reply("/c1", 200, &message("Success!"));
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();

    let sent = transport.requests_to("/c1");
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].contains("is_ajax"));
    assert_eq!(sent[0].get("game"), Some("g1"));
}

#[tokio::test]
async fn one_controller_per_block_with_a_form() {
    let (transport, psc) = primary();
    let boxes = vec![
        confirm_box("g1", "/c1"),
        r#"<div class="confirm_box" id="empty"><p>No replay matched.</p></div>"#.to_string(),
        "<p>Missing game 3</p>".to_string(),
        confirm_box("g2", "/c2"),
        confirm_box("g3", "/c3"),
    ];
    let cscs = bind_boxes(&transport, &psc, &boxes).await;

    let ids: Vec<_> = cscs.iter().map(block_id).collect();
    assert_eq!(
        ids,
        vec![
            Some("g1".to_string()),
            Some("g2".to_string()),
            Some("g3".to_string())
        ]
    );
    assert_eq!(psc.area().blocks().len(), 4);
    assert!(psc.area().text_content().contains("Missing game 3"));
    assert_eq!(psc.state(), ControllerState::Settled(Outcome::Success));
}

#[tokio::test]
async fn only_the_first_form_of_a_block_is_bound() {
    let (transport, psc) = primary();
    let html = r#"<div class="confirm_box"><form method="post" action="/first"><input name="n" value="1"></form><form method="post" action="/second"></form></div>"#;
    let cscs = bind_boxes(&transport, &psc, &[html.to_string()]).await;
    assert_eq!(cscs.len(), 1);

    transport.reply("/first", 200, &message("ok"));
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    assert_eq!(transport.requests_to("/first").len(), 1);
    assert!(transport.requests_to("/second").is_empty());
}

#[tokio::test]
async fn only_success_statuses_are_decoded() {
    for status in [404u16, 500] {
        let (transport, psc) = primary();
        transport.reply("/post-replays", status, &htmls(&[&confirm_box("g1", "/c1")]));
        let settled = psc.on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
        assert_eq!(settled.failure(), Some(Failure::Server { status }));
        assert_eq!(psc.area().inner_html(), "Error!");
        assert!(psc.confirmations().is_empty());
        assert_eq!(psc.state(), ControllerState::Settled(Outcome::Error));
    }

    let (transport, psc) = primary();
    let cscs = bind_boxes(&transport, &psc, &[confirm_box("g1", "/c1")]).await;
    for status in [404u16, 500] {
        transport.reply("/c1", status, &message("should not show"));
        let settled = cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
        assert_eq!(settled.failure(), Some(Failure::Server { status }));
    }
    transport.reply("/c1", 200, &message("Success!"));
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();

    let text = cscs[0].block().text_content();
    assert!(text.ends_with("Error!Error!Success!"));
    assert!(!text.contains("should not show"));
}

#[tokio::test]
async fn transport_failures_and_aborts_show_fixed_literals() {
    let (transport, psc) = primary();
    transport.fail("/post-replays", TransportFailure::Network("refused".into()));
    let settled = psc.on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    assert_eq!(settled.failure(), Some(Failure::Transport));
    assert_eq!(psc.area().inner_html(), "Error!");

    transport.fail("/post-replays", TransportFailure::Aborted);
    let settled = psc.on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    assert_eq!(settled.failure(), Some(Failure::Cancelled));
    assert_eq!(psc.area().inner_html(), "Aborted!");
    assert_eq!(psc.state(), ControllerState::Settled(Outcome::Abort));

    let cscs = bind_boxes(&transport, &psc, &[confirm_box("g1", "/c1")]).await;
    transport.fail("/c1", TransportFailure::Network("reset".into()));
    transport.fail("/c1", TransportFailure::Aborted);
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    assert_eq!(cscs[0].block().text_content(), "Game g1Error!Aborted!");
    assert_eq!(cscs[0].state(), ControllerState::Settled(Outcome::Abort));
}

#[tokio::test]
async fn undecodable_success_body_is_a_protocol_error() {
    let (transport, psc) = primary();
    let before = psc.area().inner_html();
    transport.reply("/post-replays", 200, "for(;;);<html>oops</html>");
    let err = psc
        .on_submit(&mut SubmitEvent::new())
        .settled()
        .await
        .err()
        .expect("protocol error");
    assert!(matches!(err, SubmitError::Protocol(_)));
    assert_eq!(psc.area().inner_html(), before);
    assert_eq!(psc.state(), ControllerState::Settled(Outcome::Error));

    let cscs = bind_boxes(&transport, &psc, &[confirm_box("g1", "/c1")]).await;
    let before = cscs[0].block().inner_html();
    transport.reply("/c1", 200, r#"for(;;);{"msg":"wrong key"}"#);
    let err = cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap_err();
    assert!(matches!(err, SubmitError::Protocol(_)));
    assert_eq!(cscs[0].block().inner_html(), before);
}

#[tokio::test]
async fn primary_success_replaces_and_confirmation_success_appends() {
    let (transport, psc) = primary();
    let first = bind_boxes(&transport, &psc, &[confirm_box("g1", "/c1")]).await;
    assert!(!psc.area().text_content().contains("Upload replays above."));

    transport.reply("/c1", 200, &message("Success!"));
    first[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    transport.reply("/c1", 200, &message("Result already submitted for 1,1,1"));
    first[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    assert!(first[0].block().with_element(|el| el.find_path("form").is_some()));
    assert!(first[0]
        .block()
        .text_content()
        .ends_with("Success!Result already submitted for 1,1,1"));

    let second = bind_boxes(&transport, &psc, &[confirm_box("g2", "/c2")]).await;
    assert_eq!(psc.area().blocks().len(), 1);
    assert!(!psc.area().text_content().contains("g1"));
    assert!(!first[0].block().is_attached());
    assert!(second[0].block().is_attached());
    assert_eq!(psc.area().generation(), 2);
}

#[tokio::test]
async fn completions_on_detached_blocks_are_inert() {
    let (transport, psc) = primary();
    let old = bind_boxes(&transport, &psc, &[confirm_box("g1", "/c1")]).await;

    let pending = transport.expect("/c1");
    let submission = old[0].on_submit(&mut SubmitEvent::new());
    let _fresh = bind_boxes(&transport, &psc, &[confirm_box("g2", "/c2")]).await;
    let area_before = psc.area().inner_html();

    pending.send(Ok(RawResponse::new(200, message("late")))).unwrap();
    let settled = submission.settled().await.unwrap();
    assert_eq!(settled, Settled::Success("late".to_string()));
    assert_eq!(psc.area().inner_html(), area_before);
    assert_eq!(old[0].block().last_text().as_deref(), Some("late"));
}

#[tokio::test]
async fn concurrent_confirmations_touch_only_their_own_block() {
    for reverse in [false, true] {
        let (transport, psc) = primary();
        let cscs = bind_boxes(
            &transport,
            &psc,
            &[confirm_box("g1", "/c1"), confirm_box("g2", "/c2")],
        )
        .await;

        let tx1 = transport.expect("/c1");
        let tx2 = transport.expect("/c2");
        let s1 = cscs[0].on_submit(&mut SubmitEvent::new());
        let s2 = cscs[1].on_submit(&mut SubmitEvent::new());
        assert_eq!(cscs[0].in_flight(), 1);
        assert_eq!(cscs[1].in_flight(), 1);

        let first_done = if reverse {
            tx2.send(Ok(RawResponse::new(200, message("two")))).unwrap();
            let done = s2.settled().await.unwrap();
            tx1.send(Ok(RawResponse::new(200, message("one")))).unwrap();
            s1.settled().await.unwrap();
            done
        } else {
            tx1.send(Ok(RawResponse::new(200, message("one")))).unwrap();
            let done = s1.settled().await.unwrap();
            tx2.send(Ok(RawResponse::new(200, message("two")))).unwrap();
            s2.settled().await.unwrap();
            done
        };
        assert!(first_done.is_success());

        assert_eq!(cscs[0].block().text_content(), "Game g1one");
        assert_eq!(cscs[1].block().text_content(), "Game g2two");
    }
}

#[tokio::test]
async fn submit_returns_before_the_response_arrives() {
    let (transport, psc) = primary();
    assert_eq!(psc.state(), ControllerState::Idle);

    let tx = transport.expect("/post-replays");
    let submission = psc.on_submit(&mut SubmitEvent::new());
    tokio::task::yield_now().await;
    assert!(!submission.is_settled());
    assert_eq!(psc.state(), ControllerState::Submitting);
    assert_eq!(psc.area().text_content(), "Upload replays above.");

    tx.send(Ok(RawResponse::new(200, htmls(&[])))).unwrap();
    assert!(submission.settled().await.unwrap().is_success());
    assert_eq!(psc.state(), ControllerState::Settled(Outcome::Success));
    assert_eq!(psc.area().inner_html(), "");
}

#[tokio::test]
async fn resubmission_is_permitted_and_last_completion_wins() {
    let (transport, psc) = primary();
    let tx_a = transport.expect("/post-replays");
    let tx_b = transport.expect("/post-replays");

    let a = psc.on_submit(&mut SubmitEvent::new());
    tokio::task::yield_now().await;
    psc.set_field("name", "b");
    let b = psc.on_submit(&mut SubmitEvent::new());
    assert_eq!(psc.in_flight(), 2);

    tx_b.send(Ok(RawResponse::new(200, htmls(&[&confirm_box("b", "/cb")])))).unwrap();
    b.settled().await.unwrap();
    assert_eq!(psc.state(), ControllerState::Submitting);
    tx_a.send(Ok(RawResponse::new(200, htmls(&[&confirm_box("a", "/ca")])))).unwrap();
    a.settled().await.unwrap();

    let sent: Vec<_> = transport
        .requests_to("/post-replays")
        .iter()
        .map(|r| r.get("name").map(str::to_string))
        .collect();
    assert_eq!(sent.len(), 2);
    assert!(sent.contains(&Some("a".to_string())));
    assert!(sent.contains(&Some("b".to_string())));

    let bound = psc.confirmations();
    assert_eq!(bound.len(), 1);
    assert_eq!(block_id(&bound[0]), Some("a".to_string()));
    assert!(bound[0].block().is_attached());
}

#[tokio::test]
async fn teardown_cancels_in_flight_submissions() {
    let (transport, psc) = primary();
    let _never_answered = transport.expect("/post-replays");
    let submission = psc.on_submit(&mut SubmitEvent::new());
    tokio::task::yield_now().await;

    psc.context().lifetime.teardown();
    let settled = submission.settled().await.unwrap();
    assert_eq!(settled.failure(), Some(Failure::Cancelled));
    assert_eq!(psc.area().inner_html(), "Aborted!");
}

#[tokio::test]
async fn confirmation_form_edits_are_submitted() {
    let (transport, psc) = primary();
    let html = r#"<div class="confirm_box"><form method="post" action="/confirm-result"><input type="hidden" name="week" value="1"><input type="radio" name="winner" value="home"><input type="radio" name="winner" value="away"></form></div>"#;
    let cscs = bind_boxes(&transport, &psc, &[html.to_string()]).await;

    assert!(cscs[0].set_checked("winner", "away", true));
    assert!(cscs[0].set_field("week", "2"));
    assert!(!cscs[0].set_field("absent", "x"));

    transport.reply("/confirm-result", 200, &message("Success!"));
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    let sent = &transport.requests_to("/confirm-result")[0];
    assert_eq!(sent.get("winner"), Some("away"));
    assert_eq!(sent.get("week"), Some("2"));
}

#[tokio::test]
async fn nested_markers_each_get_a_controller() {
    let (transport, psc) = primary();
    let html = concat!(
        r#"<div class="confirm_box" id="outer"><form method="post" action="/outer"></form>"#,
        r#"<div class="confirm_box" id="inner"><form method="post" action="/inner"></form></div></div>"#,
    );
    let cscs = bind_boxes(&transport, &psc, &[html.to_string()]).await;

    let ids: Vec<_> = cscs.iter().map(block_id).collect();
    assert_eq!(ids, vec![Some("outer".to_string()), Some("inner".to_string())]);

    transport.reply("/outer", 200, &message("outer done"));
    transport.reply("/inner", 200, &message("inner done"));
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    cscs[1].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();

    assert_eq!(transport.requests_to("/outer").len(), 1);
    assert_eq!(transport.requests_to("/inner").len(), 1);
    assert_eq!(cscs[0].block().last_text().as_deref(), Some("outer done"));
    assert_eq!(cscs[1].block().last_text().as_deref(), Some("inner done"));
}

#[tokio::test]
async fn outer_block_binds_the_form_of_its_nested_block() {
    let (transport, psc) = primary();
    let html = r#"<div class="confirm_box" id="outer"><p>Set 1</p><div class="confirm_box" id="inner"><form method="post" action="/shared"><input name="set_number" value="1"></form></div></div>"#;
    let cscs = bind_boxes(&transport, &psc, &[html.to_string()]).await;
    assert_eq!(cscs.len(), 2);

    assert!(cscs[0].set_field("set_number", "2"));
    transport.reply("/shared", 200, &message("Success!"));
    cscs[0].on_submit(&mut SubmitEvent::new()).settled().await.unwrap();

    assert_eq!(transport.requests_to("/shared")[0].get("set_number"), Some("2"));
    assert_eq!(cscs[0].block().last_text().as_deref(), Some("Success!"));
    assert_eq!(cscs[1].block().last_text(), None);
}

struct PanickingTransport;

#[async_trait]
impl Transport for PanickingTransport {
    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn send(&self, _request: &SubmissionRequest) -> Reply {
        panic!("transport bug")
    }
}

#[tokio::test]
async fn a_panicked_submission_does_not_stay_in_flight() {
    let ctx = Context::new(Arc::new(PanickingTransport), Settings::default());
    let element = parse_document(PRIMARY_FORM)
        .into_iter()
        .find_map(|node| node.as_element().cloned())
        .unwrap();
    let psc = PrimaryController::new(Form::new(element), ConfirmationArea::new(), ctx);

    let err = psc
        .on_submit(&mut SubmitEvent::new())
        .settled()
        .await
        .err()
        .expect("task error");
    assert!(matches!(err, SubmitError::Task(_)));
    assert_eq!(psc.in_flight(), 0);
    assert_eq!(psc.state(), ControllerState::Settled(Outcome::Error));
}

/// Records the level and field names of every event.
#[derive(Clone, Default)]
struct EventFields(Arc<Mutex<Vec<(tracing::Level, Vec<String>)>>>);

struct FieldNames(Vec<String>);

impl tracing::field::Visit for FieldNames {
    fn record_debug(&mut self, field: &tracing::field::Field, _value: &dyn std::fmt::Debug) {
        self.0.push(field.name().to_string());
    }
}

impl tracing::Subscriber for EventFields {
    fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _attrs: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _span: &tracing::span::Id, _values: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _span: &tracing::span::Id, _follows: &tracing::span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        let mut names = FieldNames(Vec::new());
        event.record(&mut names);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), names.0));
    }

    fn enter(&self, _span: &tracing::span::Id) {}

    fn exit(&self, _span: &tracing::span::Id) {}
}

#[tokio::test]
async fn recovered_failures_are_logged_without_detail() {
    let events = EventFields::default();
    let _guard = tracing::subscriber::set_default(events.clone());

    let (transport, psc) = primary();
    transport.reply("/post-replays", 500, "Internal Server Error");
    transport.fail("/post-replays", TransportFailure::Network("connection refused".into()));
    psc.on_submit(&mut SubmitEvent::new()).settled().await.unwrap();
    psc.on_submit(&mut SubmitEvent::new()).settled().await.unwrap();

    let warnings: Vec<Vec<String>> = events
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, _)| *level == tracing::Level::WARN)
        .map(|(_, fields)| fields.clone())
        .collect();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|fields| fields == &["message".to_string()]));
}
