use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use texchat::markdown::MarkdownRenderer;
use texchat::models::role::Role;
use texchat::providers::openai::OpenAiProvider;
use texchat::session::{ChatSession, ChatView, TurnOutcome};
use texchat::settings::{MemorySettingsStore, Settings};
use texchat::tools::PubMedResolver;

#[derive(Default)]
struct HtmlView {
    messages: Vec<(Role, String)>,
}

impl ChatView for HtmlView {
    fn display(&mut self, role: Role, _text: &str, html: &str) {
        self.messages.push((role, html.to_string()));
    }

    fn update(&mut self, _text: &str, html: &str) {
        if let Some((_, body)) = self.messages.last_mut() {
            *body = html.to_string();
        }
    }
}

fn sse(events: &[Value]) -> ResponseTemplate {
    let mut body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn tool_delta(name: Option<&str>, arguments: &str) -> Value {
    let mut function = json!({"arguments": arguments});
    if let Some(name) = name {
        function["name"] = json!(name);
    }
    json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": function}]}}]})
}

fn text_delta(text: &str) -> Value {
    json!({"choices": [{"delta": {"content": text}}]})
}

async fn mount_pubmed(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/eutils/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "esearchresult": {"idlist": ["31452104"]}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/eutils/esummary.fcgi"))
        .and(query_param("id", "31452104"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "uids": ["31452104"],
                "31452104": {
                    "pubdate": "2019 Aug",
                    "source": "Nature",
                    "authors": [{"name": "LeCun Y"}, {"name": "Bengio Y"}],
                    "title": "Deep learning.",
                    "volume": "521",
                    "issue": "7553",
                    "pages": "436-44"
                }
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/eutils/efetch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<PubmedArticleSet><PubmedArticle><Abstract><AbstractText>Deep learning allows \
             computational models to learn representations.</AbstractText></Abstract>\
             </PubmedArticle></PubmedArticleSet>",
        ))
        .mount(server)
        .await;
}

fn provider(server: &MockServer) -> OpenAiProvider {
    let settings = Settings::new(
        "sk-test",
        format!("{}/v1/chat/completions", server.uri()),
        "gpt-4o",
    );
    OpenAiProvider::new(
        Arc::new(MemorySettingsStore::new(settings)),
        Arc::new(PubMedResolver::with_host(format!("{}/eutils", server.uri())).unwrap()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_citation_then_abstract_by_key() {
    let server = MockServer::start().await;
    mount_pubmed(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("abstract for lecun2019"))
        .respond_with(sse(&[
            tool_delta(Some("fetchPubMedAbstract"), "{\"citationKeyOrTitle\":"),
            tool_delta(None, "\"lecun2019\"}"),
        ]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(&[
            text_delta("Here is the citation:\n"),
            tool_delta(Some("fetchPubMedCitation"), ""),
            tool_delta(None, "{\"title\": \"Deep learning\"}"),
        ]))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let renderer = MarkdownRenderer::default();
    let mut session = ChatSession::new();
    let mut view = HtmlView::default();

    let outcome = session
        .send(&provider, &renderer, "cite deep learning", &mut view)
        .await;
    let TurnOutcome::Replied(reply) = outcome else {
        panic!("citation turn failed: {:?}", outcome);
    };
    assert!(reply.starts_with("Here is the citation:\n```latex\n@article{lecun2019,"));
    assert!(reply.contains("    title = {Deep learning.},"));

    let (role, html) = view.messages.last().unwrap();
    assert_eq!(*role, Role::Assistant);
    assert!(html.starts_with("Here is the citation:<br><div class=\"code-block\">"));
    assert!(html.contains("<span class=\"code-language\">latex</span>"));
    assert!(html.ends_with(
        "<a href=\"https://pubmed.ncbi.nlm.nih.gov/31452104/\" target=\"_blank\" \
         rel=\"noopener noreferrer\">View on PubMed</a>"
    ));

    let outcome = session
        .send(&provider, &renderer, "abstract for lecun2019", &mut view)
        .await;
    assert_eq!(
        outcome,
        TurnOutcome::Replied(
            "Deep learning allows computational models to learn representations.\n\
             [View on PubMed](https://pubmed.ncbi.nlm.nih.gov/31452104/)"
                .to_string()
        )
    );
    assert_eq!(session.history().len(), 5);
}

#[tokio::test]
async fn test_rejected_request_is_reported_and_session_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "requests"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(&[text_delta("Use \\emph{}.")]))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let renderer = MarkdownRenderer::plain();
    let mut session = ChatSession::new();
    let mut view = HtmlView::default();

    let outcome = session.send(&provider, &renderer, "italics?", &mut view).await;
    assert_eq!(outcome, TurnOutcome::Failed("Error: Rate limit reached".to_string()));
    assert_eq!(
        view.messages.last(),
        Some(&(Role::System, "Error: Rate limit reached".to_string()))
    );

    let outcome = session.send(&provider, &renderer, "italics?", &mut view).await;
    assert_eq!(outcome, TurnOutcome::Replied("Use \\emph{}.".to_string()));
    let roles: Vec<Role> = session.history().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::System, Role::User, Role::User, Role::Assistant]
    );
}
