//! Turns a streamed chat completion body into text fragments.
//!
//! The body is a sequence of `data: <json>` lines. Text deltas are yielded as
//! soon as their line is complete. Tool-call deltas are accumulated silently
//! and, once the transport ends, the assembled call is resolved and its output
//! becomes the last fragment.
pub mod events;
pub mod lines;

use async_stream::try_stream;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fmt::Display;

use crate::errors::ChatError;
use crate::errors::ChatResult;
use crate::models::message::Message;
use crate::tools::{resolve_tool_call, ToolResolver};
use events::{parse_line, LineEvent, ToolCallAccumulator};
use lines::LineBuffer;

/// Lazy, single-pass sequence of reply fragments
pub type FragmentStream<'a> = BoxStream<'a, ChatResult<String>>;

/// Decode a response body into fragments.
///
/// The body is owned by the returned stream: it is dropped as soon as the
/// transport ends, on a read error, or when the consumer drops the stream.
pub fn decode<'a, S, B, E>(
    body: S,
    resolver: &'a dyn ToolResolver,
    history: &'a [Message],
) -> FragmentStream<'a>
where
    S: Stream<Item = Result<B, E>> + Send + 'a,
    B: AsRef<[u8]> + Send + 'a,
    E: Display + Send + 'a,
{
    Box::pin(try_stream! {
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::new();
        let mut tool_call = ToolCallAccumulator::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ChatError::Stream(e.to_string()))?;
            for line in lines.push(chunk.as_ref()) {
                if let Some(text) = handle_line(&line, &mut tool_call) {
                    yield text;
                }
            }
        }
        drop(body);

        if let Some(line) = lines.finish() {
            if let Some(text) = handle_line(&line, &mut tool_call) {
                yield text;
            }
        }

        match tool_call.finish() {
            Some(Ok(call)) => {
                tracing::debug!(tool = %call.name, "resolving tool call");
                if let Some(output) = resolve_tool_call(resolver, &call, history).await {
                    yield output;
                }
            }
            Some(Err(e)) => {
                yield format!("Error: Invalid tool arguments: {}", e);
            }
            None => {}
        }
    })
}

fn handle_line(line: &str, tool_call: &mut ToolCallAccumulator) -> Option<String> {
    match parse_line(line) {
        LineEvent::Ignored => None,
        LineEvent::Malformed(e) => {
            tracing::warn!("Error parsing stream data: {}", e);
            None
        }
        LineEvent::Chunk(chunk) => {
            if let Some(text) = chunk.text() {
                return Some(text.to_string());
            }
            tool_call.absorb(chunk.tool_calls());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    #[derive(Default)]
    struct EchoResolver {
        titles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolResolver for EchoResolver {
        async fn fetch_citation(&self, title: &str) -> ChatResult<String> {
            self.titles.lock().unwrap().push(title.to_string());
            Ok(format!("citation for {}", title))
        }

        async fn fetch_abstract(&self, key: &str, _history: &[Message]) -> ChatResult<String> {
            Ok(format!("abstract for {}", key))
        }
    }

    fn content_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    fn tool_line(index: u32, name: Option<&str>, arguments: Option<&str>) -> String {
        let mut function = json!({});
        if let Some(name) = name {
            function["name"] = json!(name);
        }
        if let Some(arguments) = arguments {
            function["arguments"] = json!(arguments);
        }
        format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"tool_calls": [{"index": index, "function": function}]}}]})
        )
    }

    fn body(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Result<Vec<u8>, Infallible>> + Send {
        stream::iter(chunks.into_iter().map(Ok))
    }

    async fn collect(chunks: Vec<Vec<u8>>, resolver: &EchoResolver) -> Vec<String> {
        let history = [Message::user("hello")];
        decode(body(chunks), resolver, &history)
            .map(|f| f.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_text_fragments_in_order() {
        let resolver = EchoResolver::default();
        let raw = [
            content_line("Hello"),
            ": keep-alive\n".to_string(),
            content_line(", "),
            content_line("world"),
            "data: [DONE]\n\n".to_string(),
        ]
        .concat();
        // split at awkward points to exercise the line buffer
        let bytes = raw.into_bytes();
        let chunks = bytes.chunks(7).map(|c| c.to_vec()).collect();

        let fragments = collect(chunks, &resolver).await;
        assert_eq!(fragments, vec!["Hello", ", ", "world"]);
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_stop_stream() {
        let resolver = EchoResolver::default();
        let raw = [
            content_line("a"),
            "data: {\"choices\": [\n".to_string(),
            content_line("b"),
        ]
        .concat();

        let fragments = collect(vec![raw.into_bytes()], &resolver).await;
        assert_eq!(fragments, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_split_tool_call_resolves_once_at_end() {
        let resolver = EchoResolver::default();
        let raw = [
            tool_line(0, Some("fetchPubMed"), None),
            tool_line(0, Some("Citation"), Some("{\"ti")),
            tool_line(0, None, Some("tle\": \"Deep ")),
            tool_line(0, None, Some("learning\"}")),
        ];
        let chunks = raw.iter().map(|l| l.as_bytes().to_vec()).collect();

        let fragments = collect(chunks, &resolver).await;
        assert_eq!(fragments, vec!["citation for Deep learning"]);
        assert_eq!(resolver.titles.lock().unwrap().as_slice(), ["Deep learning"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_name_yields_nothing() {
        let resolver = EchoResolver::default();
        let raw = [
            content_line("Let me check."),
            tool_line(0, Some("fetchArxiv"), Some("{\"title\": \"x\"}")),
        ]
        .concat();

        let fragments = collect(vec![raw.into_bytes()], &resolver).await;
        assert_eq!(fragments, vec!["Let me check."]);
        assert!(resolver.titles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_tool_indices_are_ignored() {
        let resolver = EchoResolver::default();
        let with_extra = [
            content_line("Looking it up."),
            tool_line(0, Some("fetchPubMedAbstract"), Some("{\"citationKeyOrTitle\":")),
            tool_line(1, Some("fetchPubMedCitation"), Some("{\"title\": \"x\"}")),
            tool_line(0, None, Some("\"smith2020\"}")),
            tool_line(2, None, Some("garbage")),
        ]
        .concat();
        let without_extra = [
            content_line("Looking it up."),
            tool_line(0, Some("fetchPubMedAbstract"), Some("{\"citationKeyOrTitle\":")),
            tool_line(0, None, Some("\"smith2020\"}")),
        ]
        .concat();

        let a = collect(vec![with_extra.into_bytes()], &resolver).await;
        let b = collect(vec![without_extra.into_bytes()], &resolver).await;
        assert_eq!(a, vec!["Looking it up.", "abstract for smith2020"]);
        assert_eq!(a, b);
        assert!(resolver.titles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_tool_arguments_yield_error_fragment() {
        let resolver = EchoResolver::default();
        let raw = tool_line(0, Some("fetchPubMedCitation"), Some("{\"title\": "));

        let fragments = collect(vec![raw.into_bytes()], &resolver).await;
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with("Error: Invalid tool arguments:"));
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_processed() {
        let resolver = EchoResolver::default();
        let raw = format!("{}data: {}", content_line("one"), json!({"choices": [{"delta": {"content": "two"}}]}));

        let fragments = collect(vec![raw.into_bytes()], &resolver).await;
        assert_eq!(fragments, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_read_error_ends_stream_with_error() {
        let resolver = EchoResolver::default();
        let history: [Message; 0] = [];
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(content_line("partial").into_bytes()),
            Err("connection reset".to_string()),
            Ok(content_line("never").into_bytes()),
        ];
        let mut fragments = decode(stream::iter(chunks), &resolver, &history);

        assert_eq!(fragments.next().await.unwrap().unwrap(), "partial");
        let err = fragments.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Stream interrupted: connection reset");
        assert!(fragments.next().await.is_none());
    }

    /// Body that records when it is dropped
    struct TrackedBody {
        chunks: Vec<Vec<u8>>,
        released: Arc<AtomicBool>,
    }

    impl Stream for TrackedBody {
        type Item = Result<Vec<u8>, Infallible>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            if self.chunks.is_empty() {
                Poll::Ready(None)
            } else {
                Poll::Ready(Some(Ok(self.chunks.remove(0))))
            }
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_body_released_when_consumer_stops_early() {
        let resolver = EchoResolver::default();
        let history: [Message; 0] = [];
        let released = Arc::new(AtomicBool::new(false));
        let tracked = TrackedBody {
            chunks: vec![content_line("first").into_bytes(), content_line("second").into_bytes()],
            released: released.clone(),
        };

        let mut fragments = decode(tracked, &resolver, &history);
        assert_eq!(fragments.next().await.unwrap().unwrap(), "first");
        assert!(!released.load(Ordering::SeqCst));

        drop(fragments);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_body_released_before_tool_resolution() {
        struct CheckingResolver(Arc<AtomicBool>);

        #[async_trait]
        impl ToolResolver for CheckingResolver {
            async fn fetch_citation(&self, _title: &str) -> ChatResult<String> {
                Ok(format!("released={}", self.0.load(Ordering::SeqCst)))
            }

            async fn fetch_abstract(&self, _key: &str, _history: &[Message]) -> ChatResult<String> {
                unreachable!()
            }
        }

        let released = Arc::new(AtomicBool::new(false));
        let resolver = CheckingResolver(released.clone());
        let history: [Message; 0] = [];
        let tracked = TrackedBody {
            chunks: vec![tool_line(0, Some("fetchPubMedCitation"), Some("{\"title\":\"t\"}")).into_bytes()],
            released,
        };

        let fragments: Vec<String> = decode(tracked, &resolver, &history)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["released=true"]);
    }
}
