//! Router behavior across components: selection, quota windows, fallback
//! and the status view, driven through the public API with a scripted
//! invoker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use verse_router::flows::{PoemRequest, RewriteRequest, generate_poem, suggest_rewrites};
use verse_router::{
    Clock, Error, GenerationInvoker, GenerationRequest, InlineImage, ManualClock, ModelDescriptor,
    ModelRouter,
};

/// Replays one scripted answer per call, in order, and records which model
/// each call went to. Runs out as a non-rate-limit failure.
#[derive(Debug, Default)]
struct ScriptedInvoker {
    script: Mutex<VecDeque<Result<Value, Error>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedInvoker {
    fn new(script: impl IntoIterator<Item = Result<Value, Error>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationInvoker for ScriptedInvoker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn invoke(&self, model: &str, _request: &GenerationRequest) -> verse_router::Result<Value> {
        self.calls.lock().unwrap().push(model.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::InvalidRequest("script exhausted".into())))
    }
}

fn model(id: &str, max: u32) -> ModelDescriptor {
    ModelDescriptor::new(id, id.to_uppercase(), max, Duration::from_secs(60))
}

fn poem() -> Value {
    json!({"title": "X", "poem": "Y"})
}

fn router(
    models: Vec<ModelDescriptor>,
    invoker: Arc<ScriptedInvoker>,
) -> (ModelRouter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let router = ModelRouter::builder()
        .models(models)
        .clock(clock.clone())
        .invoker_arc(invoker)
        .build()
        .unwrap();
    (router, clock)
}

fn image() -> InlineImage {
    InlineImage::from_bytes("image/png", b"\x89PNG\r\n").unwrap()
}

// ============================================================================
// Selection and quota windows
// ============================================================================

mod selection {
    use super::*;

    #[tokio::test]
    async fn test_waterfall_through_quota() {
        let invoker = ScriptedInvoker::new(vec![Ok(poem()), Ok(poem()), Ok(poem()), Ok(poem())]);
        let (router, _) = router(vec![model("a", 2), model("b", 1)], invoker.clone());

        for _ in 0..4 {
            generate_poem(&router, PoemRequest::new(image())).await.unwrap();
        }

        // a twice, b once, then both capped: last resort goes back to a
        assert_eq!(invoker.calls(), vec!["a", "a", "b", "a"]);
        assert_eq!(router.usage("a").count, 3);
        assert_eq!(router.usage("b").count, 1);
    }

    #[tokio::test]
    async fn test_window_reset() {
        let invoker = ScriptedInvoker::new(vec![Ok(poem()), Ok(poem())]);
        let (router, clock) = router(vec![model("a", 1), model("b", 1)], invoker.clone());

        generate_poem(&router, PoemRequest::new(image())).await.unwrap();
        assert_eq!(router.select_model(), "b");

        clock.advance(Duration::from_secs(59));
        assert_eq!(router.select_model(), "b");

        clock.advance(Duration::from_secs(1));
        assert_eq!(router.select_model(), "a");
        assert_eq!(router.usage("a").count, 0);

        generate_poem(&router, PoemRequest::new(image())).await.unwrap();
        assert_eq!(invoker.calls(), vec!["a", "a"]);
        assert_eq!(router.usage("a").count, 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_change_usage() {
        let invoker = ScriptedInvoker::new(vec![Ok(poem())]);
        let (router, clock) = router(vec![model("a", 1)], invoker);

        generate_poem(&router, PoemRequest::new(image())).await.unwrap();
        let before = router.usage("a");

        clock.advance(Duration::from_secs(120));
        let _ = router.snapshot();
        let _ = router.select_model();
        let _ = router.status();

        // Expired windows are projected on read but only stored on write.
        assert_eq!(router.usage("a").count, 0);
        clock.set(before.window_start + chrono::TimeDelta::seconds(30));
        assert_eq!(router.usage("a"), before);
    }
}

// ============================================================================
// Fallback
// ============================================================================

mod fallback {
    use super::*;

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let invoker = ScriptedInvoker::new(vec![Err(Error::rate_limited("a")), Ok(poem())]);
        let (router, _) = router(vec![model("a", 5), model("b", 5)], invoker.clone());

        let output = generate_poem(&router, PoemRequest::new(image())).await.unwrap();

        assert_eq!(output.title, "X");
        assert_eq!(output.poem, "Y");
        assert_eq!(invoker.calls(), vec!["a", "b"]);
        assert_eq!(router.usage("a").count, 0);
        assert_eq!(router.usage("b").count, 1);
    }

    #[tokio::test]
    async fn test_two_rate_limits_exhaust() {
        let invoker = ScriptedInvoker::new(vec![
            Err(Error::rate_limited("a")),
            Err(Error::RateLimited {
                model: "b".into(),
                retry_after: Some(Duration::from_secs(7)),
            }),
        ]);
        let (router, _) = router(vec![model("a", 5), model("b", 5)], invoker.clone());

        let err = generate_poem(&router, PoemRequest::new(image()))
            .await
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(invoker.calls().len(), 2);
        assert_eq!(router.usage("a").count, 0);
        assert_eq!(router.usage("b").count, 0);
    }

    #[tokio::test]
    async fn test_single_model_is_not_retried() {
        let invoker = ScriptedInvoker::new(vec![Err(Error::rate_limited("a")), Ok(poem())]);
        let (router, _) = router(vec![model("a", 5)], invoker.clone());

        let err = generate_poem(&router, PoemRequest::new(image()))
            .await
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(invoker.calls(), vec!["a"]);
        assert!(err.user_message().contains("busy"));
    }

    #[tokio::test]
    async fn test_no_retry_onto_a_capped_model() {
        let invoker = ScriptedInvoker::new(vec![
            Ok(poem()),
            Err(Error::rate_limited("b")),
            Ok(poem()),
        ]);
        let (router, _) = router(vec![model("a", 1), model("b", 5)], invoker.clone());

        generate_poem(&router, PoemRequest::new(image())).await.unwrap();
        let err = generate_poem(&router, PoemRequest::new(image()))
            .await
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(invoker.calls(), vec!["a", "b"]);
        assert_eq!(router.usage("a").count, 1);
        assert_eq!(router.usage("b").count, 0);
    }

    #[tokio::test]
    async fn test_non_rate_limit_failure_is_returned_as_is() {
        let invoker = ScriptedInvoker::new(vec![
            Err(Error::Api {
                message: "image could not be processed".into(),
                status: Some(400),
                error_type: Some("INVALID_ARGUMENT".into()),
            }),
            Ok(poem()),
        ]);
        let (router, _) = router(vec![model("a", 5), model("b", 5)], invoker.clone());

        let err = generate_poem(&router, PoemRequest::new(image()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { status: Some(400), .. }));
        assert_eq!(invoker.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_rewrite_falls_back_too() {
        let invoker = ScriptedInvoker::new(vec![
            Err(Error::rate_limited("a")),
            Ok(json!({"suggestions": ["a brighter line", "a quieter line"]})),
        ]);
        let (router, _) = router(vec![model("a", 5), model("b", 5)], invoker.clone());

        let output = suggest_rewrites(&router, RewriteRequest::new("first\nsecond", 0).count(1))
            .await
            .unwrap();

        assert_eq!(output.suggestions, vec!["a brighter line"]);
        assert_eq!(invoker.calls(), vec!["a", "b"]);
    }
}

// ============================================================================
// Concurrency and status
// ============================================================================

mod shared_state {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_count_every_success() {
        let invoker = ScriptedInvoker::new((0..20).map(|_| Ok(poem())));
        let (router, _) = router(vec![model("a", 1000)], invoker);

        let tasks = (0..20).map(|_| {
            let router = router.clone();
            tokio::spawn(async move {
                generate_poem(&router, PoemRequest::new(image())).await
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(router.usage("a").count, 20);
        assert_eq!(router.metrics().requests_success.get(), 20);
        assert_eq!(router.metrics().active_requests.get(), 0);
    }

    #[tokio::test]
    async fn test_status_payload() {
        let invoker = ScriptedInvoker::new(vec![Err(Error::rate_limited("a")), Ok(poem())]);
        let (router, _) = router(vec![model("a", 5), model("b", 1)], invoker);

        generate_poem(&router, PoemRequest::new(image())).await.unwrap();
        let status = serde_json::to_value(router.status()).unwrap();

        assert_eq!(status["models"][0]["descriptor"]["id"], "a");
        assert_eq!(status["models"][0]["is_available"], true);
        assert_eq!(status["models"][1]["usage"]["count"], 1);
        assert_eq!(status["models"][1]["is_available"], false);
        assert_eq!(status["models"][1]["descriptor"]["reset_interval_ms"], 60_000);
        assert_eq!(status["metrics"]["fallbacks"], 1);
        assert_eq!(status["metrics"]["rate_limited_attempts"], 1);
        assert!(status["generated_at"].is_string());
    }

    #[tokio::test]
    async fn test_status_time_follows_router_clock() {
        let (router, clock) = router(vec![model("a", 1)], ScriptedInvoker::new([Ok(poem())]));
        clock.advance(Duration::from_secs(3600));

        let status = router.status();
        assert_eq!(status.generated_at, clock.now());
        assert_eq!(status.models[0].usage.window_start, clock.now());
    }

    #[tokio::test]
    async fn test_routers_can_share_a_tracker() {
        let invoker = ScriptedInvoker::new(vec![Ok(poem()), Ok(poem())]);
        let (first, _) = router(vec![model("a", 1), model("b", 1)], invoker.clone());
        let second = ModelRouter::builder()
            .tracker(first.tracker().clone())
            .invoker_arc(invoker.clone())
            .build()
            .unwrap();

        generate_poem(&first, PoemRequest::new(image())).await.unwrap();
        generate_poem(&second, PoemRequest::new(image())).await.unwrap();

        assert_eq!(invoker.calls(), vec!["a", "b"]);
    }
}
