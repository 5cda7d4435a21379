//! End-to-end tests for the keyword engine: commands, recording and replies
//! running against real files in a temp directory.
//!
//! Run with: cargo test keyword

use super::*;
use crate::keyword::commands::{
    ANSWER_RECORDED, NO_TRIGGERS, QUESTION_RECORDED, RECORDING_STARTED,
};
use crate::keyword::message::{MessagePart, Reply};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _tmp: TempDir,
    engine: KeywordEngine,
    allow_list: Arc<AllowList>,
    triggers_dir: std::path::PathBuf,
}

impl Harness {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let allow_list = Arc::new(AllowList::open(tmp.path().join("allowed_groups.yml")).await.unwrap());
        let triggers_dir = tmp.path().join("triggers");
        let engine = KeywordEngine::new(allow_list.clone(), TriggerRepository::new(&triggers_dir));
        Self {
            _tmp: tmp,
            engine,
            allow_list,
            triggers_dir,
        }
    }

    async fn send(&self, group: &str, sender: &str, text: &str) -> Option<Reply> {
        self.engine
            .handle(&IncomingMessage::text(group, sender, text))
            .await
            .unwrap()
    }

    async fn send_text(&self, group: &str, sender: &str, text: &str) -> Option<String> {
        self.send(group, sender, text).await.map(|r| r.plain_text())
    }

    async fn record(&self, group: &str, sender: &str, question: &str, answer: &str) {
        assert_eq!(self.send_text(group, sender, "开始记录").await.as_deref(), Some(RECORDING_STARTED));
        assert_eq!(self.send_text(group, sender, question).await.as_deref(), Some(QUESTION_RECORDED));
        assert_eq!(self.send_text(group, sender, answer).await.as_deref(), Some(ANSWER_RECORDED));
    }

    fn trigger_file(&self, group: &str) -> std::path::PathBuf {
        self.triggers_dir.join(format!("{group}.yml"))
    }
}

// =============================================================================
// END-TO-END SCENARIOS
// =============================================================================

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_price_scenario() {
        let h = Harness::new().await;

        let added = h.send_text("100", "1", "添加群组 100").await.unwrap();
        assert!(added.contains("100"));

        assert_eq!(h.send_text("100", "1", "开始记录").await.as_deref(), Some("已开始记录，请输入问题。"));
        assert_eq!(h.send_text("100", "1", "price?").await.as_deref(), Some("问题已记录，请输入答案。"));
        assert_eq!(h.send_text("100", "1", "$10").await.as_deref(), Some("答案已记录，新的问答对已保存。"));

        let reply = h.send_text("100", "2", "what's the price?").await.unwrap();
        assert!(reply.contains("$10"));
    }

    #[tokio::test]
    async fn test_list_triggers_empty_then_populated() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();

        assert_eq!(h.send_text("100", "1", "查看关键词").await.as_deref(), Some(NO_TRIGGERS));

        h.record("100", "1", "hello%world", "hi!").await;
        let listing = h.send_text("100", "1", "查看关键词").await.unwrap();
        assert!(listing.contains("hello%world"));
    }

    #[tokio::test]
    async fn test_wildcard_reply() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.record("100", "1", "hello%world", "hi!").await;

        assert_eq!(h.send_text("100", "2", "hello 123 world").await.as_deref(), Some("hi!"));
        assert_eq!(h.send_text("100", "2", "helloworld").await.as_deref(), Some("hi!"));
        assert_eq!(h.send("100", "2", "helloXyz").await, None);
    }

    #[tokio::test]
    async fn test_images_recorded_and_replayed_in_order() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();

        h.send("100", "1", "开始记录").await;
        let question = IncomingMessage::text("100", "1", "cat").with_image("q.png");
        h.engine.handle(&question).await.unwrap();
        let answer = IncomingMessage::text("100", "1", "meow")
            .with_image("https://example.com/2.png")
            .with_image("https://example.com/1.png");
        h.engine.handle(&answer).await.unwrap();

        let reply = h.send("100", "2", "a cat!").await.unwrap();
        assert_eq!(
            reply,
            Reply::Chain(vec![
                MessagePart::Text("meow".to_string()),
                MessagePart::Image("https://example.com/2.png".to_string()),
                MessagePart::Image("https://example.com/1.png".to_string()),
            ])
        );

        let store = TriggerRepository::new(&h.triggers_dir).load("100").await.unwrap();
        let trigger = store.iter().next().unwrap();
        assert_eq!(trigger.question.images, vec!["q.png"]);
    }

    #[tokio::test]
    async fn test_triggers_are_per_group() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.allow_list.add("200").await.unwrap();
        h.record("100", "1", "ping", "pong").await;

        assert_eq!(h.send_text("100", "2", "ping").await.as_deref(), Some("pong"));
        assert_eq!(h.send("200", "2", "ping").await, None);
    }

    #[tokio::test]
    async fn test_out_of_band_edit_is_visible() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.send("100", "1", "hi").await;

        std::fs::write(
            h.trigger_file("100"),
            "triggers:\n  manual:\n    question:\n      text: hi\n    answer:\n      text: edited by hand\n",
        )
        .unwrap();

        assert_eq!(h.send_text("100", "1", "hi").await.as_deref(), Some("edited by hand"));
    }
}

// =============================================================================
// ALLOW-LIST GATE
// =============================================================================

mod allow_list_gate {
    use super::*;

    #[tokio::test]
    async fn test_unlisted_group_gets_nothing() {
        let h = Harness::new().await;

        assert_eq!(h.send("999", "1", "开始记录").await, None);
        assert_eq!(h.send("999", "1", "查看关键词").await, None);
        assert_eq!(h.send("999", "1", "删除关键词 x").await, None);
        assert_eq!(h.send("999", "1", "anything").await, None);
        assert!(!h.trigger_file("999").exists());
    }

    #[tokio::test]
    async fn test_group_management_is_open_to_everyone() {
        let h = Harness::new().await;

        assert!(h.send_text("999", "1", "查看允许的群组").await.is_some());
        assert_eq!(h.send_text("999", "1", "添加群组 100").await.unwrap(), "群组 100 已添加到允许列表。");
        assert_eq!(h.send_text("999", "1", "添加群组 100").await.unwrap(), "群组 100 已在允许列表中。");
        assert_eq!(h.send_text("999", "1", "查看允许的群组").await.unwrap(), "当前允许的群组如下：\n100");
    }

    #[tokio::test]
    async fn test_group_commands_usage() {
        let h = Harness::new().await;

        assert_eq!(
            h.send_text("1", "1", "添加群组").await.unwrap(),
            commands::ADD_GROUP_USAGE
        );
        assert_eq!(
            h.send_text("1", "1", "删除群组 ../x").await.unwrap(),
            commands::REMOVE_GROUP_USAGE
        );
        assert_eq!(h.send_text("1", "1", "删除群组 42").await.unwrap(), "群组 42 不在允许列表中。");
    }

    #[tokio::test]
    async fn test_remove_group_purges_triggers() {
        let h = Harness::new().await;
        h.send("1", "1", "添加群组 100").await;
        h.record("100", "1", "ping", "pong").await;
        assert!(h.trigger_file("100").exists());

        let reply = h.send_text("1", "1", "删除群组 100").await.unwrap();
        assert!(reply.contains("100"));
        assert!(!h.trigger_file("100").exists());
        assert_eq!(h.send("100", "1", "ping").await, None);

        // Re-allowing starts from an empty store.
        h.send("1", "1", "添加群组 100").await;
        assert_eq!(h.send("100", "1", "ping").await, None);
        assert_eq!(h.send_text("100", "1", "查看关键词").await.as_deref(), Some(NO_TRIGGERS));
    }

    #[tokio::test]
    async fn test_remove_group_ends_its_recording() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.allow_list.add("200").await.unwrap();
        h.send("100", "1", "开始记录").await;

        h.send("1", "1", "删除群组 100").await;

        assert_eq!(h.send_text("200", "2", "开始记录").await.as_deref(), Some(RECORDING_STARTED));
    }
}

// =============================================================================
// RECORDING SESSION
// =============================================================================

mod recording {
    use super::*;

    #[tokio::test]
    async fn test_double_start_is_idempotent() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();

        assert_eq!(h.send_text("100", "1", "开始记录").await.as_deref(), Some(RECORDING_STARTED));
        assert_eq!(h.send("100", "1", "开始记录").await, None);

        assert_eq!(h.send_text("100", "1", "q").await.as_deref(), Some(QUESTION_RECORDED));
        assert_eq!(h.send_text("100", "1", "a").await.as_deref(), Some(ANSWER_RECORDED));
    }

    #[tokio::test]
    async fn test_second_recorder_is_dropped() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.allow_list.add("200").await.unwrap();

        h.send("100", "1", "开始记录").await;
        assert_eq!(h.send("100", "2", "开始记录").await, None);
        assert_eq!(h.send("200", "1", "开始记录").await, None);

        // The original owner's dialogue is unaffected.
        assert_eq!(h.send_text("100", "1", "q").await.as_deref(), Some(QUESTION_RECORDED));
    }

    #[tokio::test]
    async fn test_other_users_ignored_while_recording() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.record("100", "1", "ping", "pong").await;

        h.send("100", "1", "开始记录").await;
        // Would normally trigger an auto-reply, but a session is active.
        assert_eq!(h.send("100", "2", "ping").await, None);
        assert_eq!(h.send_text("100", "1", "q2").await.as_deref(), Some(QUESTION_RECORDED));
        assert_eq!(h.send("100", "2", "noise").await, None);
        assert_eq!(h.send_text("100", "1", "a2").await.as_deref(), Some(ANSWER_RECORDED));

        let store = TriggerRepository::new(&h.triggers_dir).load("100").await.unwrap();
        assert_eq!(store.questions(), vec!["ping", "q2"]);
        assert_eq!(store.iter().nth(1).unwrap().answer.text, "a2");
    }

    #[tokio::test]
    async fn test_owner_command_words_are_captured() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.send("100", "1", "开始记录").await;

        // Someone else can still use commands mid-session.
        assert_eq!(h.send_text("100", "2", "查看关键词").await.as_deref(), Some(NO_TRIGGERS));

        assert_eq!(h.send_text("100", "1", "查看关键词").await.as_deref(), Some(QUESTION_RECORDED));
        assert_eq!(h.send_text("100", "1", "删除关键词 foo").await.as_deref(), Some(ANSWER_RECORDED));

        let store = TriggerRepository::new(&h.triggers_dir).load("100").await.unwrap();
        assert_eq!(store.questions(), vec!["查看关键词"]);
        assert_eq!(store.iter().next().unwrap().answer.text, "删除关键词 foo");
    }

    #[tokio::test]
    async fn test_recording_in_unlisted_group_is_rejected() {
        let h = Harness::new().await;
        assert_eq!(h.send("100", "1", "开始记录").await, None);

        h.allow_list.add("200").await.unwrap();
        assert_eq!(h.send_text("200", "2", "开始记录").await.as_deref(), Some(RECORDING_STARTED));
    }

    #[tokio::test]
    async fn test_duplicate_questions_coexist() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.record("100", "1", "hi", "first").await;
        h.record("100", "1", "hi", "second").await;

        let store = TriggerRepository::new(&h.triggers_dir).load("100").await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(h.send_text("100", "2", "hi").await.as_deref(), Some("first"));
    }
}

// =============================================================================
// DELETE TRIGGER
// =============================================================================

mod delete_trigger {
    use super::*;

    #[tokio::test]
    async fn test_delete_existing() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.record("100", "1", "price?", "$10").await;

        assert_eq!(
            h.send_text("100", "1", "删除关键词 price?").await.unwrap(),
            "关键词 'price?' 及其回复信息已成功删除。"
        );
        assert_eq!(h.send("100", "1", "what's the price?").await, None);
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();

        assert_eq!(h.send_text("100", "1", "删除关键词 nope").await.unwrap(), "未找到关键词 'nope'。");
    }

    #[tokio::test]
    async fn test_delete_requires_exact_text() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();
        h.record("100", "1", "hello%world", "hi").await;

        assert_eq!(h.send_text("100", "1", "删除关键词 hello world").await.unwrap(), "未找到关键词 'hello world'。");
        assert!(h.send_text("100", "1", "删除关键词 hello%world").await.unwrap().contains("成功删除"));
    }

    #[tokio::test]
    async fn test_delete_usage() {
        let h = Harness::new().await;
        h.allow_list.add("100").await.unwrap();

        assert_eq!(h.send_text("100", "1", "删除关键词").await.unwrap(), commands::DELETE_TRIGGER_USAGE);
    }
}
