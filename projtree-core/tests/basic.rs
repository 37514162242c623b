use projtree_core::ai::mock::MockBehavior;
use projtree_core::ai::MessageRole;
use projtree_core::chat::actor::ChatActorMessage;
use projtree_core::chat::events::{ChatEvent, MessageSender};


fn stream_deltas(events: &[ChatEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::StreamDelta { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_fixture() {
    fixture::run(|mut fixture| async move {
        let events = fixture.step("Hello").await;

        assert!(
            events.iter().any(|e| matches!(
                e,
                ChatEvent::MessageAdded(msg) if msg.sender == MessageSender::User && msg.content == "Hello"
            )),
            "Should echo the user message"
        );
        assert_eq!(fixture::assistant_texts(&events), vec!["Mock response"]);
        assert_eq!(fixture.provider().get_call_count(), 1);
    });
}

#[test]
fn test_blank_input_is_ignored() {
    fixture::run(|mut fixture| async move {
        let events = fixture.step("   ").await;
        assert!(events.is_empty());
        assert_eq!(fixture.provider().get_call_count(), 0);
    });
}

#[test]
fn test_streamed_text_is_forwarded_and_accumulated() {
    fixture::run_with_behavior(
        MockBehavior::StreamedText {
            chunks: vec!["Hel".to_string(), "lo ".to_string(), "there".to_string()],
        },
        |mut fixture| async move {
            let events = fixture.step("Say hello").await;

            assert_eq!(stream_deltas(&events), vec!["Hel", "lo ", "there"]);
            assert_eq!(fixture::assistant_texts(&events), vec!["Hello there"]);

            // Deltas arrive before the final message
            let first_delta = events
                .iter()
                .position(|e| matches!(e, ChatEvent::StreamDelta { .. }))
                .unwrap();
            let message = events
                .iter()
                .position(|e| matches!(e, ChatEvent::MessageAdded(m) if m.sender == MessageSender::Assistant))
                .unwrap();
            assert!(first_delta < message);
        },
    );
}

#[test]
fn test_disable_streaming_uses_aggregate_response() {
    fixture::run(|mut fixture| async move {
        fixture.update_settings(|s| s.disable_streaming = true);

        let events = fixture.step("Hello").await;
        assert!(stream_deltas(&events).is_empty());
        assert_eq!(fixture::assistant_texts(&events), vec!["Mock response"]);
    });
}

#[test]
fn test_conversation_history_is_kept_without_context() {
    fixture::run(|mut fixture| async move {
        fixture.link(&[("notes.md", "remember this")]).await;

        fixture.step("First").await;
        fixture.step("Second").await;

        let request = fixture.provider().get_last_captured_request().unwrap();
        let texts: Vec<String> = request.messages.iter().map(|m| m.content.text()).collect();
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[0], "First");
        assert_eq!(texts[1], "Mock response");
        assert!(texts[2].contains("----- BEGIN FILE: notes.md -----"));
        assert_eq!(texts[3], "Second");
        assert_eq!(request.messages[1].role, MessageRole::Assistant);

        // Only the latest request carries the project
        let with_context = request
            .messages
            .iter()
            .filter(|m| m.content.text().starts_with("Project structure:"))
            .count();
        assert_eq!(with_context, 1);
    });
}

#[test]
fn test_coder_mode_off_sends_plain_chat() {
    fixture::run(|mut fixture| async move {
        fixture.link(&[("notes.md", "remember this")]).await;

        let events = fixture.command(ChatActorMessage::SetCoderMode(false)).await;
        assert!(events.iter().any(|e| matches!(
            e,
            ChatEvent::MessageAdded(m) if m.sender == MessageSender::System
        )));

        fixture.step("Just chat").await;

        let request = fixture.provider().get_last_captured_request().unwrap();
        assert_eq!(request.messages.len(), 1);
        assert!(request.tools.is_empty());
    });
}

#[test]
fn test_settings_reach_the_request() {
    fixture::run(|mut fixture| async move {
        fixture.update_settings(|s| {
            s.model = "test-model".to_string();
            s.system_prompt = Some("Be terse".to_string());
        });

        fixture.step("Hi").await;

        let request = fixture.provider().get_last_captured_request().unwrap();
        assert_eq!(request.model, "test-model");
        assert_eq!(request.system_prompt.as_deref(), Some("Be terse"));
        let names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["writeFile", "createFolder", "move", "deletePath"]);
    });
}
