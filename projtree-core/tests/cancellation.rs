use projtree_core::ai::mock::MockBehavior;
use projtree_core::chat::events::ChatEvent;


async fn drain_until_idle(fixture: &mut fixture::Fixture) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = fixture.event_rx.recv().await {
        let done = matches!(event, ChatEvent::TypingStatusChanged(false));
        events.push(event);
        if done {
            break;
        }
    }
    events
}

#[test]
fn test_cancel_during_backoff() {
    fixture::run_with_behavior(
        MockBehavior::AlwaysStatusError { code: 503 },
        |mut fixture| async move {
            fixture.update_settings(|s| {
                s.retry.unavailable_base_ms = 60_000;
                s.retry.unavailable_max_ms = 60_000;
                s.retry.cancel_poll_ms = 5;
            });

            fixture.send_message("This will keep failing");

            // Wait for the first backoff to begin
            loop {
                match fixture.event_rx.recv().await {
                    Some(ChatEvent::RetryAttempt { .. }) => {
                        fixture.actor.cancel();
                        break;
                    }
                    Some(_) => continue,
                    None => panic!("Event channel closed before RetryAttempt"),
                }
            }

            let events = drain_until_idle(&mut fixture).await;

            assert!(
                events
                    .iter()
                    .any(|e| matches!(e, ChatEvent::OperationCancelled { .. })),
                "Should receive OperationCancelled event"
            );
            assert!(
                fixture::errors(&events).is_empty(),
                "Cancellation must not produce an error entry"
            );
            assert_eq!(fixture.provider().get_call_count(), 1);

            // The next prompt runs normally
            fixture.set_mock_behavior(MockBehavior::Success);
            let events = fixture.step("What's 2+2?").await;
            assert_eq!(fixture::assistant_texts(&events), vec!["Mock response"]);
            assert!(fixture::errors(&events).is_empty());
        },
    );
}

#[test]
fn test_cancel_while_idle_does_not_affect_next_turn() {
    fixture::run(|mut fixture| async move {
        fixture.actor.cancel();

        let events = fixture.step("Hello").await;

        assert!(!events
            .iter()
            .any(|e| matches!(e, ChatEvent::OperationCancelled { .. })));
        assert_eq!(fixture::assistant_texts(&events), vec!["Mock response"]);
    });
}
