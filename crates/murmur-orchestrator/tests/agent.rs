//! End-to-end behavior of the agent with scripted collaborators

use murmur_agent::mock::{ScriptedGenerator, ScriptedTransport};
use murmur_core::{ArtifactKind, InboundMessage, MurmurConfig, MurmurError};
use murmur_orchestrator::testing::{ChannelInbox, RecordingResponder};
use murmur_orchestrator::Agent;
use std::sync::Arc;
use std::time::Duration;

const ALICE: &str = "npub1alice0000000000000000000000000000000000000000000000000000";
const MALLORY: &str = "npub1mallory00000000000000000000000000000000000000000000000000";

struct Harness {
    agent: Arc<Agent>,
    generator: Arc<ScriptedGenerator>,
    transport: Arc<ScriptedTransport>,
}

fn harness(authorized: &[&str]) -> Harness {
    harness_with(authorized, ScriptedTransport::new())
}

fn harness_with(authorized: &[&str], transport: ScriptedTransport) -> Harness {
    let mut config = MurmurConfig::default();
    config.guidance.authorized_identities = authorized.iter().map(|s| s.to_string()).collect();

    let generator = Arc::new(ScriptedGenerator::new());
    let transport = Arc::new(transport);
    let agent = Agent::new(config, generator.clone(), transport.clone()).unwrap();

    Harness {
        agent: Arc::new(agent),
        generator,
        transport,
    }
}

async fn send(h: &Harness, sender: &str, text: &str) -> String {
    h.agent
        .dispatcher()
        .handle(&InboundMessage::new(sender, text))
        .await
}

#[tokio::test]
async fn post_now_from_authorized_identity_publishes_once() {
    let h = harness(&[ALICE]);

    let reply = send(&h, ALICE, "!post-now").await;

    assert!(reply.starts_with("Posted"), "reply: {}", reply);
    assert_eq!(h.generator.call_count(), 1);
    assert_eq!(h.transport.published().len(), 1);
    assert!(h.agent.runtime().last_post().is_some());
}

#[tokio::test]
async fn unauthorized_identity_cannot_post() {
    let h = harness(&[ALICE]);

    let reply = send(&h, MALLORY, "!post-now").await;

    assert!(reply.starts_with("Unauthorized"));
    assert_eq!(h.generator.call_count(), 0);
    assert_eq!(h.transport.send_count(), 0);
}

#[tokio::test]
async fn out_of_range_interval_is_rejected() {
    let h = harness(&[ALICE]);
    let before = h.agent.runtime().interval();

    let reply = send(&h, ALICE, "!set-interval 2000").await;

    assert!(reply.starts_with("Invalid posting interval"));
    assert_eq!(h.agent.runtime().interval(), before);
}

#[tokio::test]
async fn empty_authorized_set_allows_everyone() {
    let h = harness(&[]);

    let reply = send(&h, MALLORY, "!set-prompt Write haiku only.").await;

    assert_eq!(reply, "Prompt updated.");
    assert_eq!(h.agent.runtime().active_prompt(), "Write haiku only.");
}

#[tokio::test]
async fn status_is_open_to_everyone() {
    let h = harness(&[ALICE]);

    let reply = send(&h, MALLORY, "!status").await;

    assert!(reply.starts_with("Murmur"));
    assert!(reply.contains("Last post: never"));
    assert!(reply.contains("Transport circuit: closed"));
}

#[tokio::test]
async fn guidance_reaches_generator() {
    let h = harness(&[ALICE]);

    send(&h, MALLORY, "something about autumn").await;

    let calls = h.generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].guidance.as_deref(), Some("something about autumn"));
    assert_eq!(h.transport.published().len(), 1);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = MurmurConfig::default();
    config.posting.interval_minutes = 0;

    let err = Agent::new(
        config,
        Arc::new(ScriptedGenerator::new()),
        Arc::new(ScriptedTransport::new()),
    )
    .unwrap_err();

    assert!(matches!(err, MurmurError::Config(_)));
}

#[tokio::test]
async fn generate_and_post_outside_timer() {
    let h = harness(&[]);

    let receipt = h.agent.generate_and_post(Some("tea")).await.unwrap();

    assert_eq!(receipt.attempts, 1);
    assert_eq!(h.transport.published()[0].id, receipt.artifact.id);
}

#[tokio::test(start_paused = true)]
async fn listener_replies_to_each_message() {
    let h = harness(&[ALICE]);
    let (inbox, tx) = ChannelInbox::new(8);
    let responder = Arc::new(RecordingResponder::new());
    let agent = Arc::new(
        Arc::try_unwrap(h.agent)
            .unwrap()
            .with_inbox(Arc::new(inbox), responder.clone()),
    );

    let task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    tx.send(InboundMessage::new(ALICE, "!help")).await.unwrap();
    tx.send(InboundMessage::new(MALLORY, "!post-now")).await.unwrap();
    responder.wait_for_replies(2).await;

    let replies = responder.replies();
    assert_eq!(replies[0].0, ALICE);
    assert!(replies[0].1.starts_with("Commands:"));
    assert_eq!(replies[1].0, MALLORY);
    assert!(replies[1].1.starts_with("Unauthorized"));

    agent.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_reply_does_not_stop_listener() {
    let h = harness(&[]);
    let (inbox, tx) = ChannelInbox::new(8);
    let transport = h.transport.clone();
    let agent = Arc::new(
        Arc::try_unwrap(h.agent)
            .unwrap()
            .with_inbox(Arc::new(inbox), Arc::new(RecordingResponder::failing())),
    );

    let task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    tx.send(InboundMessage::new(ALICE, "first thought")).await.unwrap();
    tx.send(InboundMessage::new(ALICE, "second thought")).await.unwrap();
    drop(tx);

    // Inbox closes after the second message; the posting loop keeps running
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.published_of(ArtifactKind::TextNote).len(), 2);
    assert!(!task.is_finished());

    agent.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_finishes_message_in_flight() {
    let h = harness_with(&[], ScriptedTransport::new().with_delay(Duration::from_secs(5)));
    let (inbox, tx) = ChannelInbox::new(8);
    let responder = Arc::new(RecordingResponder::new());
    let transport = h.transport.clone();
    let agent = Arc::new(
        Arc::try_unwrap(h.agent)
            .unwrap()
            .with_inbox(Arc::new(inbox), responder.clone()),
    );

    let task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    tx.send(InboundMessage::new(ALICE, "!post-now")).await.unwrap();

    // Profile update holds the transport until t=5; the note send is parked after it
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(transport.send_count(), 2);
    assert!(transport.published_of(ArtifactKind::TextNote).is_empty());

    agent.shutdown();
    task.await.unwrap().unwrap();

    assert_eq!(transport.published_of(ArtifactKind::TextNote).len(), 1);
    let replies = responder.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].1.starts_with("Posted"));
}

#[tokio::test(start_paused = true)]
async fn profile_is_published_once_on_start() {
    let h = harness(&[]);

    let task = tokio::spawn({
        let agent = h.agent.clone();
        async move { agent.run().await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;

    let profiles = h.transport.published_of(ArtifactKind::Metadata);
    assert_eq!(profiles.len(), 1);
    assert!(profiles[0].content.contains("\"name\":\"Murmur\""));
    assert_eq!(h.transport.send_count(), 1);
    assert!(h.transport.published_of(ArtifactKind::TextNote).is_empty());

    h.agent.shutdown();
    task.await.unwrap().unwrap();
    assert_eq!(h.transport.published_of(ArtifactKind::Metadata).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_profile_update_does_not_stop_agent() {
    let h = harness_with(
        &[],
        ScriptedTransport::new()
            .failing_times(1)
            .failing_with(MurmurError::Auth),
    );
    let (inbox, tx) = ChannelInbox::new(8);
    let responder = Arc::new(RecordingResponder::new());
    let transport = h.transport.clone();
    let agent = Arc::new(
        Arc::try_unwrap(h.agent)
            .unwrap()
            .with_inbox(Arc::new(inbox), responder.clone()),
    );

    let task = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    tx.send(InboundMessage::new(ALICE, "!post-now")).await.unwrap();
    responder.wait_for_replies(1).await;

    assert!(responder.replies()[0].1.starts_with("Posted"));
    assert_eq!(transport.send_count(), 2);
    assert!(transport.published_of(ArtifactKind::Metadata).is_empty());
    assert_eq!(transport.published_of(ArtifactKind::TextNote).len(), 1);
    assert!(!task.is_finished());

    agent.shutdown();
    task.await.unwrap().unwrap();
}
